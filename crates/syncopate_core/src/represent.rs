//! Representation layer: projecting stored entities to the wire shape.
//!
//! Responsibilities: hide store-managed underscore fields (unless debug
//! mode is on or the field is a join alias of the current query), fill
//! every declared field with null when absent, and coerce the id to the
//! generator's external type.

use crate::entity::{is_internal_field, Entity};
use crate::id::IdStrategy;
use crate::schema::EntityDefinition;

/// Options for a single projection.
///
/// The join-alias list is a parameter, not a global: underscore filtering
/// must consult the active query's aliases.
#[derive(Debug, Clone, Copy, Default)]
pub struct Projection<'a> {
    /// Include underscore fields verbatim (debug mode).
    pub debug: bool,
    /// Aliases of the active query's joins, exempt from filtering.
    pub join_aliases: &'a [String],
}

impl<'a> Projection<'a> {
    /// A projection with join aliases and no debug override.
    #[must_use]
    pub fn with_aliases(join_aliases: &'a [String]) -> Self {
        Self {
            debug: false,
            join_aliases,
        }
    }

    fn keeps(&self, name: &str) -> bool {
        !is_internal_field(name)
            || self.debug
            || self.join_aliases.iter().any(|alias| alias == name)
    }
}

/// Coerces a canonical id to its generator-declared external type:
/// integer for auto_increment, string otherwise.
#[must_use]
pub fn coerce_id(id: &str, generator: IdStrategy) -> serde_json::Value {
    match generator {
        IdStrategy::AutoIncrement => id
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(id.to_string())),
        _ => serde_json::Value::String(id.to_string()),
    }
}

/// Projects a stored entity to its wire representation.
#[must_use]
pub fn to_representation(
    entity: &Entity,
    def: &EntityDefinition,
    projection: &Projection<'_>,
) -> serde_json::Value {
    let mut fields = serde_json::Map::new();

    for (name, value) in &entity.fields {
        // The id lives only at the top level; a stray 'id' key in the
        // field map is dropped rather than echoed back.
        if name == "id" {
            continue;
        }
        if !projection.keeps(name) {
            continue;
        }
        fields.insert(name.clone(), value.to_json());
    }

    for field in &def.fields {
        if field.internal || is_internal_field(&field.name) || field.name == "id" {
            continue;
        }
        fields
            .entry(field.name.clone())
            .or_insert(serde_json::Value::Null);
    }

    let mut out = serde_json::Map::new();
    out.insert("id".to_string(), coerce_id(&entity.id, def.generator()));
    out.insert(
        "type".to_string(),
        serde_json::Value::String(entity.entity_type.clone()),
    );
    out.insert("fields".to_string(), serde_json::Value::Object(fields));
    serde_json::Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDefinition;
    use crate::value::{FieldType, FieldValue};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn def_with(fields: Vec<FieldDefinition>, generator: IdStrategy) -> EntityDefinition {
        EntityDefinition {
            name: "user".into(),
            id_generator: Some(generator),
            fields,
        }
    }

    fn plain_field(name: &str) -> FieldDefinition {
        FieldDefinition {
            name: name.into(),
            field_type: FieldType::String,
            indexed: false,
            required: false,
            nullable: true,
            unique: false,
            internal: false,
        }
    }

    fn sample_entity() -> Entity {
        let mut fields = BTreeMap::new();
        fields.insert("email".to_string(), FieldValue::String("a@b".into()));
        Entity::new("7".into(), "user".into(), fields, Utc::now())
    }

    #[test]
    fn underscore_fields_are_hidden_by_default() {
        let entity = sample_entity();
        let def = def_with(vec![plain_field("email")], IdStrategy::AutoIncrement);

        let out = to_representation(&entity, &def, &Projection::default());
        let fields = out["fields"].as_object().unwrap();
        assert!(fields.contains_key("email"));
        assert!(!fields.contains_key("_created_at"));
        assert!(!fields.contains_key("_updated_at"));
    }

    #[test]
    fn debug_mode_includes_underscore_fields() {
        let entity = sample_entity();
        let def = def_with(vec![plain_field("email")], IdStrategy::AutoIncrement);

        let projection = Projection {
            debug: true,
            join_aliases: &[],
        };
        let out = to_representation(&entity, &def, &projection);
        assert!(out["fields"].as_object().unwrap().contains_key("_created_at"));
    }

    #[test]
    fn join_aliases_survive_underscore_filtering() {
        let mut entity = sample_entity();
        entity
            .fields
            .insert("_posts".to_string(), FieldValue::Json(json!([{"id": 1}])));

        let def = def_with(vec![plain_field("email")], IdStrategy::AutoIncrement);
        let aliases = vec!["_posts".to_string()];
        let out = to_representation(&entity, &def, &Projection::with_aliases(&aliases));

        let fields = out["fields"].as_object().unwrap();
        assert!(fields.contains_key("_posts"));
        assert!(!fields.contains_key("_created_at"));
    }

    #[test]
    fn declared_fields_are_null_filled() {
        let entity = sample_entity();
        let def = def_with(
            vec![plain_field("email"), plain_field("nickname")],
            IdStrategy::AutoIncrement,
        );

        let out = to_representation(&entity, &def, &Projection::default());
        assert_eq!(out["fields"]["nickname"], serde_json::Value::Null);
    }

    #[test]
    fn stray_id_key_is_dropped_from_fields() {
        let mut entity = sample_entity();
        entity
            .fields
            .insert("id".to_string(), FieldValue::Integer(99));

        let def = def_with(vec![plain_field("email")], IdStrategy::AutoIncrement);
        let out = to_representation(&entity, &def, &Projection::default());
        assert!(!out["fields"].as_object().unwrap().contains_key("id"));
        assert_eq!(out["id"], json!(7));
    }

    #[test]
    fn id_coercion_by_generator() {
        assert_eq!(coerce_id("42", IdStrategy::AutoIncrement), json!(42));
        assert_eq!(
            coerce_id("550e8400-e29b-41d4-a716-446655440000", IdStrategy::Uuid),
            json!("550e8400-e29b-41d4-a716-446655440000")
        );
        assert_eq!(coerce_id("cabc123", IdStrategy::Cuid), json!("cabc123"));
        assert_eq!(coerce_id("order-1", IdStrategy::Custom), json!("order-1"));
    }

    #[test]
    fn representation_shape() {
        let entity = sample_entity();
        let def = def_with(vec![plain_field("email")], IdStrategy::AutoIncrement);

        let out = to_representation(&entity, &def, &Projection::default());
        assert_eq!(out["id"], json!(7));
        assert_eq!(out["type"], json!("user"));
        assert_eq!(out["fields"]["email"], json!("a@b"));
    }
}
