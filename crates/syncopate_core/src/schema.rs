//! Entity type definitions and the schema registry.

use crate::error::{EngineError, EngineResult};
use crate::id::IdStrategy;
use crate::value::FieldType;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

/// Definition of a single schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name, unique within the type.
    pub name: String,
    /// Declared value type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field is backed by a value index.
    #[serde(default)]
    pub indexed: bool,
    /// Whether the field must be supplied on insert.
    #[serde(default)]
    pub required: bool,
    /// Whether null is a legal value.
    #[serde(default)]
    pub nullable: bool,
    /// Whether values must be unique across live entities of the type.
    #[serde(default)]
    pub unique: bool,
    /// Whether the field is store-managed and hidden from responses.
    #[serde(default)]
    pub internal: bool,
}

/// A named schema: id strategy plus an ordered field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDefinition {
    /// Unique, immutable type name.
    pub name: String,
    /// ID generation strategy; empty on the wire means auto_increment.
    #[serde(default, deserialize_with = "deserialize_id_generator")]
    pub id_generator: Option<IdStrategy>,
    /// Ordered field definitions.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// Accepts a missing key, `null`, or `""` as "not specified".
fn deserialize_id_generator<'de, D>(deserializer: D) -> Result<Option<IdStrategy>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some("auto_increment") => Ok(Some(IdStrategy::AutoIncrement)),
        Some("uuid") => Ok(Some(IdStrategy::Uuid)),
        Some("cuid") => Ok(Some(IdStrategy::Cuid)),
        Some("custom") => Ok(Some(IdStrategy::Custom)),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unknown id generator '{other}'"
        ))),
    }
}

impl EntityDefinition {
    /// The effective strategy (auto_increment when unspecified).
    #[must_use]
    pub fn generator(&self) -> IdStrategy {
        self.id_generator.unwrap_or_default()
    }

    /// Looks up a field definition by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of fields carrying a unique constraint.
    #[must_use]
    pub fn unique_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.unique)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Names of fields backed by a value index (unique fields included —
    /// the unique map doubles as their index).
    #[must_use]
    pub fn indexed_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.indexed)
            .map(|f| f.name.as_str())
            .collect()
    }

    fn validate(&self) -> EngineResult<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidEntityType(
                "entity type name must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name == "id" {
                return Err(EngineError::InvalidEntityType(
                    "field name 'id' is reserved for the entity ID".into(),
                ));
            }
            if field.name.starts_with('_') && !field.internal {
                return Err(EngineError::InvalidEntityType(format!(
                    "field '{}' starts with '_' but is not marked internal",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(EngineError::InvalidEntityType(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }
        Ok(())
    }
}

/// Result of a schema update: the committed definition plus the sets of
/// unique constraints that appeared or disappeared.
#[derive(Debug, Clone)]
pub struct SchemaUpdate {
    /// The merged definition as it will be (or was) stored.
    pub definition: EntityDefinition,
    /// Fields that gained a unique constraint.
    pub unique_added: Vec<String>,
    /// Fields that lost a unique constraint.
    pub unique_removed: Vec<String>,
}

/// Registry of entity type definitions.
///
/// Reads are concurrent, writes exclusive. The registry validates
/// structure only; data-dependent checks (unique constraints over live
/// entities) are orchestrated by the engine, which prepares an update
/// here, verifies it against the store, then commits.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    defs: RwLock<HashMap<String, EntityDefinition>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new entity type.
    ///
    /// Fills the generator with `auto_increment` when unspecified.
    ///
    /// # Errors
    ///
    /// [`EngineError::EntityTypeExists`] when the name is taken,
    /// [`EngineError::InvalidEntityType`] on structural problems.
    pub fn register(&self, mut def: EntityDefinition) -> EngineResult<EntityDefinition> {
        def.validate()?;
        if def.id_generator.is_none() {
            def.id_generator = Some(IdStrategy::default());
        }

        let mut defs = self.defs.write();
        if defs.contains_key(&def.name) {
            return Err(EngineError::EntityTypeExists(def.name));
        }
        defs.insert(def.name.clone(), def.clone());
        Ok(def)
    }

    /// Fetches a definition by name.
    pub fn get(&self, name: &str) -> EngineResult<EntityDefinition> {
        self.defs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::EntityTypeNotFound(name.to_string()))
    }

    /// Whether a type with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.defs.read().contains_key(name)
    }

    /// Sorted list of registered type names.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.defs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.read().is_empty()
    }

    /// Validates an updated definition against the stored one and returns
    /// the merged candidate plus the unique-constraint diff. Nothing is
    /// committed.
    ///
    /// # Errors
    ///
    /// [`EngineError::EntityTypeNotFound`] for unknown types,
    /// [`EngineError::IdGeneratorChange`] when the payload names a
    /// generator different from the stored one.
    pub fn prepare_update(&self, mut def: EntityDefinition) -> EngineResult<SchemaUpdate> {
        def.validate()?;

        let current = self.get(&def.name)?;

        match def.id_generator {
            Some(requested) if requested != current.generator() => {
                return Err(EngineError::IdGeneratorChange);
            }
            // The generator is immutable; carry the original forward.
            _ => def.id_generator = Some(current.generator()),
        }

        let old_unique: HashSet<&str> = current.unique_fields().into_iter().collect();
        let new_unique: HashSet<&str> = def.unique_fields().into_iter().collect();

        let mut unique_added: Vec<String> = new_unique
            .difference(&old_unique)
            .map(|s| (*s).to_string())
            .collect();
        let mut unique_removed: Vec<String> = old_unique
            .difference(&new_unique)
            .map(|s| (*s).to_string())
            .collect();
        unique_added.sort();
        unique_removed.sort();

        Ok(SchemaUpdate {
            definition: def,
            unique_added,
            unique_removed,
        })
    }

    /// Commits a prepared update.
    pub(crate) fn commit(&self, def: EntityDefinition) {
        self.defs.write().insert(def.name.clone(), def);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_def() -> EntityDefinition {
        EntityDefinition {
            name: "user".into(),
            id_generator: None,
            fields: vec![
                FieldDefinition {
                    name: "email".into(),
                    field_type: FieldType::String,
                    indexed: false,
                    required: true,
                    nullable: false,
                    unique: true,
                    internal: false,
                },
                FieldDefinition {
                    name: "age".into(),
                    field_type: FieldType::Integer,
                    indexed: true,
                    required: false,
                    nullable: true,
                    unique: false,
                    internal: false,
                },
            ],
        }
    }

    #[test]
    fn register_defaults_to_auto_increment() {
        let registry = SchemaRegistry::new();
        let stored = registry.register(user_def()).unwrap();
        assert_eq!(stored.generator(), IdStrategy::AutoIncrement);
    }

    #[test]
    fn register_duplicate_fails() {
        let registry = SchemaRegistry::new();
        registry.register(user_def()).unwrap();
        let err = registry.register(user_def()).unwrap_err();
        assert!(matches!(err, EngineError::EntityTypeExists(_)));
    }

    #[test]
    fn reserved_field_names_rejected() {
        let registry = SchemaRegistry::new();
        let mut def = user_def();
        def.fields.push(FieldDefinition {
            name: "id".into(),
            field_type: FieldType::String,
            indexed: false,
            required: false,
            nullable: false,
            unique: false,
            internal: false,
        });
        assert!(matches!(
            registry.register(def),
            Err(EngineError::InvalidEntityType(_))
        ));
    }

    #[test]
    fn underscore_fields_require_internal_flag() {
        let registry = SchemaRegistry::new();
        let mut def = user_def();
        def.fields.push(FieldDefinition {
            name: "_shadow".into(),
            field_type: FieldType::String,
            indexed: false,
            required: false,
            nullable: true,
            unique: false,
            internal: false,
        });
        assert!(registry.register(def.clone()).is_err());

        def.fields.last_mut().unwrap().internal = true;
        assert!(registry.register(def).is_ok());
    }

    #[test]
    fn update_unknown_type_fails() {
        let registry = SchemaRegistry::new();
        assert!(matches!(
            registry.prepare_update(user_def()),
            Err(EngineError::EntityTypeNotFound(_))
        ));
    }

    #[test]
    fn update_rejects_generator_change() {
        let registry = SchemaRegistry::new();
        registry.register(user_def()).unwrap();

        let mut def = user_def();
        def.id_generator = Some(IdStrategy::Uuid);
        assert!(matches!(
            registry.prepare_update(def),
            Err(EngineError::IdGeneratorChange)
        ));
    }

    #[test]
    fn update_carries_generator_forward() {
        let registry = SchemaRegistry::new();
        registry.register(user_def()).unwrap();

        let update = registry.prepare_update(user_def()).unwrap();
        assert_eq!(update.definition.generator(), IdStrategy::AutoIncrement);
    }

    #[test]
    fn update_reports_unique_diff() {
        let registry = SchemaRegistry::new();
        registry.register(user_def()).unwrap();

        let mut def = user_def();
        def.fields[0].unique = false; // email loses unique
        def.fields[1].unique = true; // age gains unique
        let update = registry.prepare_update(def).unwrap();
        assert_eq!(update.unique_added, vec!["age".to_string()]);
        assert_eq!(update.unique_removed, vec!["email".to_string()]);
    }

    #[test]
    fn empty_generator_string_parses_as_unspecified() {
        let def: EntityDefinition =
            serde_json::from_str(r#"{"name": "post", "idGenerator": "", "fields": []}"#).unwrap();
        assert!(def.id_generator.is_none());

        let def: EntityDefinition =
            serde_json::from_str(r#"{"name": "post", "idGenerator": "uuid", "fields": []}"#)
                .unwrap();
        assert_eq!(def.id_generator, Some(IdStrategy::Uuid));
    }

    #[test]
    fn list_is_sorted() {
        let registry = SchemaRegistry::new();
        for name in ["zebra", "alpha", "mango"] {
            registry
                .register(EntityDefinition {
                    name: name.into(),
                    id_generator: None,
                    fields: vec![],
                })
                .unwrap();
        }
        assert_eq!(registry.list(), vec!["alpha", "mango", "zebra"]);
    }
}
