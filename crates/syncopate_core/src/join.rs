//! Join execution.
//!
//! Joins compose results across entity types without ever touching the
//! stored base entities: the base query already hands out copies, and
//! foreign payloads are attached to those copies under the caller's
//! alias.

use crate::entity::{id_cmp, is_internal_field, Entity};
use crate::error::{EngineError, EngineResult};
use crate::query::{collect_matching, compile_filters, resolve_field_value, Filter};
use crate::query::{PaginatedResult, QueryOptions};
use crate::represent::coerce_id;
use crate::schema::EntityDefinition;
use crate::store::Engine;
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cardinality of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// At most one foreign row, scalar local key.
    OneToOne,
    /// A list of foreign rows, scalar local key.
    OneToMany,
    /// At most one foreign row, scalar local key (reverse direction).
    ManyToOne,
    /// A list of foreign rows, list-valued local key.
    ManyToMany,
}

impl JoinType {
    /// Parses a wire name; empty means `one_to_one`.
    pub fn parse(name: &str) -> EngineResult<Self> {
        match name {
            "" | "one_to_one" => Ok(Self::OneToOne),
            "one_to_many" => Ok(Self::OneToMany),
            "many_to_one" => Ok(Self::ManyToOne),
            "many_to_many" => Ok(Self::ManyToMany),
            other => Err(EngineError::invalid_join(format!(
                "unknown join type '{other}'"
            ))),
        }
    }

    /// Whether the attachment is a list.
    #[must_use]
    pub const fn attaches_list(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

/// A join specification as received on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinOptions {
    /// Foreign entity type.
    pub entity_type: String,
    /// Field on the base row providing the join key(s).
    pub local_field: String,
    /// Field on the foreign rows matched against the key(s).
    pub foreign_field: String,
    /// Alias the foreign payload is attached under.
    #[serde(rename = "as")]
    pub alias: String,
    /// Cardinality; see [`JoinType::parse`].
    #[serde(rename = "type")]
    pub join_type: String,
    /// Projection of foreign rows; empty means all non-internal fields.
    pub select_fields: Vec<String>,
    /// Filters restricting foreign candidates before attachment.
    pub filters: Vec<Filter>,
}

impl JoinOptions {
    fn validate(&self) -> EngineResult<JoinType> {
        if self.alias.is_empty() {
            return Err(EngineError::invalid_join("join requires an 'as' alias"));
        }
        if self.local_field.is_empty() || self.foreign_field.is_empty() {
            return Err(EngineError::invalid_join(
                "join requires localField and foreignField",
            ));
        }
        JoinType::parse(&self.join_type)
    }
}

impl Engine {
    /// Executes a query and resolves its joins.
    ///
    /// Requires at least one join. Pagination and totals are those of the
    /// base query — joins never expand the row count.
    pub fn execute_query_with_joins(&self, opts: &QueryOptions) -> EngineResult<PaginatedResult> {
        if opts.joins.is_empty() {
            return Err(EngineError::invalid_join("no joins specified"));
        }

        let base_def = self.get_entity_definition(&opts.entity_type)?;
        let mut result = self.execute_query(opts)?;

        for join in &opts.joins {
            let join_type = join.validate()?;
            let foreign_def = self.get_entity_definition(&join.entity_type)?;
            let compiled = compile_filters(&foreign_def, &join.filters)?;

            let foreign: Vec<Entity> = {
                let state = self.state.read();
                let mut rows = collect_matching(&state, &foreign_def, &compiled);
                rows.sort_by(|a, b| id_cmp(&a.id, &b.id));
                rows
            };

            // Foreign rows bucketed by the join key.
            let mut by_key: HashMap<String, Vec<&Entity>> = HashMap::new();
            for entity in &foreign {
                let value = resolve_field_value(&foreign_def, entity, &join.foreign_field);
                if let Some(key) = value.index_key() {
                    by_key.entry(key).or_default().push(entity);
                }
            }

            for row in &mut result.data {
                let local = resolve_field_value(&base_def, row, &join.local_field);
                let keys = local_keys(&local);

                let mut matched: Vec<&Entity> = Vec::new();
                for key in &keys {
                    if let Some(bucket) = by_key.get(key) {
                        for entity in bucket {
                            if !matched.iter().any(|m| m.id == entity.id) {
                                matched.push(entity);
                            }
                        }
                    }
                }

                if join_type.attaches_list() {
                    let payload: Vec<serde_json::Value> = matched
                        .iter()
                        .map(|e| project_foreign(e, &foreign_def, &join.select_fields))
                        .collect();
                    row.fields.insert(
                        join.alias.clone(),
                        FieldValue::Json(serde_json::Value::Array(payload)),
                    );
                } else if let Some(first) = matched.first() {
                    row.fields.insert(
                        join.alias.clone(),
                        FieldValue::Json(project_foreign(first, &foreign_def, &join.select_fields)),
                    );
                }
            }
        }

        Ok(result)
    }
}

/// Join keys contributed by a local value: every element of a list,
/// otherwise the scalar itself.
fn local_keys(local: &FieldValue) -> Vec<String> {
    match local {
        FieldValue::Json(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| json_scalar_key(item))
            .collect(),
        other => other.index_key().into_iter().collect(),
    }
}

/// Index key of a raw JSON scalar, aligned with [`FieldValue::index_key`].
fn json_scalar_key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(format!("s:{s}")),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(format!("i:{i}"))
            } else {
                n.as_f64().map(|f| format!("f:{f}"))
            }
        }
        serde_json::Value::Bool(b) => Some(format!("b:{b}")),
        _ => None,
    }
}

/// Projects a foreign row for attachment: id plus non-internal fields,
/// optionally narrowed to `select_fields`.
fn project_foreign(
    entity: &Entity,
    def: &EntityDefinition,
    select_fields: &[String],
) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    object.insert(
        "id".to_string(),
        coerce_id(&entity.id, def.generator()),
    );

    for (name, value) in &entity.fields {
        if is_internal_field(name) {
            continue;
        }
        if !select_fields.is_empty() && !select_fields.iter().any(|f| f == name) {
            continue;
        }
        object.insert(name.clone(), value.to_json());
    }

    serde_json::Value::Object(object)
}
