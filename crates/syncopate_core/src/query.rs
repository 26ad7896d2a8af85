//! Query execution.
//!
//! Planning is two-phase: filters on indexed (or unique) fields with an
//! equality-shaped operator resolve through the index maps, smallest
//! candidate set first; everything else — range operators, substring
//! operators, unindexed fields — runs as a linear scan over the
//! candidates. With no indexable filter at all, the candidate set is the
//! type's whole membership.

use crate::entity::{id_cmp, Entity};
use crate::error::{EngineError, EngineResult};
use crate::id::IdStrategy;
use crate::join::JoinOptions;
use crate::schema::EntityDefinition;
use crate::store::{slot, Engine, StoreState};
use crate::value::{FieldType, FieldValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Page size applied when the caller passes `limit <= 0`.
pub const DEFAULT_LIMIT: usize = 100;

/// A query as received on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    /// Type to query.
    pub entity_type: String,
    /// Filter conjunction (implicit AND).
    pub filters: Vec<Filter>,
    /// Field to order by; empty means canonical id order.
    pub order_by: String,
    /// Whether to reverse the order.
    pub order_desc: bool,
    /// Page size; `<= 0` means [`DEFAULT_LIMIT`].
    pub limit: i64,
    /// Rows to skip; negative values clamp to 0.
    pub offset: i64,
    /// Joins to apply (join queries only).
    pub joins: Vec<JoinOptions>,
}

/// One filter condition.
///
/// The operator stays a string on the wire so an unknown operator is an
/// `InvalidQuery`, not a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    /// Field to test (`id` targets the entity id).
    pub field: String,
    /// Operator name.
    pub op: String,
    /// Comparison value; ignored by `exists`.
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Parsed filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Membership in a list of values.
    In,
    /// Substring match on strings.
    Contains,
    /// Prefix match on strings.
    StartsWith,
    /// Suffix match on strings.
    EndsWith,
    /// Field is present and non-null.
    Exists,
}

impl FilterOp {
    /// Parses an operator name.
    pub fn parse(op: &str) -> EngineResult<Self> {
        match op {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "in" => Ok(Self::In),
            "contains" => Ok(Self::Contains),
            "startsWith" => Ok(Self::StartsWith),
            "endsWith" => Ok(Self::EndsWith),
            "exists" => Ok(Self::Exists),
            other => Err(EngineError::invalid_query(format!(
                "unknown operator '{other}'"
            ))),
        }
    }
}

/// A filter compiled against a schema: operator parsed, value coerced.
#[derive(Debug, Clone)]
pub(crate) struct CompiledFilter {
    pub(crate) field: String,
    pub(crate) indexable: bool,
    predicate: Predicate,
}

#[derive(Debug, Clone)]
enum Predicate {
    Eq(FieldValue),
    Ne(FieldValue),
    Gt(FieldValue),
    Gte(FieldValue),
    Lt(FieldValue),
    Lte(FieldValue),
    In(Vec<FieldValue>),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    Exists,
}

impl CompiledFilter {
    fn index_keys(&self) -> Vec<String> {
        match &self.predicate {
            Predicate::Eq(v) => v.index_key().into_iter().collect(),
            Predicate::In(vs) => vs.iter().filter_map(FieldValue::index_key).collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn matches(&self, def: &EntityDefinition, entity: &Entity) -> bool {
        let value = resolve_field_value(def, entity, &self.field);

        // Null only ever satisfies eq/ne against null, and never exists.
        if value.is_null() {
            return match &self.predicate {
                Predicate::Eq(v) => v.is_null(),
                Predicate::Ne(v) => !v.is_null(),
                Predicate::In(vs) => vs.iter().any(FieldValue::is_null),
                _ => false,
            };
        }

        match &self.predicate {
            Predicate::Eq(v) => value.loose_eq(v),
            Predicate::Ne(v) => !value.loose_eq(v),
            Predicate::Gt(v) => value.compare(v) == Some(Ordering::Greater),
            Predicate::Gte(v) => {
                matches!(value.compare(v), Some(Ordering::Greater | Ordering::Equal))
            }
            Predicate::Lt(v) => value.compare(v) == Some(Ordering::Less),
            Predicate::Lte(v) => {
                matches!(value.compare(v), Some(Ordering::Less | Ordering::Equal))
            }
            Predicate::In(vs) => vs.iter().any(|v| value.loose_eq(v)),
            Predicate::Contains(s) => value.as_str().is_some_and(|t| t.contains(s.as_str())),
            Predicate::StartsWith(s) => value.as_str().is_some_and(|t| t.starts_with(s.as_str())),
            Predicate::EndsWith(s) => value.as_str().is_some_and(|t| t.ends_with(s.as_str())),
            Predicate::Exists => true,
        }
    }
}

/// The declared comparison type of a filter target.
fn target_type(def: &EntityDefinition, field: &str) -> EngineResult<FieldType> {
    if field == "id" {
        return Ok(match def.generator() {
            IdStrategy::AutoIncrement => FieldType::Integer,
            _ => FieldType::String,
        });
    }
    def.field(field)
        .map(|f| f.field_type)
        .ok_or_else(|| {
            EngineError::invalid_query(format!(
                "unknown field '{field}' for entity type '{}'",
                def.name
            ))
        })
}

/// Resolves an entity's value for a filter or ordering target.
pub(crate) fn resolve_field_value(
    def: &EntityDefinition,
    entity: &Entity,
    field: &str,
) -> FieldValue {
    if field == "id" {
        return match def.generator() {
            IdStrategy::AutoIncrement => entity
                .id
                .parse::<i64>()
                .map(FieldValue::Integer)
                .unwrap_or_else(|_| FieldValue::String(entity.id.clone())),
            _ => FieldValue::String(entity.id.clone()),
        };
    }
    entity.resolve_field(field)
}

fn coerce_filter_value(
    field_type: FieldType,
    raw: &serde_json::Value,
) -> EngineResult<FieldValue> {
    FieldValue::from_json(field_type, raw)
        .map_err(|e| EngineError::invalid_query(format!("bad filter value: {e}")))
}

/// Compiles wire filters against a schema.
pub(crate) fn compile_filters(
    def: &EntityDefinition,
    filters: &[Filter],
) -> EngineResult<Vec<CompiledFilter>> {
    filters
        .iter()
        .map(|filter| {
            let op = FilterOp::parse(&filter.op)?;
            let field_type = target_type(def, &filter.field)?;

            let predicate = match op {
                FilterOp::Eq => Predicate::Eq(coerce_filter_value(field_type, &filter.value)?),
                FilterOp::Ne => Predicate::Ne(coerce_filter_value(field_type, &filter.value)?),
                FilterOp::Gt => Predicate::Gt(coerce_filter_value(field_type, &filter.value)?),
                FilterOp::Gte => Predicate::Gte(coerce_filter_value(field_type, &filter.value)?),
                FilterOp::Lt => Predicate::Lt(coerce_filter_value(field_type, &filter.value)?),
                FilterOp::Lte => Predicate::Lte(coerce_filter_value(field_type, &filter.value)?),
                FilterOp::In => {
                    let items = filter.value.as_array().ok_or_else(|| {
                        EngineError::invalid_query("'in' requires a list of values")
                    })?;
                    Predicate::In(
                        items
                            .iter()
                            .map(|item| coerce_filter_value(field_type, item))
                            .collect::<EngineResult<Vec<_>>>()?,
                    )
                }
                FilterOp::Contains | FilterOp::StartsWith | FilterOp::EndsWith => {
                    let needle = filter.value.as_str().ok_or_else(|| {
                        EngineError::invalid_query(format!(
                            "'{}' requires a string value",
                            filter.op
                        ))
                    })?;
                    match op {
                        FilterOp::Contains => Predicate::Contains(needle.to_string()),
                        FilterOp::StartsWith => Predicate::StartsWith(needle.to_string()),
                        _ => Predicate::EndsWith(needle.to_string()),
                    }
                }
                FilterOp::Exists => Predicate::Exists,
            };

            let field_def = def.field(&filter.field);
            let indexable = matches!(op, FilterOp::Eq | FilterOp::In)
                && field_def.is_some_and(|f| f.indexed || f.unique);

            Ok(CompiledFilter {
                field: filter.field.clone(),
                indexable,
                predicate,
            })
        })
        .collect()
}

/// One page of query results; `data` entities are copies of store state.
#[derive(Debug, Clone)]
pub struct PaginatedResult {
    /// Matching rows before pagination.
    pub total: usize,
    /// Rows in this page.
    pub count: usize,
    /// Effective page size.
    pub limit: usize,
    /// Effective offset.
    pub offset: usize,
    /// Whether rows remain past this page.
    pub has_more: bool,
    /// The queried type.
    pub entity_type: String,
    /// The page of entities.
    pub data: Vec<Entity>,
}

impl Engine {
    /// Executes a filtered, ordered, paginated query.
    pub fn execute_query(&self, opts: &QueryOptions) -> EngineResult<PaginatedResult> {
        let def = self.get_entity_definition(&opts.entity_type)?;
        let compiled = compile_filters(&def, &opts.filters)?;

        if !opts.order_by.is_empty() {
            // Validates the field; json fields are accepted and fall back
            // to id order at sort time (no defined ordering).
            target_type(&def, &opts.order_by)?;
        }

        let limit = if opts.limit <= 0 {
            DEFAULT_LIMIT
        } else {
            opts.limit as usize
        };
        let offset = opts.offset.max(0) as usize;

        let state = self.state.read();
        let mut rows = collect_matching(&state, &def, &compiled);
        drop(state);

        sort_entities(&def, &mut rows, &opts.order_by, opts.order_desc);

        let total = rows.len();
        let data: Vec<Entity> = rows.into_iter().skip(offset).take(limit).collect();
        let count = data.len();

        Ok(PaginatedResult {
            total,
            count,
            limit,
            offset,
            has_more: offset + count < total,
            entity_type: opts.entity_type.clone(),
            data,
        })
    }

    /// Count-only query: no ordering, no pagination, no row assembly.
    ///
    /// With no filters this is O(1) on the membership set.
    pub fn execute_count_query(&self, opts: &QueryOptions) -> EngineResult<usize> {
        let def = self.get_entity_definition(&opts.entity_type)?;
        let compiled = compile_filters(&def, &opts.filters)?;

        let state = self.state.read();
        if compiled.is_empty() {
            return Ok(state.members(&def.name).map_or(0, |m| m.len()));
        }
        Ok(count_matching(&state, &def, &compiled))
    }
}

/// Materializes matching entities as copies, under the read lock.
pub(crate) fn collect_matching(
    state: &StoreState,
    def: &EntityDefinition,
    compiled: &[CompiledFilter],
) -> Vec<Entity> {
    let Some(members) = state.members(&def.name) else {
        return Vec::new();
    };

    let residual: Vec<&CompiledFilter> = compiled.iter().filter(|f| !f.indexable).collect();

    match indexed_candidates(state, def, compiled) {
        Some(ids) => ids
            .iter()
            .filter_map(|id| members.get(id))
            .filter(|e| residual.iter().all(|f| f.matches(def, e)))
            .cloned()
            .collect(),
        None => members
            .values()
            .filter(|e| residual.iter().all(|f| f.matches(def, e)))
            .cloned()
            .collect(),
    }
}

fn count_matching(state: &StoreState, def: &EntityDefinition, compiled: &[CompiledFilter]) -> usize {
    let Some(members) = state.members(&def.name) else {
        return 0;
    };

    let residual: Vec<&CompiledFilter> = compiled.iter().filter(|f| !f.indexable).collect();

    match indexed_candidates(state, def, compiled) {
        Some(ids) => ids
            .iter()
            .filter_map(|id| members.get(id))
            .filter(|e| residual.iter().all(|f| f.matches(def, e)))
            .count(),
        None => members
            .values()
            .filter(|e| residual.iter().all(|f| f.matches(def, e)))
            .count(),
    }
}

/// Intersects index lookups for the indexable filters, smallest set
/// first. `None` means no indexable filter exists (full scan).
fn indexed_candidates(
    state: &StoreState,
    def: &EntityDefinition,
    compiled: &[CompiledFilter],
) -> Option<HashSet<String>> {
    let indexable: Vec<&CompiledFilter> = compiled.iter().filter(|f| f.indexable).collect();
    if indexable.is_empty() {
        return None;
    }

    let mut sets: Vec<HashSet<String>> = indexable
        .iter()
        .map(|f| index_lookup(state, def, f))
        .collect();
    sets.sort_by_key(HashSet::len);

    let mut iter = sets.into_iter();
    let smallest = iter.next().unwrap_or_default();
    let rest: Vec<HashSet<String>> = iter.collect();

    Some(
        smallest
            .into_iter()
            .filter(|id| rest.iter().all(|s| s.contains(id)))
            .collect(),
    )
}

fn index_lookup(
    state: &StoreState,
    def: &EntityDefinition,
    filter: &CompiledFilter,
) -> HashSet<String> {
    let keys = filter.index_keys();
    let mut out = HashSet::new();

    let unique = def.field(&filter.field).is_some_and(|f| f.unique);
    if unique {
        if let Some(by_value) = state.uniques.get(&slot(&def.name, &filter.field)) {
            for key in &keys {
                if let Some(id) = by_value.get(key) {
                    out.insert(id.clone());
                }
            }
        }
    } else if let Some(by_value) = state.indexes.get(&slot(&def.name, &filter.field)) {
        for key in &keys {
            if let Some(ids) = by_value.get(key) {
                out.extend(ids.iter().cloned());
            }
        }
    }

    out
}

/// Sorts rows by the order target, ties by ascending canonical id, then
/// reverses the whole page order when descending.
fn sort_entities(def: &EntityDefinition, rows: &mut [Entity], order_by: &str, desc: bool) {
    if order_by.is_empty() {
        rows.sort_by(|a, b| id_cmp(&a.id, &b.id));
    } else {
        rows.sort_by(|a, b| {
            let va = resolve_field_value(def, a, order_by);
            let vb = resolve_field_value(def, b, order_by);
            match va.compare(&vb) {
                Some(ord) if ord != Ordering::Equal => ord,
                _ => id_cmp(&a.id, &b.id),
            }
        });
    }
    if desc {
        rows.reverse();
    }
}
