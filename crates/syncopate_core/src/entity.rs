//! Entity records.

use crate::value::FieldValue;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Name of the store-managed creation timestamp field.
pub const CREATED_AT: &str = "_created_at";

/// Name of the store-managed last-update timestamp field.
pub const UPDATED_AT: &str = "_updated_at";

/// Whether a field name is store-managed (underscore-prefixed).
#[must_use]
pub fn is_internal_field(name: &str) -> bool {
    name.starts_with('_')
}

/// A single record of an entity type.
///
/// The id is always held in canonical string form; the external typed
/// representation is produced by the representation layer. Internal
/// timestamps live inside `fields` under underscore-prefixed names.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Canonical id.
    pub id: String,
    /// Name of the owning entity type.
    pub entity_type: String,
    /// Field values, including internal underscore-prefixed fields.
    pub fields: BTreeMap<String, FieldValue>,
}

impl Entity {
    /// Creates an entity and stamps both timestamps to `now`.
    #[must_use]
    pub fn new(
        id: String,
        entity_type: String,
        mut fields: BTreeMap<String, FieldValue>,
        now: DateTime<Utc>,
    ) -> Self {
        fields.insert(CREATED_AT.to_string(), FieldValue::DateTime(now));
        fields.insert(UPDATED_AT.to_string(), FieldValue::DateTime(now));
        Self {
            id,
            entity_type,
            fields,
        }
    }

    /// The creation timestamp, if present.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.fields.get(CREATED_AT) {
            Some(FieldValue::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    /// The last-update timestamp, if present.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self.fields.get(UPDATED_AT) {
            Some(FieldValue::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    /// Resolves a field for filtering and ordering.
    ///
    /// `id` resolves to the top-level id (as text; the query layer coerces
    /// auto-increment ids to integers before comparison). Absent fields
    /// resolve to null.
    #[must_use]
    pub fn resolve_field(&self, name: &str) -> FieldValue {
        if name == "id" {
            return FieldValue::String(self.id.clone());
        }
        self.fields.get(name).cloned().unwrap_or(FieldValue::Null)
    }
}

/// Compares two canonical ids.
///
/// Numeric ids order numerically (auto-increment: 2 before 10); everything
/// else falls back to lexicographic order.
#[must_use]
pub fn id_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}
