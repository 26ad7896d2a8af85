//! Error-code documentation surface.

use crate::error::status_text;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use syncopate_core::ErrorCode;

/// Documentation for one stable error code.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorCodeDoc {
    /// The stable code.
    pub code: ErrorCode,
    /// Short name.
    pub name: &'static str,
    /// What the code means.
    pub description: &'static str,
    /// HTTP status the code maps to.
    pub http_status: u16,
    /// Example message.
    pub example: &'static str,
}

fn doc(code: ErrorCode) -> ErrorCodeDoc {
    let (name, description, example) = match code {
        ErrorCode::Internal => (
            "InternalServer",
            "Unexpected failure inside the engine or its storage.",
            "internal error: WAL append failed",
        ),
        ErrorCode::MalformedData => (
            "MalformedData",
            "The request body could not be decoded or a value did not match its declared type.",
            "malformed data: expected integer, got \"thirty\"",
        ),
        ErrorCode::EntityNotFound => (
            "EntityNotFound",
            "No entity with the given id exists for the type.",
            "entity with ID '42' of type 'user' not found",
        ),
        ErrorCode::EntityTypeNotFound => (
            "EntityTypeNotFound",
            "No entity type with the given name is registered.",
            "entity type 'ghost' not found",
        ),
        ErrorCode::EntityTypeExists => (
            "EntityTypeExists",
            "An entity type with the given name is already registered.",
            "entity type 'user' already exists",
        ),
        ErrorCode::InvalidEntityType => (
            "InvalidEntityType",
            "The entity type definition is structurally invalid.",
            "invalid entity type: field name 'id' is reserved for the entity ID",
        ),
        ErrorCode::RequiredFieldMissing => (
            "RequiredFieldMissing",
            "A required field, or a required id, was not supplied.",
            "required field missing: email",
        ),
        ErrorCode::InvalidId => (
            "InvalidID",
            "An id does not conform to its generator's canonical form.",
            "invalid ID: invalid CUID 'xyz': must start with 'c'",
        ),
        ErrorCode::InvalidRequest => (
            "InvalidRequest",
            "The request is structurally valid but semantically wrong.",
            "invalid request: error code 'SY999' not found",
        ),
        ErrorCode::InvalidQuery => (
            "InvalidQuery",
            "A query references an unknown field or operator.",
            "invalid query: unknown operator 'between'",
        ),
        ErrorCode::InvalidJoin => (
            "InvalidJoin",
            "A join specification is missing or invalid.",
            "invalid join: no joins specified",
        ),
        ErrorCode::UniqueConstraint => (
            "UniqueConstraint",
            "The mutation would duplicate a value under a unique field.",
            "unique constraint violation on field 'email' of type 'user'",
        ),
        ErrorCode::IdGeneratorChange => (
            "IDGeneratorChange",
            "Entity type updates may never change the id generator.",
            "cannot change the ID generator after entity type creation",
        ),
    };

    ErrorCodeDoc {
        code,
        name,
        description,
        http_status: code.http_status(),
        example,
    }
}

/// Documentation for every defined code.
#[must_use]
pub fn all_docs() -> Vec<ErrorCodeDoc> {
    ErrorCode::all().iter().copied().map(doc).collect()
}

/// Looks up documentation by wire code (e.g. `"SY100"`).
#[must_use]
pub fn lookup(code: &str) -> Option<ErrorCodeDoc> {
    ErrorCode::all()
        .iter()
        .copied()
        .find(|c| c.as_str() == code)
        .map(doc)
}

/// The full catalog payload, optionally filtered by category or HTTP
/// status, grouped by category with usage hints.
#[must_use]
pub fn catalog(category: Option<&str>, http_status: Option<u16>) -> serde_json::Value {
    let mut categories: BTreeMap<&'static str, Vec<ErrorCodeDoc>> = BTreeMap::new();

    for entry in all_docs() {
        if let Some(filter) = category {
            if !entry.code.category().eq_ignore_ascii_case(filter) {
                continue;
            }
        }
        if let Some(status) = http_status {
            if entry.http_status != status {
                continue;
            }
        }
        categories.entry(entry.code.category()).or_default().push(entry);
    }

    for docs in categories.values_mut() {
        docs.sort_by_key(|d| d.code.as_str());
    }

    let all_categories: Vec<&str> = categories.keys().copied().collect();
    let mut statuses: Vec<u16> = all_docs().iter().map(|d| d.http_status).collect();
    statuses.sort_unstable();
    statuses.dedup();
    let status_list: Vec<serde_json::Value> = statuses
        .into_iter()
        .map(|code| json!({"code": code, "text": status_text(code)}))
        .collect();

    json!({
        "total_error_codes": ErrorCode::all().len(),
        "categories": categories,
        "available_filters": {
            "categories": all_categories,
            "http_statuses": status_list,
        },
        "usage": {
            "all_codes": "/api/v1/errors",
            "specific_code": "/api/v1/errors?code=SY001",
            "by_category": "/api/v1/errors?category=Entity",
            "by_http_status": "/api/v1/errors?http_status=404",
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_is_documented() {
        assert_eq!(all_docs().len(), ErrorCode::all().len());
    }

    #[test]
    fn lookup_by_wire_code() {
        let entry = lookup("SY300").unwrap();
        assert_eq!(entry.code, ErrorCode::UniqueConstraint);
        assert_eq!(entry.http_status, 409);
        assert!(lookup("SY999").is_none());
    }

    #[test]
    fn catalog_groups_by_category() {
        let body = catalog(None, None);
        assert_eq!(body["total_error_codes"], ErrorCode::all().len());
        assert!(body["categories"]["Entity"].is_array());
        assert!(body["categories"]["Constraint"].is_array());
    }

    #[test]
    fn catalog_filters_apply() {
        let body = catalog(Some("constraint"), None);
        assert!(body["categories"].get("Entity").is_none());
        assert!(body["categories"]["Constraint"].is_array());

        let body = catalog(None, Some(404));
        let entity = body["categories"]["Entity"].as_array().unwrap();
        assert!(entity.iter().all(|d| d["http_status"] == 404));
    }
}
