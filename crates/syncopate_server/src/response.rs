//! Response DTOs for the HTTP surface.

use serde::Serialize;
use syncopate_core::EntityDefinition;

/// Envelope for paginated entity data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
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
    /// Projected entity representations.
    pub data: Vec<serde_json::Value>,
}

/// Envelope for count-only queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    /// Matching row count.
    pub count: usize,
    /// The queried type.
    pub entity_type: String,
    /// `"simple"` or `"join"`.
    pub query_type: String,
    /// Number of filters in the query.
    pub filters_count: usize,
    /// Number of joins in the query.
    pub joins_applied: usize,
    /// Wall-clock execution time.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub execution_time: String,
}

/// Envelope for entity mutations (create/update/delete).
#[derive(Debug, Clone, Serialize)]
pub struct MutationResponse {
    /// Outcome message.
    pub message: String,
    /// The affected id, coerced to the generator's external type.
    pub id: serde_json::Value,
}

/// Envelope for entity type registration and updates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeResponse {
    /// Outcome message.
    pub message: String,
    /// The stored definition with defaults applied.
    pub entity_type: EntityDefinition,
    /// Unique constraints added by an update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_constraints_added: Option<Vec<String>>,
    /// Unique constraints removed by an update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_constraints_removed: Option<Vec<String>>,
}

/// Payload of the root welcome endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeResponse {
    /// Service name.
    pub name: String,
    /// Service version.
    pub version: String,
    /// Service description.
    pub description: String,
    /// API root path.
    pub documentation: String,
    /// Health endpoint path.
    pub health_check: String,
    /// Always `"running"`.
    pub status: String,
    /// Current server time, RFC 3339.
    pub server_time: String,
}

/// Payload of the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
}
