//! Request handlers for the HTTP surface.
//!
//! The [`Server`] is transport-agnostic: a real deployment mounts these
//! handlers behind its router of choice and maps [`crate::ApiError`] to
//! status codes with [`ApiError::to_response`]. Handlers own all
//! representation shaping; the engine never sees wire concerns.

use crate::config::ServerConfig;
use crate::errdoc;
use crate::error::{ApiError, ApiResult};
use crate::response::{
    CountResponse, EntityTypeResponse, HealthResponse, MutationResponse, QueryResponse,
    WelcomeResponse,
};
use crate::{DESCRIPTION, NAME, VERSION};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use syncopate_core::{
    coerce_id, to_representation, Engine, EntityDefinition, ErrorCode, PaginatedResult,
    Projection, QueryOptions,
};
use tracing::debug;

/// Body of `POST /entities/{type}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateEntityRequest {
    /// Explicit id; absent or empty asks the generator.
    #[serde(default)]
    pub id: Option<String>,
    /// Field values.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Body of `PUT /entities/{type}/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEntityRequest {
    /// Patched field values.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Query-string parameters of `GET /entities/{type}`.
///
/// Parsed leniently: unparseable values keep their defaults.
#[derive(Debug, Clone)]
pub struct ListParams {
    /// Page size.
    pub limit: i64,
    /// Rows to skip.
    pub offset: i64,
    /// Order field; empty means canonical id order.
    pub order_by: String,
    /// Whether to reverse the order.
    pub order_desc: bool,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            order_by: String::new(),
            order_desc: false,
        }
    }
}

impl ListParams {
    /// Parses query-string pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key {
                "limit" => {
                    if let Ok(limit) = value.parse::<i64>() {
                        if limit > 0 {
                            params.limit = limit;
                        }
                    }
                }
                "offset" => {
                    if let Ok(offset) = value.parse::<i64>() {
                        if offset >= 0 {
                            params.offset = offset;
                        }
                    }
                }
                "orderBy" => params.order_by = value.to_string(),
                "orderDesc" => params.order_desc = value == "true",
                _ => {}
            }
        }
        params
    }
}

/// The request handler layer over an engine.
pub struct Server {
    engine: Arc<Engine>,
    config: ServerConfig,
}

impl Server {
    /// Opens an engine per the configuration and wraps it.
    pub fn new(config: ServerConfig) -> ApiResult<Self> {
        let engine = Engine::open(config.engine_config())?;
        Ok(Self {
            engine: Arc::new(engine),
            config,
        })
    }

    /// Wraps an existing engine.
    #[must_use]
    pub fn with_engine(engine: Arc<Engine>, config: ServerConfig) -> Self {
        Self { engine, config }
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    // ---- entity types ------------------------------------------------------

    /// `GET /entity-types`
    #[must_use]
    pub fn list_entity_types(&self) -> Vec<String> {
        self.engine.list_entity_types()
    }

    /// `POST /entity-types` — 201 on success, 409 on duplicate names.
    pub fn create_entity_type(&self, def: EntityDefinition) -> ApiResult<EntityTypeResponse> {
        let stored = self.engine.register_entity_type(def)?;
        Ok(EntityTypeResponse {
            message: "Entity type created successfully".to_string(),
            entity_type: stored,
            unique_constraints_added: None,
            unique_constraints_removed: None,
        })
    }

    /// `GET /entity-types/{name}`
    pub fn get_entity_type(&self, name: &str) -> ApiResult<EntityDefinition> {
        Ok(self.engine.get_entity_definition(name)?)
    }

    /// `PUT /entity-types/{name}` — 400 on name mismatch or generator
    /// change, 409 when a new unique constraint fails over live data.
    pub fn update_entity_type(
        &self,
        name: &str,
        def: EntityDefinition,
    ) -> ApiResult<EntityTypeResponse> {
        self.engine.get_entity_definition(name)?;

        if def.name != name {
            return Err(ApiError::bad_request(
                ErrorCode::InvalidEntityType,
                "Entity type name in payload doesn't match URL parameter",
            ));
        }

        let update = self.engine.update_entity_type(def)?;
        Ok(EntityTypeResponse {
            message: "Entity type updated successfully".to_string(),
            entity_type: update.definition,
            unique_constraints_added: (!update.unique_added.is_empty())
                .then_some(update.unique_added),
            unique_constraints_removed: (!update.unique_removed.is_empty())
                .then_some(update.unique_removed),
        })
    }

    // ---- entities ----------------------------------------------------------

    /// `GET /entities/{type}`
    pub fn list_entities(&self, entity_type: &str, params: &ListParams) -> ApiResult<QueryResponse> {
        let opts = QueryOptions {
            entity_type: entity_type.to_string(),
            limit: params.limit,
            offset: params.offset,
            order_by: params.order_by.clone(),
            order_desc: params.order_desc,
            ..QueryOptions::default()
        };

        let def = self.engine.get_entity_definition(entity_type)?;
        let result = self.engine.execute_query(&opts)?;
        Ok(self.project_page(&result, &def, &[]))
    }

    /// `POST /entities/{type}` — 201 with the generated id.
    pub fn create_entity(
        &self,
        entity_type: &str,
        request: &CreateEntityRequest,
    ) -> ApiResult<MutationResponse> {
        let id = self
            .engine
            .insert(entity_type, request.id.as_deref(), &request.fields)?;

        debug!(entity_type, id = %id, "entity created");

        let def = self.engine.get_entity_definition(entity_type)?;
        Ok(MutationResponse {
            message: "Entity created successfully".to_string(),
            id: coerce_id(&id, def.generator()),
        })
    }

    /// `GET /entities/{type}/{id}` — 404 when absent, 400 on malformed
    /// ids.
    pub fn get_entity(&self, entity_type: &str, id: &str) -> ApiResult<serde_json::Value> {
        let def = self.engine.get_entity_definition(entity_type)?;
        let entity = self.engine.get_by_type(id, entity_type)?;

        let projection = Projection {
            debug: self.config.debug,
            join_aliases: &[],
        };
        Ok(to_representation(&entity, &def, &projection))
    }

    /// `PUT /entities/{type}/{id}`
    pub fn update_entity(
        &self,
        entity_type: &str,
        id: &str,
        request: &UpdateEntityRequest,
    ) -> ApiResult<MutationResponse> {
        let canonical = self.engine.update(entity_type, id, &request.fields)?;

        debug!(entity_type, id = %canonical, "entity updated");

        let def = self.engine.get_entity_definition(entity_type)?;
        Ok(MutationResponse {
            message: "Entity updated successfully".to_string(),
            id: coerce_id(&canonical, def.generator()),
        })
    }

    /// `DELETE /entities/{type}/{id}`
    pub fn delete_entity(&self, entity_type: &str, id: &str) -> ApiResult<MutationResponse> {
        let canonical = self.engine.delete(entity_type, id)?;

        debug!(entity_type, id = %canonical, "entity deleted");

        let def = self.engine.get_entity_definition(entity_type)?;
        Ok(MutationResponse {
            message: "Entity deleted successfully".to_string(),
            id: coerce_id(&canonical, def.generator()),
        })
    }

    // ---- queries -----------------------------------------------------------

    /// `POST /query`
    pub fn query(&self, opts: &QueryOptions) -> ApiResult<QueryResponse> {
        let def = self.engine.get_entity_definition(&opts.entity_type)?;
        let result = self.engine.execute_query(opts)?;
        Ok(self.project_page(&result, &def, &[]))
    }

    /// `POST /query/count`
    pub fn count_query(&self, opts: &QueryOptions) -> ApiResult<CountResponse> {
        let started = Instant::now();
        let count = self.engine.execute_count_query(opts)?;
        let elapsed = started.elapsed();

        Ok(CountResponse {
            count,
            entity_type: opts.entity_type.clone(),
            query_type: if opts.joins.is_empty() {
                "simple".to_string()
            } else {
                "join".to_string()
            },
            filters_count: opts.filters.len(),
            joins_applied: opts.joins.len(),
            execution_time: format!("{elapsed:?}"),
        })
    }

    /// `POST /query/joins` — 400 without at least one join.
    pub fn join_query(&self, opts: &QueryOptions) -> ApiResult<QueryResponse> {
        let def = self.engine.get_entity_definition(&opts.entity_type)?;
        let aliases: Vec<String> = opts.joins.iter().map(|j| j.alias.clone()).collect();

        let result = self.engine.execute_query_with_joins(opts)?;
        Ok(self.project_page(&result, &def, &aliases))
    }

    // ---- operational surfaces ----------------------------------------------

    /// `GET /health`
    #[must_use]
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
        }
    }

    /// `GET /`
    #[must_use]
    pub fn welcome(&self) -> WelcomeResponse {
        WelcomeResponse {
            name: NAME.to_string(),
            version: VERSION.to_string(),
            description: DESCRIPTION.to_string(),
            documentation: "/api/v1".to_string(),
            health_check: "/health".to_string(),
            status: "running".to_string(),
            server_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// `GET /settings`
    #[must_use]
    pub fn settings(&self) -> serde_json::Value {
        json!({
            "debug": self.config.debug,
            "logLevel": self.config.log_level,
            "port": self.config.port,
            "enableWAL": self.config.enable_wal,
            "enableZSTD": self.config.enable_zstd,
            "colorizedLogs": self.config.colorized_logs,
            "serverTime": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "version": VERSION,
            "environment": self.config.environment(),
        })
    }

    /// `GET /errors`
    pub fn error_codes(
        &self,
        code: Option<&str>,
        category: Option<&str>,
        http_status: Option<u16>,
    ) -> ApiResult<serde_json::Value> {
        if let Some(code) = code {
            return match errdoc::lookup(code) {
                Some(entry) => Ok(serde_json::to_value(entry)
                    .map_err(|e| ApiError::new(500, ErrorCode::Internal, e.to_string()))?),
                None => Err(ApiError::new(
                    404,
                    ErrorCode::InvalidRequest,
                    format!("Error code '{code}' not found"),
                )),
            };
        }
        Ok(errdoc::catalog(category, http_status))
    }

    /// `GET /debug/schema`
    pub fn debug_schema(&self, entity_type: Option<&str>) -> ApiResult<serde_json::Value> {
        let Some(name) = entity_type else {
            let mut schemas = serde_json::Map::new();
            for type_name in self.engine.list_entity_types() {
                if let Ok(def) = self.engine.get_entity_definition(&type_name) {
                    schemas.insert(
                        type_name,
                        serde_json::to_value(def).unwrap_or(serde_json::Value::Null),
                    );
                }
            }
            return Ok(json!({ "entity_types": schemas }));
        };

        let def = self.engine.get_entity_definition(name)?;
        let count = self.engine.entity_count(name)?;

        let mut field_map = serde_json::Map::new();
        for field in &def.fields {
            field_map.insert(
                field.name.clone(),
                json!({
                    "type": field.field_type,
                    "indexed": field.indexed,
                    "required": field.required,
                    "nullable": field.nullable,
                    "internal": field.internal,
                    "unique": field.unique,
                }),
            );
        }

        Ok(json!({
            "entity_type": def.name,
            "id_generator": def.generator().as_str(),
            "fields": field_map,
            "entity_count": count,
        }))
    }

    // ---- internals ---------------------------------------------------------

    fn project_page(
        &self,
        result: &PaginatedResult,
        def: &EntityDefinition,
        join_aliases: &[String],
    ) -> QueryResponse {
        let projection = Projection {
            debug: self.config.debug,
            join_aliases,
        };
        QueryResponse {
            total: result.total,
            count: result.count,
            limit: result.limit,
            offset: result.offset,
            has_more: result.has_more,
            entity_type: result.entity_type.clone(),
            data: result
                .data
                .iter()
                .map(|entity| to_representation(entity, def, &projection))
                .collect(),
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("port", &self.config.port)
            .field("debug", &self.config.debug)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_parse_leniently() {
        let params = ListParams::from_pairs([
            ("limit", "25"),
            ("offset", "5"),
            ("orderBy", "age"),
            ("orderDesc", "true"),
            ("stray", "ignored"),
        ]);
        assert_eq!(params.limit, 25);
        assert_eq!(params.offset, 5);
        assert_eq!(params.order_by, "age");
        assert!(params.order_desc);
    }

    #[test]
    fn list_params_ignore_garbage() {
        let params = ListParams::from_pairs([
            ("limit", "-3"),
            ("offset", "many"),
            ("orderDesc", "yes"),
        ]);
        assert_eq!(params.limit, 100);
        assert_eq!(params.offset, 0);
        assert!(!params.order_desc);
    }

    #[test]
    fn welcome_reports_running() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let welcome = server.welcome();
        assert_eq!(welcome.status, "running");
        assert_eq!(welcome.documentation, "/api/v1");
        assert_eq!(welcome.name, NAME);
    }

    #[test]
    fn settings_surface_exposes_config() {
        let server = Server::new(ServerConfig::default().debug(true).port(9000)).unwrap();
        let settings = server.settings();
        assert_eq!(settings["debug"], serde_json::json!(true));
        assert_eq!(settings["port"], serde_json::json!(9000));
        assert_eq!(settings["environment"], serde_json::json!("development"));
    }

    #[test]
    fn error_code_lookup_surface() {
        let server = Server::new(ServerConfig::default()).unwrap();

        let doc = server.error_codes(Some("SY100"), None, None).unwrap();
        assert_eq!(doc["name"], serde_json::json!("EntityNotFound"));

        let err = server.error_codes(Some("SY999"), None, None).unwrap_err();
        assert_eq!(err.status, 404);
    }
}
