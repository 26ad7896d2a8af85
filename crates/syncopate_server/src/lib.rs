//! # SyncopateDB Server
//!
//! Transport-agnostic request handlers over the SyncopateDB engine.
//!
//! A deployment mounts [`Server`]'s `handle` methods behind an HTTP
//! router: one method per route of the `/api/v1` surface, each returning
//! a serializable DTO or an [`ApiError`] carrying the HTTP status and
//! stable `db_code` for the error envelope.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod errdoc;
mod error;
mod handler;
mod response;

pub use config::ServerConfig;
pub use errdoc::{all_docs, catalog, lookup, ErrorCodeDoc};
pub use error::{status_text, ApiError, ApiResult, ErrorResponse};
pub use handler::{CreateEntityRequest, ListParams, Server, UpdateEntityRequest};
pub use response::{
    CountResponse, EntityTypeResponse, HealthResponse, MutationResponse, QueryResponse,
    WelcomeResponse,
};

/// Service name.
pub const NAME: &str = "SyncopateDB";

/// Service version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service description.
pub const DESCRIPTION: &str = "A schema-aware document store accessed over HTTP/JSON";
