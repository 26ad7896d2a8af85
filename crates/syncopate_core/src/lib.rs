//! # SyncopateDB Core
//!
//! The storage engine behind SyncopateDB:
//!
//! - Schema registry with typed field definitions
//! - Four id generation strategies with canonical forms
//! - Entity store with unique and value indexes maintained on every
//!   mutation
//! - Query executor with index-assisted planning, ordering, and
//!   pagination
//! - Join executor composing results across types without mutating
//!   sources
//! - Optional write-ahead log (append-before-apply) with zstd-compressed
//!   record bodies

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod id;
mod join;
mod query;
mod represent;
mod schema;
mod store;
mod value;
pub mod wal;

pub use config::EngineConfig;
pub use entity::{id_cmp, is_internal_field, Entity, CREATED_AT, UPDATED_AT};
pub use error::{EngineError, EngineResult, ErrorCode};
pub use id::{new_cuid, IdStrategy};
pub use join::{JoinOptions, JoinType};
pub use query::{Filter, FilterOp, PaginatedResult, QueryOptions, DEFAULT_LIMIT};
pub use represent::{coerce_id, to_representation, Projection};
pub use schema::{EntityDefinition, FieldDefinition, SchemaRegistry, SchemaUpdate};
pub use store::Engine;
pub use value::{FieldType, FieldValue};
