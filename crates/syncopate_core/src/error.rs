//! Engine error types and stable error codes.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Stable machine-readable error codes exposed on the wire as `db_code`.
///
/// Codes are grouped by hundreds: SY0xx system, SY1xx entity, SY2xx
/// validation, SY3xx constraint. Codes never change meaning once
/// published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Unexpected internal failure.
    Internal,
    /// Request body could not be decoded.
    MalformedData,
    /// No entity with the given id.
    EntityNotFound,
    /// No entity type with the given name.
    EntityTypeNotFound,
    /// Entity type name already registered.
    EntityTypeExists,
    /// Entity type definition is invalid.
    InvalidEntityType,
    /// A required field (or required id) was not supplied.
    RequiredFieldMissing,
    /// An id does not conform to its generator's canonical form.
    InvalidId,
    /// The request is structurally valid but semantically wrong.
    InvalidRequest,
    /// A query references an unknown field or operator.
    InvalidQuery,
    /// A join specification is invalid.
    InvalidJoin,
    /// A unique constraint would be violated.
    UniqueConstraint,
    /// Attempt to change an entity type's id generator.
    IdGeneratorChange,
}

impl ErrorCode {
    /// The stable wire string for this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "SY001",
            Self::MalformedData => "SY002",
            Self::EntityNotFound => "SY100",
            Self::EntityTypeNotFound => "SY101",
            Self::EntityTypeExists => "SY102",
            Self::InvalidEntityType => "SY103",
            Self::RequiredFieldMissing => "SY200",
            Self::InvalidId => "SY201",
            Self::InvalidRequest => "SY202",
            Self::InvalidQuery => "SY203",
            Self::InvalidJoin => "SY204",
            Self::UniqueConstraint => "SY300",
            Self::IdGeneratorChange => "SY301",
        }
    }

    /// The HTTP status this code maps to.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Internal => 500,
            Self::EntityNotFound | Self::EntityTypeNotFound => 404,
            Self::EntityTypeExists | Self::UniqueConstraint => 409,
            Self::MalformedData
            | Self::InvalidEntityType
            | Self::RequiredFieldMissing
            | Self::InvalidId
            | Self::InvalidRequest
            | Self::InvalidQuery
            | Self::InvalidJoin
            | Self::IdGeneratorChange => 400,
        }
    }

    /// Human-readable category for grouping in documentation.
    #[must_use]
    pub const fn category(self) -> &'static str {
        match self {
            Self::Internal | Self::MalformedData => "System",
            Self::EntityNotFound
            | Self::EntityTypeNotFound
            | Self::EntityTypeExists
            | Self::InvalidEntityType => "Entity",
            Self::RequiredFieldMissing
            | Self::InvalidId
            | Self::InvalidRequest
            | Self::InvalidQuery
            | Self::InvalidJoin => "Validation",
            Self::UniqueConstraint | Self::IdGeneratorChange => "Constraint",
        }
    }

    /// All defined codes, in wire order.
    #[must_use]
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::Internal,
            Self::MalformedData,
            Self::EntityNotFound,
            Self::EntityTypeNotFound,
            Self::EntityTypeExists,
            Self::InvalidEntityType,
            Self::RequiredFieldMissing,
            Self::InvalidId,
            Self::InvalidRequest,
            Self::InvalidQuery,
            Self::InvalidJoin,
            Self::UniqueConstraint,
            Self::IdGeneratorChange,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Errors raised by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Entity not found.
    #[error("entity with ID '{id}' of type '{entity_type}' not found")]
    EntityNotFound {
        /// The entity type searched.
        entity_type: String,
        /// The id that was not found.
        id: String,
    },

    /// Entity type not registered.
    #[error("entity type '{0}' not found")]
    EntityTypeNotFound(String),

    /// Entity type name already taken.
    #[error("entity type '{0}' already exists")]
    EntityTypeExists(String),

    /// Definition is structurally invalid.
    #[error("invalid entity type: {0}")]
    InvalidEntityType(String),

    /// Input could not be decoded or coerced.
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// A required field was missing.
    #[error("required field missing: {0}")]
    RequiredFieldMissing(String),

    /// An id failed canonical-form validation.
    #[error("invalid ID: {0}")]
    InvalidId(String),

    /// A semantically invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A query referenced an unknown field or operator.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A join specification was invalid.
    #[error("invalid join: {0}")]
    InvalidJoin(String),

    /// A unique constraint was violated.
    #[error("unique constraint violation on field '{field}' of type '{entity_type}'")]
    UniqueConstraint {
        /// The entity type.
        entity_type: String,
        /// The offending field.
        field: String,
    },

    /// Attempt to change an id generator after creation.
    #[error("cannot change the ID generator after entity type creation")]
    IdGeneratorChange,

    /// Write-ahead log corruption detected during recovery.
    #[error("WAL corruption: {0}")]
    WalCorruption(String),

    /// Log store failure.
    #[error("storage error: {0}")]
    Storage(#[from] syncopate_storage::StorageError),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Creates a malformed-data error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedData(message.into())
    }

    /// Creates an invalid-id error.
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }

    /// Creates an invalid-query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Creates an invalid-join error.
    pub fn invalid_join(message: impl Into<String>) -> Self {
        Self::InvalidJoin(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates a unique-constraint error.
    pub fn unique_constraint(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UniqueConstraint {
            entity_type: entity_type.into(),
            field: field.into(),
        }
    }

    /// Creates an entity-not-found error.
    pub fn entity_not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// The stable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EntityNotFound { .. } => ErrorCode::EntityNotFound,
            Self::EntityTypeNotFound(_) => ErrorCode::EntityTypeNotFound,
            Self::EntityTypeExists(_) => ErrorCode::EntityTypeExists,
            Self::InvalidEntityType(_) => ErrorCode::InvalidEntityType,
            Self::MalformedData(_) => ErrorCode::MalformedData,
            Self::RequiredFieldMissing(_) => ErrorCode::RequiredFieldMissing,
            Self::InvalidId(_) => ErrorCode::InvalidId,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::InvalidQuery(_) => ErrorCode::InvalidQuery,
            Self::InvalidJoin(_) => ErrorCode::InvalidJoin,
            Self::UniqueConstraint { .. } => ErrorCode::UniqueConstraint,
            Self::IdGeneratorChange => ErrorCode::IdGeneratorChange,
            Self::WalCorruption(_) | Self::Storage(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code().http_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Internal.as_str(), "SY001");
        assert_eq!(ErrorCode::EntityNotFound.as_str(), "SY100");
        assert_eq!(ErrorCode::UniqueConstraint.as_str(), "SY300");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::EntityNotFound.http_status(), 404);
        assert_eq!(ErrorCode::UniqueConstraint.http_status(), 409);
        assert_eq!(ErrorCode::InvalidQuery.http_status(), 400);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn error_to_code() {
        let err = EngineError::unique_constraint("user", "email");
        assert_eq!(err.code(), ErrorCode::UniqueConstraint);
        assert_eq!(err.http_status(), 409);

        let err = EngineError::IdGeneratorChange;
        assert_eq!(err.code(), ErrorCode::IdGeneratorChange);
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::all() {
            assert!(seen.insert(code.as_str()), "duplicate code {code}");
        }
    }
}
