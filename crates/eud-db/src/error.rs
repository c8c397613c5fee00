//! Database error types for eud-db.

use eud_core::errors::CoreError;
use thiserror::Error;

/// Errors from database operations and the services built on them.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed or a column could not be decoded.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// The requested record does not exist.
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Caller input was rejected.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The record is not in a state that allows the operation.
    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    /// A tech tree edit would have introduced a cycle.
    #[error("Tech tree cycle through node {node_id}")]
    Cycle { node_id: String },

    /// Invalid state encountered (e.g., bad data in DB).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DatabaseError {
    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(entity_type: &str, id: &str) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<CoreError> for DatabaseError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::PreconditionViolated(msg) => Self::PreconditionViolated(msg),
            CoreError::Cycle { node_id } => Self::Cycle { node_id },
            CoreError::Other(e) => Self::Other(e),
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Query(format!("JSON column: {err}"))
    }
}
