//! Cross-cutting error types for Eudaimonia.
//!
//! Domain-specific errors (e.g., `DatabaseError`, `ConfigError`) are defined in
//! their respective crates. `DatabaseError` converts from `CoreError` so that
//! "not found" and "precondition violated" stay distinct all the way up.

use thiserror::Error;

/// Errors that can be raised by any Eudaimonia crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity lookup returned no result.
    #[error("Entity not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    /// Input failed validation (range, ownership, format).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation is not allowed in the record's current state.
    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    /// Adding an edge would make the tech tree cyclic.
    #[error("Tech tree cycle through node {node_id}")]
    Cycle { node_id: String },

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(entity_type: &str, id: &str) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }
}
