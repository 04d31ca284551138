//! Domain error taxonomy.

use thiserror::Error;

/// Errors surfaced by domain operations.
///
/// Business-rule violations (`Validation`, `NotFound`, `InvalidTransition`)
/// are returned synchronously to the caller and never retried. Failures
/// discovered during an asynchronous attempt (`TransientExternal`) are
/// recorded on the entity and communicated onward only via a `*_FAILED`
/// event. `Conflict` signals a lost optimistic-concurrency race and the
/// caller decides whether to reload and retry.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Bad input, rejected before any state change.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown entity id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Illegal state-machine move.
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Gateway, channel or timeout failure during an attempt.
    #[error("Transient external failure: {0}")]
    TransientExternal(String),

    /// Version check failed on a read-modify-write update.
    #[error("Concurrent update conflict on {entity} {id}: expected version {expected}, found {actual}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },
}

impl DomainError {
    /// Creates a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates an `InvalidTransition` error.
    pub fn invalid_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        DomainError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
