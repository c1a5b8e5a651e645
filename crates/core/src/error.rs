//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Why a command was refused by the domain.
///
/// Every variant is raised before any event is produced, so a refused
/// command never leaves partial state behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (negative amount, zero quantity, unknown reference).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A transition was attempted against the wrong state.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The command targets an order that was never created.
    #[error("not found")]
    NotFound,

    /// Stale `expected_version`, or creating an order id twice.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller lacks the capability for this transition.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_reason() {
        assert_eq!(
            DomainError::precondition("order was rejected").to_string(),
            "precondition failed: order was rejected"
        );
        assert_eq!(DomainError::not_found().to_string(), "not found");
        assert_eq!(
            DomainError::unauthorized("procurement.orders.approve"),
            DomainError::Unauthorized("procurement.orders.approve".to_string())
        );
    }
}
