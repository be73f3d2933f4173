//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (invariants,
/// tenant boundaries, missing records). Field-level validation has its own
/// structured type in `rolegate-auth`; infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found, or it belongs to another account.
    #[error("not found")]
    NotFound,

    /// An entity from one account was combined with another account's entity.
    #[error("account mismatch: {0}")]
    AccountMismatch(String),
}

impl DomainError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn account_mismatch(msg: impl Into<String>) -> Self {
        Self::AccountMismatch(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
