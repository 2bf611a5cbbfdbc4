//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A client identity could not be parsed from text
    #[error("Invalid client identity '{value}': {reason}")]
    InvalidIdentity { value: String, reason: String },

    /// A session value could not be parsed from text
    #[error("Invalid session value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
