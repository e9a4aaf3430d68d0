//! Shared primitives for all Rust crates in Rankguard.

#![forbid(unsafe_code)]

/// Caller identity primitives shared across services.
pub mod auth;

use thiserror::Error;

pub use auth::AccessIdentity;

/// Result type used across Rankguard crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A backing store or message bus could not be reached in time.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the error is transient and the operation may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessIdentity, AppError};

    #[test]
    fn unavailable_errors_are_transient() {
        assert!(AppError::Unavailable("redis".to_owned()).is_transient());
        assert!(!AppError::Validation("bad".to_owned()).is_transient());
    }

    #[test]
    fn error_display_carries_category() {
        let error = AppError::Validation("unknown attribute type 'Foo'".to_owned());
        assert_eq!(
            error.to_string(),
            "validation error: unknown attribute type 'Foo'"
        );
    }

    #[test]
    fn superuser_identity_keeps_job_context() {
        let identity = AccessIdentity::new(7, "ambulance", 17).with_superuser(true);
        assert!(identity.is_superuser());
        assert_eq!(identity.job(), "ambulance");
        assert_eq!(identity.grade(), 17);
    }
}
