//! Error taxonomy for lab order operations.

use thiserror::Error;

/// Result type alias for lab order operations.
pub type Result<T> = std::result::Result<T, LabOrderError>;

/// Errors returned to callers of the lifecycle service.
///
/// Validation and authorization failures are raised before any store access.
/// `NotFound` is raised inside the result transaction and aborts it.
/// `TransientDependency` means a must-succeed event could not be published; the
/// state change may already be committed and the caller should retry the operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabOrderError {
    /// Malformed or missing input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Actor identity absent or not allowed to act on the resource.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Order or test does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Event bus or another required collaborator is unreachable.
    #[error("Dependency unavailable: {0}")]
    TransientDependency(String),

    /// Database failure or unreadable stored data.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LabOrderError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientDependency(_) | Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_dependency_failures_are_retryable() {
        assert!(LabOrderError::TransientDependency("bus down".into()).is_retryable());
        assert!(LabOrderError::Storage("pool timeout".into()).is_retryable());
        assert!(!LabOrderError::Validation("no tests".into()).is_retryable());
        assert!(!LabOrderError::Authorization("wrong provider".into()).is_retryable());
        assert!(!LabOrderError::NotFound("order".into()).is_retryable());
    }

    #[test]
    fn messages_name_the_category() {
        let err = LabOrderError::Authorization("caller is not the ordering provider".into());
        assert_eq!(
            err.to_string(),
            "Not authorized: caller is not the ordering provider"
        );
    }
}
