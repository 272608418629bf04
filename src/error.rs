//! Error types for the build-domain CLI.
//!
//! Uses thiserror for derive macros. The lock-related variants split into two
//! groups: acquisition-path errors abort the current phase, release-path errors
//! are caught by the caller and downgraded to warnings.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for build-domain operations.
#[derive(Error, Debug)]
pub enum BuildDomainError {
    /// User provided invalid inputs or configuration.
    #[error("{0}")]
    UserError(String),

    /// The lock service refused to enqueue, or a wait failed outright.
    #[error("Lock acquisition failed: {0}")]
    AcquisitionError(String),

    /// No ticket token could be recovered from the enqueue response.
    #[error("No ticket ID found in output: {output}")]
    ExtractionError { output: String },

    /// The wait elapsed without the lock being granted.
    #[error("Failed to acquire lock for resource '{resource}' within {timeout_seconds} seconds")]
    TimeoutError {
        resource: String,
        timeout_seconds: u64,
    },

    /// The lock service rejected a release.
    #[error("Failed to release lock: {0}")]
    ReleaseError(String),

    /// Handoff record incomplete or unwritable, or an illegal handle transition.
    #[error("Lock state error: {0}")]
    StateError(String),

    /// A protected step reported failure.
    #[error("{0}")]
    OperationFailed(String),

    /// An external program could not be executed at all.
    #[error("Command failed: {0}")]
    CommandError(String),
}

impl BuildDomainError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildDomainError::UserError(_) => exit_codes::USER_ERROR,
            BuildDomainError::OperationFailed(_) => exit_codes::OPERATION_FAILURE,
            BuildDomainError::CommandError(_) => exit_codes::COMMAND_FAILURE,
            BuildDomainError::AcquisitionError(_)
            | BuildDomainError::ExtractionError { .. }
            | BuildDomainError::TimeoutError { .. }
            | BuildDomainError::ReleaseError(_)
            | BuildDomainError::StateError(_) => exit_codes::LOCK_FAILURE,
        }
    }

    /// Whether this error belongs to the acquisition path (fatal to its phase).
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            BuildDomainError::AcquisitionError(_)
                | BuildDomainError::ExtractionError { .. }
                | BuildDomainError::TimeoutError { .. }
        )
    }
}

/// Result type alias for build-domain operations.
pub type Result<T> = std::result::Result<T, BuildDomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_has_correct_exit_code() {
        let err = BuildDomainError::UserError("missing repository".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn operation_failure_has_correct_exit_code() {
        let err = BuildDomainError::OperationFailed("Build failed".to_string());
        assert_eq!(err.exit_code(), exit_codes::OPERATION_FAILURE);
    }

    #[test]
    fn command_error_has_correct_exit_code() {
        let err = BuildDomainError::CommandError("sfp not found".to_string());
        assert_eq!(err.exit_code(), exit_codes::COMMAND_FAILURE);
    }

    #[test]
    fn acquisition_path_errors_map_to_lock_failure() {
        let errors = [
            BuildDomainError::AcquisitionError("status 1".to_string()),
            BuildDomainError::ExtractionError {
                output: "garbage".to_string(),
            },
            BuildDomainError::TimeoutError {
                resource: "build-core".to_string(),
                timeout_seconds: 900,
            },
        ];
        for err in errors {
            assert!(err.is_acquisition_failure());
            assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);
        }
    }

    #[test]
    fn release_path_errors_are_not_acquisition_failures() {
        assert!(!BuildDomainError::ReleaseError("x".to_string()).is_acquisition_failure());
        assert!(!BuildDomainError::StateError("x".to_string()).is_acquisition_failure());
    }

    #[test]
    fn timeout_message_names_resource_and_timeout() {
        let err = BuildDomainError::TimeoutError {
            resource: "build-widgets".to_string(),
            timeout_seconds: 900,
        };
        let msg = err.to_string();
        assert!(msg.contains("build-widgets"));
        assert!(msg.contains("900"));
    }

    #[test]
    fn extraction_error_includes_full_response() {
        let err = BuildDomainError::ExtractionError {
            output: "line one\nnot-a-ticket".to_string(),
        };
        assert!(err.to_string().contains("line one\nnot-a-ticket"));
    }
}
