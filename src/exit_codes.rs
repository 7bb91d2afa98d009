//! Process exit codes and the mapping from library errors.

use crate::error::OrchestratorError;

/// Exit code constants.
pub mod codes {
    /// Operation completed successfully.
    pub const SUCCESS: i32 = 0;

    /// Invalid usage: bad arguments or configuration.
    pub const USAGE: i32 = 1;

    /// Workflow failed and is not automatically recoverable.
    pub const WORKFLOW_FAILED: i32 = 2;

    /// Run was cancelled by the user.
    pub const CANCELLED: i32 = 3;
}

/// Map an orchestrator error to the process exit code.
#[must_use]
pub fn exit_code_for(error: &OrchestratorError) -> i32 {
    match error {
        OrchestratorError::Cancelled => codes::CANCELLED,
        OrchestratorError::Config(_) => codes::USAGE,
        OrchestratorError::State(crate::error::StateError::InvalidName { .. }) => codes::USAGE,
        _ => codes::WORKFLOW_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, StateError};

    #[test]
    fn cancellation_maps_to_three() {
        assert_eq!(exit_code_for(&OrchestratorError::Cancelled), 3);
    }

    #[test]
    fn config_errors_are_usage_errors() {
        let err = OrchestratorError::Config(ConfigError::InvalidValue {
            key: "max-lines".to_string(),
            value: "-1".to_string(),
        });
        assert_eq!(exit_code_for(&err), codes::USAGE);
    }

    #[test]
    fn bad_names_are_usage_errors() {
        let err = OrchestratorError::State(StateError::InvalidName {
            name: "../evil".to_string(),
            reason: "path traversal".to_string(),
        });
        assert_eq!(exit_code_for(&err), codes::USAGE);
    }

    #[test]
    fn everything_else_is_workflow_failure() {
        let err = OrchestratorError::ConfirmationDenied;
        assert_eq!(exit_code_for(&err), codes::WORKFLOW_FAILED);
    }
}
