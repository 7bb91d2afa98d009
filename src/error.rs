//! Error types for the workflow orchestrator.
//!
//! Each subsystem owns a `thiserror` enum; `OrchestratorError` aggregates
//! them for callers. Library code returns errors and never exits the
//! process; only the CLI maps errors to exit codes.

use thiserror::Error;

use crate::types::Phase;

/// Errors from the low-level command runner.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("'{program}' timed out after {timeout_seconds}s")]
    Timeout {
        program: String,
        timeout_seconds: u64,
    },

    #[error("io error running '{program}': {reason}")]
    Io { program: String, reason: String },
}

/// Errors from the Agent executor.
///
/// `Timeout` and `NonZeroExit` are recoverable: the phase runner retries
/// them within the attempt budget. `BinaryNotFound` and `SpawnFailed` are
/// environment problems and fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("claude binary not found: {detail}")]
    BinaryNotFound { detail: String },

    #[error("failed to spawn claude: {reason}")]
    SpawnFailed { reason: String },

    #[error("claude timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("claude exited with code {code}")]
    NonZeroExit { code: i32 },

    #[error("failed to read claude output stream: {reason}")]
    StreamRead { reason: String },
}

impl ExecutorError {
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NonZeroExit { .. } | Self::StreamRead { .. }
        )
    }
}

/// Errors from the durable state store.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("workflow '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("workflow '{name}' not found")]
    NotFound { name: String },

    #[error("invalid workflow name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("state file corrupt at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write failed: {0}")]
    Write(#[from] anyhow::Error),
}

/// Errors from the typed git facade.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("{what} cannot be empty")]
    EmptyArgument { what: &'static str },

    #[error("branch {branch} already exists")]
    BranchExists { branch: String },

    #[error("failed to {op}: {stderr}")]
    CommandFailed { op: String, stderr: String },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors from the typed gh facade.
#[derive(Error, Debug)]
pub enum GhError {
    #[error("gh {op} failed: {stderr}")]
    CommandFailed { op: String, stderr: String },

    #[error("failed to parse gh output for {what}: {reason}")]
    ParseFailed { what: String, reason: String },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors from the CI monitor.
#[derive(Error, Debug)]
pub enum CiError {
    #[error("failed to check CI status: {reason}")]
    CheckFailed { reason: String },

    #[error("CI did not settle within {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },
}

/// Errors from worktree management.
#[derive(Error, Debug)]
pub enum WorktreeError {
    #[error("workflow name cannot be empty")]
    EmptyName,

    #[error("worktree path cannot be empty")]
    EmptyPath,

    #[error("path {path} exists but is not a registered worktree")]
    NotAWorktree { path: String },

    #[error("failed to resolve repository root at {dir}: {reason}")]
    RepoRoot { dir: String, reason: String },

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Errors from prompt construction.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PromptError {
    #[error("plan is required for this prompt")]
    MissingPlan,

    #[error("metrics are required for this prompt")]
    MissingMetrics,

    #[error("CI failures cannot be empty")]
    EmptyFailures,

    #[error("{what} cannot be empty")]
    EmptyField { what: &'static str },
}

/// Configuration problems, surfaced as usage errors by the CLI.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Top-level error type returned by the orchestrator library API.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("gh error: {0}")]
    Gh(#[from] GhError),

    #[error("CI error: {0}")]
    Ci(#[from] CiError),

    #[error("worktree error: {0}")]
    Worktree(#[from] WorktreeError),

    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("phase {phase} failed after {attempts} attempt(s): {message}")]
    PhaseFailed {
        phase: Phase,
        attempts: u32,
        message: String,
    },

    #[error("could not parse {phase} output: {reason}")]
    OutputParse { phase: Phase, reason: String },

    #[error("plan rejected without feedback")]
    ConfirmationDenied,

    #[error("confirmation callback failed: {reason}")]
    ConfirmationFailed { reason: String },

    #[error("workflow cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Whether `resume` can pick the workflow back up after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Executor(e) => e.is_recoverable(),
            Self::Ci(_) | Self::PhaseFailed { .. } | Self::OutputParse { .. } => true,
            Self::Cancelled => true,
            Self::State(StateError::AlreadyExists { .. }) => false,
            Self::Worktree(_) | Self::Config(_) | Self::Io(_) => false,
            Self::ConfirmationDenied | Self::ConfirmationFailed { .. } => false,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_recoverability() {
        assert!(ExecutorError::Timeout { timeout_seconds: 5 }.is_recoverable());
        assert!(ExecutorError::NonZeroExit { code: 1 }.is_recoverable());
        assert!(!ExecutorError::BinaryNotFound {
            detail: "not on PATH".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn orchestrator_recoverability() {
        let err = OrchestratorError::PhaseFailed {
            phase: Phase::Implementation,
            attempts: 3,
            message: "timed out".to_string(),
        };
        assert!(err.is_recoverable());

        let err = OrchestratorError::Worktree(WorktreeError::EmptyName);
        assert!(!err.is_recoverable());
    }
}
