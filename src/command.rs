//! Subprocess execution: an argv-style command description, a runner trait
//! for dependency injection, and the real tokio-backed implementation.
//!
//! All process execution goes through [`CommandSpec`] so arguments cross
//! trust boundaries as discrete elements, never as shell strings.

use std::collections::HashMap;
use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use crate::error::CommandError;

/// Specification for a command to execute.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<Utf8PathBuf>,
    pub env: Option<HashMap<OsString, OsString>>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Build a `tokio::process::Command` from this spec. The child inherits
    /// the parent environment with any overrides applied on top.
    #[must_use]
    pub fn to_tokio_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(ref env) = self.env {
            for (key, value) in env {
                cmd.env(key, value);
            }
        }
        cmd
    }

    pub(crate) fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// Captured output of a completed command. stdout/stderr are trimmed, which
/// is what every caller wants for `git`/`gh` plumbing output.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Abstracts command execution so git/gh facades and the CI monitor are
/// testable without real subprocesses.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command with a timeout, capturing stdout and stderr. A non-zero
    /// exit is not an error at this layer; callers decide.
    async fn run(&self, spec: &CommandSpec, timeout: Duration)
        -> Result<CommandOutput, CommandError>;
}

/// Real runner backed by `tokio::process`. `kill_on_drop` ensures a timed
/// out child does not outlive the call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout_duration: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let mut cmd = spec.to_tokio_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output_future = cmd.output();
        let output = match timeout(timeout_duration, output_future).await {
            Ok(result) => result.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CommandError::SpawnFailed {
                        program: spec.program_name(),
                        reason: "not found on PATH".to_string(),
                    }
                } else {
                    CommandError::Io {
                        program: spec.program_name(),
                        reason: e.to_string(),
                    }
                }
            })?,
            // Dropping the output future kills the child via kill_on_drop.
            Err(_) => {
                return Err(CommandError::Timeout {
                    program: spec.program_name(),
                    timeout_seconds: timeout_duration.as_secs(),
                })
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
