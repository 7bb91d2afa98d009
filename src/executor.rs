//! Agent subprocess execution with streaming structured output.
//!
//! Launches the Claude CLI non-interactively, writes the prompt to stdin,
//! and decodes newline-delimited JSON from stdout into progress events and
//! a final result payload. Timeouts kill the whole process group; whatever
//! output was streamed before the kill is returned alongside the error.

mod stream;

pub(crate) use stream::{extract_last_json, tail_excerpt};

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use crate::error::ExecutorError;
use crate::ring_buffer::RingBuffer;
use crate::types::ProgressEvent;

use stream::StreamEvent;

/// Progress callback invoked for each decoded stream event.
pub type ProgressFn<'a> = &'a (dyn Fn(ProgressEvent) + Send + Sync);

/// One Agent invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecuteConfig {
    pub prompt: String,
    pub working_directory: Utf8PathBuf,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub json_schema: Option<String>,
    pub resume_session_id: Option<String>,
    /// Ignore `resume_session_id` and start a fresh conversation.
    pub force_new_session: bool,
    pub extra_args: Vec<String>,
}

/// Outcome of an Agent invocation.
///
/// `output` is the final `result` chunk's payload; `raw_transcript` is the
/// capped full stdout for archival. `error` is set for recoverable
/// failures (timeout, non-zero exit) so partial output stays available.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub output: String,
    pub raw_transcript: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub error: Option<ExecutorError>,
}

impl ExecuteResult {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }
}

/// Seam for the orchestrator and tests; the real implementation shells out
/// to the Claude CLI.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, config: &ExecuteConfig) -> Result<ExecuteResult, ExecutorError>;

    async fn execute_streaming(
        &self,
        config: &ExecuteConfig,
        on_progress: ProgressFn<'_>,
    ) -> Result<ExecuteResult, ExecutorError>;
}

/// Real executor shelling out to the `claude` binary.
pub struct ClaudeExecutor {
    claude_path: Option<String>,
    dangerously_skip_permissions: bool,
    stdout_cap_bytes: usize,
    stderr_cap_bytes: usize,
}

impl ClaudeExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            claude_path: None,
            dangerously_skip_permissions: false,
            stdout_cap_bytes: 2 * 1024 * 1024,
            stderr_cap_bytes: 256 * 1024,
        }
    }

    #[must_use]
    pub fn with_path(claude_path: impl Into<String>) -> Self {
        let mut executor = Self::new();
        executor.claude_path = Some(claude_path.into());
        executor
    }

    #[must_use]
    pub fn skip_permissions(mut self, skip: bool) -> Self {
        self.dangerously_skip_permissions = skip;
        self
    }

    /// Resolve the Agent binary: the configured path first, then PATH.
    pub fn find_claude_path(&self) -> Result<String, ExecutorError> {
        if let Some(path) = &self.claude_path {
            return Ok(path.clone());
        }
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join("claude");
            if candidate.is_file() {
                return Ok(candidate.to_string_lossy().into_owned());
            }
        }
        Err(ExecutorError::BinaryNotFound {
            detail: "claude was not found on PATH; install the Claude CLI or pass --claude-path"
                .to_string(),
        })
    }

    fn build_args(&self, config: &ExecuteConfig) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];
        if let Some(session_id) = config
            .resume_session_id
            .as_deref()
            .filter(|id| !id.is_empty() && !config.force_new_session)
        {
            args.push("--resume".to_string());
            args.push(session_id.to_string());
        }
        if let Some(schema) = &config.json_schema {
            args.push("--json-schema".to_string());
            args.push(schema.clone());
        }
        if self.dangerously_skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.extend(config.extra_args.iter().cloned());
        args
    }
}

impl Default for ClaudeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentExecutor for ClaudeExecutor {
    async fn execute(&self, config: &ExecuteConfig) -> Result<ExecuteResult, ExecutorError> {
        self.execute_streaming(config, &|_| {}).await
    }

    async fn execute_streaming(
        &self,
        config: &ExecuteConfig,
        on_progress: ProgressFn<'_>,
    ) -> Result<ExecuteResult, ExecutorError> {
        let started = Instant::now();
        let binary = self.find_claude_path()?;
        let args = self.build_args(config);

        let mut cmd = tokio::process::Command::new(&binary);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !config.working_directory.as_str().is_empty() {
            cmd.current_dir(&config.working_directory);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        // New process group so a timeout kill takes the Agent's children too.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecutorError::BinaryNotFound {
                    detail: format!("{binary}: {e}"),
                }
            } else {
                ExecutorError::SpawnFailed {
                    reason: e.to_string(),
                }
            }
        })?;
        let child_pid = child.id();

        // The prompt goes to stdin as a single write, then stdin closes.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(config.prompt.as_bytes())
                .await
                .map_err(|e| ExecutorError::SpawnFailed {
                    reason: format!("failed to write prompt to stdin: {e}"),
                })?;
            drop(stdin);
        }

        let stdout = child.stdout.take().ok_or_else(|| ExecutorError::SpawnFailed {
            reason: "failed to capture stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ExecutorError::SpawnFailed {
            reason: "failed to capture stderr".to_string(),
        })?;

        // stderr drains in its own task so a chatty Agent cannot deadlock
        // on a full pipe.
        let stderr_cap = self.stderr_cap_bytes;
        let stderr_task = tokio::spawn(async move {
            let mut buffer = RingBuffer::new(stderr_cap);
            let mut reader = BufReader::new(stderr);
            let mut chunk = vec![0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buffer.write(&chunk[..n]),
                }
            }
            buffer
        });

        let mut transcript = RingBuffer::new(self.stdout_cap_bytes);
        let mut result_payload = String::new();
        let mut lines = BufReader::new(stdout).lines();

        let read_future = async {
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| ExecutorError::StreamRead {
                    reason: e.to_string(),
                })?
            {
                transcript.write_line(&line);
                for event in stream::decode_line(&line) {
                    match event {
                        StreamEvent::Progress(progress) => on_progress(progress),
                        StreamEvent::Result { result, .. } => {
                            result_payload = result;
                        }
                        StreamEvent::SessionInit { .. } => {
                            // Session ids are extracted from the archived
                            // transcript by the session manager.
                        }
                    }
                }
            }
            child.wait().await.map_err(|e| ExecutorError::StreamRead {
                reason: format!("failed to wait for claude: {e}"),
            })
        };

        let (exit_code, error) = if let Some(budget) = config.timeout {
            match timeout(budget, read_future).await {
                Ok(Ok(status)) => finish_status(status),
                Ok(Err(e)) => (-1, Some(e)),
                Err(_) => {
                    kill_process_group(child_pid);
                    // Drain whatever arrived before the kill landed.
                    let _ = timeout(Duration::from_millis(100), async {
                        while let Ok(Some(line)) = lines.next_line().await {
                            transcript.write_line(&line);
                        }
                    })
                    .await;
                    (
                        -1,
                        Some(ExecutorError::Timeout {
                            timeout_seconds: budget.as_secs(),
                        }),
                    )
                }
            }
        } else {
            match read_future.await {
                Ok(status) => finish_status(status),
                Err(e) => (-1, Some(e)),
            }
        };

        let stderr_buffer = stderr_task.await.unwrap_or_else(|_| RingBuffer::new(0));
        if let Some(err) = &error {
            tracing::warn!(
                error = %err,
                stderr_tail = %tail_excerpt(&stderr_buffer.to_string_lossy(), 512),
                "agent invocation failed"
            );
        }

        Ok(ExecuteResult {
            output: result_payload,
            raw_transcript: transcript.to_string_lossy(),
            exit_code,
            duration: started.elapsed(),
            error,
        })
    }
}

fn finish_status(status: std::process::ExitStatus) -> (i32, Option<ExecutorError>) {
    let code = status.code().unwrap_or(-1);
    if code == 0 {
        (0, None)
    } else {
        (code, Some(ExecutorError::NonZeroExit { code }))
    }
}

/// Kill the child's process group (Unix) or the child itself.
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    #[cfg(unix)]
    unsafe {
        // Negative pid targets the process group created in pre_exec.
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}
