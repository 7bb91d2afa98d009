//! Generic retry loop for Agent-driven phases.
//!
//! One phase run: archive the prompt, stream the Agent, archive the raw
//! transcript, record the session id, extract and validate the final JSON
//! payload, checkpoint state at every attempt boundary. On the final
//! attempt the prompt switches to a simplified variant to raise the odds
//! of success under long-context degradation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;

use crate::error::{OrchestratorError, PromptError};
use crate::executor::{AgentExecutor, ExecuteConfig, ProgressFn};
use crate::executor::extract_last_json;
use crate::session::SessionManager;
use crate::state::StateStore;
use crate::types::{Phase, WorkflowState};

/// How to run one phase.
pub struct PhaseSpec<'a> {
    /// Builds the prompt for a given attempt; `simplified` is true on late
    /// attempts.
    pub build_prompt: &'a (dyn Fn(u32, bool) -> Result<String, PromptError> + Send + Sync),
    /// JSON schema forwarded to the Agent; when set, the output must
    /// contain a JSON payload accepted by `validate`.
    pub json_schema: Option<&'a str>,
    /// Validates the extracted JSON (typically a typed deserialization).
    pub validate: Option<&'a (dyn Fn(&str) -> Result<(), String> + Send + Sync)>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub max_attempts: u32,
    pub working_dir: Utf8PathBuf,
    /// Start a fresh Agent conversation instead of resuming.
    pub force_new_session: bool,
    /// Extra environment for the Agent process.
    pub env: HashMap<String, String>,
}

/// Successful phase outcome.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    /// Extracted JSON payload when a schema was set, otherwise the raw
    /// result payload.
    pub output: String,
    pub attempts: u32,
    pub duration: Duration,
}

pub struct PhaseRunner {
    executor: Arc<dyn AgentExecutor>,
    store: StateStore,
    sessions: SessionManager,
}

impl PhaseRunner {
    #[must_use]
    pub fn new(executor: Arc<dyn AgentExecutor>, store: StateStore) -> Self {
        Self {
            executor,
            store,
            sessions: SessionManager::new(),
        }
    }

    /// Run a phase with retries. The attempt counter on `state` is
    /// monotonic: a resumed workflow continues where it crashed.
    pub async fn run(
        &self,
        state: &mut WorkflowState,
        phase: Phase,
        spec: &PhaseSpec<'_>,
        on_progress: ProgressFn<'_>,
    ) -> Result<PhaseOutcome, OrchestratorError> {
        use tracing::Instrument;
        let span = crate::logging::phase_span(&state.name, phase.as_str());
        self.run_inner(state, phase, spec, on_progress)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        state: &mut WorkflowState,
        phase: Phase,
        spec: &PhaseSpec<'_>,
        on_progress: ProgressFn<'_>,
    ) -> Result<PhaseOutcome, OrchestratorError> {
        let started = std::time::Instant::now();
        let mut last_failure = String::from("no attempts made");

        while state.attempts(phase) < spec.max_attempts {
            let attempt = state.attempts(phase) + 1;
            state.phase_mut(phase).attempts = attempt;
            self.store.save_state(state)?;

            let simplified = attempt > 2 || (attempt == spec.max_attempts && attempt > 1);
            let prompt = (spec.build_prompt)(attempt, simplified)?;
            self.store.save_prompt(&state.name, phase, attempt, &prompt)?;
            tracing::info!(attempt, simplified, "running phase attempt");

            let config = ExecuteConfig {
                prompt,
                working_directory: spec.working_dir.clone(),
                env: spec.env.clone(),
                timeout: Some(spec.timeout),
                json_schema: spec.json_schema.map(str::to_string),
                resume_session_id: state.session_id.clone(),
                force_new_session: spec.force_new_session,
                extra_args: Vec::new(),
            };

            let result = self.executor.execute_streaming(&config, on_progress).await?;

            // Transcript archival happens before the session id update so a
            // crash between the two leaves the transcript on disk.
            self.store
                .save_raw_output(&state.name, phase, &result.raw_transcript)?;
            if let Some(id) = self.sessions.parse_session_id(&result.raw_transcript) {
                let is_new = state.session_id.as_deref() != Some(id.as_str());
                self.sessions.update_state_with_session(state, &id, is_new);
            }
            self.store.save_state(state)?;

            if let Some(error) = &result.error {
                last_failure = error.to_string();
                state.phase_mut(phase).last_error = Some(last_failure.clone());
                self.store.save_state(state)?;
                tracing::warn!(attempt, error = %last_failure, "phase attempt failed");
                continue;
            }

            let output = if spec.json_schema.is_some() {
                // Exactly one JSON result is expected; pick the last
                // well-formed top-level value in the payload.
                let Some(json) = extract_last_json(&result.output) else {
                    last_failure = format!(
                        "no JSON found in agent output (tail: {})",
                        crate::executor::tail_excerpt(&result.output, 256)
                    );
                    state.phase_mut(phase).last_error = Some(last_failure.clone());
                    self.store.save_state(state)?;
                    continue;
                };
                if let Some(validate) = spec.validate {
                    if let Err(reason) = validate(&json) {
                        last_failure = format!("agent output failed validation: {reason}");
                        state.phase_mut(phase).last_error = Some(last_failure.clone());
                        self.store.save_state(state)?;
                        continue;
                    }
                }
                // Persist the validated payload as the phase's structured
                // output.
                let value: serde_json::Value = serde_json::from_str(&json)
                    .map_err(|e| OrchestratorError::OutputParse {
                        phase,
                        reason: e.to_string(),
                    })?;
                self.store.save_phase_output(&state.name, phase, &value)?;
                json
            } else {
                result.output
            };

            state.phase_mut(phase).last_error = None;
            self.store.save_state(state)?;

            return Ok(PhaseOutcome {
                output,
                attempts: attempt,
                duration: started.elapsed(),
            });
        }

        Err(OrchestratorError::PhaseFailed {
            phase,
            attempts: state.attempts(phase),
            message: last_failure,
        })
    }
}
