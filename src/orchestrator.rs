//! The workflow state machine.
//!
//! Drives a request through PLANNING → CONFIRMATION → IMPLEMENTATION →
//! CREATE_PR → CI verification → REFACTORING → optional PR_SPLIT, with a
//! CI_FIX loop whenever a non-ignored job fails. Phases run strictly
//! sequentially; state is checkpointed at every boundary so any phase can
//! be resumed after a crash.

mod split;
mod summary;

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use crossterm::style::Color;

use crate::ci::{CheckCiOptions, CiMonitor};
use crate::command::CommandRunner;
use crate::config::WorkflowConfig;
use crate::error::{ExecutorError, OrchestratorError, StateError};
use crate::executor::AgentExecutor;
use crate::gh::GhOps;
use crate::git::GitOps;
use crate::phase_runner::{PhaseOutcome, PhaseRunner, PhaseSpec};
use crate::prompt::{schemas, PrCreationContext, PromptBuilder};
use crate::state::StateStore;
use crate::types::{
    FailureType, ImplementationSummary, Phase, Plan, PrCreationResult, PrInfo, PrMetadata,
    PrSplitPlan, ProgressEvent, WorkflowError, WorkflowInfo, WorkflowState, WorkflowType,
};
use crate::worktree::WorktreeManager;

pub(crate) use summary::style;

/// Answer from the confirmation gate.
#[derive(Debug, Clone, Default)]
pub struct Confirmation {
    pub approved: bool,
    pub feedback: Option<String>,
}

/// User-supplied confirmation callback. Runs on a blocking thread; the
/// orchestrator starts no further Agent work until it returns.
pub type ConfirmCallback = Arc<dyn Fn(&Plan) -> Result<Confirmation, String> + Send + Sync>;

/// Default confirmation: render the plan and read an answer from the
/// terminal. Anything other than yes/no is treated as feedback.
#[must_use]
pub fn terminal_confirm() -> ConfirmCallback {
    Arc::new(|plan: &Plan| {
        println!("\n{}", plan.to_markdown());
        print!("Approve this plan? [y/N or feedback]: ");
        std::io::stdout().flush().map_err(|e| e.to_string())?;
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .map_err(|e| e.to_string())?;
        let answer = line.trim().to_string();
        Ok(match answer.to_lowercase().as_str() {
            "y" | "yes" => Confirmation {
                approved: true,
                feedback: None,
            },
            "" | "n" | "no" => Confirmation {
                approved: false,
                feedback: None,
            },
            _ => Confirmation {
                approved: false,
                feedback: Some(answer),
            },
        })
    })
}

pub struct Orchestrator {
    pub(crate) config: WorkflowConfig,
    pub(crate) store: StateStore,
    pub(crate) executor: Arc<dyn AgentExecutor>,
    pub(crate) git: GitOps,
    pub(crate) gh: GhOps,
    pub(crate) worktrees: WorktreeManager,
    pub(crate) prompts: PromptBuilder,
    phase_runner: PhaseRunner,
    confirm: ConfirmCallback,
}

impl Orchestrator {
    pub fn new(
        config: WorkflowConfig,
        runner: Arc<dyn CommandRunner>,
        executor: Arc<dyn AgentExecutor>,
    ) -> Result<Self, OrchestratorError> {
        let store = StateStore::new(config.base_dir.clone());
        let git = GitOps::new(runner.clone());
        let gh = GhOps::with_timeout(runner, config.ci.command_timeout);
        let worktrees = WorktreeManager::new(&config.repo_dir, git.clone())?;
        let phase_runner = PhaseRunner::new(executor.clone(), store.clone());
        Ok(Self {
            config,
            store,
            executor,
            git,
            gh,
            worktrees,
            prompts: PromptBuilder::new(),
            phase_runner,
            confirm: terminal_confirm(),
        })
    }

    pub fn set_confirm_callback(&mut self, callback: ConfirmCallback) {
        self.confirm = callback;
    }

    /// Create a new workflow and run it to completion or failure.
    pub async fn start(
        &self,
        name: &str,
        description: &str,
        workflow_type: WorkflowType,
    ) -> Result<WorkflowState, OrchestratorError> {
        let mut state = self.store.init_state(name, description, workflow_type)?;

        let worktree = match self.worktrees.create_worktree(name).await {
            Ok(path) => path,
            Err(e) => {
                let err = OrchestratorError::Worktree(e);
                self.record_failure(&mut state, &err);
                return Err(err);
            }
        };
        state.worktree_path = Some(worktree);
        self.store.save_state(&state)?;

        println!(
            "{} started workflow '{name}' ({workflow_type})",
            style("→", Color::Cyan, false)
        );
        self.run_workflow(state).await
    }

    /// Resume a suspended or recoverably failed workflow at its recorded
    /// phase, with retained session id and attempt counters.
    pub async fn resume(&self, name: &str) -> Result<WorkflowState, OrchestratorError> {
        let mut state = self.store.load_state(name)?;

        match state.current_phase {
            Phase::Completed => return Ok(state),
            Phase::Failed => {
                let error = state.last_error.clone().ok_or_else(|| {
                    OrchestratorError::State(StateError::Corrupt {
                        path: format!("{name}/state.json"),
                        reason: "failed workflow has no recorded error".to_string(),
                    })
                })?;
                if !error.recoverable {
                    return Err(OrchestratorError::PhaseFailed {
                        phase: error.phase,
                        attempts: state.attempts(error.phase),
                        message: format!("not recoverable: {}", error.message),
                    });
                }
                // Give the failing phase a fresh attempt budget.
                state.phase_mut(error.phase).attempts = 0;
                state.enter_phase(error.phase);
                state.last_error = None;
            }
            _ => {}
        }

        // The worktree may have been cleaned since the crash.
        let worktree = self.worktrees.create_worktree(name).await?;
        state.worktree_path = Some(worktree);
        self.store.save_state(&state)?;

        println!(
            "{} resuming workflow '{name}' at {}",
            style("→", Color::Cyan, false),
            state.current_phase
        );
        self.run_workflow(state).await
    }

    pub fn status(&self, name: &str) -> Result<WorkflowState, OrchestratorError> {
        Ok(self.store.load_state(name)?)
    }

    pub fn list(&self) -> Result<Vec<WorkflowInfo>, OrchestratorError> {
        Ok(self.store.list_workflows()?)
    }

    /// Delete a workflow's state and worktree.
    pub async fn delete(&self, name: &str) -> Result<(), OrchestratorError> {
        if let Ok(state) = self.store.load_state(name) {
            if let Some(worktree) = &state.worktree_path {
                self.worktrees.delete_worktree(worktree).await?;
            }
        }
        self.store.delete_workflow(name)?;
        Ok(())
    }

    /// Remove worktrees of finished workflows; `all` removes every
    /// workflow's worktree regardless of phase.
    pub async fn clean(&self, all: bool) -> Result<Vec<Utf8PathBuf>, OrchestratorError> {
        let mut removed = Vec::new();
        for info in self.store.list_workflows()? {
            if !all && !info.current_phase.is_terminal() {
                continue;
            }
            let state = self.store.load_state(&info.name)?;
            if let Some(worktree) = &state.worktree_path {
                self.worktrees.delete_worktree(worktree).await?;
                removed.push(worktree.clone());
            }
        }
        Ok(removed)
    }

    async fn run_workflow(
        &self,
        mut state: WorkflowState,
    ) -> Result<WorkflowState, OrchestratorError> {
        loop {
            let phase = state.current_phase;
            let step = match phase {
                Phase::Planning => self.run_planning(&mut state).await,
                Phase::Confirmation => self.run_confirmation(&mut state).await,
                Phase::Implementation => self.run_implementation(&mut state).await,
                Phase::CreatePr => self.run_create_pr(&mut state).await,
                Phase::CiFix => self.run_ci_fix(&mut state).await,
                Phase::Refactoring => self.run_refactoring(&mut state).await,
                Phase::PrSplit => self.run_pr_split(&mut state).await,
                Phase::Completed => {
                    summary::display_summary(&self.store, &self.git, &self.gh, &state).await;
                    return Ok(state);
                }
                Phase::Failed => {
                    let message = state
                        .last_error
                        .as_ref()
                        .map_or_else(|| "unknown failure".to_string(), |e| e.message.clone());
                    return Err(OrchestratorError::PhaseFailed {
                        phase,
                        attempts: 0,
                        message,
                    });
                }
            };

            if let Err(error) = step {
                self.record_failure(&mut state, &error);
                summary::display_failure(&self.store, &state);
                return Err(error);
            }
        }
    }

    fn record_failure(&self, state: &mut WorkflowState, error: &OrchestratorError) {
        let phase = if state.current_phase.is_terminal() {
            Phase::Planning
        } else {
            state.current_phase
        };
        state.fail(WorkflowError {
            phase,
            message: error.to_string(),
            failure_type: failure_type(error),
            recoverable: error.is_recoverable(),
        });
        if let Err(e) = self.store.save_state(state) {
            tracing::error!(error = %e, "failed to persist failure state");
        }
    }

    fn working_dir(&self, state: &WorkflowState) -> Utf8PathBuf {
        state
            .worktree_path
            .clone()
            .unwrap_or_else(|| self.worktrees.repo_dir().to_path_buf())
    }

    /// Base branch for the workflow's PR: the PR's recorded base once one
    /// exists, the main repository's current branch before that.
    async fn base_branch(&self, state: &WorkflowState) -> Result<String, OrchestratorError> {
        if let Some(pr) = state.pr_number {
            let dir = self.working_dir(state);
            return Ok(self.gh.pr_base_branch(&dir, pr).await?);
        }
        Ok(self.git.current_branch(self.worktrees.repo_dir()).await?)
    }

    async fn run_planning(&self, state: &mut WorkflowState) -> Result<(), OrchestratorError> {
        let workflow_type = state.workflow_type;
        let description = state.description.clone();
        let feedback = state.feedback.clone();
        let prompts = self.prompts;
        // Feedback re-roots the conversation, so re-entry after a rejected
        // plan forces a new session.
        let force_new_session = !feedback.is_empty();

        let build = move |_attempt: u32, simplified: bool| {
            if simplified {
                prompts.planning_simplified(workflow_type, &description, &feedback)
            } else {
                prompts.planning(workflow_type, &description, &feedback)
            }
        };
        let validate = |json: &str| -> Result<(), String> {
            serde_json::from_str::<Plan>(json)
                .map(|_| ())
                .map_err(|e| e.to_string())
        };
        let spec = PhaseSpec {
            build_prompt: &build,
            json_schema: Some(schemas::PLAN),
            validate: Some(&validate),
            timeout: self.config.phase_timeout(Phase::Planning),
            max_attempts: self.config.max_attempts,
            working_dir: self.working_dir(state),
            force_new_session,
            env: HashMap::new(),
        };
        let outcome = self.run_agent_phase(state, Phase::Planning, &spec).await?;

        let plan: Plan =
            serde_json::from_str(&outcome.output).map_err(|e| OrchestratorError::OutputParse {
                phase: Phase::Planning,
                reason: e.to_string(),
            })?;
        self.store.save_plan(&state.name, &plan)?;
        self.store.save_plan_markdown(&state.name, &plan.to_markdown())?;

        state.enter_phase(Phase::Confirmation);
        self.store.save_state(state)?;
        Ok(())
    }

    async fn run_confirmation(&self, state: &mut WorkflowState) -> Result<(), OrchestratorError> {
        // The plan is always persisted before the gate is reachable.
        let plan = self.store.load_plan(&state.name)?;
        let callback = self.confirm.clone();
        let confirmation = tokio::task::spawn_blocking(move || callback(&plan))
            .await
            .map_err(|e| OrchestratorError::ConfirmationFailed {
                reason: e.to_string(),
            })?
            .map_err(|reason| OrchestratorError::ConfirmationFailed { reason })?;

        if confirmation.approved {
            state.enter_phase(Phase::Implementation);
            self.store.save_state(state)?;
            return Ok(());
        }

        match confirmation.feedback.filter(|f| !f.is_empty()) {
            Some(feedback) => {
                println!(
                    "{} plan rejected, replanning with feedback",
                    style("→", Color::Cyan, false)
                );
                state.feedback.push(feedback);
                state.enter_phase(Phase::Planning);
                self.store.save_state(state)?;
                Ok(())
            }
            // Denial without feedback is final: no silent re-planning.
            None => Err(OrchestratorError::ConfirmationDenied),
        }
    }

    async fn run_implementation(&self, state: &mut WorkflowState) -> Result<(), OrchestratorError> {
        let plan = self.store.load_plan(&state.name)?;
        let work_stream = plan.work_streams.first().cloned().unwrap_or_default();
        let prompts = self.prompts;

        let plan_for_build = plan.clone();
        let build = move |attempt: u32, simplified: bool| {
            if simplified {
                prompts.implementation_simplified(Some(&plan_for_build), &work_stream, attempt)
            } else {
                prompts.implementation(Some(&plan_for_build))
            }
        };
        let validate = |json: &str| -> Result<(), String> {
            serde_json::from_str::<ImplementationSummary>(json)
                .map(|_| ())
                .map_err(|e| e.to_string())
        };
        let spec = PhaseSpec {
            build_prompt: &build,
            json_schema: Some(schemas::IMPLEMENTATION_SUMMARY),
            validate: Some(&validate),
            timeout: self.config.phase_timeout(Phase::Implementation),
            max_attempts: self.config.max_attempts,
            working_dir: self.working_dir(state),
            force_new_session: false,
            env: HashMap::new(),
        };
        self.run_agent_phase(state, Phase::Implementation, &spec)
            .await?;

        state.enter_phase(Phase::CreatePr);
        self.store.save_state(state)?;
        Ok(())
    }

    async fn run_create_pr(&self, state: &mut WorkflowState) -> Result<(), OrchestratorError> {
        let worktree = self.working_dir(state);

        if state.pr_number.is_none() {
            let branch = self.git.current_branch(&worktree).await?;
            let base_branch = self.base_branch(state).await?;
            let ctx = PrCreationContext {
                workflow_type: state.workflow_type,
                branch,
                base_branch,
                description: state.description.clone(),
            };
            let prompts = self.prompts;
            let build = move |_: u32, _: bool| prompts.create_pr(&ctx);
            let validate = |json: &str| -> Result<(), String> {
                serde_json::from_str::<PrCreationResult>(json)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            };
            let spec = PhaseSpec {
                build_prompt: &build,
                json_schema: Some(schemas::PR_CREATION_RESULT),
                validate: Some(&validate),
                timeout: self.config.phase_timeout(Phase::CreatePr),
                max_attempts: self.config.max_attempts,
                working_dir: worktree.clone(),
                force_new_session: false,
                env: HashMap::new(),
            };
            let outcome = self.run_agent_phase(state, Phase::CreatePr, &spec).await?;
            let result: PrCreationResult = serde_json::from_str(&outcome.output)
                .map_err(|e| OrchestratorError::OutputParse {
                    phase: Phase::CreatePr,
                    reason: e.to_string(),
                })?;
            log_pr_metadata(result.metadata.as_ref());

            // The Agent reports the number; `gh pr list` is the fallback.
            let branch = self.git.current_branch(&worktree).await?;
            let pr_number = match result.pr_number {
                Some(n) => n,
                None => self
                    .gh
                    .pr_list_for_branch(&worktree, &branch)
                    .await?
                    .first()
                    .map(|pr| pr.number)
                    .ok_or_else(|| OrchestratorError::OutputParse {
                        phase: Phase::CreatePr,
                        reason: format!(
                            "agent reported '{}' but no PR found for branch {branch}",
                            result.message
                        ),
                    })?,
            };
            state.pr_number = Some(pr_number);
            println!(
                "{} PR #{pr_number} ready",
                style("→", Color::Cyan, false)
            );

            // Where to go once CI is green.
            let refactoring_done = state
                .phase_state(Phase::Refactoring)
                .is_some_and(|p| p.status == crate::types::PhaseStatus::Completed);
            state.ci_target = Some(
                if state.workflow_type.includes_refactoring() && !refactoring_done {
                    Phase::Refactoring
                } else {
                    Phase::PrSplit
                },
            );
            self.store.save_state(state)?;
        }

        self.run_ci_gate(state).await
    }

    /// Wait for CI on the workflow's PR, then either advance to the
    /// recorded target or route into CI_FIX.
    async fn run_ci_gate(&self, state: &mut WorkflowState) -> Result<(), OrchestratorError> {
        let pr_number = state.pr_number.ok_or_else(|| OrchestratorError::OutputParse {
            phase: state.current_phase,
            reason: "CI gate reached without a PR number".to_string(),
        })?;
        let worktree = self.working_dir(state);
        let monitor = CiMonitor::new(self.gh.clone(), worktree, &self.config.ci);
        let options = CheckCiOptions {
            e2e_ignore_pattern: self.config.ci.e2e_ignore_pattern.clone(),
        };

        let result = monitor
            .wait_for_ci_with_progress(
                pr_number,
                self.config.ci.overall_timeout,
                options,
                &|message| {
                    println!("  {} {message}", style("→", Color::Cyan, false));
                },
            )
            .await?;

        if result.passed {
            return self.advance_from_ci(state).await;
        }

        if state.ci_fix_attempts >= self.config.ci.fix_max_attempts {
            return Err(OrchestratorError::PhaseFailed {
                phase: Phase::CiFix,
                attempts: state.ci_fix_attempts,
                message: format!("CI still failing: {}", result.failed_jobs.join(", ")),
            });
        }

        // Stash the failing jobs as the CI_FIX context.
        self.store
            .save_phase_output(&state.name, Phase::CiFix, &result)?;
        state.enter_phase(Phase::CiFix);
        self.store.save_state(state)?;
        Ok(())
    }

    /// CI is green: move to the recorded target, running the split
    /// decision when the target is PR_SPLIT.
    async fn advance_from_ci(&self, state: &mut WorkflowState) -> Result<(), OrchestratorError> {
        let target = state.ci_target.take().unwrap_or(Phase::PrSplit);
        if target == Phase::Refactoring {
            state.enter_phase(Phase::Refactoring);
            self.store.save_state(state)?;
            return Ok(());
        }

        let worktree = self.working_dir(state);
        let base = self.base_branch(state).await?;
        let metrics = self.git.diff_metrics(&worktree, &base).await?;
        let needs_split = self.config.split.enabled
            && (metrics.total_lines() > self.config.split.max_lines
                || metrics.files_changed > self.config.split.max_files);

        if needs_split {
            println!(
                "{} PR is large ({} files, {} lines), splitting",
                style("→", Color::Cyan, false),
                metrics.files_changed,
                metrics.total_lines()
            );
            state.enter_phase(Phase::PrSplit);
        } else {
            state.enter_phase(Phase::Completed);
        }
        self.store.save_state(state)?;
        Ok(())
    }

    async fn run_ci_fix(&self, state: &mut WorkflowState) -> Result<(), OrchestratorError> {
        state.ci_fix_attempts += 1;
        self.store.save_state(state)?;

        let ci_result: crate::types::CiResult =
            self.store.load_phase_output(&state.name, Phase::CiFix)?;
        let failures = format!(
            "Failed jobs: {}\n\n{}",
            ci_result.failed_jobs.join(", "),
            ci_result.output
        );
        let prompts = self.prompts;
        let build = move |_: u32, _: bool| prompts.fix_ci(&failures);

        let spec = PhaseSpec {
            build_prompt: &build,
            json_schema: None,
            validate: None,
            timeout: self.config.phase_timeout(Phase::CiFix),
            // CI_FIX accumulates attempts across rounds; each round gets
            // the standard per-phase budget on top of what it has used.
            max_attempts: state.attempts(Phase::CiFix) + self.config.max_attempts,
            working_dir: self.working_dir(state),
            force_new_session: false,
            env: HashMap::new(),
        };
        self.run_agent_phase(state, Phase::CiFix, &spec).await?;

        // The fix is pushed; verify CI again from the same gate.
        self.run_ci_gate(state).await
    }

    async fn run_refactoring(&self, state: &mut WorkflowState) -> Result<(), OrchestratorError> {
        let plan = self.store.load_plan(&state.name)?;
        let prompts = self.prompts;
        let plan_for_build = plan.clone();
        let build = move |_: u32, simplified: bool| {
            if simplified {
                prompts.refactoring_simplified(Some(&plan_for_build))
            } else {
                prompts.refactoring(Some(&plan_for_build))
            }
        };
        let validate = |json: &str| -> Result<(), String> {
            serde_json::from_str::<ImplementationSummary>(json)
                .map(|_| ())
                .map_err(|e| e.to_string())
        };
        let spec = PhaseSpec {
            build_prompt: &build,
            json_schema: Some(schemas::IMPLEMENTATION_SUMMARY),
            validate: Some(&validate),
            timeout: self.config.phase_timeout(Phase::Refactoring),
            max_attempts: self.config.max_attempts,
            working_dir: self.working_dir(state),
            force_new_session: false,
            env: HashMap::new(),
        };
        self.run_agent_phase(state, Phase::Refactoring, &spec).await?;

        // Refactoring commits go through the same CI gate before the split
        // decision.
        state.ci_target = Some(Phase::PrSplit);
        self.store.save_state(state)?;
        self.run_ci_gate(state).await
    }

    async fn run_pr_split(&self, state: &mut WorkflowState) -> Result<(), OrchestratorError> {
        let worktree = self.working_dir(state);
        let base = self.base_branch(state).await?;
        let metrics = self.git.diff_metrics(&worktree, &base).await?;
        let commits = self.git.log_range(&worktree, &base).await?;

        let prompts = self.prompts;
        let build = move |_: u32, simplified: bool| {
            if simplified {
                prompts.pr_split_simplified(Some(&metrics), &commits)
            } else {
                prompts.pr_split(Some(&metrics), &commits)
            }
        };
        let validate = |json: &str| -> Result<(), String> {
            serde_json::from_str::<PrSplitPlan>(json)
                .map(|_| ())
                .map_err(|e| e.to_string())
        };
        let spec = PhaseSpec {
            build_prompt: &build,
            json_schema: Some(schemas::PR_SPLIT_PLAN),
            validate: Some(&validate),
            timeout: self.config.phase_timeout(Phase::PrSplit),
            max_attempts: self.config.max_attempts,
            working_dir: worktree,
            force_new_session: false,
            env: HashMap::new(),
        };
        let outcome = self.run_agent_phase(state, Phase::PrSplit, &spec).await?;
        let split_plan: PrSplitPlan = serde_json::from_str(&outcome.output)
            .map_err(|e| OrchestratorError::OutputParse {
                phase: Phase::PrSplit,
                reason: e.to_string(),
            })?;

        let result = split::execute_split_plan(self, state, &split_plan, &base).await?;
        // The result replaces the plan as the phase's structured output.
        self.store
            .save_phase_output(&state.name, Phase::PrSplit, &result)?;

        state.enter_phase(Phase::Completed);
        self.store.save_state(state)?;
        Ok(())
    }

    async fn run_agent_phase(
        &self,
        state: &mut WorkflowState,
        phase: Phase,
        spec: &PhaseSpec<'_>,
    ) -> Result<PhaseOutcome, OrchestratorError> {
        let verbose = self.config.verbose;
        self.phase_runner
            .run(state, phase, spec, &move |event| {
                print_progress(&event, verbose);
            })
            .await
    }

    /// Drive the Agent through a single PR creation outside the phase
    /// runner, used for split children and the parent's fallback path.
    pub(crate) async fn create_pr_via_agent(
        &self,
        state: &WorkflowState,
        branch: &str,
        base_branch: &str,
        description: &str,
    ) -> Result<PrInfo, OrchestratorError> {
        let worktree = self.working_dir(state);
        let ctx = PrCreationContext {
            workflow_type: state.workflow_type,
            branch: branch.to_string(),
            base_branch: base_branch.to_string(),
            description: description.to_string(),
        };
        let config = crate::executor::ExecuteConfig {
            prompt: self.prompts.create_pr(&ctx)?,
            working_directory: worktree.clone(),
            env: HashMap::new(),
            timeout: Some(self.config.pr_creation_timeout),
            json_schema: Some(schemas::PR_CREATION_RESULT.to_string()),
            resume_session_id: state.session_id.clone(),
            force_new_session: false,
            extra_args: Vec::new(),
        };
        let verbose = self.config.verbose;
        let result = self
            .executor
            .execute_streaming(&config, &move |event| print_progress(&event, verbose))
            .await?;
        if let Some(error) = result.error {
            return Err(OrchestratorError::Executor(error));
        }

        let creation: PrCreationResult = crate::executor::extract_last_json(&result.output)
            .and_then(|json| serde_json::from_str(&json).ok())
            .ok_or_else(|| OrchestratorError::OutputParse {
                phase: Phase::PrSplit,
                reason: format!("no PR creation result for branch {branch}"),
            })?;
        log_pr_metadata(creation.metadata.as_ref());

        let prs = self.gh.pr_list_for_branch(&worktree, branch).await?;
        if let Some(pr) = prs.into_iter().next() {
            return Ok(pr);
        }
        // The PR exists per the Agent but the listing lagged; trust the
        // reported number.
        let number = creation.pr_number.ok_or_else(|| OrchestratorError::OutputParse {
            phase: Phase::PrSplit,
            reason: format!("agent reported no PR number for branch {branch}"),
        })?;
        Ok(PrInfo {
            number,
            url: creation.message,
            title: String::new(),
            branch: branch.to_string(),
        })
    }
}

fn failure_type(error: &OrchestratorError) -> FailureType {
    match error {
        OrchestratorError::Ci(_) => FailureType::Ci,
        OrchestratorError::PhaseFailed {
            phase: Phase::CiFix,
            ..
        } => FailureType::Ci,
        OrchestratorError::Executor(ExecutorError::BinaryNotFound { .. })
        | OrchestratorError::Executor(ExecutorError::SpawnFailed { .. }) => {
            FailureType::Environment
        }
        OrchestratorError::Executor(_)
        | OrchestratorError::PhaseFailed { .. }
        | OrchestratorError::OutputParse { .. } => FailureType::Agent,
        OrchestratorError::ConfirmationDenied
        | OrchestratorError::ConfirmationFailed { .. } => FailureType::Semantic,
        OrchestratorError::Cancelled => FailureType::Cancelled,
        _ => FailureType::Environment,
    }
}

fn print_progress(event: &ProgressEvent, verbose: bool) {
    match event {
        ProgressEvent::ToolUse {
            tool_name,
            tool_input,
        } => {
            println!(
                "  {} {tool_name} {tool_input}",
                style("→", Color::Cyan, false)
            );
        }
        ProgressEvent::ToolResult { text, is_error } if *is_error => {
            println!("  {} {text}", style("✗", Color::Red, false));
        }
        ProgressEvent::Text { text } if verbose => {
            if let Some(line) = text.lines().next() {
                println!("  {line}");
            }
        }
        _ => {}
    }
}

fn log_pr_metadata(metadata: Option<&PrMetadata>) {
    let Some(metadata) = metadata else { return };
    if !metadata.issues.is_empty() {
        println!(
            "  {} Applied issue references: {}",
            style("✓", Color::Green, false),
            metadata.issues.join(", ")
        );
    }
    if !metadata.labels.is_empty() {
        println!(
            "  {} Applied labels: {}",
            style("✓", Color::Green, false),
            metadata.labels.join(", ")
        );
    }
    if !metadata.projects.is_empty() {
        println!(
            "  {} Applied to projects: {}",
            style("✓", Color::Green, false),
            metadata.projects.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_type_classification() {
        assert_eq!(
            failure_type(&OrchestratorError::Ci(crate::error::CiError::Timeout {
                timeout_seconds: 600
            })),
            FailureType::Ci
        );
        assert_eq!(
            failure_type(&OrchestratorError::Executor(ExecutorError::Timeout {
                timeout_seconds: 60
            })),
            FailureType::Agent
        );
        assert_eq!(
            failure_type(&OrchestratorError::Executor(ExecutorError::BinaryNotFound {
                detail: "x".to_string()
            })),
            FailureType::Environment
        );
        assert_eq!(
            failure_type(&OrchestratorError::ConfirmationDenied),
            FailureType::Semantic
        );
        assert_eq!(
            failure_type(&OrchestratorError::Cancelled),
            FailureType::Cancelled
        );
    }
}
