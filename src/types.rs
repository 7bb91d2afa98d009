//! Shared data model for workflows, plans, PRs, and agent progress events.
//!
//! Everything here is serialized with camelCase field names so the on-disk
//! JSON matches what earlier versions of the tool wrote.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of change a workflow drives end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    Feature,
    Fix,
    Refactor,
}

impl WorkflowType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Fix => "fix",
            Self::Refactor => "refactor",
        }
    }

    /// Fix workflows skip the refactoring pass.
    #[must_use]
    pub const fn includes_refactoring(&self) -> bool {
        !matches!(self, Self::Fix)
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feature" => Ok(Self::Feature),
            "fix" => Ok(Self::Fix),
            "refactor" => Ok(Self::Refactor),
            other => Err(format!(
                "unknown workflow type '{other}' (expected feature, fix, or refactor)"
            )),
        }
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named steps of the pipeline. Ordering matters: it is the canonical
/// progression order and drives summary display.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Planning,
    Confirmation,
    Implementation,
    CreatePr,
    CiFix,
    Refactoring,
    PrSplit,
    Completed,
    Failed,
}

impl Phase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PLANNING",
            Self::Confirmation => "CONFIRMATION",
            Self::Implementation => "IMPLEMENTATION",
            Self::CreatePr => "CREATE_PR",
            Self::CiFix => "CI_FIX",
            Self::Refactoring => "REFACTORING",
            Self::PrSplit => "PR_SPLIT",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Terminal phases carry no in-progress work.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Per-phase bookkeeping persisted in `state.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    pub status: PhaseStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Broad classification of a workflow failure, used to decide whether
/// `resume` can pick the workflow back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Agent,
    Ci,
    Environment,
    Semantic,
    Cancelled,
}

/// Last recorded failure for a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowError {
    pub phase: Phase,
    pub message: String,
    pub failure_type: FailureType,
    pub recoverable: bool,
}

/// Durable state of one workflow. Unknown fields from newer versions are
/// preserved across load/save via the flattened `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub name: String,
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub current_phase: Phase,
    #[serde(default)]
    pub phases: BTreeMap<Phase, PhaseState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_reuse_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub ci_fix_attempts: u32,
    /// Phase to advance to once CI passes; set while a CI gate is active so
    /// a resumed CI_FIX knows where to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_target: Option<Phase>,
    /// Accumulated reviewer feedback from rejected confirmations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedback: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<WorkflowError>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl WorkflowState {
    #[must_use]
    pub fn new(name: &str, description: &str, workflow_type: WorkflowType) -> Self {
        let mut state = Self {
            name: name.to_string(),
            workflow_type,
            description: description.to_string(),
            created_at: Utc::now(),
            current_phase: Phase::Planning,
            phases: BTreeMap::new(),
            worktree_path: None,
            session_id: None,
            session_created_at: None,
            session_reuse_count: 0,
            pr_number: None,
            ci_fix_attempts: 0,
            ci_target: None,
            feedback: Vec::new(),
            last_error: None,
            extra: BTreeMap::new(),
        };
        state.phase_mut(Phase::Planning).status = PhaseStatus::InProgress;
        state.phase_mut(Phase::Planning).started_at = Some(Utc::now());
        state
    }

    /// Mutable access to a phase's bookkeeping, creating it on first touch.
    pub fn phase_mut(&mut self, phase: Phase) -> &mut PhaseState {
        self.phases.entry(phase).or_default()
    }

    #[must_use]
    pub fn phase_state(&self, phase: Phase) -> Option<&PhaseState> {
        self.phases.get(&phase)
    }

    #[must_use]
    pub fn attempts(&self, phase: Phase) -> u32 {
        self.phases.get(&phase).map_or(0, |p| p.attempts)
    }

    /// Marks `phase` in progress, clearing any other in-progress marker so
    /// the single-in-progress invariant holds at every save point.
    pub fn enter_phase(&mut self, phase: Phase) {
        for (_, ps) in self.phases.iter_mut() {
            if ps.status == PhaseStatus::InProgress {
                ps.status = PhaseStatus::Completed;
                ps.completed_at = Some(Utc::now());
            }
        }
        self.current_phase = phase;
        if !phase.is_terminal() {
            let ps = self.phase_mut(phase);
            ps.status = PhaseStatus::InProgress;
            if ps.started_at.is_none() {
                ps.started_at = Some(Utc::now());
            }
        }
    }

    pub fn complete_phase(&mut self, phase: Phase) {
        let ps = self.phase_mut(phase);
        ps.status = PhaseStatus::Completed;
        ps.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: WorkflowError) {
        let ps = self.phase_mut(error.phase);
        ps.status = PhaseStatus::Failed;
        ps.completed_at = Some(Utc::now());
        ps.last_error = Some(error.message.clone());
        self.last_error = Some(error);
        self.current_phase = Phase::Failed;
    }

    /// Invariant check: exactly one phase is in progress, or the workflow is
    /// in a terminal phase.
    pub fn validate(&self) -> Result<(), String> {
        let in_progress = self
            .phases
            .values()
            .filter(|p| p.status == PhaseStatus::InProgress)
            .count();
        if self.current_phase.is_terminal() {
            if in_progress != 0 {
                return Err(format!(
                    "terminal workflow has {in_progress} phase(s) still in progress"
                ));
            }
            return Ok(());
        }
        if in_progress != 1 {
            return Err(format!(
                "expected exactly one in-progress phase, found {in_progress}"
            ));
        }
        Ok(())
    }
}

/// One row of `claude-workflow list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub current_phase: Phase,
    pub created_at: DateTime<Utc>,
}

/// Implementation plan produced by the PLANNING phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub summary: String,
    #[serde(default)]
    pub context_type: String,
    pub architecture: Architecture,
    #[serde(default)]
    pub phases: Vec<PlanPhase>,
    #[serde(default)]
    pub work_streams: Vec<WorkStream>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub complexity: String,
    #[serde(default)]
    pub estimated_total_lines: i64,
    #[serde(default)]
    pub estimated_total_files: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Architecture {
    pub overview: String,
    #[serde(default)]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPhase {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub estimated_files: i64,
    #[serde(default)]
    pub estimated_lines: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkStream {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Plan {
    /// Renders the plan as markdown for `plan.md` and the confirmation gate.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Plan: {}\n\n", self.summary));
        out.push_str(&format!("Complexity: {}\n\n", self.complexity));
        out.push_str("## Architecture\n\n");
        out.push_str(&self.architecture.overview);
        out.push('\n');
        for component in &self.architecture.components {
            out.push_str(&format!("- {component}\n"));
        }
        if !self.phases.is_empty() {
            out.push_str("\n## Phases\n\n");
            for phase in &self.phases {
                out.push_str(&format!(
                    "- **{}**: {} (~{} files, ~{} lines)\n",
                    phase.name, phase.description, phase.estimated_files, phase.estimated_lines
                ));
            }
        }
        if !self.work_streams.is_empty() {
            out.push_str("\n## Work Streams\n\n");
            for ws in &self.work_streams {
                out.push_str(&format!("### {}\n", ws.name));
                if !ws.depends_on.is_empty() {
                    out.push_str(&format!("Depends on: {}\n", ws.depends_on.join(", ")));
                }
                for task in &ws.tasks {
                    out.push_str(&format!("- [ ] {task}\n"));
                }
                out.push('\n');
            }
        }
        if !self.risks.is_empty() {
            out.push_str("\n## Risks\n\n");
            for risk in &self.risks {
                out.push_str(&format!("- {risk}\n"));
            }
        }
        out.push_str(&format!(
            "\nEstimated total: ~{} lines across ~{} files\n",
            self.estimated_total_lines, self.estimated_total_files
        ));
        out
    }
}

/// Structured result of an IMPLEMENTATION or REFACTORING phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationSummary {
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub lines_added: i64,
    #[serde(default)]
    pub lines_removed: i64,
    #[serde(default)]
    pub tests_added: i64,
    pub summary: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// Identity of a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrInfo {
    pub number: u64,
    pub url: String,
    pub title: String,
    pub branch: String,
}

/// Size of a PR relative to its base branch, input to the split decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrMetrics {
    pub commits: usize,
    pub files_changed: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
}

impl PrMetrics {
    #[must_use]
    pub const fn total_lines(&self) -> usize {
        self.lines_added + self.lines_removed
    }
}

/// One commit in the worktree branch history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub hash: String,
    pub subject: String,
}

/// How a large PR should be partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SplitStrategy {
    ByCommits,
    ByFiles,
}

/// One child PR in a split plan. Exactly one of `commits`/`files` is
/// populated depending on the strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildPrSpec {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Agent-produced plan for splitting an oversized PR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrSplitPlan {
    pub strategy: SplitStrategy,
    pub parent_title: String,
    #[serde(default)]
    pub parent_description: String,
    pub child_prs: Vec<ChildPrSpec>,
    #[serde(default)]
    pub summary: String,
}

/// Outcome of executing a split plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrSplitResult {
    pub parent_pr: PrInfo,
    pub child_prs: Vec<PrInfo>,
    pub summary: String,
    pub branch_names: Vec<String>,
}

/// Overall CI verdict for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiStatus {
    Success,
    Failure,
    Pending,
}

impl CiStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Pending => "pending",
        }
    }
}

/// Result of one CI status check, after the ignore filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiResult {
    pub passed: bool,
    pub status: CiStatus,
    pub failed_jobs: Vec<String>,
    pub output: String,
}

/// Live progress decoded from the Agent's stream-json output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    ToolUse { tool_name: String, tool_input: String },
    ToolResult { text: String, is_error: bool },
    Text { text: String },
    Thinking { text: String },
}

/// GitHub metadata the Agent extracted from the request for PR creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrMetadata {
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrCreationStatus {
    Created,
    Exists,
    Skipped,
    Failed,
}

/// Agent's structured answer to the CREATE_PR prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrCreationResult {
    #[serde(default)]
    pub pr_number: Option<u64>,
    pub status: PrCreationStatus,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<PrMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&Phase::CreatePr).unwrap(),
            r#""CREATE_PR""#
        );
        assert_eq!(serde_json::to_string(&Phase::CiFix).unwrap(), r#""CI_FIX""#);
        assert_eq!(
            serde_json::to_string(&Phase::PrSplit).unwrap(),
            r#""PR_SPLIT""#
        );
    }

    #[test]
    fn workflow_type_round_trips() {
        for (s, t) in [
            ("feature", WorkflowType::Feature),
            ("fix", WorkflowType::Fix),
            ("refactor", WorkflowType::Refactor),
        ] {
            assert_eq!(s.parse::<WorkflowType>().unwrap(), t);
            assert_eq!(t.as_str(), s);
        }
        assert!("bogus".parse::<WorkflowType>().is_err());
    }

    #[test]
    fn new_state_has_planning_in_progress() {
        let state = WorkflowState::new("demo", "add a thing", WorkflowType::Feature);
        assert_eq!(state.current_phase, Phase::Planning);
        assert_eq!(
            state.phase_state(Phase::Planning).unwrap().status,
            PhaseStatus::InProgress
        );
        state.validate().unwrap();
    }

    #[test]
    fn enter_phase_keeps_single_in_progress() {
        let mut state = WorkflowState::new("demo", "d", WorkflowType::Feature);
        state.enter_phase(Phase::Confirmation);
        state.validate().unwrap();
        state.enter_phase(Phase::Implementation);
        state.validate().unwrap();
        assert_eq!(
            state.phase_state(Phase::Planning).unwrap().status,
            PhaseStatus::Completed
        );
    }

    #[test]
    fn fail_moves_to_terminal_phase() {
        let mut state = WorkflowState::new("demo", "d", WorkflowType::Fix);
        state.fail(WorkflowError {
            phase: Phase::Planning,
            message: "boom".to_string(),
            failure_type: FailureType::Agent,
            recoverable: true,
        });
        assert_eq!(state.current_phase, Phase::Failed);
        state.validate().unwrap();
    }

    #[test]
    fn state_preserves_unknown_fields() {
        let json = r#"{
            "name": "x",
            "type": "feature",
            "description": "d",
            "createdAt": "2025-01-01T00:00:00Z",
            "currentPhase": "PLANNING",
            "futureField": {"nested": true}
        }"#;
        let state: WorkflowState = serde_json::from_str(json).unwrap();
        assert!(state.extra.contains_key("futureField"));
        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["futureField"]["nested"], serde_json::json!(true));
    }

    #[test]
    fn progress_event_wire_shape() {
        let event = ProgressEvent::ToolUse {
            tool_name: "Read".to_string(),
            tool_input: "/tmp/x.rs".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["toolName"], "Read");
    }

    #[test]
    fn plan_markdown_lists_work_streams() {
        let plan = Plan {
            summary: "Add subtract".to_string(),
            context_type: "library".to_string(),
            architecture: Architecture {
                overview: "One new function".to_string(),
                components: vec!["calc".to_string()],
            },
            phases: vec![],
            work_streams: vec![WorkStream {
                name: "core".to_string(),
                tasks: vec!["write Subtract".to_string()],
                depends_on: vec![],
            }],
            risks: vec!["none".to_string()],
            complexity: "small".to_string(),
            estimated_total_lines: 10,
            estimated_total_files: 2,
        };
        let md = plan.to_markdown();
        assert!(md.contains("# Plan: Add subtract"));
        assert!(md.contains("- [ ] write Subtract"));
        assert!(md.contains("~10 lines"));
    }
}
