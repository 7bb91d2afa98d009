//! Runtime configuration for the orchestrator.
//!
//! All knobs come from the CLI layer (or library callers); there is no
//! config-file discovery. Defaults follow the phase timeout and split
//! threshold conventions of the original tool.

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::types::Phase;

/// CI monitoring knobs.
#[derive(Debug, Clone)]
pub struct CiConfig {
    /// Quiet period before the first poll so CI jobs can register.
    pub initial_delay: Duration,
    /// Interval between polls.
    pub check_interval: Duration,
    /// Timeout for a single `gh pr checks` invocation, isolated from the
    /// overall budget so a hung gh does not consume it.
    pub command_timeout: Duration,
    /// Overall budget for one CI wait.
    pub overall_timeout: Duration,
    /// Regex over failed-job names whose matches are non-blocking.
    pub e2e_ignore_pattern: Option<String>,
    /// How many CI_FIX rounds to attempt before failing the workflow.
    pub fix_max_attempts: u32,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(60),
            check_interval: Duration::from_secs(30),
            command_timeout: Duration::from_secs(120),
            overall_timeout: Duration::from_secs(600),
            e2e_ignore_pattern: None,
            fix_max_attempts: 3,
        }
    }
}

/// PR split thresholds.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub enabled: bool,
    /// Split when added + removed lines exceed this.
    pub max_lines: usize,
    /// Split when changed files exceed this.
    pub max_files: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_lines: 100,
            max_files: 10,
        }
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// State store base directory.
    pub base_dir: Utf8PathBuf,
    /// Main repository the worktrees hang off.
    pub repo_dir: Utf8PathBuf,
    /// Explicit path to the claude binary; PATH lookup otherwise.
    pub claude_path: Option<String>,
    pub dangerously_skip_permissions: bool,
    pub planning_timeout: Duration,
    pub implementation_timeout: Duration,
    pub refactoring_timeout: Duration,
    pub pr_split_timeout: Duration,
    /// Budget for one PR creation attempt.
    pub pr_creation_timeout: Duration,
    /// Per-phase attempt budget.
    pub max_attempts: u32,
    pub ci: CiConfig,
    pub split: SplitConfig,
    pub verbose: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            base_dir: Utf8PathBuf::from(".claude/workflow"),
            repo_dir: Utf8PathBuf::from("."),
            claude_path: None,
            dangerously_skip_permissions: false,
            planning_timeout: Duration::from_secs(60 * 60),
            implementation_timeout: Duration::from_secs(6 * 60 * 60),
            refactoring_timeout: Duration::from_secs(6 * 60 * 60),
            pr_split_timeout: Duration::from_secs(60 * 60),
            pr_creation_timeout: Duration::from_secs(10 * 60),
            max_attempts: 3,
            ci: CiConfig::default(),
            split: SplitConfig::default(),
            verbose: false,
        }
    }
}

impl WorkflowConfig {
    /// Timeout budget for one attempt of the given phase.
    #[must_use]
    pub fn phase_timeout(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Planning | Phase::Confirmation => self.planning_timeout,
            Phase::Implementation | Phase::CiFix => self.implementation_timeout,
            Phase::Refactoring => self.refactoring_timeout,
            Phase::PrSplit => self.pr_split_timeout,
            Phase::CreatePr => self.pr_creation_timeout,
            Phase::Completed | Phase::Failed => Duration::from_secs(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let config = WorkflowConfig::default();
        assert_eq!(config.planning_timeout, Duration::from_secs(3600));
        assert_eq!(config.implementation_timeout, Duration::from_secs(21600));
        assert_eq!(config.ci.initial_delay, Duration::from_secs(60));
        assert_eq!(config.ci.check_interval, Duration::from_secs(30));
        assert_eq!(config.ci.command_timeout, Duration::from_secs(120));
        assert_eq!(config.split.max_lines, 100);
        assert_eq!(config.split.max_files, 10);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn phase_timeout_dispatch() {
        let config = WorkflowConfig::default();
        assert_eq!(
            config.phase_timeout(Phase::Refactoring),
            config.refactoring_timeout
        );
        assert_eq!(
            config.phase_timeout(Phase::CreatePr),
            config.pr_creation_timeout
        );
    }
}
