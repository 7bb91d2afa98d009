//! CLI argument definitions.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::types::WorkflowType;

/// claude-workflow - drive the Claude CLI from request to merge-ready PR
#[derive(Parser)]
#[command(name = "claude-workflow")]
#[command(about = "Orchestrates an AI coding agent through plan, implement, PR, and CI phases")]
#[command(long_about = r#"
claude-workflow drives the Claude CLI through a fixed pipeline: it plans the
change, asks you to confirm the plan, implements it on an isolated git
worktree, opens a pull request, watches CI (fixing failures when it can),
refactors, and splits oversized PRs into reviewable pieces.

EXAMPLES:
  # Start a feature workflow
  claude-workflow start add-sub "Add Subtract(a, b int) returning a-b" --type feature

  # See all workflows and their phases
  claude-workflow list

  # Resume after a crash or CI failure
  claude-workflow resume add-sub

  # Remove a workflow's state and worktree
  claude-workflow delete add-sub --force

State lives under .claude/workflow/<name>/ and survives process exits; any
phase can be resumed.
"#)]
#[command(version)]
pub struct Cli {
    /// Base directory for workflow state
    #[arg(long, global = true, default_value = ".claude/workflow")]
    pub base_dir: Utf8PathBuf,

    /// Path to the main git repository
    #[arg(long, global = true, default_value = ".")]
    pub repo: Utf8PathBuf,

    /// Path to the claude binary (PATH lookup by default)
    #[arg(long, global = true)]
    pub claude_path: Option<String>,

    /// Pass --dangerously-skip-permissions to the agent
    #[arg(long, global = true)]
    pub dangerously_skip_permissions: bool,

    /// PR split threshold: total changed lines
    #[arg(long, global = true, default_value_t = 100)]
    pub max_lines: usize,

    /// PR split threshold: changed files
    #[arg(long, global = true, default_value_t = 10)]
    pub max_files: usize,

    /// Disable PR splitting entirely
    #[arg(long, global = true)]
    pub no_split: bool,

    /// Planning phase timeout in seconds
    #[arg(long, global = true, default_value_t = 3600)]
    pub timeout_planning: u64,

    /// Implementation phase timeout in seconds
    #[arg(long, global = true, default_value_t = 21600)]
    pub timeout_implementation: u64,

    /// Refactoring phase timeout in seconds
    #[arg(long, global = true, default_value_t = 21600)]
    pub timeout_refactoring: u64,

    /// PR split phase timeout in seconds
    #[arg(long, global = true, default_value_t = 3600)]
    pub timeout_pr_split: u64,

    /// Overall CI wait budget in seconds
    #[arg(long, global = true, default_value_t = 600)]
    pub ci_timeout: u64,

    /// Regex over failed CI job names to treat as non-blocking
    #[arg(long, global = true)]
    pub e2e_ignore_pattern: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new workflow
    Start {
        /// Workflow name (also the branch and worktree name)
        name: String,

        /// Natural-language description of the change
        description: String,

        /// Kind of change
        #[arg(long = "type", default_value = "feature")]
        workflow_type: WorkflowType,
    },

    /// List workflows and their current phases
    List,

    /// Show the full state of one workflow
    Status {
        /// Workflow name
        name: String,
    },

    /// Resume a suspended or recoverably failed workflow
    Resume {
        /// Workflow name
        name: String,
    },

    /// Delete a workflow's state and worktree
    Delete {
        /// Workflow name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Remove worktrees of finished workflows
    Clean {
        /// Remove every workflow's worktree, finished or not
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn start_parses_type_flag() {
        let cli = Cli::try_parse_from([
            "claude-workflow",
            "start",
            "add-sub",
            "Add subtract",
            "--type",
            "fix",
        ])
        .unwrap();
        match cli.command {
            Commands::Start {
                name,
                description,
                workflow_type,
            } => {
                assert_eq!(name, "add-sub");
                assert_eq!(description, "Add subtract");
                assert_eq!(workflow_type, WorkflowType::Fix);
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn defaults_match_documented_thresholds() {
        let cli = Cli::try_parse_from(["claude-workflow", "list"]).unwrap();
        assert_eq!(cli.max_lines, 100);
        assert_eq!(cli.max_files, 10);
        assert_eq!(cli.base_dir, Utf8PathBuf::from(".claude/workflow"));
    }

    #[test]
    fn bad_type_is_rejected() {
        let result = Cli::try_parse_from([
            "claude-workflow",
            "start",
            "x",
            "d",
            "--type",
            "bogus",
        ]);
        assert!(result.is_err());
    }
}
