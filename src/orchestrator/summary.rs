//! Terminal summaries: the end-of-workflow report and the failure report.

use std::time::Duration;

use crossterm::style::{Attribute, Color, Stylize};

use crate::gh::GhOps;
use crate::git::GitOps;
use crate::logging::use_color;
use crate::state::StateStore;
use crate::types::{
    ImplementationSummary, Phase, PhaseStatus, PrInfo, PrSplitResult, WorkflowState,
};

const HEADER_SEP: &str = "═══════════════════════════════════════════════════";

/// Aggregated data for the final report.
#[derive(Debug, Default)]
pub(crate) struct WorkflowSummary {
    pub workflow_name: String,
    pub files_changed: Vec<String>,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub tests_added: i64,
    pub main_pr: Option<PrInfo>,
    pub child_prs: Vec<PrInfo>,
    pub phases: Vec<PhaseStats>,
    pub total_duration: Duration,
}

#[derive(Debug)]
pub(crate) struct PhaseStats {
    pub name: &'static str,
    pub success: bool,
    pub attempts: u32,
    pub duration: Duration,
}

pub(crate) fn style(text: &str, color: Color, bold: bool) -> String {
    if use_color() {
        let mut styled = text.with(color);
        if bold {
            styled = styled.attribute(Attribute::Bold);
        }
        format!("{styled}")
    } else {
        text.to_string()
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

/// Collect summary data from the state store, falling back to a PR lookup
/// for the current branch when no split result exists.
pub(crate) async fn gather_summary(
    store: &StateStore,
    git: &GitOps,
    gh: &GhOps,
    state: &WorkflowState,
) -> WorkflowSummary {
    let mut summary = WorkflowSummary {
        workflow_name: state.name.clone(),
        ..WorkflowSummary::default()
    };

    if let Ok(impl_summary) =
        store.load_phase_output::<ImplementationSummary>(&state.name, Phase::Implementation)
    {
        summary.files_changed = impl_summary.files_changed;
        summary.lines_added = impl_summary.lines_added;
        summary.lines_removed = impl_summary.lines_removed;
        summary.tests_added = impl_summary.tests_added;
    } else {
        tracing::debug!("no implementation summary recorded");
    }

    for (phase, ps) in &state.phases {
        let duration = match (ps.started_at, ps.completed_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::default(),
        };
        summary.total_duration += duration;
        summary.phases.push(PhaseStats {
            name: phase.as_str(),
            success: ps.status == PhaseStatus::Completed,
            attempts: ps.attempts,
            duration,
        });
    }

    if let Ok(split) = store.load_phase_output::<PrSplitResult>(&state.name, Phase::PrSplit) {
        summary.main_pr = Some(split.parent_pr);
        summary.child_prs = split.child_prs;
        return summary;
    }

    // Single-PR workflows: look the PR up from the worktree branch.
    if let Some(worktree) = &state.worktree_path {
        if let Ok(branch) = git.current_branch(worktree).await {
            match gh.pr_list_for_branch(worktree, &branch).await {
                Ok(prs) => summary.main_pr = prs.into_iter().next(),
                Err(e) => tracing::debug!(error = %e, "could not look up PR for summary"),
            }
        }
    }

    summary
}

pub(crate) fn format_summary(summary: &WorkflowSummary) -> String {
    let mut b = String::new();
    b.push_str(HEADER_SEP);
    b.push('\n');
    b.push_str(&style("Workflow Summary: ", Color::Reset, true));
    b.push_str(&summary.workflow_name);
    b.push('\n');
    b.push_str(HEADER_SEP);
    b.push_str("\n\n");

    if let Some(pr) = &summary.main_pr {
        b.push_str(&style("Pull Requests:", Color::Reset, true));
        b.push('\n');
        b.push_str(&format!(
            "  Main PR: {} - {}\n",
            style(&format!("#{}", pr.number), Color::Cyan, false),
            pr.title
        ));
        b.push_str(&format!(
            "          {}\n",
            style(&pr.url, Color::Cyan, false)
        ));
        if !summary.child_prs.is_empty() {
            b.push_str("\n  Child PRs:\n");
            for child in &summary.child_prs {
                b.push_str(&format!(
                    "    • {} - {}\n",
                    style(&format!("#{}", child.number), Color::Cyan, false),
                    child.title
                ));
                b.push_str(&format!(
                    "      {}\n",
                    style(&child.url, Color::Cyan, false)
                ));
            }
        }
        b.push('\n');
    }

    let has_stats = !summary.files_changed.is_empty()
        || summary.lines_added != 0
        || summary.lines_removed != 0
        || summary.tests_added != 0;
    if has_stats {
        b.push_str(&style("Implementation Stats:", Color::Reset, true));
        b.push('\n');
        b.push_str(&format!(
            "  Files Changed: {}\n",
            style(&summary.files_changed.len().to_string(), Color::Green, false)
        ));
        b.push_str(&format!(
            "  Lines Added:   {}\n",
            style(&format!("+{}", summary.lines_added), Color::Green, false)
        ));
        b.push_str(&format!("  Lines Removed: -{}\n", summary.lines_removed));
        b.push_str(&format!(
            "  Tests Added:   {}\n",
            style(&summary.tests_added.to_string(), Color::Green, false)
        ));
        b.push('\n');
    }

    if !summary.phases.is_empty() {
        b.push_str(&style("Phase Execution:", Color::Reset, true));
        b.push('\n');
        for phase in &summary.phases {
            let icon = if phase.success {
                style("✓", Color::Green, false)
            } else {
                style("✗", Color::Red, false)
            };
            let attempts = if phase.attempts == 1 {
                "1 attempt".to_string()
            } else {
                format!("{} attempts", phase.attempts)
            };
            b.push_str(&format!(
                "  {} {:<16} {} ({})\n",
                icon,
                phase.name,
                style(&format_duration(phase.duration), Color::Yellow, false),
                attempts
            ));
        }
        b.push('\n');
    }

    b.push_str(&style("Total Duration: ", Color::Reset, true));
    b.push_str(&style(
        &format_duration(summary.total_duration),
        Color::Yellow,
        false,
    ));
    b.push('\n');
    b
}

/// Print the end-of-workflow summary.
pub(crate) async fn display_summary(
    store: &StateStore,
    git: &GitOps,
    gh: &GhOps,
    state: &WorkflowState,
) {
    let summary = gather_summary(store, git, gh, state).await;
    println!("\n{}", format_summary(&summary));
}

/// Print the failure report: phase, attempts, last error, and where the
/// transcript and prompt for the failing attempt live.
pub(crate) fn display_failure(store: &StateStore, state: &WorkflowState) {
    let Some(error) = &state.last_error else {
        return;
    };
    let attempts = state.attempts(error.phase);

    eprintln!();
    eprintln!(
        "{} workflow '{}' failed in {}",
        style("✗", Color::Red, true),
        state.name,
        error.phase
    );
    eprintln!("  Attempts: {attempts}");
    eprintln!("  Error:    {}", error.message);
    eprintln!(
        "  Recoverable: {} (resume with: claude-workflow resume {})",
        error.recoverable, state.name
    );
    let raw = store.raw_output_path(&state.name, error.phase);
    if raw.exists() {
        eprintln!("  Transcript: {raw}");
    }
    let prompt = store.prompt_path(&state.name, error.phase, attempts.max(1));
    if prompt.exists() {
        eprintln!("  Prompt:     {prompt}");
    }
}
