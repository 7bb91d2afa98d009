//! Execution of a PR split plan.
//!
//! The orchestrator owns the branch surgery: a parent branch holding an
//! empty commit targets the original base, and each child branch is built
//! from the parent by cherry-picking commits or checking out file groups
//! from the workflow branch. The parent PR is created directly through
//! `gh`; child PRs go through the Agent so their descriptions match the
//! actual diff.

use crossterm::style::Color;

use crate::error::OrchestratorError;
use crate::types::{PrInfo, PrSplitPlan, PrSplitResult, SplitStrategy, WorkflowState};

use super::summary::style;
use super::Orchestrator;

pub(crate) async fn execute_split_plan(
    orch: &Orchestrator,
    state: &WorkflowState,
    plan: &PrSplitPlan,
    base_branch: &str,
) -> Result<PrSplitResult, OrchestratorError> {
    let worktree = orch.working_dir(state);
    let source_branch = orch.git.current_branch(&worktree).await?;

    let parent_branch = format!("{}-parent", state.name);
    orch.git
        .checkout_new_branch(&worktree, &parent_branch, base_branch)
        .await?;
    orch.git
        .commit_empty(&worktree, &format!("chore: parent PR for {}", state.name))
        .await?;
    orch.git.push(&worktree, &parent_branch).await?;

    let parent_url = orch
        .gh
        .pr_create(
            &worktree,
            &plan.parent_title,
            &plan.parent_description,
            &parent_branch,
            base_branch,
        )
        .await?;
    let parent_pr = match orch
        .gh
        .pr_list_for_branch(&worktree, &parent_branch)
        .await?
        .into_iter()
        .next()
    {
        Some(pr) => pr,
        None => PrInfo {
            number: pr_number_from_url(&parent_url).unwrap_or_default(),
            url: parent_url,
            title: plan.parent_title.clone(),
            branch: parent_branch.clone(),
        },
    };
    println!(
        "  {} parent PR #{} on {}",
        style("✓", Color::Green, false),
        parent_pr.number,
        parent_branch
    );

    let mut branch_names = vec![parent_branch.clone()];
    let mut child_prs = Vec::new();

    for (index, child) in plan.child_prs.iter().enumerate() {
        let child_branch = format!("{}-part-{}", state.name, index + 1);
        orch.git
            .checkout_new_branch(&worktree, &child_branch, &parent_branch)
            .await?;

        match plan.strategy {
            SplitStrategy::ByCommits => {
                for commit in &child.commits {
                    orch.git.cherry_pick(&worktree, commit).await?;
                }
            }
            SplitStrategy::ByFiles => {
                orch.git
                    .checkout_files(&worktree, &source_branch, &child.files)
                    .await?;
                orch.git.commit_all(&worktree, &child.title).await?;
            }
        }

        orch.git.push(&worktree, &child_branch).await?;
        let pr = orch
            .create_pr_via_agent(state, &child_branch, &parent_branch, &child.description)
            .await?;
        println!(
            "  {} child PR #{} on {}",
            style("✓", Color::Green, false),
            pr.number,
            child_branch
        );
        child_prs.push(pr);
        branch_names.push(child_branch);
    }

    // Leave the worktree back on the workflow branch.
    orch.git.checkout(&worktree, &source_branch).await?;

    Ok(PrSplitResult {
        parent_pr,
        child_prs,
        summary: plan.summary.clone(),
        branch_names,
    })
}

/// Trailing number of a GitHub PR URL.
fn pr_number_from_url(url: &str) -> Option<u64> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|tail| tail.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pr_number_from_url() {
        assert_eq!(
            pr_number_from_url("https://github.com/o/r/pull/42"),
            Some(42)
        );
        assert_eq!(
            pr_number_from_url("https://github.com/o/r/pull/42/"),
            Some(42)
        );
        assert_eq!(pr_number_from_url("https://github.com/o/r"), None);
    }
}
