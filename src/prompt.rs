//! Prompt construction for every phase.
//!
//! The builder is a pure function over its inputs. Simplified variants
//! exist for late retry attempts: long prompts degrade agent quality, so
//! the slow-growing collections (work-stream tasks, commit lists) are
//! trimmed to a fixed tail.

use crate::error::PromptError;
use crate::types::{Commit, Plan, PrMetrics, WorkflowType, WorkStream};

/// Work-stream tasks kept in simplified prompts.
const TASKS_TO_KEEP: usize = 5;
/// Tighter task tail once past the second attempt.
const TASKS_TO_KEEP_LATE: usize = 3;
/// Commits kept in simplified PR-split prompts.
const COMMITS_TO_KEEP: usize = 10;

/// JSON schemas handed to the Agent alongside prompts.
pub mod schemas {
    /// Schema for the PLANNING phase output.
    pub const PLAN: &str = r#"{
    "type": "object",
    "properties": {
        "summary": {"type": "string"},
        "contextType": {"type": "string"},
        "architecture": {
            "type": "object",
            "properties": {
                "overview": {"type": "string"},
                "components": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["overview"]
        },
        "phases": {
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "estimatedFiles": {"type": "integer"},
                    "estimatedLines": {"type": "integer"}
                },
                "required": ["name", "description"]
            }
        },
        "workStreams": {
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "tasks": {"type": "array", "items": {"type": "string"}},
                    "dependsOn": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["name"]
            }
        },
        "risks": {"type": "array", "items": {"type": "string"}},
        "complexity": {"type": "string", "enum": ["small", "medium", "large"]},
        "estimatedTotalLines": {"type": "integer"},
        "estimatedTotalFiles": {"type": "integer"}
    },
    "required": ["summary", "architecture", "complexity"]
}"#;

    /// Schema for IMPLEMENTATION and REFACTORING phase output.
    pub const IMPLEMENTATION_SUMMARY: &str = r#"{
    "type": "object",
    "properties": {
        "filesChanged": {"type": "array", "items": {"type": "string"}},
        "linesAdded": {"type": "integer"},
        "linesRemoved": {"type": "integer"},
        "testsAdded": {"type": "integer"},
        "summary": {"type": "string"},
        "nextSteps": {"type": "array", "items": {"type": "string"}}
    },
    "required": ["summary"]
}"#;

    /// Schema for the Agent's PR creation answer.
    pub const PR_CREATION_RESULT: &str = r#"{
    "type": "object",
    "properties": {
        "prNumber": {"type": "integer", "description": "The PR number if created or found"},
        "status": {"type": "string", "enum": ["created", "exists", "skipped", "failed"], "description": "The result status"},
        "message": {"type": "string", "description": "A message explaining the result"},
        "metadata": {
            "type": "object",
            "description": "Optional GitHub metadata extracted from user prompts",
            "properties": {
                "issues": {"type": "array", "items": {"type": "string"}},
                "labels": {"type": "array", "items": {"type": "string"}},
                "projects": {"type": "array", "items": {"type": "string"}}
            }
        }
    },
    "required": ["status", "message"]
}"#;

    /// Schema for the PR_SPLIT plan.
    pub const PR_SPLIT_PLAN: &str = r#"{
    "type": "object",
    "properties": {
        "strategy": {"type": "string", "enum": ["byCommits", "byFiles"]},
        "parentTitle": {"type": "string"},
        "parentDescription": {"type": "string"},
        "childPrs": {
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "commits": {"type": "array", "items": {"type": "string"}},
                    "files": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["title", "description"]
            }
        },
        "summary": {"type": "string"}
    },
    "required": ["strategy", "parentTitle", "childPrs"]
}"#;
}

/// Context for a CREATE_PR prompt.
#[derive(Debug, Clone)]
pub struct PrCreationContext {
    pub workflow_type: WorkflowType,
    pub branch: String,
    pub base_branch: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn planning(
        &self,
        workflow_type: WorkflowType,
        description: &str,
        feedback: &[String],
    ) -> Result<String, PromptError> {
        if description.is_empty() {
            return Err(PromptError::EmptyField {
                what: "description",
            });
        }
        let mut prompt = format!(
            "You are planning a {workflow_type} change.\n\n\
             Request:\n{description}\n\n\
             Produce an implementation plan as JSON matching the provided schema. \
             Include an architecture overview, concrete phases with file and line \
             estimates, independent work streams with task lists, risks, and an \
             overall complexity rating (small, medium, or large).\n\
             Do not write any code yet."
        );
        if !feedback.is_empty() {
            prompt.push_str("\n\nReviewer feedback on previous plans, address every point:\n");
            for item in feedback {
                prompt.push_str(&format!("- {item}\n"));
            }
        }
        Ok(prompt)
    }

    /// Shorter planning prompt for late attempts: the request and the last
    /// round of feedback only.
    pub fn planning_simplified(
        &self,
        workflow_type: WorkflowType,
        description: &str,
        feedback: &[String],
    ) -> Result<String, PromptError> {
        if description.is_empty() {
            return Err(PromptError::EmptyField {
                what: "description",
            });
        }
        let mut prompt = format!(
            "Plan a {workflow_type} change for this request and answer with JSON \
             matching the schema:\n{description}\n"
        );
        if let Some(last) = feedback.last() {
            prompt.push_str(&format!("\nMost recent reviewer feedback:\n- {last}\n"));
        }
        Ok(prompt)
    }

    pub fn implementation(&self, plan: Option<&Plan>) -> Result<String, PromptError> {
        let plan = plan.ok_or(PromptError::MissingPlan)?;
        let mut prompt = format!(
            "Implement the following plan in this repository.\n\n\
             Summary: {}\n\nArchitecture:\n{}\n",
            plan.summary, plan.architecture.overview
        );
        for ws in &plan.work_streams {
            prompt.push_str(&format!("\nWork stream: {}\n", ws.name));
            for task in &ws.tasks {
                prompt.push_str(&format!("- {task}\n"));
            }
        }
        prompt.push_str(
            "\nWrite the code and tests, run the test suite, and commit your work \
             with clear messages. When done, answer with JSON matching the schema \
             describing what changed.",
        );
        Ok(prompt)
    }

    /// Simplified implementation prompt: one work stream, tail of its tasks.
    pub fn implementation_simplified(
        &self,
        plan: Option<&Plan>,
        work_stream: &WorkStream,
        attempt: u32,
    ) -> Result<String, PromptError> {
        let plan = plan.ok_or(PromptError::MissingPlan)?;
        let keep = if attempt > 2 {
            TASKS_TO_KEEP_LATE
        } else {
            TASKS_TO_KEEP
        };
        let tasks = tail(&work_stream.tasks, keep);
        let mut prompt = format!(
            "Implement this plan: {}\n\nRemaining tasks:\n",
            plan.summary
        );
        for task in tasks {
            prompt.push_str(&format!("- {task}\n"));
        }
        prompt.push_str(
            "\nWrite the code and tests, commit, and answer with JSON matching the schema.",
        );
        Ok(prompt)
    }

    pub fn refactoring(&self, plan: Option<&Plan>) -> Result<String, PromptError> {
        let plan = plan.ok_or(PromptError::MissingPlan)?;
        Ok(format!(
            "The implementation of \"{}\" is complete and CI is green.\n\n\
             Review the changes on this branch for clarity, duplication, naming, \
             and missing test coverage. Apply focused refactorings without \
             changing behavior, keep the test suite green, commit and push your \
             work, and answer with JSON matching the schema describing what \
             changed.",
            plan.summary
        ))
    }

    pub fn refactoring_simplified(&self, plan: Option<&Plan>) -> Result<String, PromptError> {
        let plan = plan.ok_or(PromptError::MissingPlan)?;
        Ok(format!(
            "Refactor the changes on this branch for \"{}\": reduce duplication \
             and improve naming without changing behavior. Commit, push, and \
             answer with JSON matching the schema.",
            plan.summary
        ))
    }

    pub fn create_pr(&self, ctx: &PrCreationContext) -> Result<String, PromptError> {
        if ctx.branch.is_empty() {
            return Err(PromptError::EmptyField { what: "branch" });
        }
        if ctx.base_branch.is_empty() {
            return Err(PromptError::EmptyField {
                what: "base branch",
            });
        }
        Ok(format!(
            "Create a pull request for the {} change on branch `{}` targeting \
             `{}`.\n\nOriginal request:\n{}\n\n\
             Push the branch if needed, then use `gh pr create` with a title \
             following conventional commits and a body summarizing the change. \
             If a PR for this branch already exists, report it instead of \
             creating a duplicate. Extract any issue references, labels, or \
             project names from the request and apply them. Answer with JSON \
             matching the schema, including the PR number.",
            ctx.workflow_type, ctx.branch, ctx.base_branch, ctx.description
        ))
    }

    pub fn fix_ci(&self, failures: &str) -> Result<String, PromptError> {
        if failures.is_empty() {
            return Err(PromptError::EmptyFailures);
        }
        Ok(format!(
            "CI is failing on the pull request for this branch.\n\n\
             Failing jobs and output:\n{failures}\n\n\
             Diagnose the failures, fix them, run the relevant tests locally, \
             then commit and push the fix."
        ))
    }

    pub fn pr_split(
        &self,
        metrics: Option<&PrMetrics>,
        commits: &[Commit],
    ) -> Result<String, PromptError> {
        let metrics = metrics.ok_or(PromptError::MissingMetrics)?;
        let mut prompt = format!(
            "This PR is too large to review comfortably: {} commits, {} files, \
             +{}/-{} lines. Propose a split into a parent PR plus smaller child \
             PRs, each reviewable on its own.\n\nCommits on the branch:\n",
            metrics.commits, metrics.files_changed, metrics.lines_added, metrics.lines_removed
        );
        for commit in commits {
            prompt.push_str(&format!("- {} {}\n", commit.hash, commit.subject));
        }
        prompt.push_str(
            "\nChoose byCommits when commits are cleanly separable, byFiles \
             otherwise. Answer with JSON matching the schema.",
        );
        Ok(prompt)
    }

    /// Simplified split prompt: metrics plus the last ten commits.
    pub fn pr_split_simplified(
        &self,
        metrics: Option<&PrMetrics>,
        commits: &[Commit],
    ) -> Result<String, PromptError> {
        let metrics = metrics.ok_or(PromptError::MissingMetrics)?;
        let mut prompt = format!(
            "Split this oversized PR ({} files, +{}/-{} lines) into a parent \
             and child PRs. Recent commits:\n",
            metrics.files_changed, metrics.lines_added, metrics.lines_removed
        );
        for commit in tail(commits, COMMITS_TO_KEEP) {
            prompt.push_str(&format!("- {} {}\n", commit.hash, commit.subject));
        }
        prompt.push_str("\nAnswer with JSON matching the schema.");
        Ok(prompt)
    }
}

/// Last `n` elements of a slice.
fn tail<T>(items: &[T], n: usize) -> &[T] {
    let start = items.len().saturating_sub(n);
    &items[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Architecture;

    fn sample_plan() -> Plan {
        Plan {
            summary: "Add Subtract".to_string(),
            context_type: "library".to_string(),
            architecture: Architecture {
                overview: "one function".to_string(),
                components: vec![],
            },
            phases: vec![],
            work_streams: vec![WorkStream {
                name: "core".to_string(),
                tasks: (1..=8).map(|i| format!("task {i}")).collect(),
                depends_on: vec![],
            }],
            risks: vec![],
            complexity: "small".to_string(),
            estimated_total_lines: 10,
            estimated_total_files: 2,
        }
    }

    #[test]
    fn planning_includes_feedback() {
        let builder = PromptBuilder::new();
        let prompt = builder
            .planning(
                WorkflowType::Feature,
                "Add Subtract(a, b)",
                &["Use table-driven tests".to_string()],
            )
            .unwrap();
        assert!(prompt.contains("Add Subtract(a, b)"));
        assert!(prompt.contains("Use table-driven tests"));
    }

    #[test]
    fn planning_rejects_empty_description() {
        let builder = PromptBuilder::new();
        assert!(builder.planning(WorkflowType::Fix, "", &[]).is_err());
    }

    #[test]
    fn implementation_requires_plan() {
        let builder = PromptBuilder::new();
        assert_eq!(
            builder.implementation(None).unwrap_err(),
            PromptError::MissingPlan
        );
    }

    #[test]
    fn simplified_implementation_keeps_task_tail() {
        let builder = PromptBuilder::new();
        let plan = sample_plan();
        let ws = plan.work_streams[0].clone();

        // Attempt 2 keeps the last five tasks.
        let prompt = builder
            .implementation_simplified(Some(&plan), &ws, 2)
            .unwrap();
        assert!(!prompt.contains("task 3"));
        assert!(prompt.contains("task 4"));
        assert!(prompt.contains("task 8"));

        // Past the second attempt only three remain.
        let prompt = builder
            .implementation_simplified(Some(&plan), &ws, 3)
            .unwrap();
        assert!(!prompt.contains("task 5"));
        assert!(prompt.contains("task 6"));
    }

    #[test]
    fn create_pr_validates_branches() {
        let builder = PromptBuilder::new();
        let mut ctx = PrCreationContext {
            workflow_type: WorkflowType::Feature,
            branch: "add-sub".to_string(),
            base_branch: "main".to_string(),
            description: "Add Subtract".to_string(),
        };
        assert!(builder.create_pr(&ctx).is_ok());
        ctx.branch = String::new();
        assert!(builder.create_pr(&ctx).is_err());
    }

    #[test]
    fn fix_ci_rejects_empty_failures() {
        let builder = PromptBuilder::new();
        assert_eq!(
            builder.fix_ci("").unwrap_err(),
            PromptError::EmptyFailures
        );
        assert!(builder.fix_ci("lint: unused import").unwrap().contains("lint"));
    }

    #[test]
    fn simplified_split_truncates_commits() {
        let builder = PromptBuilder::new();
        let commits: Vec<Commit> = (1..=15)
            .map(|i| Commit {
                hash: format!("sha{i}"),
                subject: format!("commit {i}"),
            })
            .collect();
        let metrics = PrMetrics {
            commits: 15,
            files_changed: 14,
            lines_added: 200,
            lines_removed: 50,
        };
        let prompt = builder
            .pr_split_simplified(Some(&metrics), &commits)
            .unwrap();
        assert!(!prompt.contains("commit 5"));
        assert!(prompt.contains("commit 6"));
        assert!(prompt.contains("commit 15"));
    }

    #[test]
    fn schemas_are_valid_json() {
        for schema in [
            schemas::PLAN,
            schemas::IMPLEMENTATION_SUMMARY,
            schemas::PR_CREATION_RESULT,
            schemas::PR_SPLIT_PLAN,
        ] {
            serde_json::from_str::<serde_json::Value>(schema).unwrap();
        }
    }
}
