//! Typed facade over `git` for the fixed vocabulary the orchestrator needs.

use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::GitError;
use crate::types::{Commit, PrMetrics};

/// Git operations, all executed in an explicit directory.
#[derive(Clone)]
pub struct GitOps {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl GitOps {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: Duration::from_secs(120),
        }
    }

    async fn git(
        &self,
        dir: &Utf8Path,
        op: &str,
        args: &[&str],
    ) -> Result<CommandOutput, GitError> {
        let spec = CommandSpec::new("git").args(args.iter().copied()).cwd(dir);
        let output = self.runner.run(&spec, self.timeout).await?;
        if !output.success() {
            return Err(GitError::CommandFailed {
                op: op.to_string(),
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    pub async fn current_branch(&self, dir: &Utf8Path) -> Result<String, GitError> {
        let output = self
            .git(dir, "get current branch", &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(output.stdout)
    }

    pub async fn push(&self, dir: &Utf8Path, branch: &str) -> Result<(), GitError> {
        if branch.is_empty() {
            return Err(GitError::EmptyArgument {
                what: "branch name",
            });
        }
        self.git(dir, "push branch", &["push", "-u", "origin", branch])
            .await?;
        Ok(())
    }

    pub async fn worktree_add(
        &self,
        dir: &Utf8Path,
        path: &Utf8Path,
        branch: &str,
    ) -> Result<(), GitError> {
        if path.as_str().is_empty() {
            return Err(GitError::EmptyArgument {
                what: "worktree path",
            });
        }
        if branch.is_empty() {
            return Err(GitError::EmptyArgument {
                what: "branch name",
            });
        }
        let result = self
            .git(
                dir,
                "create worktree",
                &["worktree", "add", path.as_str(), "-b", branch],
            )
            .await;
        match result {
            Err(GitError::CommandFailed { stderr, .. }) if stderr.contains("already exists") => {
                Err(GitError::BranchExists {
                    branch: branch.to_string(),
                })
            }
            Err(e) => Err(e),
            Ok(_) => Ok(()),
        }
    }

    pub async fn worktree_remove(&self, dir: &Utf8Path, path: &Utf8Path) -> Result<(), GitError> {
        if path.as_str().is_empty() {
            return Err(GitError::EmptyArgument {
                what: "worktree path",
            });
        }
        self.git(
            dir,
            "remove worktree",
            &["worktree", "remove", "--force", path.as_str()],
        )
        .await?;
        Ok(())
    }

    /// Paths of all registered worktrees for the repository at `dir`.
    pub async fn worktree_list(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, GitError> {
        let output = self
            .git(dir, "list worktrees", &["worktree", "list", "--porcelain"])
            .await?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(Utf8PathBuf::from)
            .collect())
    }

    pub async fn checkout(&self, dir: &Utf8Path, branch: &str) -> Result<(), GitError> {
        self.git(dir, "checkout branch", &["checkout", branch]).await?;
        Ok(())
    }

    pub async fn checkout_new_branch(
        &self,
        dir: &Utf8Path,
        branch: &str,
        start_point: &str,
    ) -> Result<(), GitError> {
        if branch.is_empty() {
            return Err(GitError::EmptyArgument {
                what: "branch name",
            });
        }
        self.git(
            dir,
            "create branch",
            &["checkout", "-b", branch, start_point],
        )
        .await?;
        Ok(())
    }

    pub async fn delete_branch(&self, dir: &Utf8Path, branch: &str) -> Result<(), GitError> {
        self.git(dir, "delete branch", &["branch", "-D", branch])
            .await?;
        Ok(())
    }

    pub async fn cherry_pick(&self, dir: &Utf8Path, commit: &str) -> Result<(), GitError> {
        self.git(dir, "cherry-pick commit", &["cherry-pick", commit])
            .await?;
        Ok(())
    }

    /// Check out specific files from another ref into the working tree.
    pub async fn checkout_files(
        &self,
        dir: &Utf8Path,
        source_ref: &str,
        files: &[String],
    ) -> Result<(), GitError> {
        if files.is_empty() {
            return Err(GitError::EmptyArgument { what: "file list" });
        }
        let mut args: Vec<&str> = vec!["checkout", source_ref, "--"];
        args.extend(files.iter().map(String::as_str));
        self.git(dir, "checkout files", &args).await?;
        Ok(())
    }

    /// Stage everything and commit.
    pub async fn commit_all(&self, dir: &Utf8Path, message: &str) -> Result<(), GitError> {
        self.git(dir, "stage changes", &["add", "-A"]).await?;
        self.git(dir, "commit changes", &["commit", "-m", message])
            .await?;
        Ok(())
    }

    pub async fn commit_empty(&self, dir: &Utf8Path, message: &str) -> Result<(), GitError> {
        self.git(
            dir,
            "create empty commit",
            &["commit", "--allow-empty", "-m", message],
        )
        .await?;
        Ok(())
    }

    /// Diff size and commit count of HEAD relative to `base`.
    pub async fn diff_metrics(&self, dir: &Utf8Path, base: &str) -> Result<PrMetrics, GitError> {
        let numstat = self
            .git(
                dir,
                "diff against base",
                &["diff", "--numstat", &format!("{base}...HEAD")],
            )
            .await?;

        let mut metrics = PrMetrics::default();
        for line in numstat.stdout.lines() {
            let mut fields = line.split_whitespace();
            let added = fields.next();
            let removed = fields.next();
            let path = fields.next();
            if path.is_none() {
                continue;
            }
            metrics.files_changed += 1;
            // Binary files report "-" for both counts.
            metrics.lines_added += added.and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
            metrics.lines_removed += removed.and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
        }

        let count = self
            .git(
                dir,
                "count commits",
                &["rev-list", "--count", &format!("{base}..HEAD")],
            )
            .await?;
        metrics.commits = count.stdout.trim().parse::<usize>().unwrap_or(0);

        Ok(metrics)
    }

    /// Commits on HEAD that are not on `base`, oldest first.
    pub async fn log_range(&self, dir: &Utf8Path, base: &str) -> Result<Vec<Commit>, GitError> {
        let output = self
            .git(
                dir,
                "list commits",
                &[
                    "log",
                    "--reverse",
                    "--pretty=format:%H\t%s",
                    &format!("{base}..HEAD"),
                ],
            )
            .await?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| {
                let (hash, subject) = line.split_once('\t')?;
                Some(Commit {
                    hash: hash.to_string(),
                    subject: subject.to_string(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Runner that records argv and replays scripted output.
    struct ScriptedRunner {
        calls: Mutex<Vec<Vec<String>>>,
        responses: Mutex<Vec<CommandOutput>>,
    }

    impl ScriptedRunner {
        fn new(responses: Vec<CommandOutput>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(responses),
            }
        }

        fn ok(stdout: &str) -> CommandOutput {
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: 0,
            }
        }

        fn fail(stderr: &str) -> CommandOutput {
            CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code: 128,
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            spec: &CommandSpec,
            _timeout: Duration,
        ) -> Result<CommandOutput, crate::error::CommandError> {
            let mut argv = vec![spec.program_name()];
            argv.extend(spec.args.iter().map(|a| a.to_string_lossy().into_owned()));
            self.calls.lock().unwrap().push(argv);
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    fn dir() -> Utf8PathBuf {
        Utf8PathBuf::from("/test/repo")
    }

    #[tokio::test]
    async fn current_branch_trims_and_uses_rev_parse() {
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::ok("main")]));
        let git = GitOps::new(runner.clone());
        let branch = git.current_branch(&dir()).await.unwrap();
        assert_eq!(branch, "main");
        assert_eq!(
            runner.calls.lock().unwrap()[0],
            vec!["git", "rev-parse", "--abbrev-ref", "HEAD"]
        );
    }

    #[tokio::test]
    async fn push_rejects_empty_branch() {
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let git = GitOps::new(runner);
        let err = git.push(&dir(), "").await.unwrap_err();
        assert!(matches!(err, GitError::EmptyArgument { .. }));
    }

    #[tokio::test]
    async fn push_uses_upstream_origin() {
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::ok("")]));
        let git = GitOps::new(runner.clone());
        git.push(&dir(), "feature-branch").await.unwrap();
        assert_eq!(
            runner.calls.lock().unwrap()[0],
            vec!["git", "push", "-u", "origin", "feature-branch"]
        );
    }

    #[tokio::test]
    async fn worktree_add_detects_existing_branch() {
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::fail(
            "fatal: A branch named 'existing' already exists",
        )]));
        let git = GitOps::new(runner);
        let err = git
            .worktree_add(&dir(), Utf8Path::new("/test/worktree"), "existing")
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::BranchExists { .. }));
    }

    #[tokio::test]
    async fn worktree_list_parses_porcelain() {
        let porcelain = "worktree /test/repo\nHEAD abc\nbranch refs/heads/main\n\nworktree /test/worktrees/demo\nHEAD def\nbranch refs/heads/demo\n";
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::ok(porcelain)]));
        let git = GitOps::new(runner);
        let paths = git.worktree_list(&dir()).await.unwrap();
        assert_eq!(
            paths,
            vec![
                Utf8PathBuf::from("/test/repo"),
                Utf8PathBuf::from("/test/worktrees/demo")
            ]
        );
    }

    #[tokio::test]
    async fn diff_metrics_sums_numstat_and_counts_commits() {
        let numstat = "10\t2\tsrc/a.rs\n5\t0\tsrc/b.rs\n-\t-\tassets/logo.png";
        let runner = Arc::new(ScriptedRunner::new(vec![
            ScriptedRunner::ok(numstat),
            ScriptedRunner::ok("4"),
        ]));
        let git = GitOps::new(runner);
        let metrics = git.diff_metrics(&dir(), "main").await.unwrap();
        assert_eq!(metrics.files_changed, 3);
        assert_eq!(metrics.lines_added, 15);
        assert_eq!(metrics.lines_removed, 2);
        assert_eq!(metrics.commits, 4);
    }

    #[tokio::test]
    async fn log_range_parses_hash_and_subject() {
        let log = "abc123\tAdd subtract\ndef456\tFix sign handling";
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::ok(log)]));
        let git = GitOps::new(runner);
        let commits = git.log_range(&dir(), "main").await.unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc123");
        assert_eq!(commits[1].subject, "Fix sign handling");
    }

    #[tokio::test]
    async fn checkout_files_requires_files() {
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let git = GitOps::new(runner);
        let err = git
            .checkout_files(&dir(), "feature", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::EmptyArgument { .. }));
    }
}
