//! Worktree lifecycle: one isolated checkout per workflow.
//!
//! The path is deterministic from the workflow name so create is
//! idempotent: `<repo parent>/worktrees/<name>`.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::WorktreeError;
use crate::git::GitOps;

pub struct WorktreeManager {
    /// Absolute path to the main repository, resolved once.
    repo_dir: Utf8PathBuf,
    git: GitOps,
}

impl WorktreeManager {
    pub fn new(repo_dir: &Utf8Path, git: GitOps) -> Result<Self, WorktreeError> {
        let resolved = repo_dir
            .canonicalize_utf8()
            .map_err(|e| WorktreeError::RepoRoot {
                dir: repo_dir.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            repo_dir: resolved,
            git,
        })
    }

    /// Absolute path of the main repository.
    #[must_use]
    pub fn repo_dir(&self) -> &Utf8Path {
        &self.repo_dir
    }

    /// Deterministic worktree path for a workflow name.
    #[must_use]
    pub fn worktree_path(&self, workflow_name: &str) -> Utf8PathBuf {
        let parent = self
            .repo_dir
            .parent()
            .map_or_else(|| self.repo_dir.clone(), Utf8Path::to_path_buf);
        parent.join("worktrees").join(workflow_name)
    }

    /// Create the worktree (and a branch named after the workflow), or
    /// return the existing path when it is already registered.
    pub async fn create_worktree(&self, workflow_name: &str) -> Result<Utf8PathBuf, WorktreeError> {
        if workflow_name.is_empty() {
            return Err(WorktreeError::EmptyName);
        }
        let path = self.worktree_path(workflow_name);

        if path.exists() {
            if self.worktree_exists(&path).await? {
                return Ok(path);
            }
            return Err(WorktreeError::NotAWorktree {
                path: path.to_string(),
            });
        }

        self.git
            .worktree_add(&self.repo_dir, &path, workflow_name)
            .await?;
        Ok(path)
    }

    /// Remove a worktree. Removing a path that is not a registered worktree
    /// is treated as success so cleanup is idempotent.
    pub async fn delete_worktree(&self, path: &Utf8Path) -> Result<(), WorktreeError> {
        if path.as_str().is_empty() {
            return Err(WorktreeError::EmptyPath);
        }
        if !self.worktree_exists(path).await? {
            return Ok(());
        }
        self.git.worktree_remove(&self.repo_dir, path).await?;
        Ok(())
    }

    /// Whether `path` is a registered worktree of the repository.
    pub async fn worktree_exists(&self, path: &Utf8Path) -> Result<bool, WorktreeError> {
        let registered = self.git.worktree_list(&self.repo_dir).await?;
        Ok(registered.iter().any(|p| p == path))
    }
}
