//! Version-control collaborator interface.
//!
//! The pipeline only ever talks to git through [`Vcs`]. [`crate::git::GitCli`]
//! shells out to the `git` binary; [`crate::fakes::FakeRepo`] models a
//! repository in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Working tree status, as file path sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStatus {
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    /// New files, tracked or not.
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    /// Paths with unresolved merge conflicts.
    pub conflicted: Vec<String>,
}

impl RepoStatus {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.modified.is_empty()
            && self.created.is_empty()
            && self.deleted.is_empty()
            && self.conflicted.is_empty()
    }

    /// Every path that differs from HEAD, deduplicated, sorted.
    pub fn changed_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .staged
            .iter()
            .chain(&self.modified)
            .chain(&self.created)
            .chain(&self.deleted)
            .chain(&self.conflicted)
            .cloned()
            .collect();
        files.sort();
        files.dedup();
        files
    }
}

/// Commit counts of a local ref relative to its upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AheadBehind {
    pub ahead: u32,
    pub behind: u32,
}

/// One entry from the commit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub summary: String,
}

/// Git primitives consumed by checks and operations.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Checked-out branch, or `None` on a detached HEAD.
    async fn current_branch(&self) -> Result<Option<String>>;

    async fn status(&self) -> Result<RepoStatus>;

    async fn branch_exists(&self, name: &str) -> Result<bool>;

    /// Local branch names.
    async fn list_branches(&self) -> Result<Vec<String>>;

    /// Create `name` at `start_point` without checking it out.
    async fn create_branch(&self, name: &str, start_point: &str) -> Result<()>;

    async fn checkout(&self, name: &str) -> Result<()>;

    async fn delete_branch(&self, name: &str, force: bool) -> Result<()>;

    async fn delete_remote_branch(&self, remote: &str, name: &str) -> Result<()>;

    /// Stash all changes, untracked files included, under `label`.
    /// Returns the label the stash can be popped by.
    async fn stash_push(&self, label: &str) -> Result<String>;

    /// Pop the stash labelled `label`, or the newest stash when `None`.
    /// Returns `false` when there was nothing to pop.
    async fn stash_pop(&self, label: Option<&str>) -> Result<bool>;

    /// Throw away every uncommitted change, untracked files included.
    async fn discard_changes(&self) -> Result<()>;

    /// Stage everything and commit. Returns the new commit sha.
    async fn commit_all(&self, message: &str) -> Result<String>;

    async fn push(&self, remote: &str, branch: &str, set_upstream: bool) -> Result<()>;

    /// Fast-forward `branch` from `remote`.
    async fn pull(&self, remote: &str, branch: &str) -> Result<()>;

    async fn fetch(&self, remote: &str) -> Result<()>;

    async fn ahead_behind(&self, local: &str, upstream: &str) -> Result<AheadBehind>;

    /// Up to `limit` commits of `range` (e.g. `origin/main..feature/x`), newest first.
    async fn log(&self, range: &str, limit: usize) -> Result<Vec<CommitInfo>>;

    /// Diff of the working tree against HEAD.
    async fn diff(&self) -> Result<String>;

    async fn remote_url(&self, remote: &str) -> Result<Option<String>>;

    /// Add `pattern` to this clone's private ignore list so status, stash
    /// and commits never see it. Returns `false` when it was already listed.
    async fn exclude_locally(&self, pattern: &str) -> Result<bool>;
}
