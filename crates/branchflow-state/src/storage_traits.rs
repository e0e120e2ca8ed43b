//! Storage trait for workflow sessions
//!
//! `SessionStore` is the single persistence seam of branchflow. It is async
//! and backend-agnostic; the in-memory fake in [`crate::fakes`] satisfies the
//! same contract as the filesystem and SurrealDB stores.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::session::{SessionId, WorkflowSession};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Keyed persistence for [`WorkflowSession`] records.
///
/// Guarantees:
/// - `create` rejects a duplicate id, and rejects a new active session on a
///   branch that already has one.
/// - `get` / `get_by_branch` return what was last written.
/// - `update` fails with `NotFound` for an unknown id.
/// - `list` is ordered by `created_at`, oldest first.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session.
    async fn create(&self, session: &WorkflowSession) -> StorageResult<()>;

    /// Fetch a session by id.
    async fn get(&self, id: &SessionId) -> StorageResult<Option<WorkflowSession>>;

    /// Fetch the session for a branch. When several sessions used the branch
    /// over time, the active one wins, then the newest.
    async fn get_by_branch(&self, branch: &str) -> StorageResult<Option<WorkflowSession>>;

    /// Overwrite an existing session.
    async fn update(&self, session: &WorkflowSession) -> StorageResult<()>;

    /// List sessions; terminal ones only when `include_terminal` is set.
    async fn list(&self, include_terminal: bool) -> StorageResult<Vec<WorkflowSession>>;
}

/// Pick the session a branch lookup should return.
pub fn pick_branch_session<I>(candidates: I) -> Option<WorkflowSession>
where
    I: IntoIterator<Item = WorkflowSession>,
{
    candidates.into_iter().max_by(|a, b| {
        a.is_active()
            .cmp(&b.is_active())
            .then(a.created_at.cmp(&b.created_at))
    })
}

/// Reject `session` if it collides with something already stored.
pub(crate) fn check_create_conflicts<'a, I>(
    session: &WorkflowSession,
    existing: I,
) -> StorageResult<()>
where
    I: IntoIterator<Item = &'a WorkflowSession>,
{
    for other in existing {
        if other.id() == session.id() {
            return Err(StorageError::AlreadyExists {
                id: session.id().to_string(),
            });
        }
        if session.is_active() && other.is_active() && other.branch() == session.branch() {
            return Err(StorageError::ActiveSessionExists {
                branch: session.branch().to_string(),
                id: other.id().to_string(),
            });
        }
    }
    Ok(())
}

/// Sort and filter a raw listing into the `list` contract.
pub(crate) fn finish_listing(
    mut sessions: Vec<WorkflowSession>,
    include_terminal: bool,
) -> Vec<WorkflowSession> {
    if !include_terminal {
        sessions.retain(WorkflowSession::is_active);
    }
    sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    sessions
}
