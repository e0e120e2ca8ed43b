//! Workflow operations, one [`Operation`](crate::pipeline::Operation) each.

mod abort;
mod commit;
mod init;
mod launch;
mod query;
mod ship;
mod swap;

pub use abort::{Abort, AbortOutput};
pub use commit::{Commit, CommitOutput};
pub use init::{Init, InitOutput};
pub use launch::{Launch, LaunchOutput};
pub use query::{List, ListOutput, Status, StatusOutput};
pub use ship::{Ship, ShipOutput, ShipProgress};
pub use swap::{Swap, SwapOutput};

use branchflow_state::WorkflowSession;

use crate::error::{FlowError, Result};
use crate::pipeline::Env;

/// Checked-out branch, or an error on a detached HEAD.
async fn current_branch(env: &Env) -> Result<String> {
    env.vcs.current_branch().await?.ok_or_else(|| FlowError::InvalidParameter {
        field: "branch".to_string(),
        reason: "HEAD is detached; check out a branch first".to_string(),
    })
}

/// The active session on `branch`.
async fn active_session(env: &Env, branch: &str) -> Result<WorkflowSession> {
    env.store
        .get_by_branch(branch)
        .await?
        .filter(WorkflowSession::is_active)
        .ok_or_else(|| FlowError::NoActiveSession(branch.to_string()))
}
