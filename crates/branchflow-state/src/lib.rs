//! branchflow-state: workflow sessions and their persistence
//!
//! This crate owns the unit of work tracked by branchflow, the
//! [`WorkflowSession`], together with the state machine that governs it and
//! the stores that persist it.
//!
//! ## Key Components
//!
//! - `WorkflowSession`: one feature or hotfix branch moving from
//!   `BRANCH_READY` to `COMPLETE` (or `ABORTED`)
//! - `SessionStore`: async, backend-agnostic keyed storage for sessions
//! - `FsSessionStore`: one JSON document per session on disk
//! - `SurrealSessionStore`: SurrealDB-backed store (embedded or in-memory)
//! - `fakes::MemorySessionStore`: in-memory store for tests

mod error;
pub mod fakes;
mod fs_store;
pub mod session;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{SessionError, StorageError};
pub use fs_store::FsSessionStore;
pub use session::{
    SessionId, SessionMetadata, SessionState, Transition, WorkflowKind, WorkflowSession,
};
pub use storage_traits::{pick_branch_session, SessionStore, StorageResult};
pub use surreal_store::SurrealSessionStore;
