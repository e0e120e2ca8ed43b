//! Error types for branchflow-state

use thiserror::Error;

use crate::session::SessionState;

/// Errors raised by the session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The requested edge does not exist in the state machine.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

/// Errors that can occur in the session persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// No session with this id
    #[error("Session not found: {id}")]
    NotFound { id: String },

    /// A session with this id was already created
    #[error("Session already exists: {id}")]
    AlreadyExists { id: String },

    /// Another non-terminal session already owns the branch
    #[error("Branch {branch} already has an active session ({id})")]
    ActiveSessionExists { branch: String, id: String },

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database backend error
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
