//! Error taxonomy for branchflow-core.
//!
//! `FlowError` never crosses the pipeline boundary: [`crate::pipeline`]
//! converts every error into a structured `Failure` outcome.

use branchflow_state::{SessionError, StorageError};

/// Errors raised by collaborators and operations.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("branchflow is not initialized in this repository")]
    NotInitialized,

    #[error("invalid parameter {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("git error: {0}")]
    Vcs(String),

    #[error("code host error: {0}")]
    CodeHost(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("no active session on branch {0}")]
    NoActiveSession(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("resolution failed: {0}")]
    Resolution(String),

    #[error("timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    /// A multi-step mutation stopped part way. `progress` describes how far it got.
    #[error("{message}")]
    Incomplete {
        message: String,
        progress: serde_json::Value,
        remedy: Option<String>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// A concrete next step for the caller, when there is one.
    pub fn remedy(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some("run `branchflow init`".to_string()),
            Self::NoActiveSession(_) => {
                Some("run `branchflow launch` or `branchflow swap` to pick a session".to_string())
            }
            Self::Timeout { .. } => {
                Some("check the pull request's CI run, then re-run `branchflow ship`".to_string())
            }
            Self::CodeHost(_) => {
                Some("check GITHUB_TOKEN and the `repository` setting in .branchflow/config.json".to_string())
            }
            Self::Incomplete { remedy, .. } => remedy.clone(),
            _ => None,
        }
    }

    /// Partial progress carried by an incomplete mutation.
    pub fn progress(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Incomplete { progress, .. } => Some(progress),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FlowError {
    fn from(err: reqwest::Error) -> Self {
        FlowError::CodeHost(err.to_string())
    }
}

/// Result type for branchflow-core operations.
pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_error_display() {
        let err = FlowError::Timeout {
            what: "CI checks".to_string(),
            secs: 1200,
        };
        assert_eq!(err.to_string(), "timed out after 1200s waiting for CI checks");

        let err = FlowError::InvalidParameter {
            field: "branch".to_string(),
            reason: "contains '..'".to_string(),
        };
        assert!(err.to_string().contains("invalid parameter branch"));
    }

    #[test]
    fn test_remedy_present_for_not_initialized() {
        assert!(FlowError::NotInitialized
            .remedy()
            .unwrap()
            .contains("branchflow init"));
        assert!(FlowError::Vcs("boom".to_string()).remedy().is_none());
    }

    #[test]
    fn test_storage_error_converts() {
        let err: FlowError = StorageError::NotFound {
            id: "abc".to_string(),
        }
        .into();
        assert!(matches!(err, FlowError::Storage(_)));
    }
}
