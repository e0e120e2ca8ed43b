//! Code-host collaborator interface (pull requests and CI status).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Which pull requests a lookup should consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrFilter {
    Any,
    Open,
    /// Closed or merged.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

impl PrFilter {
    pub fn matches(self, state: PrState) -> bool {
        match self {
            PrFilter::Any => true,
            PrFilter::Open => state == PrState::Open,
            PrFilter::Closed => state != PrState::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub state: PrState,
    pub head: String,
    pub base: String,
    pub title: String,
    /// Head commit the host last saw; CI status is keyed on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Aggregate CI status of a pull request's head commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CiStatus {
    Pending,
    Success,
    Failure { summary: String },
    /// The host reports no checks at all.
    NoChecks,
}

/// Pull request and CI primitives consumed by `ship`.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Most recent pull request with `head == branch` matching `filter`.
    async fn find_pull_request(&self, branch: &str, filter: PrFilter)
        -> Result<Option<PullRequest>>;

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest>;

    /// Squash-merge the pull request.
    async fn merge_pull_request(&self, number: u64) -> Result<()>;

    async fn ci_status(&self, pr: &PullRequest) -> Result<CiStatus>;
}

/// Stand-in host used when no repository is configured. Every call fails
/// with a configuration hint.
#[derive(Debug, Default, Clone)]
pub struct Unconfigured;

impl Unconfigured {
    fn err<T>() -> Result<T> {
        Err(FlowError::CodeHost(
            "no code host configured: set `repository` in .branchflow/config.json or add a GitHub remote".to_string(),
        ))
    }
}

#[async_trait]
impl CodeHost for Unconfigured {
    async fn find_pull_request(&self, _: &str, _: PrFilter) -> Result<Option<PullRequest>> {
        Self::err()
    }

    async fn create_pull_request(&self, _: &NewPullRequest) -> Result<PullRequest> {
        Self::err()
    }

    async fn merge_pull_request(&self, _: u64) -> Result<()> {
        Self::err()
    }

    async fn ci_status(&self, _: &PullRequest) -> Result<CiStatus> {
        Self::err()
    }
}
