//! GitHub REST implementation of [`CodeHost`].

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::code_host::{CiStatus, CodeHost, NewPullRequest, PrFilter, PrState, PullRequest};
use crate::config::FlowConfig;
use crate::error::{FlowError, Result};

/// Thin GitHub API client scoped to one repository.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    name: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    html_url: String,
    state: String,
    #[serde(default)]
    merged_at: Option<String>,
    title: String,
    head: ApiRef,
    base: ApiRef,
}

impl ApiPull {
    fn into_pull_request(self) -> PullRequest {
        let state = match (self.state.as_str(), self.merged_at.is_some()) {
            (_, true) => PrState::Merged,
            ("open", false) => PrState::Open,
            _ => PrState::Closed,
        };
        PullRequest {
            number: self.number,
            url: self.html_url,
            state,
            head: self.head.name,
            base: self.base.name,
            title: self.title,
            head_sha: Some(self.head.sha),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckRun {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckRunList {
    check_runs: Vec<CheckRun>,
}

/// Fold individual check runs into one status.
pub(crate) fn summarize_check_runs(runs: &[CheckRun]) -> CiStatus {
    if runs.is_empty() {
        return CiStatus::NoChecks;
    }
    let failed: Vec<&str> = runs
        .iter()
        .filter(|r| {
            matches!(
                r.conclusion.as_deref(),
                Some("failure" | "cancelled" | "timed_out" | "action_required" | "startup_failure")
            )
        })
        .map(|r| r.name.as_str())
        .collect();
    if !failed.is_empty() {
        return CiStatus::Failure {
            summary: format!("failing checks: {}", failed.join(", ")),
        };
    }
    if runs.iter().any(|r| r.status != "completed") {
        return CiStatus::Pending;
    }
    CiStatus::Success
}

/// Extract `owner/name` from a GitHub remote URL.
pub fn parse_github_remote(url: &str) -> Option<String> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("git@github.com:") {
        rest
    } else {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .or_else(|| url.strip_prefix("ssh://"))?;
        let rest = rest.strip_prefix("git@").unwrap_or(rest);
        rest.strip_prefix("github.com/")?
    };
    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let (owner, name) = path.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some(format!("{owner}/{name}"))
}

impl GitHubClient {
    /// Create a client for `repository` (`owner/name`).
    pub fn new(api_url: &str, repository: &str, token: Option<String>) -> Result<Self> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty())
            .ok_or_else(|| FlowError::Config(format!("repository must be owner/name, got {repository:?}")))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("branchflow/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token,
        })
    }

    /// Build a client from config, falling back to the remote URL for the
    /// repository and to `GITHUB_TOKEN` / `GH_TOKEN` for credentials.
    /// Returns `None` when no repository can be determined.
    pub fn from_config(config: &FlowConfig, remote_url: Option<&str>) -> Result<Option<Self>> {
        let repository = config
            .repository
            .clone()
            .or_else(|| remote_url.and_then(parse_github_remote));
        let Some(repository) = repository else {
            return Ok(None);
        };
        let token = std::env::var("GITHUB_TOKEN")
            .or_else(|_| std::env::var("GH_TOKEN"))
            .ok();
        Self::new(&config.api_url, &repository, token).map(Some)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_url, self.owner, self.repo, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, self.url(path))
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = req.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(FlowError::CodeHost(format!("GitHub returned {status}: {body}")))
    }
}

#[async_trait]
impl CodeHost for GitHubClient {
    async fn find_pull_request(
        &self,
        branch: &str,
        filter: PrFilter,
    ) -> Result<Option<PullRequest>> {
        let head = format!("{}:{}", self.owner, branch);
        let req = self.request(reqwest::Method::GET, "/pulls").query(&[
            ("head", head.as_str()),
            ("state", "all"),
            ("sort", "created"),
            ("direction", "desc"),
            ("per_page", "30"),
        ]);
        let pulls: Vec<ApiPull> = self.send(req).await?.json().await?;
        debug!(branch, count = pulls.len(), "listed pull requests");

        Ok(pulls
            .into_iter()
            .map(ApiPull::into_pull_request)
            .find(|pr| pr.head == branch && filter.matches(pr.state)))
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let req = self
            .request(reqwest::Method::POST, "/pulls")
            .json(&serde_json::json!({
                "title": request.title,
                "body": request.body,
                "head": request.head,
                "base": request.base,
            }));
        let pull: ApiPull = self.send(req).await?.json().await?;
        Ok(pull.into_pull_request())
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        let req = self
            .request(reqwest::Method::PUT, &format!("/pulls/{number}/merge"))
            .json(&serde_json::json!({ "merge_method": "squash" }));
        self.send(req).await?;
        Ok(())
    }

    async fn ci_status(&self, pr: &PullRequest) -> Result<CiStatus> {
        let sha = match &pr.head_sha {
            Some(sha) => sha.clone(),
            None => {
                let req = self.request(reqwest::Method::GET, &format!("/pulls/{}", pr.number));
                let pull: ApiPull = self.send(req).await?.json().await?;
                pull.head.sha
            }
        };
        let req = self
            .request(reqwest::Method::GET, &format!("/commits/{sha}/check-runs"))
            .query(&[("per_page", "100")]);
        let list: CheckRunList = self.send(req).await?.json().await?;
        Ok(summarize_check_runs(&list.check_runs))
    }
}
