//! Repository facts that pre-checks evaluate against.
//!
//! Checks are pure functions of a [`CheckContext`]. All I/O happens up front
//! in [`gather_facts`], which fetches only what the requested checks need.

use serde::Serialize;
use tracing::{debug, warn};

use branchflow_state::{SessionStore, WorkflowSession};

use crate::checks::Overrides;
use crate::code_host::{CodeHost, PrFilter, PullRequest};
use crate::error::Result;
use crate::vcs::{AheadBehind, RepoStatus, Vcs};

/// Which facts a set of checks reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactNeeds {
    pub status: bool,
    pub branches: bool,
    pub base_sync: bool,
    pub unshipped: bool,
    pub closed_pr: bool,
    pub current_session: bool,
    pub target_session: bool,
}

impl FactNeeds {
    pub fn union(self, other: FactNeeds) -> FactNeeds {
        FactNeeds {
            status: self.status || other.status,
            branches: self.branches || other.branches,
            base_sync: self.base_sync || other.base_sync,
            unshipped: self.unshipped || other.unshipped,
            closed_pr: self.closed_pr || other.closed_pr,
            current_session: self.current_session || other.current_session,
            target_session: self.target_session || other.target_session,
        }
    }
}

/// Snapshot of repository and session state. Unfetched facts keep their
/// defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoFacts {
    pub current_branch: Option<String>,
    pub status: RepoStatus,
    pub local_branches: Vec<String>,
    /// Base branch relative to its remote counterpart. `None` when it could
    /// not be determined (e.g. fetch failed).
    pub base_sync: Option<AheadBehind>,
    pub base_sync_error: Option<String>,
    /// Commits on the subject branch that are not on base.
    pub unshipped: Option<u32>,
    /// A merged or closed pull request for the subject branch.
    pub closed_pr: Option<PullRequest>,
    pub pr_lookup_error: Option<String>,
    /// Active session owning the current branch.
    pub current_session: Option<WorkflowSession>,
    /// Session (active or not) for the target branch.
    pub target_session: Option<WorkflowSession>,
}

/// Everything a check may look at.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub base_branch: String,
    /// Branch the operation is about to create or switch to.
    pub target_branch: Option<String>,
    pub overrides: Overrides,
    pub facts: RepoFacts,
}

impl CheckContext {
    pub fn new(base_branch: impl Into<String>, facts: RepoFacts) -> Self {
        Self {
            base_branch: base_branch.into(),
            target_branch: None,
            overrides: Overrides::default(),
            facts,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_branch = Some(target.into());
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Branch whose commits and pull requests are under inspection:
    /// the target when there is one, else the current branch.
    pub fn subject_branch(&self) -> Option<&str> {
        self.target_branch
            .as_deref()
            .or(self.facts.current_branch.as_deref())
    }

    pub fn on_base(&self) -> bool {
        self.facts.current_branch.as_deref() == Some(self.base_branch.as_str())
    }
}

/// Collaborators facts are read from.
pub struct FactSources<'a> {
    pub vcs: &'a dyn Vcs,
    pub host: &'a dyn CodeHost,
    pub store: &'a dyn SessionStore,
    pub remote: &'a str,
    pub base_branch: &'a str,
}

/// Fetch the facts named by `needs`.
///
/// Store and basic git failures propagate. Remote lookups (fetch, pull
/// requests) are recorded as unknown so the checks can report them.
pub async fn gather_facts(
    needs: FactNeeds,
    src: &FactSources<'_>,
    target_branch: Option<&str>,
) -> Result<RepoFacts> {
    let mut facts = RepoFacts {
        current_branch: src.vcs.current_branch().await?,
        ..RepoFacts::default()
    };
    let subject = target_branch
        .map(str::to_string)
        .or_else(|| facts.current_branch.clone());

    if needs.status {
        facts.status = src.vcs.status().await?;
    }
    if needs.branches {
        facts.local_branches = src.vcs.list_branches().await?;
    }
    if needs.base_sync {
        let upstream = format!("{}/{}", src.remote, src.base_branch);
        let sync = match src.vcs.fetch(src.remote).await {
            Ok(()) => src.vcs.ahead_behind(src.base_branch, &upstream).await,
            Err(e) => Err(e),
        };
        match sync {
            Ok(ab) => facts.base_sync = Some(ab),
            Err(e) => {
                warn!(error = %e, "could not compare base branch with remote");
                facts.base_sync_error = Some(e.to_string());
            }
        }
    }
    if needs.unshipped {
        if let Some(branch) = subject.as_deref() {
            match src.vcs.ahead_behind(branch, src.base_branch).await {
                Ok(ab) => facts.unshipped = Some(ab.ahead),
                Err(e) => warn!(branch, error = %e, "could not count unshipped commits"),
            }
        }
    }
    if needs.closed_pr {
        if let Some(branch) = subject.as_deref() {
            match src.host.find_pull_request(branch, PrFilter::Closed).await {
                Ok(pr) => facts.closed_pr = pr,
                Err(e) => facts.pr_lookup_error = Some(e.to_string()),
            }
        }
    }
    if needs.current_session {
        if let Some(branch) = facts.current_branch.as_deref() {
            facts.current_session = src
                .store
                .get_by_branch(branch)
                .await?
                .filter(WorkflowSession::is_active);
        }
    }
    if needs.target_session {
        if let Some(branch) = target_branch {
            facts.target_session = src.store.get_by_branch(branch).await?;
        }
    }

    debug!(current = ?facts.current_branch, "facts gathered");
    Ok(facts)
}
