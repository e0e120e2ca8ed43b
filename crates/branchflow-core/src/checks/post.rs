//! Post-condition verification.
//!
//! After a mutation each [`PostCondition`] re-reads the store, the working
//! tree or the code host and confirms a claimed side effect took hold.
//! Results are info, warning or error only; a failure is reported and
//! never rolled back.

use serde::{Deserialize, Serialize};
use tracing::debug;

use branchflow_state::{SessionId, SessionState};

use crate::checks::facts::FactSources;
use crate::checks::{CheckResult, Severity, VerificationReport};
use crate::code_host::{PrFilter, PrState};
use crate::error::Result;

/// Named post-condition checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "kebab-case")]
pub enum PostCheck {
    SessionRecorded { id: SessionId },
    SessionInState { id: SessionId, state: SessionState },
    OnBranch { branch: String },
    BranchExists { branch: String },
    BranchDeleted { branch: String },
    PullRequestOpen { branch: String },
    PullRequestMerged { branch: String },
    WorkingTreeClean,
    NoActiveSession { branch: String },
}

impl PostCheck {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionRecorded { .. } => "session-recorded",
            Self::SessionInState { .. } => "session-in-state",
            Self::OnBranch { .. } => "on-branch",
            Self::BranchExists { .. } => "branch-exists",
            Self::BranchDeleted { .. } => "branch-deleted",
            Self::PullRequestOpen { .. } => "pull-request-open",
            Self::PullRequestMerged { .. } => "pull-request-merged",
            Self::WorkingTreeClean => "working-tree-clean",
            Self::NoActiveSession { .. } => "no-active-session",
        }
    }

    /// Failure blocks success of the operation.
    pub fn required(self) -> PostCondition {
        PostCondition {
            check: self,
            severity: Severity::Error,
        }
    }

    /// Failure is reported as a warning only.
    pub fn advisory(self) -> PostCondition {
        PostCondition {
            check: self,
            severity: Severity::Warning,
        }
    }
}

/// A post-check with the severity its failure carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCondition {
    pub check: PostCheck,
    severity: Severity,
}

impl PostCondition {
    pub fn severity(&self) -> Severity {
        self.severity
    }

    fn failed(&self, message: String) -> CheckResult {
        match self.severity {
            Severity::Warning => CheckResult::warning(self.check.name(), message),
            _ => CheckResult::error(self.check.name(), message),
        }
    }

    /// Observe the world and judge this condition.
    async fn verify(&self, src: &FactSources<'_>) -> Result<CheckResult> {
        let name = self.check.name();
        let result = match &self.check {
            PostCheck::SessionRecorded { id } => match src.store.get(id).await? {
                Some(_) => CheckResult::pass(name, format!("session {id} recorded")),
                None => self.failed(format!("session {id} not found in store")),
            },
            PostCheck::SessionInState { id, state } => match src.store.get(id).await? {
                Some(s) if s.state() == *state => {
                    CheckResult::pass(name, format!("session {id} is {state}"))
                }
                Some(s) => self.failed(format!(
                    "session {id} is {}, expected {state}",
                    s.state()
                )),
                None => self.failed(format!("session {id} not found in store")),
            },
            PostCheck::OnBranch { branch } => match src.vcs.current_branch().await? {
                Some(current) if current == *branch => {
                    CheckResult::pass(name, format!("checked out {branch}"))
                }
                other => self.failed(format!(
                    "expected {branch} checked out, found {}",
                    other.as_deref().unwrap_or("a detached HEAD")
                )),
            },
            PostCheck::BranchExists { branch } => {
                if src.vcs.branch_exists(branch).await? {
                    CheckResult::pass(name, format!("{branch} exists"))
                } else {
                    self.failed(format!("{branch} does not exist"))
                }
            }
            PostCheck::BranchDeleted { branch } => {
                if src.vcs.branch_exists(branch).await? {
                    self.failed(format!("{branch} still exists locally"))
                } else {
                    CheckResult::pass(name, format!("{branch} deleted"))
                }
            }
            PostCheck::PullRequestOpen { branch } => {
                match src.host.find_pull_request(branch, PrFilter::Open).await? {
                    Some(pr) => CheckResult::pass(name, format!("pull request #{} is open", pr.number)),
                    None => self.failed(format!("no open pull request for {branch}")),
                }
            }
            PostCheck::PullRequestMerged { branch } => {
                match src.host.find_pull_request(branch, PrFilter::Any).await? {
                    Some(pr) if pr.state == PrState::Merged => {
                        CheckResult::pass(name, format!("pull request #{} merged", pr.number))
                    }
                    Some(pr) => self.failed(format!(
                        "pull request #{} is {}, expected merged",
                        pr.number, pr.state
                    )),
                    None => self.failed(format!("no pull request found for {branch}")),
                }
            }
            PostCheck::WorkingTreeClean => {
                let status = src.vcs.status().await?;
                if status.is_clean() {
                    CheckResult::pass(name, "working tree is clean")
                } else {
                    self.failed(format!(
                        "{} uncommitted change(s) remain",
                        status.changed_files().len()
                    ))
                }
            }
            PostCheck::NoActiveSession { branch } => {
                match src.store.get_by_branch(branch).await? {
                    Some(s) if s.is_active() => self.failed(format!(
                        "{branch} still has active session {}",
                        s.id()
                    )),
                    _ => CheckResult::pass(name, format!("no active session on {branch}")),
                }
            }
        };
        Ok(result)
    }
}

/// Verify `conditions` in order. A lookup that errors fails its condition.
pub async fn run_post_checks(
    conditions: &[PostCondition],
    src: &FactSources<'_>,
) -> VerificationReport {
    let mut results = Vec::with_capacity(conditions.len());
    for cond in conditions {
        let result = match cond.verify(src).await {
            Ok(r) => r,
            Err(e) => cond.failed(format!("could not verify: {e}")),
        };
        debug!(check = cond.check.name(), passed = result.passed, "post-check");
        results.push(result);
    }
    VerificationReport::new(results)
}
