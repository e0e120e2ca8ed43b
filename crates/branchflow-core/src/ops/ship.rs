//! `ship`: push, open or reuse a pull request, wait for CI, squash-merge,
//! then clean up.
//!
//! Each step records the session state it reached. A failure before the
//! merge stops with [`FlowError::Incomplete`] carrying the
//! [`ShipProgress`]; the branch, the pull request and the session state are
//! left as they are. Cleanup after the merge cannot undo anything, so its
//! failures are only warnings.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use branchflow_state::{SessionId, SessionState, WorkflowSession};

use crate::checks::{PostCheck, PostCondition, PreCheck};
use crate::code_host::{CiStatus, CodeHost, NewPullRequest, PrFilter, PullRequest};
use crate::error::{FlowError, Result};
use crate::obs;
use crate::ops::{active_session, current_branch};
use crate::pipeline::{Applied, CheckPlan, Collected, Env, Mutated, Operation, Request};

/// Push and merge the current session branch.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ship;

#[derive(Debug, Default)]
pub struct ShipParams {
    title: Option<String>,
    body: Option<String>,
}

/// How far a ship run got.
#[derive(Debug, Clone, Serialize)]
pub struct ShipProgress {
    pub branch: String,
    pub pushed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiStatus>,
    pub merged: bool,
    /// Last state the session was moved to.
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipOutput {
    pub session_id: SessionId,
    pub branch: String,
    pub base_branch: String,
    pub pull_request: PullRequest,
    pub ci: CiStatus,
    pub state: SessionState,
    /// Cleanup steps that failed after the merge.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup_failures: Vec<String>,
}

const CHECKS: [PreCheck; 5] = [
    PreCheck::ActiveSessionExists,
    PreCheck::OnNonBaseBranch,
    PreCheck::WorkingTreeClean,
    PreCheck::HasUnshippedCommits,
    PreCheck::NoClosedPullRequest,
];

/// Poll `ci_status` until it settles or `timeout` passes.
pub async fn wait_for_ci(
    host: &dyn CodeHost,
    pr: &PullRequest,
    timeout: Duration,
    interval: Duration,
) -> Result<CiStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        let status = host.ci_status(pr).await?;
        if status != CiStatus::Pending {
            return Ok(status);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(FlowError::Timeout {
                what: format!("CI on pull request #{}", pr.number),
                secs: timeout.as_secs(),
            });
        }
        debug!(pr = pr.number, "CI pending");
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

struct ShipRun<'a> {
    env: &'a Env,
    session: WorkflowSession,
    progress: ShipProgress,
}

impl ShipRun<'_> {
    fn stop(&self, message: String, remedy: &str) -> FlowError {
        let progress = serde_json::to_value(&self.progress).unwrap_or_default();
        FlowError::Incomplete {
            message,
            progress,
            remedy: Some(remedy.to_string()),
        }
    }

    async fn reach(&mut self, state: SessionState, trigger: &str) -> Result<()> {
        if self.session.advance_to(state, trigger)? {
            self.env.store.update(&self.session).await?;
        }
        self.progress.state = self.session.state();
        obs::emit_ship_step(self.session.branch(), state.as_str());
        Ok(())
    }

    async fn push(&mut self) -> Result<()> {
        let branch = self.progress.branch.clone();
        if let Err(e) = self.env.vcs.push(&self.env.config.remote, &branch, true).await {
            return Err(self.stop(
                format!("push of {branch} failed: {e}"),
                "fix the push error and run `branchflow ship` again",
            ));
        }
        self.progress.pushed = true;
        self.reach(SessionState::Pushed, "ship:push").await
    }

    async fn open_pull_request(&mut self, params: &ShipParams) -> Result<PullRequest> {
        let host = self.env.host.as_ref();
        let branch = self.progress.branch.clone();
        let existing = match host.find_pull_request(&branch, PrFilter::Open).await {
            Ok(pr) => pr,
            Err(e) => {
                return Err(self.stop(
                    format!("could not look up pull requests for {branch}: {e}"),
                    "check the code host settings and run `branchflow ship` again",
                ))
            }
        };
        let pr = match existing {
            Some(pr) => {
                info!(pr = pr.number, "reusing open pull request");
                pr
            }
            None => {
                let description = self.session.metadata.description.clone();
                let request = NewPullRequest {
                    title: params
                        .title
                        .clone()
                        .or(description.clone())
                        .unwrap_or_else(|| branch.clone()),
                    body: params.body.clone().or(description).unwrap_or_default(),
                    head: branch.clone(),
                    base: self.session.base_branch.clone(),
                };
                match host.create_pull_request(&request).await {
                    Ok(pr) => pr,
                    Err(e) => {
                        return Err(self.stop(
                            format!("could not open a pull request for {branch}: {e}"),
                            "the branch is pushed; run `branchflow ship` again once the host is reachable",
                        ))
                    }
                }
            }
        };
        self.session.metadata.pr_number = Some(pr.number);
        self.session.metadata.pr_url = Some(pr.url.clone());
        self.session.touch();
        self.progress.pull_request = Some(pr.clone());
        self.reach(SessionState::PrCreated, "ship:pull-request").await?;
        // metadata changes land even when the state was already reached
        self.env.store.update(&self.session).await?;
        Ok(pr)
    }

    async fn await_ci(&mut self, pr: &PullRequest) -> Result<(CiStatus, Vec<String>)> {
        let config = &self.env.config;
        let status = match wait_for_ci(
            self.env.host.as_ref(),
            pr,
            config.ci_timeout(),
            config.ci_poll_interval(),
        )
        .await
        {
            Ok(s) => s,
            Err(e) => {
                return Err(self.stop(
                    e.to_string(),
                    "the pull request stays open; check its CI run and run `branchflow ship` again",
                ))
            }
        };
        self.progress.ci = Some(status.clone());

        let mut warnings = Vec::new();
        match &status {
            CiStatus::Failure { summary } => {
                return Err(self.stop(
                    format!("CI failed on pull request #{}: {summary}", pr.number),
                    "fix the failing checks, commit, and run `branchflow ship` again",
                ))
            }
            CiStatus::NoChecks if self.env.config.allow_unchecked_merge => {
                warnings.push(format!("pull request #{} has no CI checks", pr.number))
            }
            CiStatus::NoChecks => {
                return Err(self.stop(
                    format!("pull request #{} has no CI checks to wait for", pr.number),
                    "add CI to the repository, or set allow_unchecked_merge in .branchflow/config.json",
                ))
            }
            CiStatus::Success | CiStatus::Pending => {}
        }
        self.reach(SessionState::ChecksPassing, "ship:ci").await?;
        self.reach(SessionState::ReadyToMerge, "ship:ci").await?;
        Ok((status, warnings))
    }

    async fn merge(&mut self, pr: &PullRequest) -> Result<()> {
        if let Err(e) = self.env.host.merge_pull_request(pr.number).await {
            return Err(self.stop(
                format!("merge of pull request #{} failed: {e}", pr.number),
                "resolve the merge problem on the host, then run `branchflow ship` again",
            ));
        }
        self.progress.merged = true;
        obs::emit_ship_step(&self.progress.branch, "merged");
        Ok(())
    }

    /// Back to base, fast-forward it, and drop the branch on both sides.
    async fn cleanup(&self) -> Vec<String> {
        let env = self.env;
        let base = self.session.base_branch.as_str();
        let remote = env.config.remote.as_str();
        let branch = self.progress.branch.as_str();
        let mut failures = Vec::new();

        let mut note = |step: &str, e: FlowError| {
            obs::emit_cleanup_warning(branch, &e);
            failures.push(format!("cleanup: {step} failed: {e}"));
        };

        match env.vcs.checkout(base).await {
            Ok(()) => {
                if let Err(e) = env.vcs.pull(remote, base).await {
                    note("pull base", e);
                }
                if let Err(e) = env.vcs.delete_branch(branch, true).await {
                    note("delete local branch", e);
                }
            }
            Err(e) => note("checkout base", e),
        }
        if let Err(e) = env.vcs.delete_remote_branch(remote, branch).await {
            note("delete remote branch", e);
        }
        failures
    }
}

#[async_trait]
impl Operation for Ship {
    type Params = ShipParams;
    type Context = ShipParams;
    type Output = ShipOutput;

    fn name(&self) -> &'static str {
        "ship"
    }

    async fn collect(&self, request: &Request, _env: &Env) -> Result<Collected<ShipParams>> {
        Ok(Collected::Ready(ShipParams {
            title: request.str_param("title"),
            body: request.str_param("body"),
        }))
    }

    async fn build_context(&self, params: ShipParams, _env: &Env) -> Result<ShipParams> {
        Ok(params)
    }

    fn pre_checks(&self, _params: &ShipParams) -> CheckPlan {
        CheckPlan::new(&CHECKS)
    }

    async fn mutate(
        &self,
        params: &ShipParams,
        applied: &Applied,
        env: &Env,
    ) -> Result<Mutated<ShipOutput>> {
        let branch = current_branch(env).await?;
        let mut session = active_session(env, &branch).await?;
        if let Some(stash) = &applied.stash_ref {
            session.metadata.stash_ref = Some(stash.clone());
            session.touch();
            env.store.update(&session).await?;
        }
        let mut run = ShipRun {
            env,
            progress: ShipProgress {
                branch: branch.clone(),
                pushed: false,
                pull_request: None,
                ci: None,
                merged: false,
                state: session.state(),
            },
            session,
        };

        run.push().await?;
        let pr = run.open_pull_request(params).await?;
        let (ci, mut warnings) = run.await_ci(&pr).await?;
        run.merge(&pr).await?;

        let cleanup_failures = run.cleanup().await;
        warnings.extend(cleanup_failures.iter().cloned());
        run.reach(SessionState::Complete, "ship:merge").await?;
        info!(branch = %branch, pr = pr.number, "shipped");

        Ok(Mutated::new(ShipOutput {
            session_id: run.session.id().clone(),
            branch,
            base_branch: run.session.base_branch.clone(),
            pull_request: pr,
            ci,
            state: run.session.state(),
            cleanup_failures,
        })
        .with_warnings(warnings))
    }

    fn post_checks(&self, _params: &ShipParams, output: &ShipOutput) -> Vec<PostCondition> {
        vec![
            PostCheck::SessionInState {
                id: output.session_id.clone(),
                state: SessionState::Complete,
            }
            .required(),
            PostCheck::PullRequestMerged {
                branch: output.branch.clone(),
            }
            .required(),
            PostCheck::OnBranch {
                branch: output.base_branch.clone(),
            }
            .advisory(),
            PostCheck::BranchDeleted {
                branch: output.branch.clone(),
            }
            .advisory(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_host::PrState;
    use crate::fakes::FakeCodeHost;

    #[tokio::test(start_paused = true)]
    async fn ci_wait_returns_first_settled_status() {
        let host = FakeCodeHost::new();
        let pr = host.with_pull("feature/x", "main", PrState::Open);
        host.script_ci([CiStatus::Pending, CiStatus::Pending]);

        let status = wait_for_ci(&host, &pr, Duration::from_secs(600), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(status, CiStatus::Success);
        assert_eq!(host.ci_polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn ci_wait_times_out() {
        let host = FakeCodeHost::new();
        let pr = host.with_pull("feature/x", "main", PrState::Open);
        host.set_ci_default(CiStatus::Pending);

        let err = wait_for_ci(&host, &pr, Duration::from_secs(90), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Timeout { secs: 90, .. }));
        // polls at 0, 30, 60 and 90 seconds
        assert_eq!(host.ci_polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn ci_failure_is_returned_not_raised() {
        let host = FakeCodeHost::new();
        let pr = host.with_pull("feature/x", "main", PrState::Open);
        host.script_ci([CiStatus::Failure {
            summary: "tests".to_string(),
        }]);
        let status = wait_for_ci(&host, &pr, Duration::from_secs(60), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(matches!(status, CiStatus::Failure { .. }));
    }
}
