//! Read-only operations. They run through the pipeline for the init check
//! and the uniform outcome shape, with no pre- or post-checks.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use branchflow_state::{SessionState, WorkflowSession};

use crate::checks::PostCondition;
use crate::error::Result;
use crate::pipeline::{Applied, CheckPlan, Collected, Env, Mutated, Operation, Request};
use crate::vcs::RepoStatus;

/// Session and working tree status for one branch (default: current).
#[derive(Debug, Default, Clone, Copy)]
pub struct Status;

#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub base_branch: String,
    pub session: Option<WorkflowSession>,
    /// Where the session can go next.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub next_states: Vec<SessionState>,
    pub working_tree: RepoStatus,
    /// Commits on the branch not on base.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unshipped: Option<u32>,
}

#[async_trait]
impl Operation for Status {
    type Params = Option<String>;
    type Context = Option<String>;
    type Output = StatusOutput;

    fn name(&self) -> &'static str {
        "status"
    }

    async fn collect(&self, request: &Request, _env: &Env) -> Result<Collected<Option<String>>> {
        Ok(Collected::Ready(request.str_param("branch")))
    }

    async fn build_context(&self, branch: Option<String>, env: &Env) -> Result<Option<String>> {
        match branch {
            Some(b) => Ok(Some(b)),
            None => env.vcs.current_branch().await,
        }
    }

    fn pre_checks(&self, _branch: &Option<String>) -> CheckPlan {
        CheckPlan::default()
    }

    async fn mutate(
        &self,
        branch: &Option<String>,
        _applied: &Applied,
        env: &Env,
    ) -> Result<Mutated<StatusOutput>> {
        let base = env.config.base_branch.clone();
        let session = match branch {
            Some(b) => env.store.get_by_branch(b).await?,
            None => None,
        };
        let unshipped = match branch.as_deref() {
            Some(b) if b != base => match env.vcs.ahead_behind(b, &base).await {
                Ok(ab) => Some(ab.ahead),
                Err(e) => {
                    warn!(branch = %b, error = %e, "could not count unshipped commits");
                    None
                }
            },
            _ => None,
        };
        Ok(Mutated::new(StatusOutput {
            branch: branch.clone(),
            base_branch: base,
            next_states: session
                .as_ref()
                .map(WorkflowSession::allowed_transitions)
                .unwrap_or_default(),
            session,
            working_tree: env.vcs.status().await?,
            unshipped,
        }))
    }

    fn post_checks(&self, _branch: &Option<String>, _output: &StatusOutput) -> Vec<PostCondition> {
        Vec::new()
    }
}

/// Every session, optionally including finished ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct List;

#[derive(Debug, Clone, Serialize)]
pub struct ListOutput {
    pub count: usize,
    pub sessions: Vec<WorkflowSession>,
}

#[async_trait]
impl Operation for List {
    type Params = bool;
    type Context = bool;
    type Output = ListOutput;

    fn name(&self) -> &'static str {
        "list"
    }

    async fn collect(&self, request: &Request, _env: &Env) -> Result<Collected<bool>> {
        Ok(Collected::Ready(
            request.bool_param("include_terminal").unwrap_or(false),
        ))
    }

    async fn build_context(&self, include_terminal: bool, _env: &Env) -> Result<bool> {
        Ok(include_terminal)
    }

    fn pre_checks(&self, _include_terminal: &bool) -> CheckPlan {
        CheckPlan::default()
    }

    async fn mutate(
        &self,
        include_terminal: &bool,
        _applied: &Applied,
        env: &Env,
    ) -> Result<Mutated<ListOutput>> {
        let sessions = env.store.list(*include_terminal).await?;
        Ok(Mutated::new(ListOutput {
            count: sessions.len(),
            sessions,
        }))
    }

    fn post_checks(&self, _include_terminal: &bool, _output: &ListOutput) -> Vec<PostCondition> {
        Vec::new()
    }
}
