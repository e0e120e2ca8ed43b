use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use branchflow_state::{SessionId, SessionState};

use crate::checks::{PostCheck, PostCondition, PreCheck};
use crate::error::Result;
use crate::ops::{active_session, current_branch};
use crate::pipeline::{Applied, CheckPlan, Collected, Env, Mutated, Operation, Request};

/// End a session without shipping it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Abort;

#[derive(Debug)]
pub struct AbortParams {
    branch: Option<String>,
    delete_branch: bool,
}

#[derive(Debug)]
pub struct AbortContext {
    branch: String,
    on_branch: bool,
    delete_branch: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AbortOutput {
    pub session_id: SessionId,
    pub branch: String,
    /// Branch checked out afterwards, when the checkout moved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_out: Option<String>,
    pub branch_deleted: bool,
}

#[async_trait]
impl Operation for Abort {
    type Params = AbortParams;
    type Context = AbortContext;
    type Output = AbortOutput;

    fn name(&self) -> &'static str {
        "abort"
    }

    async fn collect(&self, request: &Request, _env: &Env) -> Result<Collected<AbortParams>> {
        Ok(Collected::Ready(AbortParams {
            branch: request.str_param("branch"),
            delete_branch: request.bool_param("delete_branch").unwrap_or(false),
        }))
    }

    async fn build_context(&self, params: AbortParams, env: &Env) -> Result<AbortContext> {
        let current = env.vcs.current_branch().await?;
        let branch = match params.branch {
            Some(b) => b,
            None => current_branch(env).await?,
        };
        Ok(AbortContext {
            on_branch: current.as_deref() == Some(branch.as_str()),
            branch,
            delete_branch: params.delete_branch,
        })
    }

    fn pre_checks(&self, ctx: &AbortContext) -> CheckPlan {
        if ctx.on_branch {
            CheckPlan::new(&[PreCheck::ActiveSessionExists])
        } else {
            CheckPlan::new(&[PreCheck::TargetSessionExists]).with_target(ctx.branch.clone())
        }
    }

    async fn mutate(
        &self,
        ctx: &AbortContext,
        _applied: &Applied,
        env: &Env,
    ) -> Result<Mutated<AbortOutput>> {
        let mut session = active_session(env, &ctx.branch).await?;
        session.abort("abort")?;
        env.store.update(&session).await?;
        info!(branch = %ctx.branch, session = %session.id(), "session aborted");

        let mut warnings = Vec::new();
        let mut checked_out = None;
        let mut off_branch = !ctx.on_branch;
        if ctx.on_branch {
            let base = &session.base_branch;
            match env.vcs.checkout(base).await {
                Ok(()) => {
                    checked_out = Some(base.clone());
                    off_branch = true;
                }
                Err(e) => {
                    warn!(branch = %base, error = %e, "could not leave aborted branch");
                    warnings.push(format!("could not check out {base}: {e}"));
                }
            }
        }

        let mut branch_deleted = false;
        if ctx.delete_branch {
            if !off_branch {
                warnings.push(format!("{} is still checked out; not deleted", ctx.branch));
            } else {
                match env.vcs.delete_branch(&ctx.branch, true).await {
                    Ok(()) => branch_deleted = true,
                    Err(e) => warnings.push(format!("could not delete {}: {e}", ctx.branch)),
                }
            }
        }

        Ok(Mutated::new(AbortOutput {
            session_id: session.id().clone(),
            branch: ctx.branch.clone(),
            checked_out,
            branch_deleted,
        })
        .with_warnings(warnings))
    }

    fn post_checks(&self, ctx: &AbortContext, output: &AbortOutput) -> Vec<PostCondition> {
        let mut conditions = vec![
            PostCheck::SessionInState {
                id: output.session_id.clone(),
                state: SessionState::Aborted,
            }
            .required(),
            PostCheck::NoActiveSession {
                branch: output.branch.clone(),
            }
            .required(),
        ];
        if ctx.delete_branch {
            conditions.push(
                PostCheck::BranchDeleted {
                    branch: output.branch.clone(),
                }
                .advisory(),
            );
        }
        conditions
    }
}
