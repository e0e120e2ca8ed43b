use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use branchflow_state::{SessionId, SessionState};

use crate::checks::{PostCheck, PostCondition, PreCheck};
use crate::error::Result;
use crate::ops::active_session;
use crate::pipeline::{
    Applied, CheckPlan, Collected, Elicitation, Env, Mutated, Operation, Request,
};

/// Switch the checkout to another active session's branch.
///
/// Changes stashed while resolving a dirty tree are parked on the session
/// being left; a stash parked on the target session is popped on arrival.
#[derive(Debug, Default, Clone, Copy)]
pub struct Swap;

#[derive(Debug)]
pub struct SwapContext {
    target: String,
    from: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwapOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    pub session_id: SessionId,
    pub state: SessionState,
    /// Stash left behind on the session that was switched away from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parked_stash: Option<String>,
    /// Whether the target session's parked changes were restored.
    pub restored_stash: bool,
}

#[async_trait]
impl Operation for Swap {
    type Params = String;
    type Context = SwapContext;
    type Output = SwapOutput;

    fn name(&self) -> &'static str {
        "swap"
    }

    async fn collect(&self, request: &Request, env: &Env) -> Result<Collected<String>> {
        if let Some(target) = request.str_param("branch") {
            return Ok(Collected::Ready(target));
        }
        let current = env.vcs.current_branch().await?;
        let sessions: Vec<_> = env
            .store
            .list(false)
            .await?
            .into_iter()
            .filter(|s| Some(s.branch()) != current.as_deref())
            .map(|s| {
                json!({
                    "branch": s.branch(),
                    "state": s.state(),
                    "kind": s.kind,
                    "description": s.metadata.description,
                })
            })
            .collect();
        Ok(Collected::Missing(Elicitation::new(
            "branch",
            "Which session do you want to switch to?",
            json!({ "current": current, "sessions": sessions }),
        )))
    }

    async fn build_context(&self, target: String, env: &Env) -> Result<SwapContext> {
        Ok(SwapContext {
            target,
            from: env.vcs.current_branch().await?,
        })
    }

    fn pre_checks(&self, ctx: &SwapContext) -> CheckPlan {
        CheckPlan::new(&[PreCheck::WorkingTreeClean, PreCheck::TargetSessionExists])
            .with_target(ctx.target.clone())
    }

    async fn mutate(
        &self,
        ctx: &SwapContext,
        applied: &Applied,
        env: &Env,
    ) -> Result<Mutated<SwapOutput>> {
        let mut warnings = Vec::new();

        let mut parked_stash = None;
        if let (Some(stash), Some(from)) = (&applied.stash_ref, &ctx.from) {
            match env.store.get_by_branch(from).await? {
                Some(mut leaving) if leaving.is_active() => {
                    leaving.metadata.stash_ref = Some(stash.clone());
                    leaving.touch();
                    env.store.update(&leaving).await?;
                    parked_stash = Some(stash.clone());
                }
                _ => warnings.push(format!(
                    "changes on {from} were stashed as {stash} but no session tracks them"
                )),
            }
        }

        env.vcs.checkout(&ctx.target).await?;

        let mut target = active_session(env, &ctx.target).await?;
        let mut restored_stash = false;
        if let Some(label) = target.metadata.stash_ref.clone() {
            match env.vcs.stash_pop(Some(&label)).await {
                Ok(popped) => {
                    if !popped {
                        warnings.push(format!("stash {label} for {} was not found", ctx.target));
                    }
                    restored_stash = popped;
                    target.metadata.stash_ref = None;
                    target.touch();
                    env.store.update(&target).await?;
                }
                Err(e) => {
                    warn!(stash = %label, error = %e, "could not restore stash");
                    warnings.push(format!("could not restore stash {label}: {e}"));
                }
            }
        }
        info!(from = ?ctx.from, to = %ctx.target, restored_stash, "swapped");

        Ok(Mutated::new(SwapOutput {
            from: ctx.from.clone(),
            to: ctx.target.clone(),
            session_id: target.id().clone(),
            state: target.state(),
            parked_stash,
            restored_stash,
        })
        .with_warnings(warnings))
    }

    fn post_checks(&self, ctx: &SwapContext, _output: &SwapOutput) -> Vec<PostCondition> {
        vec![PostCheck::OnBranch {
            branch: ctx.target.clone(),
        }
        .required()]
    }
}
