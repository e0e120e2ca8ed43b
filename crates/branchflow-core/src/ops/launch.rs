use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use branchflow_state::{SessionState, WorkflowKind, WorkflowSession};

use crate::checks::{PostCheck, PostCondition, PreCheck};
use crate::error::Result;
use crate::naming;
use crate::ops::active_session;
use crate::pipeline::{
    Applied, CheckPlan, Collected, Elicitation, Env, Mutated, Operation, Request,
};

/// Start a new branch and session. Also serves `hotfix` with a different
/// kind and prefix.
#[derive(Debug, Clone, Copy)]
pub struct Launch {
    kind: WorkflowKind,
}

impl Launch {
    pub fn feature() -> Self {
        Self {
            kind: WorkflowKind::Feature,
        }
    }

    pub fn hotfix() -> Self {
        Self {
            kind: WorkflowKind::Hotfix,
        }
    }
}

#[derive(Debug)]
pub struct LaunchParams {
    description: String,
    branch: Option<String>,
}

#[derive(Debug)]
pub struct LaunchContext {
    description: String,
    branch: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchOutput {
    pub session: WorkflowSession,
    pub branch: String,
    /// Branch the new one was created from, when it was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_from: Option<String>,
    /// An existing session was checked out instead of starting one.
    pub resumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash_ref: Option<String>,
}

const CHECKS: [PreCheck; 6] = [
    PreCheck::BranchNameValid,
    PreCheck::OnBaseBranch,
    PreCheck::WorkingTreeClean,
    PreCheck::BaseBranchSynced,
    PreCheck::BranchNameAvailable,
    PreCheck::NoActiveSessionOnBranch,
];

/// Hand a launch-time stash to the active session it was taken from.
/// Returns false when no session owns that branch.
async fn park_on_origin(env: &Env, applied: &Applied, stash: &str) -> Result<bool> {
    let Some(origin) = applied.stash_origin.as_deref() else {
        return Ok(false);
    };
    match env.store.get_by_branch(origin).await? {
        Some(mut owner) if owner.is_active() => {
            owner.metadata.stash_ref = Some(stash.to_string());
            owner.touch();
            env.store.update(&owner).await?;
            info!(branch = %origin, stash = %stash, "parked stash on session");
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[async_trait]
impl Operation for Launch {
    type Params = LaunchParams;
    type Context = LaunchContext;
    type Output = LaunchOutput;

    fn name(&self) -> &'static str {
        match self.kind {
            WorkflowKind::Feature => "launch",
            WorkflowKind::Hotfix => "hotfix",
        }
    }

    async fn collect(&self, request: &Request, env: &Env) -> Result<Collected<LaunchParams>> {
        let branch = request.str_param("branch");
        let description = request.str_param("description").or_else(|| branch.clone());
        let Some(description) = description else {
            let prompt = match self.kind {
                WorkflowKind::Feature => "What are you working on?",
                WorkflowKind::Hotfix => "What needs fixing?",
            };
            return Ok(Collected::Missing(Elicitation::new(
                "description",
                prompt,
                json!({
                    "kind": self.kind,
                    "prefix": env.config.prefix_for(self.kind),
                    "base_branch": env.config.base_branch,
                }),
            )));
        };
        Ok(Collected::Ready(LaunchParams {
            description,
            branch,
        }))
    }

    async fn build_context(&self, params: LaunchParams, env: &Env) -> Result<LaunchContext> {
        let branch = match params.branch {
            Some(b) => b,
            None => naming::branch_name(env.config.prefix_for(self.kind), &params.description)?,
        };
        Ok(LaunchContext {
            description: params.description,
            branch,
        })
    }

    fn pre_checks(&self, ctx: &LaunchContext) -> CheckPlan {
        CheckPlan::new(&CHECKS).with_target(ctx.branch.clone())
    }

    async fn mutate(
        &self,
        ctx: &LaunchContext,
        applied: &Applied,
        env: &Env,
    ) -> Result<Mutated<LaunchOutput>> {
        if let Some(branch) = &applied.resumed {
            let session = active_session(env, branch).await?;
            info!(branch = %branch, session = %session.id(), "resumed existing session");
            return Ok(Mutated::new(LaunchOutput {
                session,
                branch: branch.clone(),
                created_from: None,
                resumed: true,
                stash_ref: applied.stash_ref.clone(),
            }));
        }

        let start = applied
            .branch_from
            .clone()
            .unwrap_or_else(|| env.config.base_branch.clone());
        let created_from = if env.vcs.branch_exists(&ctx.branch).await? {
            None
        } else {
            env.vcs.create_branch(&ctx.branch, &start).await?;
            Some(start)
        };
        env.vcs.checkout(&ctx.branch).await?;

        let mut session = WorkflowSession::new(
            ctx.branch.clone(),
            env.config.base_branch.clone(),
            self.kind,
        )
        .with_description(ctx.description.clone());
        if let Some(stash) = &applied.stash_ref {
            if !park_on_origin(env, applied, stash).await? {
                session.metadata.stash_ref = Some(stash.clone());
            }
        }
        if let Some(from) = &created_from {
            session
                .metadata
                .extra
                .insert("start_point".to_string(), json!(from));
        }
        env.store.create(&session).await?;
        info!(branch = %ctx.branch, session = %session.id(), kind = %self.kind, "session launched");

        Ok(Mutated::new(LaunchOutput {
            session,
            branch: ctx.branch.clone(),
            created_from,
            resumed: false,
            stash_ref: applied.stash_ref.clone(),
        }))
    }

    fn post_checks(&self, _ctx: &LaunchContext, output: &LaunchOutput) -> Vec<PostCondition> {
        let id = output.session.id().clone();
        let mut conditions = vec![
            PostCheck::SessionRecorded { id: id.clone() }.required(),
            PostCheck::OnBranch {
                branch: output.branch.clone(),
            }
            .required(),
        ];
        if !output.resumed {
            conditions.push(
                PostCheck::SessionInState {
                    id,
                    state: SessionState::BranchReady,
                }
                .required(),
            );
        }
        conditions
    }
}
