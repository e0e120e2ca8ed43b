//! Picking and applying resolutions for recoverable pre-check failures.

use std::collections::BTreeMap;

use tracing::{debug, info};

use branchflow_state::SessionId;

use crate::checks::{CheckResult, ResolutionAction, ResolutionOption, VerificationReport};
use crate::error::{FlowError, Result};
use crate::pipeline::outcome::{AppliedResolution, PendingChoice};
use crate::pipeline::Env;

/// One recoverable check and the option chosen for it.
#[derive(Debug, Clone)]
pub(crate) struct Chosen {
    pub check: String,
    pub option: ResolutionOption,
}

#[derive(Debug)]
pub(crate) enum Selection {
    Proceed(Vec<Chosen>),
    NeedsChoice(Vec<PendingChoice>),
    Rejected(String),
}

fn pending(result: &CheckResult) -> PendingChoice {
    PendingChoice {
        check: result.name.clone(),
        message: result.message.clone(),
        options: result.options.clone(),
    }
}

/// Decide how every recoverable result in `pre` gets resolved.
///
/// Explicit choices win. In auto mode the recommended option is taken, and a
/// result without one rejects the run. Otherwise any unanswered result turns
/// the run into a choice over every recoverable check.
pub(crate) fn select_resolutions(
    pre: &VerificationReport,
    auto: bool,
    explicit: &BTreeMap<String, String>,
) -> Selection {
    let mut chosen = Vec::new();
    let mut unanswered = false;

    for result in pre.recoverable_results() {
        if let Some(id) = explicit.get(&result.name) {
            let Some(option) = result.option(id) else {
                let known: Vec<&str> = result.options.iter().map(|o| o.id.as_str()).collect();
                return Selection::Rejected(format!(
                    "unknown option {id:?} for {}; expected one of: {}",
                    result.name,
                    known.join(", ")
                ));
            };
            chosen.push(Chosen {
                check: result.name.clone(),
                option: option.clone(),
            });
        } else if auto {
            let Some(option) = result.recommended_option() else {
                return Selection::Rejected(format!(
                    "{}: {} (no safe option to apply automatically)",
                    result.name, result.message
                ));
            };
            chosen.push(Chosen {
                check: result.name.clone(),
                option: option.clone(),
            });
        } else {
            unanswered = true;
        }
    }

    if unanswered {
        return Selection::NeedsChoice(pre.recoverable_results().map(pending).collect());
    }
    Selection::Proceed(chosen)
}

/// Side effects of applied resolutions that the mutation needs to know.
#[derive(Debug, Clone, Default)]
pub struct Applied {
    pub resolutions: Vec<AppliedResolution>,
    /// Label of a stash created while resolving.
    pub stash_ref: Option<String>,
    /// Branch that was checked out when the stash was made.
    pub stash_origin: Option<String>,
    /// Start point to branch from instead of base.
    pub branch_from: Option<String>,
    /// Branch of an existing session that was checked out instead.
    pub resumed: Option<String>,
    pub aborted: Vec<SessionId>,
}

/// Label for a stash parking the changes of `branch`.
pub(crate) fn stash_label(branch: Option<&str>) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("branchflow/{}/{}", branch.unwrap_or("detached"), &id[..8])
}

async fn stash(env: &Env, applied: &mut Applied) -> Result<()> {
    if env.vcs.status().await?.is_clean() {
        debug!("working tree already clean, nothing to stash");
        return Ok(());
    }
    let current = env.vcs.current_branch().await?;
    let label = stash_label(current.as_deref());
    let label = env.vcs.stash_push(&label).await?;
    info!(stash = %label, "stashed uncommitted changes");
    applied.stash_ref = Some(label);
    applied.stash_origin = current;
    Ok(())
}

async fn apply_one(env: &Env, action: &ResolutionAction, applied: &mut Applied) -> Result<()> {
    let base = env.config.base_branch.as_str();
    match action {
        ResolutionAction::KeepChanges | ResolutionAction::ProceedAnyway => {}
        ResolutionAction::StashChanges => stash(env, applied).await?,
        ResolutionAction::DiscardChanges => env.vcs.discard_changes().await?,
        ResolutionAction::SwitchToBase => env.vcs.checkout(base).await?,
        ResolutionAction::StashAndSwitchToBase => {
            stash(env, applied).await?;
            env.vcs.checkout(base).await?;
        }
        ResolutionAction::BranchFromCurrent => {
            let current = env.vcs.current_branch().await?.ok_or_else(|| {
                FlowError::Resolution("HEAD is detached, nothing to branch from".to_string())
            })?;
            applied.branch_from = Some(current);
        }
        ResolutionAction::PullBase => env.vcs.pull(&env.config.remote, base).await?,
        ResolutionAction::ResumeSession { branch } => {
            env.vcs.checkout(branch).await?;
            applied.resumed = Some(branch.clone());
        }
        ResolutionAction::AbortExistingSession { session_id } => {
            let id = SessionId(session_id.clone());
            let mut session = env
                .store
                .get(&id)
                .await?
                .ok_or_else(|| FlowError::Resolution(format!("session {id} not found")))?;
            session.abort("resolve:abort-existing")?;
            env.store.update(&session).await?;
            applied.aborted.push(id);
        }
    }
    Ok(())
}

/// Apply `chosen` in order. The first failure stops the run.
pub(crate) async fn apply_resolutions(env: &Env, chosen: Vec<Chosen>) -> Result<Applied> {
    let mut applied = Applied::default();
    for Chosen { check, option } in chosen {
        debug!(check = %check, option = %option.id, "applying resolution");
        apply_one(env, &option.action, &mut applied)
            .await
            .map_err(|e| FlowError::Resolution(format!("{} for {check}: {e}", option.id)))?;
        applied.resolutions.push(AppliedResolution {
            check,
            option_id: option.id,
            action: option.action,
        });
    }
    Ok(applied)
}
