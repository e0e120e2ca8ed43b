use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use branchflow_state::{SessionId, SessionState};

use crate::checks::{PostCheck, PostCondition, PreCheck};
use crate::error::Result;
use crate::ops::{active_session, current_branch};
use crate::pipeline::{
    Applied, CheckPlan, Collected, Elicitation, Env, Mutated, Operation, Request,
};

/// Diff text included in a message elicitation is cut to this many bytes.
const MAX_DIFF_BYTES: usize = 16 * 1024;

/// Stage everything and commit it on the session branch.
#[derive(Debug, Default, Clone, Copy)]
pub struct Commit;

#[derive(Debug, Clone, Serialize)]
pub struct CommitOutput {
    pub session_id: SessionId,
    pub branch: String,
    pub sha: String,
    pub state: SessionState,
    /// Whether this commit moved the session forward.
    pub transitioned: bool,
}

const CHECKS: [PreCheck; 4] = [
    PreCheck::ActiveSessionExists,
    PreCheck::OnNonBaseBranch,
    PreCheck::HasUncommittedChanges,
    PreCheck::NoMergeConflicts,
];

fn clip(mut diff: String) -> (String, bool) {
    if diff.len() <= MAX_DIFF_BYTES {
        return (diff, false);
    }
    let mut cut = MAX_DIFF_BYTES;
    while !diff.is_char_boundary(cut) {
        cut -= 1;
    }
    diff.truncate(cut);
    (diff, true)
}

#[async_trait]
impl Operation for Commit {
    type Params = String;
    type Context = String;
    type Output = CommitOutput;

    fn name(&self) -> &'static str {
        "commit"
    }

    async fn collect(&self, request: &Request, env: &Env) -> Result<Collected<String>> {
        if let Some(message) = request.str_param("message") {
            return Ok(Collected::Ready(message));
        }
        let files = env.vcs.status().await?.changed_files();
        let (diff, truncated) = clip(env.vcs.diff().await?);
        Ok(Collected::Missing(Elicitation::new(
            "message",
            "Describe the change in a commit message",
            json!({ "files": files, "diff": diff, "diff_truncated": truncated }),
        )))
    }

    async fn build_context(&self, message: String, _env: &Env) -> Result<String> {
        Ok(message)
    }

    fn pre_checks(&self, _message: &String) -> CheckPlan {
        CheckPlan::new(&CHECKS)
    }

    async fn mutate(
        &self,
        message: &String,
        _applied: &Applied,
        env: &Env,
    ) -> Result<Mutated<CommitOutput>> {
        let branch = current_branch(env).await?;
        let mut session = active_session(env, &branch).await?;

        let sha = env.vcs.commit_all(message).await?;
        session.metadata.last_commit = Some(sha.clone());
        let transitioned = session.advance_to(SessionState::ChangesCommitted, "commit")?;
        if !transitioned {
            session.touch();
        }
        env.store.update(&session).await?;
        info!(branch = %branch, sha = %sha, state = %session.state(), "committed");

        Ok(Mutated::new(CommitOutput {
            session_id: session.id().clone(),
            branch,
            sha,
            state: session.state(),
            transitioned,
        }))
    }

    fn post_checks(&self, _message: &String, output: &CommitOutput) -> Vec<PostCondition> {
        vec![
            PostCheck::SessionInState {
                id: output.session_id.clone(),
                state: output.state,
            }
            .required(),
            PostCheck::WorkingTreeClean.required(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_short_diffs() {
        let (diff, truncated) = clip("diff --git a/x b/x\n".to_string());
        assert!(!truncated);
        assert!(diff.starts_with("diff"));
    }

    #[test]
    fn clip_cuts_on_char_boundary() {
        let long = "é".repeat(MAX_DIFF_BYTES);
        let (diff, truncated) = clip(long);
        assert!(truncated);
        assert!(diff.len() <= MAX_DIFF_BYTES);
    }
}
