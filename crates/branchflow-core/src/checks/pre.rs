//! Pre-condition check catalogue.
//!
//! Every check is a pure function of a [`CheckContext`]. The catalogue is a
//! closed enum; [`PreCheck::evaluator`] maps each variant to its function
//! through an exhaustive match.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::checks::facts::{CheckContext, FactNeeds};
use crate::checks::{CheckResult, ResolutionAction, ResolutionOption, RiskTier, VerificationReport};

/// Named pre-condition checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreCheck {
    OnBaseBranch,
    WorkingTreeClean,
    BaseBranchSynced,
    NoActiveSessionOnBranch,
    BranchNameAvailable,
    BranchNameValid,
    ActiveSessionExists,
    OnNonBaseBranch,
    HasUncommittedChanges,
    HasUnshippedCommits,
    NoMergeConflicts,
    NoClosedPullRequest,
    TargetSessionExists,
}

/// Signature shared by every check.
pub type CheckFn = fn(&CheckContext) -> CheckResult;

impl PreCheck {
    pub const ALL: [PreCheck; 13] = [
        PreCheck::OnBaseBranch,
        PreCheck::WorkingTreeClean,
        PreCheck::BaseBranchSynced,
        PreCheck::NoActiveSessionOnBranch,
        PreCheck::BranchNameAvailable,
        PreCheck::BranchNameValid,
        PreCheck::ActiveSessionExists,
        PreCheck::OnNonBaseBranch,
        PreCheck::HasUncommittedChanges,
        PreCheck::HasUnshippedCommits,
        PreCheck::NoMergeConflicts,
        PreCheck::NoClosedPullRequest,
        PreCheck::TargetSessionExists,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::OnBaseBranch => "on-base-branch",
            Self::WorkingTreeClean => "working-tree-clean",
            Self::BaseBranchSynced => "base-branch-synced",
            Self::NoActiveSessionOnBranch => "no-active-session-on-branch",
            Self::BranchNameAvailable => "branch-name-available",
            Self::BranchNameValid => "branch-name-valid",
            Self::ActiveSessionExists => "active-session-exists",
            Self::OnNonBaseBranch => "on-non-base-branch",
            Self::HasUncommittedChanges => "has-uncommitted-changes",
            Self::HasUnshippedCommits => "has-unshipped-commits",
            Self::NoMergeConflicts => "no-merge-conflicts",
            Self::NoClosedPullRequest => "no-closed-pull-request",
            Self::TargetSessionExists => "target-session-exists",
        }
    }

    /// The function implementing this check.
    pub fn evaluator(self) -> CheckFn {
        match self {
            Self::OnBaseBranch => on_base_branch,
            Self::WorkingTreeClean => working_tree_clean,
            Self::BaseBranchSynced => base_branch_synced,
            Self::NoActiveSessionOnBranch => no_active_session_on_branch,
            Self::BranchNameAvailable => branch_name_available,
            Self::BranchNameValid => branch_name_valid,
            Self::ActiveSessionExists => active_session_exists,
            Self::OnNonBaseBranch => on_non_base_branch,
            Self::HasUncommittedChanges => has_uncommitted_changes,
            Self::HasUnshippedCommits => has_unshipped_commits,
            Self::NoMergeConflicts => no_merge_conflicts,
            Self::NoClosedPullRequest => no_closed_pull_request,
            Self::TargetSessionExists => target_session_exists,
        }
    }

    /// Facts the check reads.
    pub fn needs(self) -> FactNeeds {
        let none = FactNeeds::default();
        match self {
            Self::OnBaseBranch
            | Self::WorkingTreeClean
            | Self::HasUncommittedChanges
            | Self::NoMergeConflicts => FactNeeds {
                status: true,
                ..none
            },
            Self::BaseBranchSynced => FactNeeds {
                base_sync: true,
                ..none
            },
            Self::NoActiveSessionOnBranch | Self::TargetSessionExists => FactNeeds {
                target_session: true,
                ..none
            },
            Self::BranchNameAvailable => FactNeeds {
                branches: true,
                target_session: true,
                ..none
            },
            Self::ActiveSessionExists => FactNeeds {
                current_session: true,
                ..none
            },
            Self::HasUnshippedCommits => FactNeeds {
                unshipped: true,
                ..none
            },
            Self::NoClosedPullRequest => FactNeeds {
                closed_pr: true,
                ..none
            },
            Self::BranchNameValid | Self::OnNonBaseBranch => none,
        }
    }

    pub fn evaluate(self, ctx: &CheckContext) -> CheckResult {
        (self.evaluator())(ctx)
    }

    /// Combined needs of `checks`.
    pub fn needs_all(checks: &[PreCheck]) -> FactNeeds {
        checks
            .iter()
            .fold(FactNeeds::default(), |acc, c| acc.union(c.needs()))
    }
}

impl std::fmt::Display for PreCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Evaluate `checks` in order.
pub fn run_pre_checks(checks: &[PreCheck], ctx: &CheckContext) -> VerificationReport {
    checks.iter().map(|c| c.evaluate(ctx)).collect()
}

fn current_label(ctx: &CheckContext) -> String {
    ctx.facts
        .current_branch
        .clone()
        .unwrap_or_else(|| "a detached HEAD".to_string())
}

fn on_base_branch(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::OnBaseBranch.name();
    if ctx.on_base() {
        return CheckResult::pass(name, format!("on base branch {}", ctx.base_branch));
    }

    let mut options = Vec::new();
    if ctx.facts.status.is_clean() {
        options.push(ResolutionOption::new(
            "switch",
            "Switch to base",
            format!("Check out {} before branching", ctx.base_branch),
            ResolutionAction::SwitchToBase,
            RiskTier::Low,
        ));
    } else {
        options.push(ResolutionOption::new(
            "stash-and-switch",
            "Stash and switch to base",
            format!(
                "Stash uncommitted changes, then check out {}",
                ctx.base_branch
            ),
            ResolutionAction::StashAndSwitchToBase,
            RiskTier::Low,
        ));
    }
    if ctx.facts.current_branch.is_some() {
        options.push(ResolutionOption::new(
            "branch-from-current",
            "Branch from current",
            format!("Start the new branch from {}", current_label(ctx)),
            ResolutionAction::BranchFromCurrent,
            RiskTier::Medium,
        ));
    }

    CheckResult::recoverable(
        name,
        format!(
            "on {}, not on base branch {}",
            current_label(ctx),
            ctx.base_branch
        ),
        options,
    )
}

fn working_tree_clean(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::WorkingTreeClean.name();
    let status = &ctx.facts.status;
    if status.is_clean() {
        return CheckResult::pass(name, "working tree is clean");
    }
    let files = status.changed_files();
    let detail = json!({ "files": files });
    if ctx.overrides.allow_dirty {
        return CheckResult::advisory(
            name,
            format!("{} uncommitted change(s) allowed by override", files.len()),
        )
        .with_detail(detail);
    }

    let discard = ResolutionOption::new(
        "discard",
        "Discard changes",
        "Throw away every uncommitted change",
        ResolutionAction::DiscardChanges,
        RiskTier::High,
    );
    // git refuses to stash or carry unmerged paths across a checkout.
    let unmerged = status.conflicted.len();
    if unmerged > 0 {
        return CheckResult::recoverable(
            name,
            format!(
                "working tree has {} uncommitted change(s), {unmerged} unmerged",
                files.len()
            ),
            vec![discard],
        )
        .with_remedy("finish or abort the merge, then run the command again")
        .with_detail(detail);
    }

    CheckResult::recoverable(
        name,
        format!("working tree has {} uncommitted change(s)", files.len()),
        vec![
            ResolutionOption::new(
                "stash",
                "Stash changes",
                "Stash the changes; they are restored when you swap back",
                ResolutionAction::StashChanges,
                RiskTier::Low,
            ),
            ResolutionOption::new(
                "keep",
                "Keep changes",
                "Leave the changes in the working tree and continue",
                ResolutionAction::KeepChanges,
                RiskTier::Medium,
            ),
            discard,
        ],
    )
    .with_detail(detail)
}

fn base_branch_synced(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::BaseBranchSynced.name();
    let base = &ctx.base_branch;
    if ctx.overrides.skip_sync {
        return CheckResult::pass(name, format!("sync check for {base} skipped"));
    }
    let Some(sync) = ctx.facts.base_sync else {
        let why = ctx
            .facts
            .base_sync_error
            .as_deref()
            .unwrap_or("remote not reachable");
        return CheckResult::warning(name, format!("could not verify {base} is up to date: {why}"));
    };
    let detail = json!({ "ahead": sync.ahead, "behind": sync.behind });

    if sync.behind > 0 {
        return CheckResult::recoverable(
            name,
            format!("{base} is {} commit(s) behind the remote", sync.behind),
            vec![
                ResolutionOption::new(
                    "pull",
                    "Pull base",
                    format!("Fast-forward {base} from the remote"),
                    ResolutionAction::PullBase,
                    RiskTier::Low,
                ),
                ResolutionOption::new(
                    "proceed-anyway",
                    "Proceed anyway",
                    format!("Branch from the stale {base}"),
                    ResolutionAction::ProceedAnyway,
                    RiskTier::Medium,
                ),
            ],
        )
        .with_detail(detail);
    }
    if sync.ahead > 0 {
        return CheckResult::advisory(
            name,
            format!("{base} has {} unpushed commit(s)", sync.ahead),
        )
        .with_detail(detail);
    }
    CheckResult::pass(name, format!("{base} is up to date"))
}

fn no_active_session_on_branch(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::NoActiveSessionOnBranch.name();
    let Some(target) = ctx.target_branch.as_deref() else {
        return CheckResult::pass(name, "no target branch");
    };
    match ctx.facts.target_session.as_ref().filter(|s| s.is_active()) {
        None => CheckResult::pass(name, format!("no active session on {target}")),
        Some(session) => CheckResult::recoverable(
            name,
            format!(
                "{target} already has an active session in state {}",
                session.state()
            ),
            vec![
                ResolutionOption::new(
                    "resume",
                    "Resume session",
                    format!("Check out {target} and continue the existing session"),
                    ResolutionAction::ResumeSession {
                        branch: target.to_string(),
                    },
                    RiskTier::Low,
                ),
                ResolutionOption::new(
                    "abort-existing",
                    "Abort existing session",
                    "Abort the existing session and start a new one on the same branch",
                    ResolutionAction::AbortExistingSession {
                        session_id: session.id().to_string(),
                    },
                    RiskTier::High,
                ),
            ],
        )
        .with_detail(json!({
            "session_id": session.id(),
            "state": session.state(),
        })),
    }
}

fn branch_name_available(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::BranchNameAvailable.name();
    let Some(target) = ctx.target_branch.as_deref() else {
        return CheckResult::error(name, "no branch name given");
    };
    if !ctx.facts.local_branches.iter().any(|b| b == target) {
        return CheckResult::pass(name, format!("{target} is available"));
    }
    let owned = ctx
        .facts
        .target_session
        .as_ref()
        .is_some_and(|s| s.is_active());
    if owned {
        return CheckResult::pass(name, format!("{target} belongs to an active session"));
    }
    CheckResult::error(name, format!("branch {target} already exists"))
        .with_remedy("choose a different description or branch name")
}

fn branch_name_valid(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::BranchNameValid.name();
    let Some(target) = ctx.target_branch.as_deref() else {
        return CheckResult::error(name, "no branch name given");
    };
    match validate_branch_name(target) {
        Ok(()) => CheckResult::pass(name, format!("{target} is a valid branch name")),
        Err(reason) => CheckResult::error(name, format!("invalid branch name {target:?}: {reason}")),
    }
}

static ALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._/+-]+$").expect("branch charset pattern compiles"));

/// Apply git's ref-name rules, restricted to a portable character set.
pub fn validate_branch_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty".to_string());
    }
    if !ALLOWED_CHARS.is_match(name) {
        return Err("only letters, digits, '.', '_', '-', '+' and '/' are allowed".to_string());
    }
    if name.starts_with('-') || name.starts_with('/') || name.ends_with('/') {
        return Err("must not start with '-' or start/end with '/'".to_string());
    }
    if name.contains("..") || name.contains("//") {
        return Err("must not contain '..' or '//'".to_string());
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return Err("must not end with '.' or '.lock'".to_string());
    }
    if name.split('/').any(|part| part.starts_with('.')) {
        return Err("path components must not start with '.'".to_string());
    }
    Ok(())
}

fn active_session_exists(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::ActiveSessionExists.name();
    match &ctx.facts.current_session {
        Some(session) => CheckResult::pass(
            name,
            format!("session {} is {}", session.id(), session.state()),
        )
        .with_detail(json!({ "session_id": session.id(), "state": session.state() })),
        None => CheckResult::error(
            name,
            format!("no active session on {}", current_label(ctx)),
        )
        .with_remedy("run `branchflow launch` or `branchflow swap <branch>`"),
    }
}

fn on_non_base_branch(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::OnNonBaseBranch.name();
    match ctx.facts.current_branch.as_deref() {
        None => CheckResult::error(name, "HEAD is detached"),
        Some(b) if b == ctx.base_branch => {
            CheckResult::error(name, format!("on base branch {b}"))
                .with_remedy("switch to a feature branch first")
        }
        Some(b) => CheckResult::pass(name, format!("on {b}")),
    }
}

fn has_uncommitted_changes(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::HasUncommittedChanges.name();
    let files = ctx.facts.status.changed_files();
    if files.is_empty() {
        return CheckResult::error(name, "nothing to commit, working tree clean");
    }
    CheckResult::pass(name, format!("{} file(s) to commit", files.len()))
        .with_detail(json!({ "files": files }))
}

fn has_unshipped_commits(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::HasUnshippedCommits.name();
    let branch = ctx.subject_branch().unwrap_or("HEAD");
    match ctx.facts.unshipped {
        None => CheckResult::error(
            name,
            format!("could not compare {branch} with {}", ctx.base_branch),
        ),
        Some(0) => CheckResult::error(
            name,
            format!("{branch} has no commits beyond {}", ctx.base_branch),
        )
        .with_remedy("commit your work with `branchflow commit` first"),
        Some(n) => CheckResult::pass(name, format!("{n} commit(s) to ship")),
    }
}

fn no_merge_conflicts(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::NoMergeConflicts.name();
    let conflicted = &ctx.facts.status.conflicted;
    if conflicted.is_empty() {
        return CheckResult::pass(name, "no merge conflicts");
    }
    CheckResult::error(
        name,
        format!("{} file(s) have unresolved conflicts", conflicted.len()),
    )
    .with_detail(json!({ "files": conflicted }))
    .with_remedy("resolve the conflicts and try again")
}

fn no_closed_pull_request(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::NoClosedPullRequest.name();
    if let Some(err) = &ctx.facts.pr_lookup_error {
        return CheckResult::error(name, format!("could not query pull requests: {err}"));
    }
    match &ctx.facts.closed_pr {
        None => CheckResult::pass(name, "no merged or closed pull request"),
        Some(pr) => CheckResult::error(
            name,
            format!(
                "pull request #{} for {} is already {}; a branch cannot be shipped again",
                pr.number, pr.head, pr.state
            ),
        )
        .with_detail(json!({ "number": pr.number, "url": pr.url, "state": pr.state }))
        .with_remedy("abort this session and launch a new branch"),
    }
}

fn target_session_exists(ctx: &CheckContext) -> CheckResult {
    let name = PreCheck::TargetSessionExists.name();
    let Some(target) = ctx.target_branch.as_deref() else {
        return CheckResult::error(name, "no target branch given");
    };
    match &ctx.facts.target_session {
        Some(s) if s.is_active() => {
            CheckResult::pass(name, format!("{target} has session in state {}", s.state()))
        }
        Some(s) => CheckResult::error(
            name,
            format!("the session on {target} is {}", s.state()),
        ),
        None => CheckResult::error(name, format!("no session on {target}"))
            .with_remedy("run `branchflow list` to see active sessions"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::facts::RepoFacts;
    use crate::checks::{Overrides, Severity};
    use crate::code_host::{PrState, PullRequest};
    use crate::vcs::{AheadBehind, RepoStatus};
    use branchflow_state::{SessionState, WorkflowKind, WorkflowSession};

    fn facts_on(branch: &str) -> RepoFacts {
        RepoFacts {
            current_branch: Some(branch.to_string()),
            ..RepoFacts::default()
        }
    }

    fn dirty() -> RepoStatus {
        RepoStatus {
            modified: vec!["src/lib.rs".to_string()],
            ..RepoStatus::default()
        }
    }

    #[test]
    fn every_check_has_distinct_name() {
        let mut names: Vec<&str> = PreCheck::ALL.iter().map(|c| c.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), PreCheck::ALL.len());
    }

    #[test]
    fn recoverable_results_always_have_options_and_one_recommendation() {
        let session = WorkflowSession::new("feature/x", "main", WorkflowKind::Feature);
        let contexts = vec![
            CheckContext::new("main", facts_on("feature/y")),
            CheckContext::new(
                "main",
                RepoFacts {
                    status: dirty(),
                    base_sync: Some(AheadBehind { ahead: 0, behind: 2 }),
                    target_session: Some(session),
                    ..facts_on("feature/y")
                },
            )
            .with_target("feature/x"),
            CheckContext::new("main", RepoFacts::default()),
        ];
        for ctx in &contexts {
            for check in PreCheck::ALL {
                let r = check.evaluate(ctx);
                if r.severity == Severity::Recoverable {
                    assert!(!r.passed, "{check}");
                    assert!(!r.options.is_empty(), "{check}");
                    assert_eq!(
                        r.options.iter().filter(|o| o.recommended).count(),
                        1,
                        "{check}"
                    );
                }
                if r.severity == Severity::Error {
                    assert!(!r.passed, "{check}");
                }
            }
        }
    }

    #[test]
    fn on_base_branch_passes_on_base() {
        let ctx = CheckContext::new("main", facts_on("main"));
        assert!(PreCheck::OnBaseBranch.evaluate(&ctx).passed);
    }

    #[test]
    fn off_base_offers_stash_and_switch_when_dirty() {
        let ctx = CheckContext::new(
            "main",
            RepoFacts {
                status: dirty(),
                ..facts_on("feature/old")
            },
        );
        let r = PreCheck::OnBaseBranch.evaluate(&ctx);
        assert_eq!(r.severity, Severity::Recoverable);
        assert_eq!(r.recommended_option().unwrap().id, "stash-and-switch");
        assert!(r.option("branch-from-current").is_some());
    }

    #[test]
    fn dirty_tree_recommends_stash() {
        let ctx = CheckContext::new(
            "main",
            RepoFacts {
                status: dirty(),
                ..facts_on("main")
            },
        );
        let r = PreCheck::WorkingTreeClean.evaluate(&ctx);
        assert!(r.is_recoverable());
        assert_eq!(r.recommended_option().unwrap().id, "stash");
        assert!(r.option("discard").unwrap().action.discards_work());
    }

    #[test]
    fn unmerged_paths_only_offer_discard() {
        let ctx = CheckContext::new(
            "main",
            RepoFacts {
                status: RepoStatus {
                    conflicted: vec!["src/lib.rs".to_string()],
                    ..RepoStatus::default()
                },
                ..facts_on("main")
            },
        );
        let r = PreCheck::WorkingTreeClean.evaluate(&ctx);
        assert!(r.is_recoverable());
        assert!(r.message.contains("1 unmerged"));
        assert_eq!(r.options.len(), 1);
        assert!(r.recommended_option().is_none());
        assert!(r.remedy.is_some());
    }

    #[test]
    fn allow_dirty_override_downgrades_to_advisory() {
        let ctx = CheckContext::new(
            "main",
            RepoFacts {
                status: dirty(),
                ..facts_on("main")
            },
        )
        .with_overrides(Overrides {
            allow_dirty: true,
            ..Overrides::default()
        });
        let r = PreCheck::WorkingTreeClean.evaluate(&ctx);
        assert!(r.passed);
        assert_eq!(r.severity, Severity::Warning);
    }

    #[test]
    fn base_sync_variants() {
        let with_sync = |ab: Option<AheadBehind>| {
            CheckContext::new(
                "main",
                RepoFacts {
                    base_sync: ab,
                    ..facts_on("main")
                },
            )
        };

        let behind = PreCheck::BaseBranchSynced.evaluate(&with_sync(Some(AheadBehind {
            ahead: 0,
            behind: 3,
        })));
        assert!(behind.is_recoverable());
        assert_eq!(behind.recommended_option().unwrap().id, "pull");

        let ahead = PreCheck::BaseBranchSynced.evaluate(&with_sync(Some(AheadBehind {
            ahead: 1,
            behind: 0,
        })));
        assert!(ahead.passed);
        assert_eq!(ahead.severity, Severity::Warning);

        let unknown = PreCheck::BaseBranchSynced.evaluate(&with_sync(None));
        assert!(!unknown.passed);
        assert_eq!(unknown.severity, Severity::Warning);

        let even = PreCheck::BaseBranchSynced.evaluate(&with_sync(Some(AheadBehind::default())));
        assert!(even.passed);
        assert_eq!(even.severity, Severity::Info);
    }

    #[test]
    fn active_session_on_target_recommends_resume() {
        let session = WorkflowSession::new("feature/x", "main", WorkflowKind::Feature);
        let ctx = CheckContext::new(
            "main",
            RepoFacts {
                target_session: Some(session),
                ..facts_on("main")
            },
        )
        .with_target("feature/x");
        let r = PreCheck::NoActiveSessionOnBranch.evaluate(&ctx);
        assert!(r.is_recoverable());
        assert_eq!(r.recommended_option().unwrap().id, "resume");
    }

    #[test]
    fn branch_name_available_rules() {
        let mut facts = facts_on("main");
        facts.local_branches = vec!["main".to_string(), "feature/x".to_string()];

        let ctx = CheckContext::new("main", facts.clone()).with_target("feature/new");
        assert!(PreCheck::BranchNameAvailable.evaluate(&ctx).passed);

        let ctx = CheckContext::new("main", facts.clone()).with_target("feature/x");
        assert!(PreCheck::BranchNameAvailable.evaluate(&ctx).is_blocking_error());

        facts.target_session = Some(WorkflowSession::new(
            "feature/x",
            "main",
            WorkflowKind::Feature,
        ));
        let ctx = CheckContext::new("main", facts).with_target("feature/x");
        assert!(PreCheck::BranchNameAvailable.evaluate(&ctx).passed);
    }

    #[test]
    fn branch_name_validation() {
        for ok in ["feature/add-login", "hotfix/fix_1.2", "a"] {
            assert!(validate_branch_name(ok).is_ok(), "{ok}");
        }
        for bad in [
            "",
            "feature/a..b",
            "-x",
            "feature/",
            "has space",
            "x.lock",
            "feature/.hidden",
            "a//b",
            "tilde~1",
            "ends.",
        ] {
            assert!(validate_branch_name(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn session_checks() {
        let mut session = WorkflowSession::new("feature/x", "main", WorkflowKind::Feature);
        let ctx = CheckContext::new(
            "main",
            RepoFacts {
                current_session: Some(session.clone()),
                ..facts_on("feature/x")
            },
        );
        assert!(PreCheck::ActiveSessionExists.evaluate(&ctx).passed);
        assert!(PreCheck::OnNonBaseBranch.evaluate(&ctx).passed);

        let ctx = CheckContext::new("main", facts_on("main"));
        assert!(PreCheck::ActiveSessionExists
            .evaluate(&ctx)
            .is_blocking_error());
        assert!(PreCheck::OnNonBaseBranch.evaluate(&ctx).is_blocking_error());

        session.abort("test").unwrap();
        let ctx = CheckContext::new(
            "main",
            RepoFacts {
                target_session: Some(session),
                ..facts_on("main")
            },
        )
        .with_target("feature/x");
        let r = PreCheck::TargetSessionExists.evaluate(&ctx);
        assert!(r.is_blocking_error());
        assert!(r.message.contains(SessionState::Aborted.as_str()));
    }

    #[test]
    fn commit_and_ship_checks() {
        let clean = CheckContext::new("main", facts_on("feature/x"));
        assert!(PreCheck::HasUncommittedChanges
            .evaluate(&clean)
            .is_blocking_error());
        assert!(PreCheck::HasUnshippedCommits
            .evaluate(&clean)
            .is_blocking_error());
        assert!(PreCheck::NoMergeConflicts.evaluate(&clean).passed);

        let conflicted = CheckContext::new(
            "main",
            RepoFacts {
                status: RepoStatus {
                    conflicted: vec!["a.rs".to_string()],
                    ..RepoStatus::default()
                },
                unshipped: Some(2),
                ..facts_on("feature/x")
            },
        );
        assert!(PreCheck::HasUncommittedChanges.evaluate(&conflicted).passed);
        assert!(PreCheck::HasUnshippedCommits.evaluate(&conflicted).passed);
        assert!(PreCheck::NoMergeConflicts
            .evaluate(&conflicted)
            .is_blocking_error());
    }

    #[test]
    fn merged_pull_request_blocks() {
        let ctx = CheckContext::new(
            "main",
            RepoFacts {
                closed_pr: Some(PullRequest {
                    number: 9,
                    url: "https://github.com/acme/widgets/pull/9".to_string(),
                    state: PrState::Merged,
                    head: "feature/x".to_string(),
                    base: "main".to_string(),
                    title: "x".to_string(),
                    head_sha: None,
                }),
                ..facts_on("feature/x")
            },
        );
        let r = PreCheck::NoClosedPullRequest.evaluate(&ctx);
        assert!(r.is_blocking_error());
        assert!(r.message.contains("#9"));
        assert!(r.message.contains("merged"));
    }

    #[test]
    fn needs_union_covers_all_checks() {
        let needs = PreCheck::needs_all(&[PreCheck::WorkingTreeClean, PreCheck::BaseBranchSynced]);
        assert!(needs.status);
        assert!(needs.base_sync);
        assert!(!needs.closed_pr);
    }
}
