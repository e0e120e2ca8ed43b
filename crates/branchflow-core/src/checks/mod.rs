//! Check results shared by the pre- and post-condition engines.
//!
//! A [`CheckResult`] is one verdict; a [`VerificationReport`] is the ordered
//! aggregate of one engine run. Recoverable results carry
//! [`ResolutionOption`]s, at most one of them recommended.

pub mod facts;
pub mod post;
pub mod pre;

use serde::{Deserialize, Serialize};

pub use facts::{gather_facts, CheckContext, FactNeeds, FactSources, RepoFacts};
pub use post::{run_post_checks, PostCheck, PostCondition};
pub use pre::{run_pre_checks, PreCheck};

/// How much a check result matters to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    /// Blocking, but with known resolutions the caller can pick from.
    Recoverable,
}

/// Coarse risk of applying a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Concrete actions the pipeline knows how to apply before a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionAction {
    StashChanges,
    /// Leave uncommitted changes where they are.
    KeepChanges,
    DiscardChanges,
    SwitchToBase,
    StashAndSwitchToBase,
    /// Start the new branch from the current checkout instead of base.
    BranchFromCurrent,
    PullBase,
    /// Continue on a stale base.
    ProceedAnyway,
    /// Check out the existing session instead of launching a new one.
    ResumeSession { branch: String },
    AbortExistingSession { session_id: String },
}

impl ResolutionAction {
    /// Whether applying the action loses uncommitted work.
    pub fn discards_work(&self) -> bool {
        matches!(self, Self::DiscardChanges)
    }
}

/// One way out of a recoverable check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOption {
    pub id: String,
    pub label: String,
    pub description: String,
    pub action: ResolutionAction,
    pub recommended: bool,
    pub risk: RiskTier,
}

impl ResolutionOption {
    pub fn new(
        id: &str,
        label: &str,
        description: impl Into<String>,
        action: ResolutionAction,
        risk: RiskTier,
    ) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            description: description.into(),
            action,
            recommended: false,
            risk,
        }
    }
}

/// Mark the recommended option: lowest risk among options that keep work,
/// first listed on ties. Options that all discard work get no recommendation.
pub fn recommend(options: &mut [ResolutionOption]) {
    for opt in options.iter_mut() {
        opt.recommended = false;
    }
    let best = options
        .iter()
        .enumerate()
        .filter(|(_, o)| !o.action.discards_work())
        .min_by_key(|(idx, o)| (o.risk, *idx))
        .map(|(idx, _)| idx);
    if let Some(idx) = best {
        options[idx].recommended = true;
    }
}

/// Outcome of a single check.
///
/// Constructors uphold: `Error` and `Recoverable` results never pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ResolutionOption>,
    /// Suggested fix for a failed check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remedy: Option<String>,
}

impl CheckResult {
    fn build(name: &str, passed: bool, message: String, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            passed,
            message,
            severity,
            detail: None,
            options: Vec::new(),
            remedy: None,
        }
    }

    /// Passed, informational.
    pub fn pass(name: &str, message: impl Into<String>) -> Self {
        Self::build(name, true, message.into(), Severity::Info)
    }

    /// Passed, but worth telling the caller about.
    pub fn advisory(name: &str, message: impl Into<String>) -> Self {
        Self::build(name, true, message.into(), Severity::Warning)
    }

    /// Failed, non-blocking.
    pub fn warning(name: &str, message: impl Into<String>) -> Self {
        Self::build(name, false, message.into(), Severity::Warning)
    }

    /// Failed, blocking.
    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self::build(name, false, message.into(), Severity::Error)
    }

    /// Failed with resolution options. The recommendation is recomputed.
    pub fn recoverable(
        name: &str,
        message: impl Into<String>,
        mut options: Vec<ResolutionOption>,
    ) -> Self {
        recommend(&mut options);
        let mut result = Self::build(name, false, message.into(), Severity::Recoverable);
        result.options = options;
        result
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_remedy(mut self, remedy: impl Into<String>) -> Self {
        self.remedy = Some(remedy.into());
        self
    }

    pub fn is_blocking_error(&self) -> bool {
        !self.passed && self.severity == Severity::Error
    }

    pub fn is_recoverable(&self) -> bool {
        !self.passed && self.severity == Severity::Recoverable
    }

    pub fn recommended_option(&self) -> Option<&ResolutionOption> {
        self.options.iter().find(|o| o.recommended)
    }

    pub fn option(&self, id: &str) -> Option<&ResolutionOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

/// Per-severity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub recoverable: usize,
}

/// Aggregate of one engine run. Derived entirely from `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub all_passed: bool,
    pub results: Vec<CheckResult>,
    /// Messages of failed error-level checks.
    pub failures: Vec<String>,
    /// Messages of warning-level checks, passed or not.
    pub warnings: Vec<String>,
    /// Messages of recoverable checks.
    pub recoverable: Vec<String>,
    pub counts: SeverityCounts,
}

impl VerificationReport {
    pub fn new(results: Vec<CheckResult>) -> Self {
        let mut counts = SeverityCounts::default();
        let mut failures = Vec::new();
        let mut warnings = Vec::new();
        let mut recoverable = Vec::new();

        for r in &results {
            match r.severity {
                Severity::Info => counts.info += 1,
                Severity::Warning => {
                    counts.warning += 1;
                    warnings.push(r.message.clone());
                }
                Severity::Error => {
                    counts.error += 1;
                    if !r.passed {
                        failures.push(r.message.clone());
                    }
                }
                Severity::Recoverable => {
                    counts.recoverable += 1;
                    recoverable.push(r.message.clone());
                }
            }
        }

        Self {
            all_passed: results.iter().all(|r| r.passed),
            results,
            failures,
            warnings,
            recoverable,
            counts,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(CheckResult::is_blocking_error)
    }

    pub fn recoverable_results(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.is_recoverable())
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Drop structured detail from passing checks.
    pub fn condensed(mut self) -> Self {
        for r in self.results.iter_mut().filter(|r| r.passed) {
            r.detail = None;
        }
        self
    }
}

impl FromIterator<CheckResult> for VerificationReport {
    fn from_iter<I: IntoIterator<Item = CheckResult>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Caller-supplied switches that relax specific checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    /// Treat a dirty working tree as acceptable.
    #[serde(default)]
    pub allow_dirty: bool,
    /// Skip the base-branch freshness check.
    #[serde(default)]
    pub skip_sync: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(id: &str, action: ResolutionAction, risk: RiskTier) -> ResolutionOption {
        ResolutionOption::new(id, id, id, action, risk)
    }

    #[test]
    fn constructors_uphold_passed_invariant() {
        assert!(!CheckResult::error("x", "m").passed);
        assert!(!CheckResult::recoverable("x", "m", vec![]).passed);
        assert!(CheckResult::pass("x", "m").passed);
        assert!(CheckResult::advisory("x", "m").passed);
        assert!(!CheckResult::warning("x", "m").passed);
    }

    #[test]
    fn recommendation_prefers_low_risk_non_destructive() {
        let result = CheckResult::recoverable(
            "working-tree-clean",
            "dirty",
            vec![
                opt("discard", ResolutionAction::DiscardChanges, RiskTier::Low),
                opt("keep", ResolutionAction::KeepChanges, RiskTier::Medium),
                opt("stash", ResolutionAction::StashChanges, RiskTier::Low),
            ],
        );
        assert_eq!(result.recommended_option().unwrap().id, "stash");
        assert_eq!(result.options.iter().filter(|o| o.recommended).count(), 1);
    }

    #[test]
    fn recommendation_tie_goes_to_first() {
        let mut options = vec![
            opt("a", ResolutionAction::SwitchToBase, RiskTier::Low),
            opt("b", ResolutionAction::StashChanges, RiskTier::Low),
        ];
        recommend(&mut options);
        assert!(options[0].recommended);
        assert!(!options[1].recommended);
    }

    #[test]
    fn only_destructive_options_get_no_recommendation() {
        let result = CheckResult::recoverable(
            "x",
            "m",
            vec![opt("discard", ResolutionAction::DiscardChanges, RiskTier::High)],
        );
        assert!(result.recommended_option().is_none());
    }

    #[test]
    fn all_passed_iff_every_result_passed() {
        let empty = VerificationReport::new(vec![]);
        assert!(empty.all_passed);

        let all_pass: VerificationReport = vec![
            CheckResult::pass("a", "ok"),
            CheckResult::advisory("b", "heads up"),
        ]
        .into_iter()
        .collect();
        assert!(all_pass.all_passed);

        let all_fail = VerificationReport::new(vec![
            CheckResult::error("a", "bad"),
            CheckResult::recoverable("b", "fixable", vec![]),
        ]);
        assert!(!all_fail.all_passed);

        let mixed = VerificationReport::new(vec![
            CheckResult::pass("a", "ok"),
            CheckResult::warning("b", "meh"),
        ]);
        assert!(!mixed.all_passed);
        assert!(!mixed.has_errors());
    }

    #[test]
    fn report_lists_and_counts() {
        let report = VerificationReport::new(vec![
            CheckResult::pass("a", "ok"),
            CheckResult::advisory("b", "ahead of remote"),
            CheckResult::error("c", "no session"),
            CheckResult::recoverable("d", "dirty", vec![]),
        ]);
        assert_eq!(report.failures, vec!["no session"]);
        assert_eq!(report.warnings, vec!["ahead of remote"]);
        assert_eq!(report.recoverable, vec!["dirty"]);
        assert_eq!(
            report.counts,
            SeverityCounts {
                info: 1,
                warning: 1,
                error: 1,
                recoverable: 1
            }
        );
        assert!(report.has_errors());
        assert_eq!(report.recoverable_results().count(), 1);
    }

    #[test]
    fn condensed_strips_passing_detail_only() {
        let report = VerificationReport::new(vec![
            CheckResult::pass("a", "ok").with_detail(serde_json::json!({"x": 1})),
            CheckResult::error("b", "bad").with_detail(serde_json::json!({"y": 2})),
        ])
        .condensed();
        assert!(report.results[0].detail.is_none());
        assert!(report.results[1].detail.is_some());
    }
}
