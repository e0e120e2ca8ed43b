//! What a pipeline run hands back to the caller.

use serde::Serialize;
use serde_json::Value;

use crate::checks::{ResolutionAction, ResolutionOption, VerificationReport};

/// Fixed pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Collect,
    Context,
    PreCheck,
    Resolve,
    Mutate,
    PostCheck,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Collect => "collect",
            Self::Context => "context",
            Self::PreCheck => "pre_check",
            Self::Resolve => "resolve",
            Self::Mutate => "mutate",
            Self::PostCheck => "post_check",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The mutation ran. `success` inside the report says whether it held.
    Done(Report<T>),
    /// A required parameter is missing.
    NeedsInput(Elicitation),
    /// Recoverable checks failed and nobody picked a resolution.
    NeedsChoice(Choices),
    Failed(Failure),
}

impl<T> Outcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Done and every required post-condition held.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done(r) if r.success)
    }

    pub fn report(&self) -> Option<&Report<T>> {
        match self {
            Self::Done(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_report(self) -> Option<Report<T>> {
        match self {
            Self::Done(r) => Some(r),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(f) => Some(f),
            _ => None,
        }
    }

    pub fn choices(&self) -> Option<&Choices> {
        match self {
            Self::NeedsChoice(c) => Some(c),
            _ => None,
        }
    }

    pub fn elicitation(&self) -> Option<&Elicitation> {
        match self {
            Self::NeedsInput(e) => Some(e),
            _ => None,
        }
    }
}

/// A resolution that was applied before the mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedResolution {
    pub check: String,
    pub option_id: String,
    pub action: ResolutionAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report<T> {
    pub operation: String,
    pub output: T,
    pub pre: VerificationReport,
    pub post: VerificationReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resolutions_applied: Vec<AppliedResolution>,
    /// Mutation finished and no required post-condition failed.
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Request for a missing parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Elicitation {
    pub field: String,
    pub prompt: String,
    /// Material that helps answer the prompt (a diff, a session list, ...).
    pub context: Value,
}

impl Elicitation {
    pub fn new(field: &str, prompt: impl Into<String>, context: Value) -> Self {
        Self {
            field: field.to_string(),
            prompt: prompt.into(),
            context,
        }
    }
}

/// Options for one unresolved recoverable check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingChoice {
    pub check: String,
    pub message: String,
    pub options: Vec<ResolutionOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choices {
    pub operation: String,
    pub pending: Vec<PendingChoice>,
    pub pre: VerificationReport,
}

impl Choices {
    pub fn get(&self, check: &str) -> Option<&PendingChoice> {
        self.pending.iter().find(|p| p.check == check)
    }
}

/// Why a run stopped. Always carries at least one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub operation: String,
    pub phase: Phase,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remedy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre: Option<VerificationReport>,
    /// How far a multi-step mutation got before it stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<Value>,
}

impl Failure {
    pub fn new(operation: &str, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            phase,
            messages: vec![message.into()],
            remedy: None,
            pre: None,
            partial: None,
        }
    }

    pub fn from_error(operation: &str, phase: Phase, err: &crate::error::FlowError) -> Self {
        Self {
            remedy: err.remedy(),
            partial: err.progress().cloned(),
            ..Self::new(operation, phase, err.to_string())
        }
    }

    /// Failure listing every blocking pre-check.
    pub fn from_pre_checks(operation: &str, pre: VerificationReport) -> Self {
        let blocking: Vec<_> = pre.results.iter().filter(|r| r.is_blocking_error()).collect();
        let mut messages: Vec<String> = blocking.iter().map(|r| r.message.clone()).collect();
        if messages.is_empty() {
            messages.push("pre-checks failed".to_string());
        }
        let remedy = blocking.iter().find_map(|r| r.remedy.clone());
        Self {
            operation: operation.to_string(),
            phase: Phase::PreCheck,
            messages,
            remedy,
            pre: Some(pre),
            partial: None,
        }
    }

    pub fn with_pre(mut self, pre: VerificationReport) -> Self {
        self.pre = Some(pre);
        self
    }
}
