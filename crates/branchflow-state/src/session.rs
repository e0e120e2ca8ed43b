//! Workflow session entity and its state machine.
//!
//! A session tracks one branch from creation to merge. Its state only moves
//! through [`WorkflowSession::transition`], which appends to an append-only
//! history; there is no rollback. Correcting a wrong transition means aborting
//! the session and launching a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Unique identifier for a workflow session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random SessionId
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordinary feature work or an emergency fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Feature,
    Hotfix,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feature => write!(f, "feature"),
            Self::Hotfix => write!(f, "hotfix"),
        }
    }
}

/// Lifecycle state of a session.
///
/// The forward chain is `BranchReady → ChangesCommitted → Pushed → PrCreated
/// → ChecksPassing → ReadyToMerge → Complete`. `Aborted` is reachable from
/// every non-terminal state. `Complete` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    BranchReady,
    ChangesCommitted,
    Pushed,
    PrCreated,
    ChecksPassing,
    ReadyToMerge,
    Complete,
    Aborted,
}

impl SessionState {
    /// Every state, forward chain first.
    pub const ALL: [SessionState; 8] = [
        SessionState::BranchReady,
        SessionState::ChangesCommitted,
        SessionState::Pushed,
        SessionState::PrCreated,
        SessionState::ChecksPassing,
        SessionState::ReadyToMerge,
        SessionState::Complete,
        SessionState::Aborted,
    ];

    /// Position on the forward chain. `Aborted` is off the chain.
    fn rank(self) -> Option<u8> {
        match self {
            Self::BranchReady => Some(0),
            Self::ChangesCommitted => Some(1),
            Self::Pushed => Some(2),
            Self::PrCreated => Some(3),
            Self::ChecksPassing => Some(4),
            Self::ReadyToMerge => Some(5),
            Self::Complete => Some(6),
            Self::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }

    /// Whether `self → to` is an edge of the state machine.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), to.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }

    /// Whether `self` is at or beyond `other` on the forward chain.
    pub fn has_reached(self, other: SessionState) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => self == other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BranchReady => "BRANCH_READY",
            Self::ChangesCommitted => "CHANGES_COMMITTED",
            Self::Pushed => "PUSHED",
            Self::PrCreated => "PR_CREATED",
            Self::ChecksPassing => "CHECKS_PASSING",
            Self::ReadyToMerge => "READY_TO_MERGE",
            Self::Complete => "COMPLETE",
            Self::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    /// What caused the change (e.g. "commit", "ship:push").
    pub trigger: String,
    pub at: DateTime<Utc>,
}

/// Free-form data linked to a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Description the session was launched with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,

    /// Sha of the last commit recorded through the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,

    /// Label of a stash holding this branch's parked changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stash_ref: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The unit of work: one branch moving through the workflow.
///
/// # Invariants
///
/// - `branch` is fixed at creation.
/// - `state` equals the `to` of the last history entry (or `BranchReady`
///   when history is empty).
/// - History is only ever appended to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSession {
    id: SessionId,
    branch: String,
    /// Branch the work merges back into.
    pub base_branch: String,
    pub kind: WorkflowKind,
    state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(default)]
    history: Vec<Transition>,
}

impl WorkflowSession {
    /// Create a session in `BranchReady` with an empty history.
    pub fn new(
        branch: impl Into<String>,
        base_branch: impl Into<String>,
        kind: WorkflowKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            branch: branch.into(),
            base_branch: base_branch.into(),
            kind,
            state: SessionState::BranchReady,
            created_at: now,
            updated_at: now,
            metadata: SessionMetadata::default(),
            history: Vec::new(),
        }
    }

    /// Attach a launch description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Active means not in a terminal state.
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// States reachable from the current one in a single transition.
    pub fn allowed_transitions(&self) -> Vec<SessionState> {
        SessionState::ALL
            .into_iter()
            .filter(|to| self.state.can_transition_to(*to))
            .collect()
    }

    /// Move to `to`, appending a history entry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` (and leaves the session
    /// untouched) when the edge is not part of the state machine.
    pub fn transition(
        &mut self,
        to: SessionState,
        trigger: impl Into<String>,
    ) -> Result<&Transition, SessionError> {
        if !self.state.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        let now = Utc::now();
        self.history.push(Transition {
            from: self.state,
            to,
            trigger: trigger.into(),
            at: now,
        });
        self.state = to;
        self.updated_at = now;
        Ok(&self.history[self.history.len() - 1])
    }

    /// Transition to `to` unless the session already reached it.
    ///
    /// Returns `Ok(false)` when no transition was needed.
    pub fn advance_to(
        &mut self,
        to: SessionState,
        trigger: impl Into<String>,
    ) -> Result<bool, SessionError> {
        if self.state.has_reached(to) && self.state != SessionState::Aborted {
            return Ok(false);
        }
        self.transition(to, trigger)?;
        Ok(true)
    }

    /// Abort from any non-terminal state.
    pub fn abort(&mut self, trigger: impl Into<String>) -> Result<&Transition, SessionError> {
        self.transition(SessionState::Aborted, trigger)
    }

    /// Bump `updated_at` after a metadata-only change.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
