//! branchflow core library
//!
//! Checks, the pipeline controller, workflow operations, and the git and
//! code-host collaborators they run against.

pub mod checks;
pub mod code_host;
pub mod config;
pub mod error;
pub mod fakes;
pub mod git;
pub mod github;
pub mod naming;
pub mod obs;
pub mod ops;
pub mod pipeline;
pub mod telemetry;
pub mod vcs;

pub use checks::{
    CheckResult, Overrides, PostCheck, PreCheck, ResolutionAction, ResolutionOption, RiskTier,
    Severity, VerificationReport,
};

pub use code_host::{CiStatus, CodeHost, PrFilter, PrState, PullRequest, Unconfigured};

pub use config::FlowConfig;

pub use error::{FlowError, Result};

pub use git::GitCli;

pub use github::GitHubClient;

pub use ops::{Abort, Commit, Init, Launch, List, Ship, Status, Swap};

pub use pipeline::{Env, Failure, Outcome, Phase, Pipeline, Report, Request};

pub use telemetry::{init_tracing, LogOptions};

pub use vcs::{RepoStatus, Vcs};

pub use branchflow_state::{SessionState, WorkflowKind, WorkflowSession};
