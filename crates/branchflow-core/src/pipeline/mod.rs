//! The pipeline controller.
//!
//! Every operation runs through the same fixed phases:
//!
//! 1. init check (skipped by operations that do not require it)
//! 2. parameter collection, which may ask for input
//! 3. context building
//! 4. fact gathering and pre-checks
//! 5. resolution of recoverable checks (choice, auto, or explicit)
//! 6. hard-failure short-circuit
//! 7. mutation
//! 8. post-checks and report assembly
//!
//! Resolutions are picked in phase 5 but only applied once phase 6 has
//! passed, so a run that stops before mutation leaves the repository as it
//! found it.
//!
//! Operations plug in through [`Operation`]. Errors never escape
//! [`Pipeline::run`]; they become a [`Failure`] for the phase they hit.

pub mod outcome;
pub mod request;
mod resolve;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use branchflow_state::SessionStore;

use crate::checks::{
    gather_facts, run_post_checks, run_pre_checks, CheckContext, FactSources, PostCondition,
    PreCheck, VerificationReport,
};
use crate::code_host::CodeHost;
use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::obs;
use crate::vcs::Vcs;

pub use outcome::{
    AppliedResolution, Choices, Elicitation, Failure, Outcome, PendingChoice, Phase, Report,
};
pub use request::Request;
pub use resolve::Applied;

use resolve::{apply_resolutions, select_resolutions, Selection};

/// Collaborators and configuration shared by every operation.
#[derive(Clone)]
pub struct Env {
    pub config: FlowConfig,
    /// Repository root; `init` writes the config below it.
    pub repo_root: PathBuf,
    pub vcs: Arc<dyn Vcs>,
    pub host: Arc<dyn CodeHost>,
    pub store: Arc<dyn SessionStore>,
}

impl Env {
    pub fn sources(&self) -> FactSources<'_> {
        FactSources {
            vcs: self.vcs.as_ref(),
            host: self.host.as_ref(),
            store: self.store.as_ref(),
            remote: &self.config.remote,
            base_branch: &self.config.base_branch,
        }
    }
}

/// Result of parameter collection.
#[derive(Debug)]
pub enum Collected<P> {
    Ready(P),
    Missing(Elicitation),
}

/// Pre-checks an operation wants, and the branch they are about.
#[derive(Debug, Clone, Default)]
pub struct CheckPlan {
    pub checks: Vec<PreCheck>,
    pub target_branch: Option<String>,
}

impl CheckPlan {
    pub fn new(checks: &[PreCheck]) -> Self {
        Self {
            checks: checks.to_vec(),
            target_branch: None,
        }
    }

    pub fn with_target(mut self, branch: impl Into<String>) -> Self {
        self.target_branch = Some(branch.into());
        self
    }
}

/// What a mutation produced.
#[derive(Debug)]
pub struct Mutated<T> {
    pub output: T,
    /// Non-fatal problems hit along the way.
    pub warnings: Vec<String>,
}

impl<T> Mutated<T> {
    pub fn new(output: T) -> Self {
        Self {
            output,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Operation-specific hooks for the pipeline phases.
#[async_trait]
pub trait Operation: Send + Sync {
    type Params: Send;
    type Context: Send + Sync;
    type Output: Serialize + Send;

    fn name(&self) -> &'static str;

    fn requires_init(&self) -> bool {
        true
    }

    /// Pull parameters out of the request, or ask for what is missing.
    async fn collect(&self, request: &Request, env: &Env) -> Result<Collected<Self::Params>>;

    async fn build_context(&self, params: Self::Params, env: &Env) -> Result<Self::Context>;

    fn pre_checks(&self, ctx: &Self::Context) -> CheckPlan;

    async fn mutate(
        &self,
        ctx: &Self::Context,
        applied: &Applied,
        env: &Env,
    ) -> Result<Mutated<Self::Output>>;

    fn post_checks(&self, ctx: &Self::Context, output: &Self::Output) -> Vec<PostCondition>;
}

/// Runs operations against one repository.
pub struct Pipeline {
    env: Env,
}

impl Pipeline {
    pub fn new(env: Env) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn config(&self) -> &FlowConfig {
        &self.env.config
    }

    /// Run `op` for `request` through every phase.
    pub async fn run<O: Operation>(&self, op: &O, request: Request) -> Outcome<O::Output> {
        obs::OperationSpan::new(op.name())
            .scope(self.run_phases(op, request))
            .await
    }

    async fn run_phases<O: Operation>(&self, op: &O, request: Request) -> Outcome<O::Output> {
        let env = &self.env;
        let name = op.name();
        let auto = request.auto_resolve.unwrap_or(env.config.auto_resolve);
        obs::emit_pipeline_started(name, auto);

        let halt = |phase: Phase, err: &FlowError| {
            obs::emit_pipeline_halted(name, phase.as_str(), &err.to_string());
            Outcome::Failed(Failure::from_error(name, phase, err))
        };

        // 1. init
        if op.requires_init() && !env.config.initialized {
            return halt(Phase::Init, &FlowError::NotInitialized);
        }

        // 2. parameters
        let params = match op.collect(&request, env).await {
            Ok(Collected::Ready(p)) => p,
            Ok(Collected::Missing(elicitation)) => {
                obs::emit_pipeline_halted(name, Phase::Collect.as_str(), "needs input");
                return Outcome::NeedsInput(elicitation);
            }
            Err(e) => return halt(Phase::Collect, &e),
        };

        // 3. context
        let ctx = match op.build_context(params, env).await {
            Ok(c) => c,
            Err(e) => return halt(Phase::Context, &e),
        };

        // 4. pre-checks
        let plan = op.pre_checks(&ctx);
        let pre = match self.evaluate(&plan, &request).await {
            Ok(report) => report,
            Err(e) => return halt(Phase::PreCheck, &e),
        };
        obs::emit_precheck(
            name,
            pre.results.len(),
            pre.failures.len(),
            pre.recoverable.len(),
        );

        // 5. recoverable issues
        let chosen = match select_resolutions(&pre, auto, &request.resolutions) {
            Selection::Proceed(chosen) => chosen,
            Selection::NeedsChoice(pending) => {
                obs::emit_pipeline_halted(name, Phase::Resolve.as_str(), "needs choice");
                return Outcome::NeedsChoice(Choices {
                    operation: name.to_string(),
                    pending,
                    pre: self.shape(pre),
                });
            }
            Selection::Rejected(reason) => {
                let err = FlowError::Resolution(reason);
                obs::emit_pipeline_halted(name, Phase::Resolve.as_str(), &err.to_string());
                return Outcome::Failed(
                    Failure::from_error(name, Phase::Resolve, &err).with_pre(self.shape(pre)),
                );
            }
        };

        // 6. remaining hard failures stop before anything is touched
        if pre.has_errors() {
            let failure = Failure::from_pre_checks(name, self.shape(pre));
            obs::emit_pipeline_halted(name, Phase::PreCheck.as_str(), &failure.messages[0]);
            return Outcome::Failed(failure);
        }

        let applied = match apply_resolutions(env, chosen).await {
            Ok(a) => a,
            Err(e) => {
                obs::emit_pipeline_halted(name, Phase::Resolve.as_str(), &e.to_string());
                return Outcome::Failed(
                    Failure::from_error(name, Phase::Resolve, &e).with_pre(self.shape(pre)),
                );
            }
        };

        // 7. mutation
        let mutated = op.mutate(&ctx, &applied, env).await;
        obs::emit_mutated(name, mutated.is_ok());
        let Mutated { output, warnings } = match mutated {
            Ok(m) => m,
            Err(e) => {
                obs::emit_pipeline_halted(name, Phase::Mutate.as_str(), &e.to_string());
                return Outcome::Failed(
                    Failure::from_error(name, Phase::Mutate, &e).with_pre(self.shape(pre)),
                );
            }
        };

        // 8. post-checks
        let conditions = op.post_checks(&ctx, &output);
        let post = run_post_checks(&conditions, &env.sources()).await;
        let success = !post.has_errors();
        obs::emit_pipeline_finished(name, success, post.failures.len());

        let mut all_warnings = pre.warnings.clone();
        all_warnings.extend(warnings);
        all_warnings.extend(post.warnings.iter().cloned());
        all_warnings.extend(post.failures.iter().cloned());

        Outcome::Done(Report {
            operation: name.to_string(),
            output,
            pre: self.shape(pre),
            post: self.shape(post),
            resolutions_applied: applied.resolutions,
            success,
            warnings: all_warnings,
        })
    }

    async fn evaluate(&self, plan: &CheckPlan, request: &Request) -> Result<VerificationReport> {
        if plan.checks.is_empty() {
            return Ok(VerificationReport::new(Vec::new()));
        }
        let needs = PreCheck::needs_all(&plan.checks);
        let facts = gather_facts(needs, &self.env.sources(), plan.target_branch.as_deref()).await?;
        let mut ctx = CheckContext::new(self.env.config.base_branch.clone(), facts)
            .with_overrides(request.overrides);
        if let Some(target) = &plan.target_branch {
            ctx = ctx.with_target(target.clone());
        }
        let report = run_pre_checks(&plan.checks, &ctx);
        debug!(passed = report.all_passed, "pre-checks evaluated");
        Ok(report)
    }

    /// Trim structured detail from passing checks unless verbose.
    fn shape(&self, report: VerificationReport) -> VerificationReport {
        if self.env.config.verbose {
            report
        } else {
            report.condensed()
        }
    }
}
