use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::checks::PostCondition;
use crate::config::{FlowConfig, STATE_DIR};
use crate::error::Result;
use crate::pipeline::{Applied, CheckPlan, Collected, Env, Mutated, Operation, Request};

/// Mark the repository as initialized, write its config and keep the state
/// directory out of git.
#[derive(Debug, Default, Clone, Copy)]
pub struct Init;

#[derive(Debug, Clone, Serialize)]
pub struct InitOutput {
    pub config_path: String,
    pub already_initialized: bool,
    /// The state directory was newly added to `.git/info/exclude`.
    pub state_dir_excluded: bool,
    pub config: FlowConfig,
}

#[async_trait]
impl Operation for Init {
    type Params = FlowConfig;
    type Context = FlowConfig;
    type Output = InitOutput;

    fn name(&self) -> &'static str {
        "init"
    }

    fn requires_init(&self) -> bool {
        false
    }

    async fn collect(&self, request: &Request, env: &Env) -> Result<Collected<FlowConfig>> {
        // Start from what is on disk; env and flag overrides stay out of the file.
        let mut config = FlowConfig::load(&env.repo_root)?;
        if let Some(base) = request.str_param("base_branch") {
            config.base_branch = base;
        }
        if let Some(remote) = request.str_param("remote") {
            config.remote = remote;
        }
        if let Some(repository) = request.str_param("repository") {
            config.repository = Some(repository);
        }
        if let Some(auto) = request.bool_param("auto_resolve") {
            config.auto_resolve = auto;
        }
        Ok(Collected::Ready(config))
    }

    async fn build_context(&self, config: FlowConfig, _env: &Env) -> Result<FlowConfig> {
        Ok(config)
    }

    fn pre_checks(&self, _config: &FlowConfig) -> CheckPlan {
        CheckPlan::default()
    }

    async fn mutate(
        &self,
        config: &FlowConfig,
        _applied: &Applied,
        env: &Env,
    ) -> Result<Mutated<InitOutput>> {
        let already_initialized = config.initialized;
        let config = FlowConfig {
            initialized: true,
            ..config.clone()
        };
        let path = config.save(&env.repo_root)?;
        let state_dir_excluded = env.vcs.exclude_locally(&format!("/{STATE_DIR}/")).await?;
        info!(path = %path.display(), state_dir_excluded, "config written");
        Ok(Mutated::new(InitOutput {
            config_path: path.display().to_string(),
            already_initialized,
            state_dir_excluded,
            config,
        }))
    }

    fn post_checks(&self, _config: &FlowConfig, _output: &InitOutput) -> Vec<PostCondition> {
        Vec::new()
    }
}
