//! Repository-level configuration.
//!
//! Stored as `<repo>/.branchflow/config.json`. The loaded value is handed to
//! the pipeline at construction; nothing reads configuration globally.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{FlowError, Result};

/// Directory holding branchflow state inside a repository.
pub const STATE_DIR: &str = ".branchflow";

const CONFIG_FILE: &str = "config.json";

/// Upper bound on the CI poll interval, in seconds.
const MAX_POLL_INTERVAL_SECS: u64 = 300;

/// Configuration for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Set by `init`. Every other operation refuses to run while false.
    pub initialized: bool,
    /// Apply recommended resolutions without asking.
    pub auto_resolve: bool,
    /// Include passing checks and structured detail in reports.
    pub verbose: bool,
    pub base_branch: String,
    pub remote: String,
    pub branch_prefix: String,
    pub hotfix_prefix: String,
    pub ci_timeout_secs: u64,
    pub ci_poll_interval_secs: u64,
    /// Let `ship` merge a pull request the host reports no CI checks for.
    pub allow_unchecked_merge: bool,
    /// Code host repository as `owner/name`. Derived from the remote URL when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub api_url: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            initialized: false,
            auto_resolve: false,
            verbose: false,
            base_branch: "main".to_string(),
            remote: "origin".to_string(),
            branch_prefix: "feature/".to_string(),
            hotfix_prefix: "hotfix/".to_string(),
            ci_timeout_secs: 1200,
            ci_poll_interval_secs: 30,
            allow_unchecked_merge: false,
            repository: None,
            api_url: "https://api.github.com".to_string(),
        }
    }
}

/// Path of the config file for a repository root.
pub fn config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(STATE_DIR).join(CONFIG_FILE)
}

impl FlowConfig {
    /// Load the config for `repo_root`. A missing file yields the defaults
    /// (with `initialized = false`).
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = config_path(repo_root);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| FlowError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(FlowError::Io(e)),
        }
    }

    /// Apply `BRANCHFLOW_*` overrides from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` as the environment.
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("BRANCHFLOW_AUTO").and_then(|v| parse_flag(&v)) {
            self.auto_resolve = v;
        }
        if let Some(v) = lookup("BRANCHFLOW_VERBOSE").and_then(|v| parse_flag(&v)) {
            self.verbose = v;
        }
        if let Some(v) = lookup("BRANCHFLOW_BASE_BRANCH").filter(|v| !v.trim().is_empty()) {
            self.base_branch = v.trim().to_string();
        }
        self
    }

    /// Write the config atomically under `repo_root`.
    pub fn save(&self, repo_root: &Path) -> Result<PathBuf> {
        let dir = repo_root.join(STATE_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = config_path(repo_root);

        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.persist(&path).map_err(|e| FlowError::Io(e.error))?;
        Ok(path)
    }

    pub fn ci_timeout(&self) -> Duration {
        Duration::from_secs(self.ci_timeout_secs)
    }

    /// Poll interval, clamped to 1..=300 seconds.
    pub fn ci_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ci_poll_interval_secs.clamp(1, MAX_POLL_INTERVAL_SECS))
    }

    /// Branch prefix for a workflow kind.
    pub fn prefix_for(&self, kind: branchflow_state::WorkflowKind) -> &str {
        match kind {
            branchflow_state::WorkflowKind::Feature => &self.branch_prefix,
            branchflow_state::WorkflowKind::Hotfix => &self.hotfix_prefix,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
