//! branchflow - guarded feature-branch workflow CLI
//!
//! Every command runs one operation through the checked pipeline and prints
//! its outcome as JSON on stdout. Logs go to stderr.
//!
//! ## Commands
//!
//! - `init`: mark the repository as managed and write `.branchflow/config.json`
//! - `launch` / `hotfix`: start a session on a new branch
//! - `commit`: commit all changes on the session branch
//! - `ship`: push, open a pull request, wait for CI, merge, clean up
//! - `swap`: park the current session and switch to another
//! - `abort`: end a session without shipping
//! - `status` / `list`: inspect sessions
//!
//! ## Exit codes
//!
//! `0` done, `1` failed, `2` needs input or a choice, `3` done but a
//! required post-check failed.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use branchflow_core::config::STATE_DIR;
use branchflow_core::ops::{Abort, Commit, Init, Launch, List, Ship, Status, Swap};
use branchflow_core::{
    CodeHost, Env, FlowConfig, GitCli, GitHubClient, LogOptions, Outcome, Overrides, Pipeline,
    Request, Unconfigured, Vcs,
};
use branchflow_state::{FsSessionStore, SessionStore, SurrealSessionStore};

const EXIT_DONE: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_NEEDS_INPUT: u8 = 2;
const EXIT_UNSUCCESSFUL: u8 = 3;

#[derive(Parser)]
#[command(name = "branchflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Guarded feature-branch workflow automation", long_about = None)]
struct Cli {
    /// Enable verbose output (debug logs, full check detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Apply the recommended resolution for every recoverable check
    #[arg(long, global = true)]
    auto: bool,

    /// Path inside the repository (default: current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Session store backend
    #[arg(long, global = true, value_enum, env = "BRANCHFLOW_STORE", default_value_t = StoreKind::Fs)]
    store: StoreKind,

    /// Choose a resolution option for a check, e.g. working-tree-clean=stash
    #[arg(long = "resolve", global = true, value_name = "CHECK=OPTION", value_parser = parse_resolution)]
    resolutions: Vec<(String, String)>,

    /// Accept a dirty working tree
    #[arg(long, global = true)]
    allow_dirty: bool,

    /// Skip the base branch freshness check
    #[arg(long, global = true)]
    skip_sync: bool,

    /// Read a JSON request (params, resolutions, overrides) from a file
    #[arg(long, global = true, value_name = "FILE")]
    request: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// One JSON file per session under .branchflow/sessions
    Fs,
    /// Embedded SurrealDB under .branchflow/sessions.db
    Surreal,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize branchflow in this repository
    Init {
        /// Base branch sessions start from and merge into
        #[arg(long)]
        base: Option<String>,

        /// Remote to push to
        #[arg(long)]
        remote: Option<String>,

        /// GitHub repository as owner/name (default: parsed from the remote)
        #[arg(long)]
        repository: Option<String>,
    },

    /// Start a feature session on a new branch
    Launch {
        /// What the work is about; the branch name is derived from it
        description: Option<String>,

        /// Explicit branch name
        #[arg(long)]
        branch: Option<String>,
    },

    /// Start a hotfix session on a new branch
    Hotfix {
        /// What needs fixing; the branch name is derived from it
        description: Option<String>,

        /// Explicit branch name
        #[arg(long)]
        branch: Option<String>,
    },

    /// Commit every change on the session branch
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Push, open a pull request, wait for CI, merge and clean up
    Ship {
        /// Pull request title (default: session description)
        #[arg(long)]
        title: Option<String>,

        /// Pull request body
        #[arg(long)]
        body: Option<String>,
    },

    /// Switch to another active session
    Swap {
        /// Branch of the session to switch to
        branch: Option<String>,
    },

    /// Abort a session without shipping it
    Abort {
        /// Branch of the session (default: current branch)
        branch: Option<String>,

        /// Also delete the local branch
        #[arg(long)]
        delete_branch: bool,
    },

    /// Show the session and working tree status
    Status {
        /// Branch to inspect (default: current branch)
        branch: Option<String>,
    },

    /// List sessions
    List {
        /// Include completed and aborted sessions
        #[arg(long)]
        all: bool,
    },
}

fn parse_resolution(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((check, option)) if !check.trim().is_empty() && !option.trim().is_empty() => {
            Ok((check.trim().to_string(), option.trim().to_string()))
        }
        _ => Err(format!("expected CHECK=OPTION, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    branchflow_core::init_tracing(LogOptions {
        verbose: cli.verbose,
        json: cli.json_logs,
    });

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let request = base_request(&cli)?;
    let env = build_env(&cli).await?;
    let pipeline = Pipeline::new(env);

    let (outcome, code) = execute(&pipeline, cli.command, request).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(code)
}

/// Request shared by every command: file contents, then global flags.
fn base_request(cli: &Cli) -> Result<Request> {
    let mut request = match &cli.request {
        Some(path) => read_request(path)?,
        None => Request::new(),
    };
    for (check, option) in &cli.resolutions {
        request = request.with_resolution(check, option);
    }
    if cli.auto {
        request = request.auto(true);
    }
    let overrides = Overrides {
        allow_dirty: request.overrides.allow_dirty || cli.allow_dirty,
        skip_sync: request.overrides.skip_sync || cli.skip_sync,
    };
    Ok(request.with_overrides(overrides))
}

fn read_request(path: &Path) -> Result<Request> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid request JSON in {}", path.display()))
}

async fn build_env(cli: &Cli) -> Result<Env> {
    let start = match &cli.repo {
        Some(p) => p.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let repo_root = GitCli::discover(&start)
        .await
        .with_context(|| format!("{} is not inside a git repository", start.display()))?;

    let mut config = FlowConfig::load(&repo_root)?.apply_env();
    if cli.verbose {
        config.verbose = true;
    }

    let git = GitCli::new(repo_root.clone());
    let remote_url = match git.remote_url(&config.remote).await {
        Ok(url) => url,
        Err(e) => {
            warn!(remote = %config.remote, error = %e, "could not read remote url");
            None
        }
    };
    let host: Arc<dyn CodeHost> = match GitHubClient::from_config(&config, remote_url.as_deref())? {
        Some(client) => Arc::new(client),
        None => {
            debug!("no GitHub repository configured");
            Arc::new(Unconfigured)
        }
    };

    let state_dir = repo_root.join(STATE_DIR);
    let store: Arc<dyn SessionStore> = match cli.store {
        StoreKind::Fs => Arc::new(
            FsSessionStore::new(&state_dir).context("Failed to open the session directory")?,
        ),
        StoreKind::Surreal => Arc::new(
            SurrealSessionStore::open(state_dir.join("sessions.db"))
                .await
                .context("Failed to open the session database")?,
        ),
    };

    Ok(Env {
        config,
        repo_root,
        vcs: Arc::new(git),
        host,
        store,
    })
}

fn with_opt(request: Request, key: &str, value: Option<String>) -> Request {
    match value {
        Some(v) => request.with_param(key, v),
        None => request,
    }
}

/// Run `command` and return its JSON outcome with the exit code.
async fn execute(pipeline: &Pipeline, command: Commands, request: Request) -> Result<(Value, u8)> {
    match command {
        Commands::Init {
            base,
            remote,
            repository,
        } => {
            let request = with_opt(request, "base_branch", base);
            let request = with_opt(request, "remote", remote);
            let request = with_opt(request, "repository", repository);
            finish(pipeline.run(&Init, request).await)
        }
        Commands::Launch {
            description,
            branch,
        } => {
            let request = with_opt(request, "description", description);
            let request = with_opt(request, "branch", branch);
            finish(pipeline.run(&Launch::feature(), request).await)
        }
        Commands::Hotfix {
            description,
            branch,
        } => {
            let request = with_opt(request, "description", description);
            let request = with_opt(request, "branch", branch);
            finish(pipeline.run(&Launch::hotfix(), request).await)
        }
        Commands::Commit { message } => {
            let request = with_opt(request, "message", message);
            finish(pipeline.run(&Commit, request).await)
        }
        Commands::Ship { title, body } => {
            let request = with_opt(request, "title", title);
            let request = with_opt(request, "body", body);
            finish(pipeline.run(&Ship, request).await)
        }
        Commands::Swap { branch } => {
            let request = with_opt(request, "branch", branch);
            finish(pipeline.run(&Swap, request).await)
        }
        Commands::Abort {
            branch,
            delete_branch,
        } => {
            let mut request = with_opt(request, "branch", branch);
            if delete_branch {
                request = request.with_param("delete_branch", true);
            }
            finish(pipeline.run(&Abort, request).await)
        }
        Commands::Status { branch } => {
            let request = with_opt(request, "branch", branch);
            finish(pipeline.run(&Status, request).await)
        }
        Commands::List { all } => {
            let request = if all {
                request.with_param("include_terminal", true)
            } else {
                request
            };
            finish(pipeline.run(&List, request).await)
        }
    }
}

fn finish<T: Serialize>(outcome: Outcome<T>) -> Result<(Value, u8)> {
    let code = exit_code(&outcome);
    let value = serde_json::to_value(&outcome).context("Failed to serialize outcome")?;
    Ok((value, code))
}

fn exit_code<T>(outcome: &Outcome<T>) -> u8 {
    match outcome {
        Outcome::Done(report) if report.success => EXIT_DONE,
        Outcome::Done(_) => EXIT_UNSUCCESSFUL,
        Outcome::NeedsInput(_) | Outcome::NeedsChoice(_) => EXIT_NEEDS_INPUT,
        Outcome::Failed(_) => EXIT_FAILED,
    }
}
