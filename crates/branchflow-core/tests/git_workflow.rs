//! init → launch → commit against a real git repository and the file-backed
//! session store.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use branchflow_core::checks::Overrides;
use branchflow_core::config::{FlowConfig, STATE_DIR};
use branchflow_core::ops::{Commit, Init, Launch};
use branchflow_core::pipeline::{Env, Pipeline, Request};
use branchflow_core::{GitCli, SessionState, Unconfigured};
use branchflow_state::{FsSessionStore, SessionStore};

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn make_git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "--quiet"]);
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir.path(), &["config", "user.name", "test-user"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
    dir
}

/// Pipeline wired the way the CLI wires it, config read fresh from disk.
fn pipeline_for(root: &Path) -> (Pipeline, Arc<FsSessionStore>) {
    let store = Arc::new(FsSessionStore::new(root.join(STATE_DIR)).unwrap());
    let pipeline = Pipeline::new(Env {
        config: FlowConfig::load(root).unwrap(),
        repo_root: root.to_path_buf(),
        vcs: Arc::new(GitCli::new(root)),
        host: Arc::new(Unconfigured),
        store: store.clone(),
    });
    (pipeline, store)
}

fn offline() -> Overrides {
    Overrides {
        skip_sync: true,
        ..Overrides::default()
    }
}

#[tokio::test]
async fn freshly_initialized_repo_launches_and_commits_cleanly() {
    let repo = make_git_repo();
    let root = repo.path();

    let (pipeline, _) = pipeline_for(root);
    let init = pipeline
        .run(&Init, Request::new())
        .await
        .into_report()
        .expect("init should finish");
    assert!(init.output.state_dir_excluded);
    let exclude = std::fs::read_to_string(root.join(".git/info/exclude")).unwrap();
    assert!(exclude.lines().any(|l| l == "/.branchflow/"));
    assert_eq!(git(root, &["status", "--porcelain"]), "");

    let (pipeline, store) = pipeline_for(root);
    let launch = pipeline
        .run(
            &Launch::feature(),
            Request::new()
                .with_param("description", "add login")
                .with_overrides(offline()),
        )
        .await;
    let report = launch
        .into_report()
        .expect("launch on a freshly initialized clean repo should finish");
    assert!(report.success, "post failures: {:?}", report.post.failures);
    assert_eq!(report.pre.counts.recoverable, 0);
    assert_eq!(report.output.branch, "feature/add-login");
    assert_eq!(git(root, &["branch", "--show-current"]).trim(), "feature/add-login");
    assert_eq!(git(root, &["stash", "list"]), "");

    std::fs::write(root.join("login.txt"), "form").unwrap();
    let commit = pipeline
        .run(&Commit, Request::new().with_param("message", "add login form"))
        .await
        .into_report()
        .expect("commit should finish");
    assert!(commit.success, "post failures: {:?}", commit.post.failures);
    assert_eq!(commit.output.state, SessionState::ChangesCommitted);

    let committed = git(root, &["show", "--name-only", "--format=", "HEAD"]);
    assert_eq!(committed.trim(), "login.txt");
    assert!(root.join(STATE_DIR).join("config.json").exists());

    let session = store
        .get_by_branch("feature/add-login")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state(), SessionState::ChangesCommitted);
}

#[tokio::test]
async fn state_files_from_before_the_exclude_stay_invisible() {
    let repo = make_git_repo();
    let root = repo.path();
    FlowConfig {
        initialized: true,
        ..FlowConfig::default()
    }
    .save(root)
    .unwrap();

    let (pipeline, _) = pipeline_for(root);
    let report = pipeline
        .run(
            &Launch::feature(),
            Request::new()
                .with_param("description", "add login")
                .with_overrides(offline()),
        )
        .await
        .into_report()
        .expect("launch should finish");
    assert!(report.success);
    assert!(report.resolutions_applied.is_empty());
    assert!(root.join(STATE_DIR).join("config.json").exists());
}
