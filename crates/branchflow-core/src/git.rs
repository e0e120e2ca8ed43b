//! `Vcs` implementation backed by the `git` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::STATE_DIR;
use crate::error::{FlowError, Result};
use crate::vcs::{AheadBehind, CommitInfo, RepoStatus, Vcs};

/// Default per-command timeout. Network commands (push, fetch) can be slow.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs git subcommands in one working tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
    timeout: Duration,
}

/// Raw result of one git invocation.
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Locate the top of the work tree containing `dir`.
    pub async fn discover(dir: &Path) -> Result<PathBuf> {
        let git = GitCli::new(dir);
        let top = git.run(&["rev-parse", "--show-toplevel"]).await?;
        Ok(PathBuf::from(top.trim()))
    }

    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        debug!(args = ?args, "git");
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.repo_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| FlowError::Timeout {
                what: format!("git {}", args.join(" ")),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| FlowError::Vcs(format!("failed to run git: {e}")))?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run git, failing on a non-zero exit. Returns stdout.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let out = self.exec(args).await?;
        if !out.success {
            return Err(FlowError::Vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                out.stderr
            )));
        }
        Ok(out.stdout)
    }

    /// Stash list as `(ref, subject)` pairs, newest first.
    async fn stash_entries(&self) -> Result<Vec<(String, String)>> {
        let out = self.run(&["stash", "list", "--format=%gd%x1f%s"]).await?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let (r, subject) = line.split_once('\u{1f}')?;
                Some((r.to_string(), subject.to_string()))
            })
            .collect())
    }
}

/// Pathspec that keeps branchflow's own state out of stashes and commits.
fn skip_state_dir() -> String {
    format!(":(exclude){STATE_DIR}")
}

/// Whether `path` lies inside the branchflow state directory.
fn is_state_path(path: &str) -> bool {
    path.strip_prefix(STATE_DIR)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Parse `git status --porcelain=v1` output. Entries under the state
/// directory are dropped.
pub fn parse_porcelain(output: &str) -> RepoStatus {
    let mut status = RepoStatus::default();
    for line in output.lines() {
        if line.len() < 4 {
            continue;
        }
        let mut codes = line.chars();
        let (x, y) = match (codes.next(), codes.next()) {
            (Some(x), Some(y)) => (x, y),
            _ => continue,
        };
        let raw_path = &line[3..];
        // Renames and copies are reported as "old -> new".
        let path = raw_path
            .rsplit_once(" -> ")
            .map(|(_, new)| new)
            .unwrap_or(raw_path)
            .trim_matches('"')
            .to_string();
        if is_state_path(&path) {
            continue;
        }

        let conflicted = matches!(
            (x, y),
            ('D', 'D') | ('A', 'U') | ('U', 'D') | ('U', 'A') | ('D', 'U') | ('A', 'A') | ('U', 'U')
        );
        if conflicted {
            status.conflicted.push(path);
            continue;
        }
        if x == '?' {
            status.created.push(path);
            continue;
        }
        if matches!(x, 'M' | 'A' | 'D' | 'R' | 'C' | 'T') {
            status.staged.push(path.clone());
        }
        if x == 'A' {
            status.created.push(path.clone());
        }
        if x == 'D' || y == 'D' {
            status.deleted.push(path.clone());
        }
        if matches!(x, 'M' | 'R' | 'C' | 'T') || matches!(y, 'M' | 'T') {
            status.modified.push(path);
        }
    }
    status
}

#[async_trait]
impl Vcs for GitCli {
    async fn current_branch(&self) -> Result<Option<String>> {
        let out = self
            .exec(&["symbolic-ref", "--quiet", "--short", "HEAD"])
            .await?;
        if !out.success {
            return Ok(None);
        }
        let branch = out.stdout.trim();
        Ok((!branch.is_empty()).then(|| branch.to_string()))
    }

    async fn status(&self) -> Result<RepoStatus> {
        let out = self
            .run(&["status", "--porcelain=v1", "--untracked-files=all"])
            .await?;
        Ok(parse_porcelain(&out))
    }

    async fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{name}");
        let out = self
            .exec(&["show-ref", "--verify", "--quiet", &refname])
            .await?;
        Ok(out.success)
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        let out = self
            .run(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn create_branch(&self, name: &str, start_point: &str) -> Result<()> {
        self.run(&["branch", name, start_point]).await?;
        Ok(())
    }

    async fn checkout(&self, name: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", name]).await?;
        Ok(())
    }

    async fn delete_branch(&self, name: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, name]).await?;
        Ok(())
    }

    async fn delete_remote_branch(&self, remote: &str, name: &str) -> Result<()> {
        self.run(&["push", remote, "--delete", name]).await?;
        Ok(())
    }

    async fn stash_push(&self, label: &str) -> Result<String> {
        let skip = skip_state_dir();
        self.run(&[
            "stash",
            "push",
            "--include-untracked",
            "-m",
            label,
            "--",
            ".",
            &skip,
        ])
        .await?;
        Ok(label.to_string())
    }

    async fn stash_pop(&self, label: Option<&str>) -> Result<bool> {
        let entries = self.stash_entries().await?;
        let target = match label {
            Some(label) => entries
                .into_iter()
                .find(|(_, subject)| subject.ends_with(label))
                .map(|(r, _)| r),
            None => entries.into_iter().next().map(|(r, _)| r),
        };
        let Some(stash_ref) = target else {
            return Ok(false);
        };
        self.run(&["stash", "pop", "--quiet", &stash_ref]).await?;
        Ok(true)
    }

    async fn discard_changes(&self) -> Result<()> {
        self.run(&["reset", "--hard", "--quiet"]).await?;
        self.run(&["clean", "-fd", "--quiet", "-e", STATE_DIR]).await?;
        Ok(())
    }

    async fn commit_all(&self, message: &str) -> Result<String> {
        let skip = skip_state_dir();
        self.run(&["add", "--all", "--", ".", &skip]).await?;
        self.run(&["commit", "--quiet", "-m", message]).await?;
        let sha = self.run(&["rev-parse", "HEAD"]).await?;
        Ok(sha.trim().to_string())
    }

    async fn push(&self, remote: &str, branch: &str, set_upstream: bool) -> Result<()> {
        let mut args = vec!["push", "--quiet"];
        if set_upstream {
            args.push("--set-upstream");
        }
        args.extend([remote, branch]);
        self.run(&args).await?;
        Ok(())
    }

    async fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        if self.current_branch().await?.as_deref() == Some(branch) {
            self.run(&["pull", "--ff-only", "--quiet", remote, branch])
                .await?;
        } else {
            // Fast-forward a branch that is not checked out.
            let refspec = format!("{branch}:{branch}");
            self.run(&["fetch", "--quiet", remote, &refspec]).await?;
        }
        Ok(())
    }

    async fn fetch(&self, remote: &str) -> Result<()> {
        self.run(&["fetch", "--quiet", "--prune", remote]).await?;
        Ok(())
    }

    async fn ahead_behind(&self, local: &str, upstream: &str) -> Result<AheadBehind> {
        let range = format!("{local}...{upstream}");
        let out = self
            .run(&["rev-list", "--left-right", "--count", &range])
            .await?;
        let mut counts = out.split_whitespace().map(str::parse::<u32>);
        match (counts.next(), counts.next()) {
            (Some(Ok(ahead)), Some(Ok(behind))) => Ok(AheadBehind { ahead, behind }),
            _ => Err(FlowError::Vcs(format!(
                "unexpected rev-list output: {}",
                out.trim()
            ))),
        }
    }

    async fn log(&self, range: &str, limit: usize) -> Result<Vec<CommitInfo>> {
        let limit = limit.to_string();
        let out = self
            .run(&["log", "--format=%H%x1f%s", "-n", &limit, range])
            .await?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let (sha, summary) = line.split_once('\u{1f}')?;
                Some(CommitInfo {
                    sha: sha.to_string(),
                    summary: summary.to_string(),
                })
            })
            .collect())
    }

    async fn diff(&self) -> Result<String> {
        self.run(&["diff", "HEAD"]).await
    }

    async fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        let out = self.exec(&["remote", "get-url", remote]).await?;
        if !out.success {
            return Ok(None);
        }
        Ok(Some(out.stdout.trim().to_string()))
    }

    async fn exclude_locally(&self, pattern: &str) -> Result<bool> {
        let rel = self.run(&["rev-parse", "--git-path", "info/exclude"]).await?;
        let path = self.repo_dir.join(rel.trim());
        let mut content = match tokio::fs::read_to_string(&path).await {
            Ok(existing) => existing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(FlowError::Io(e)),
        };
        if content.lines().any(|line| line.trim() == pattern) {
            return Ok(false);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(pattern);
        content.push('\n');
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), pattern, "added local exclude");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "--quiet"]);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn porcelain_parses_each_class() {
        let out = "\
M  staged.rs
 M edited.rs
A  added.rs
?? untracked.txt
 D gone.rs
UU both.rs
R  old.rs -> new.rs
";
        let status = parse_porcelain(out);
        assert_eq!(status.staged, vec!["staged.rs", "added.rs", "new.rs"]);
        assert_eq!(status.modified, vec!["staged.rs", "edited.rs", "new.rs"]);
        assert_eq!(status.created, vec!["added.rs", "untracked.txt"]);
        assert_eq!(status.deleted, vec!["gone.rs"]);
        assert_eq!(status.conflicted, vec!["both.rs"]);
    }

    #[test]
    fn porcelain_skips_state_dir() {
        let out = "\
?? .branchflow/config.json
?? .branchflow/sessions/abc.json
?? .branchflowrc
 M src/lib.rs
";
        let status = parse_porcelain(out);
        assert_eq!(status.created, vec![".branchflowrc"]);
        assert_eq!(status.modified, vec!["src/lib.rs"]);
    }

    #[test]
    fn porcelain_empty_is_clean() {
        assert!(parse_porcelain("").is_clean());
    }

    #[tokio::test]
    async fn current_branch_and_status() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());

        assert_eq!(git.current_branch().await.unwrap().as_deref(), Some("main"));
        assert!(git.status().await.unwrap().is_clean());

        std::fs::write(repo.path().join("notes.txt"), "hi").unwrap();
        let status = git.status().await.unwrap();
        assert_eq!(status.created, vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn branch_lifecycle() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());

        git.create_branch("feature/x", "main").await.unwrap();
        assert!(git.branch_exists("feature/x").await.unwrap());
        assert!(!git.branch_exists("feature/y").await.unwrap());

        git.checkout("feature/x").await.unwrap();
        assert_eq!(
            git.current_branch().await.unwrap().as_deref(),
            Some("feature/x")
        );

        let mut branches = git.list_branches().await.unwrap();
        branches.sort();
        assert_eq!(branches, vec!["feature/x", "main"]);

        git.checkout("main").await.unwrap();
        git.delete_branch("feature/x", true).await.unwrap();
        assert!(!git.branch_exists("feature/x").await.unwrap());
    }

    #[tokio::test]
    async fn commit_all_returns_head_sha() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());

        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        let sha = git.commit_all("add a").await.unwrap();
        assert_eq!(sha.len(), 40);
        assert!(git.status().await.unwrap().is_clean());

        let log = git.log("HEAD", 1).await.unwrap();
        assert_eq!(log[0].sha, sha);
        assert_eq!(log[0].summary, "add a");
    }

    #[tokio::test]
    async fn stash_by_label_round_trips() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());

        std::fs::write(repo.path().join("wip.txt"), "wip").unwrap();
        let label = git.stash_push("branchflow:feature/x").await.unwrap();
        assert!(git.status().await.unwrap().is_clean());

        assert!(!git.stash_pop(Some("other-label")).await.unwrap());
        assert!(git.stash_pop(Some(&label)).await.unwrap());
        assert!(repo.path().join("wip.txt").exists());
        assert!(!git.stash_pop(None).await.unwrap());
    }

    #[tokio::test]
    async fn ahead_behind_counts_commits() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());

        git.create_branch("feature/x", "main").await.unwrap();
        git.checkout("feature/x").await.unwrap();
        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        git.commit_all("one").await.unwrap();
        std::fs::write(repo.path().join("b.txt"), "b").unwrap();
        git.commit_all("two").await.unwrap();

        let counts = git.ahead_behind("feature/x", "main").await.unwrap();
        assert_eq!(counts, AheadBehind { ahead: 2, behind: 0 });
    }

    #[tokio::test]
    async fn exclude_locally_is_idempotent() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());

        assert!(git.exclude_locally("/.branchflow/").await.unwrap());
        assert!(!git.exclude_locally("/.branchflow/").await.unwrap());

        let exclude = std::fs::read_to_string(repo.path().join(".git/info/exclude")).unwrap();
        assert_eq!(exclude.lines().filter(|l| *l == "/.branchflow/").count(), 1);
    }

    #[tokio::test]
    async fn state_dir_stays_out_of_stash_and_commits() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());

        let state = repo.path().join(STATE_DIR).join("sessions");
        std::fs::create_dir_all(&state).unwrap();
        std::fs::write(state.join("s1.json"), "{}").unwrap();
        assert!(git.status().await.unwrap().is_clean());

        std::fs::write(repo.path().join("wip.txt"), "wip").unwrap();
        git.stash_push("branchflow:main").await.unwrap();
        assert!(state.join("s1.json").exists());
        assert!(git.stash_pop(Some("branchflow:main")).await.unwrap());

        git.commit_all("wip").await.unwrap();
        let out = StdCommand::new("git")
            .args(["show", "--name-only", "--format=", "HEAD"])
            .current_dir(repo.path())
            .output()
            .unwrap();
        let files = String::from_utf8_lossy(&out.stdout);
        assert_eq!(files.trim(), "wip.txt");

        git.discard_changes().await.unwrap();
        assert!(state.join("s1.json").exists());
    }

    #[tokio::test]
    async fn missing_remote_url_is_none() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        assert!(git.remote_url("origin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_command_is_vcs_error() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        let err = git.checkout("does-not-exist").await.unwrap_err();
        assert!(matches!(err, FlowError::Vcs(_)));
    }
}
