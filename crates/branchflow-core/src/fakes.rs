//! In-memory fakes for the VCS and code-host collaborators (testing only)
//!
//! `FakeRepo` models local and remote branches as commit-id lists plus a
//! working tree status; `FakeCodeHost` keeps pull requests in a list and
//! replays a scripted sequence of CI statuses. Both record every call and
//! can be told to fail a named method.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::code_host::{CiStatus, CodeHost, NewPullRequest, PrFilter, PrState, PullRequest};
use crate::error::{FlowError, Result};
use crate::vcs::{AheadBehind, CommitInfo, RepoStatus, Vcs};

// ---------------------------------------------------------------------------
// FakeRepo
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RepoState {
    current: Option<String>,
    local: BTreeMap<String, Vec<String>>,
    remote: BTreeMap<String, Vec<String>>,
    status: RepoStatus,
    /// Oldest first.
    stashes: Vec<(String, RepoStatus)>,
    next_commit: u64,
    excluded: Vec<String>,
    fail_on: HashSet<String>,
    calls: Vec<String>,
}

impl RepoState {
    fn new_commit(&mut self) -> String {
        self.next_commit += 1;
        format!("{:040x}", self.next_commit)
    }

    fn check(&mut self, call: &str) -> Result<()> {
        self.calls.push(call.to_string());
        let method = call.split(' ').next().unwrap_or(call);
        if self.fail_on.contains(method) {
            return Err(FlowError::Vcs(format!("injected failure: {method}")));
        }
        Ok(())
    }

    /// Resolve a local branch or `<remote>/<branch>` ref to its commits.
    fn resolve(&self, remote: &str, reference: &str) -> Option<Vec<String>> {
        if let Some(commits) = self.local.get(reference) {
            return Some(commits.clone());
        }
        reference
            .strip_prefix(&format!("{remote}/"))
            .and_then(|b| self.remote.get(b))
            .cloned()
    }
}

/// In-memory repository with one remote.
#[derive(Debug)]
pub struct FakeRepo {
    remote_name: String,
    state: Mutex<RepoState>,
}

impl FakeRepo {
    /// Repository on `base` with one commit, pushed to `origin`.
    pub fn new(base: &str) -> Self {
        let mut state = RepoState::default();
        let root = state.new_commit();
        state.local.insert(base.to_string(), vec![root.clone()]);
        state.remote.insert(base.to_string(), vec![root]);
        state.current = Some(base.to_string());
        Self {
            remote_name: "origin".to_string(),
            state: Mutex::new(state),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.state.lock().unwrap().current.clone()
    }

    pub fn local_branches(&self) -> Vec<String> {
        self.state.lock().unwrap().local.keys().cloned().collect()
    }

    pub fn remote_branches(&self) -> Vec<String> {
        self.state.lock().unwrap().remote.keys().cloned().collect()
    }

    pub fn stash_count(&self) -> usize {
        self.state.lock().unwrap().stashes.len()
    }

    /// Patterns added through `exclude_locally`.
    pub fn excluded(&self) -> Vec<String> {
        self.state.lock().unwrap().excluded.clone()
    }

    pub fn working_tree(&self) -> RepoStatus {
        self.state.lock().unwrap().status.clone()
    }

    pub fn set_status(&self, status: RepoStatus) {
        self.state.lock().unwrap().status = status;
    }

    /// Mark `files` as modified in the working tree.
    pub fn make_dirty(&self, files: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state
            .status
            .modified
            .extend(files.iter().map(|f| f.to_string()));
    }

    /// Add a local branch at the tip of `from` and check it out.
    pub fn checkout_new(&self, name: &str, from: &str) {
        let mut state = self.state.lock().unwrap();
        let commits = state.local.get(from).cloned().unwrap_or_default();
        state.local.insert(name.to_string(), commits);
        state.current = Some(name.to_string());
    }

    /// Commit directly on a local branch.
    pub fn add_local_commit(&self, branch: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let sha = state.new_commit();
        state
            .local
            .entry(branch.to_string())
            .or_default()
            .push(sha.clone());
        sha
    }

    /// Commit on the remote only, leaving the local branch behind.
    pub fn add_remote_commit(&self, branch: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let sha = state.new_commit();
        state
            .remote
            .entry(branch.to_string())
            .or_default()
            .push(sha.clone());
        sha
    }

    /// Make every call to `method` (e.g. "push") fail.
    pub fn fail_on(&self, method: &str) {
        self.state.lock().unwrap().fail_on.insert(method.to_string());
    }

    /// Calls made so far, as "method arg..." strings.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Whether any recorded call starts with `method`.
    pub fn called(&self, method: &str) -> bool {
        self.calls()
            .iter()
            .any(|c| c.split(' ').next() == Some(method))
    }
}

#[async_trait]
impl Vcs for FakeRepo {
    async fn current_branch(&self) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.check("current_branch")?;
        Ok(state.current.clone())
    }

    async fn status(&self) -> Result<RepoStatus> {
        let mut state = self.state.lock().unwrap();
        state.check("status")?;
        Ok(state.status.clone())
    }

    async fn branch_exists(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("branch_exists {name}"))?;
        Ok(state.local.contains_key(name))
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.check("list_branches")?;
        Ok(state.local.keys().cloned().collect())
    }

    async fn create_branch(&self, name: &str, start_point: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("create_branch {name} {start_point}"))?;
        if state.local.contains_key(name) {
            return Err(FlowError::Vcs(format!("branch {name} already exists")));
        }
        let commits = state
            .resolve(&self.remote_name, start_point)
            .ok_or_else(|| FlowError::Vcs(format!("unknown start point {start_point}")))?;
        state.local.insert(name.to_string(), commits);
        Ok(())
    }

    async fn checkout(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("checkout {name}"))?;
        if !state.local.contains_key(name) {
            return Err(FlowError::Vcs(format!("pathspec '{name}' did not match")));
        }
        state.current = Some(name.to_string());
        Ok(())
    }

    async fn delete_branch(&self, name: &str, _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("delete_branch {name}"))?;
        if state.current.as_deref() == Some(name) {
            return Err(FlowError::Vcs(format!(
                "cannot delete branch {name} while checked out"
            )));
        }
        state
            .local
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FlowError::Vcs(format!("branch {name} not found")))
    }

    async fn delete_remote_branch(&self, remote: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("delete_remote_branch {remote} {name}"))?;
        state
            .remote
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FlowError::Vcs(format!("remote ref {name} does not exist")))
    }

    async fn stash_push(&self, label: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("stash_push {label}"))?;
        if !state.status.is_clean() {
            let saved = std::mem::take(&mut state.status);
            state.stashes.push((label.to_string(), saved));
        }
        Ok(label.to_string())
    }

    async fn stash_pop(&self, label: Option<&str>) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("stash_pop {}", label.unwrap_or("")))?;
        let idx = match label {
            Some(label) => state.stashes.iter().rposition(|(l, _)| l == label),
            None => state.stashes.len().checked_sub(1),
        };
        let Some(idx) = idx else {
            return Ok(false);
        };
        let (_, saved) = state.stashes.remove(idx);
        state.status = saved;
        Ok(true)
    }

    async fn discard_changes(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check("discard_changes")?;
        state.status = RepoStatus::default();
        Ok(())
    }

    async fn commit_all(&self, message: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("commit_all {message}"))?;
        if state.status.is_clean() {
            return Err(FlowError::Vcs("nothing to commit, working tree clean".to_string()));
        }
        let branch = state
            .current
            .clone()
            .ok_or_else(|| FlowError::Vcs("HEAD is detached".to_string()))?;
        let sha = state.new_commit();
        state.local.entry(branch).or_default().push(sha.clone());
        state.status = RepoStatus::default();
        Ok(sha)
    }

    async fn push(&self, remote: &str, branch: &str, _set_upstream: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("push {remote} {branch}"))?;
        let commits = state
            .local
            .get(branch)
            .cloned()
            .ok_or_else(|| FlowError::Vcs(format!("src refspec {branch} does not match any")))?;
        state.remote.insert(branch.to_string(), commits);
        Ok(())
    }

    async fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("pull {remote} {branch}"))?;
        let commits = state
            .remote
            .get(branch)
            .cloned()
            .ok_or_else(|| FlowError::Vcs(format!("couldn't find remote ref {branch}")))?;
        state.local.insert(branch.to_string(), commits);
        Ok(())
    }

    async fn fetch(&self, remote: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("fetch {remote}"))
    }

    async fn ahead_behind(&self, local: &str, upstream: &str) -> Result<AheadBehind> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("ahead_behind {local} {upstream}"))?;
        let ours = state
            .resolve(&self.remote_name, local)
            .ok_or_else(|| FlowError::Vcs(format!("unknown ref {local}")))?;
        let theirs = state
            .resolve(&self.remote_name, upstream)
            .ok_or_else(|| FlowError::Vcs(format!("unknown ref {upstream}")))?;
        let ahead = ours.iter().filter(|c| !theirs.contains(c)).count() as u32;
        let behind = theirs.iter().filter(|c| !ours.contains(c)).count() as u32;
        Ok(AheadBehind { ahead, behind })
    }

    async fn log(&self, range: &str, limit: usize) -> Result<Vec<CommitInfo>> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("log {range}"))?;
        let (exclude, include) = match range.split_once("..") {
            Some((a, b)) => (state.resolve(&self.remote_name, a), b),
            None => (None, range),
        };
        let commits = state
            .resolve(&self.remote_name, include)
            .ok_or_else(|| FlowError::Vcs(format!("unknown ref {include}")))?;
        let exclude = exclude.unwrap_or_default();
        Ok(commits
            .iter()
            .rev()
            .filter(|c| !exclude.contains(c))
            .take(limit)
            .map(|sha| CommitInfo {
                sha: sha.clone(),
                summary: format!("commit {}", &sha[sha.len() - 4..]),
            })
            .collect())
    }

    async fn diff(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.check("diff")?;
        Ok(state
            .status
            .changed_files()
            .iter()
            .map(|f| format!("diff --git a/{f} b/{f}\n"))
            .collect())
    }

    async fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("remote_url {remote}"))?;
        Ok((remote == self.remote_name).then(|| "git@github.com:acme/widgets.git".to_string()))
    }

    async fn exclude_locally(&self, pattern: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.check(&format!("exclude_locally {pattern}"))?;
        if state.excluded.iter().any(|p| p == pattern) {
            return Ok(false);
        }
        state.excluded.push(pattern.to_string());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// FakeCodeHost
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct HostState {
    pulls: Vec<PullRequest>,
    ci_script: VecDeque<CiStatus>,
    ci_default: CiStatus,
    ci_polls: usize,
    fail_on: HashSet<String>,
    calls: Vec<String>,
}

impl HostState {
    fn check(&mut self, call: &str) -> Result<()> {
        self.calls.push(call.to_string());
        let method = call.split(' ').next().unwrap_or(call);
        if self.fail_on.contains(method) {
            return Err(FlowError::CodeHost(format!("injected failure: {method}")));
        }
        Ok(())
    }
}

/// In-memory pull request host. CI reports `Success` unless scripted otherwise.
#[derive(Debug)]
pub struct FakeCodeHost {
    state: Mutex<HostState>,
}

impl Default for FakeCodeHost {
    fn default() -> Self {
        Self {
            state: Mutex::new(HostState {
                pulls: Vec::new(),
                ci_script: VecDeque::new(),
                ci_default: CiStatus::Success,
                ci_polls: 0,
                fail_on: HashSet::new(),
                calls: Vec::new(),
            }),
        }
    }
}

impl FakeCodeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing pull request for `head`.
    pub fn with_pull(&self, head: &str, base: &str, state: PrState) -> PullRequest {
        let mut host = self.state.lock().unwrap();
        let number = host.pulls.len() as u64 + 1;
        let pr = PullRequest {
            number,
            url: format!("https://github.com/acme/widgets/pull/{number}"),
            state,
            head: head.to_string(),
            base: base.to_string(),
            title: format!("seeded {head}"),
            head_sha: None,
        };
        host.pulls.push(pr.clone());
        pr
    }

    /// Statuses returned by successive `ci_status` calls, before the default.
    pub fn script_ci(&self, statuses: impl IntoIterator<Item = CiStatus>) {
        self.state.lock().unwrap().ci_script.extend(statuses);
    }

    /// Status returned once the script runs out.
    pub fn set_ci_default(&self, status: CiStatus) {
        self.state.lock().unwrap().ci_default = status;
    }

    pub fn fail_on(&self, method: &str) {
        self.state.lock().unwrap().fail_on.insert(method.to_string());
    }

    pub fn pulls(&self) -> Vec<PullRequest> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn ci_polls(&self) -> usize {
        self.state.lock().unwrap().ci_polls
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl CodeHost for FakeCodeHost {
    async fn find_pull_request(
        &self,
        branch: &str,
        filter: PrFilter,
    ) -> Result<Option<PullRequest>> {
        let mut host = self.state.lock().unwrap();
        host.check(&format!("find_pull_request {branch}"))?;
        Ok(host
            .pulls
            .iter()
            .rev()
            .find(|pr| pr.head == branch && filter.matches(pr.state))
            .cloned())
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let mut host = self.state.lock().unwrap();
        host.check(&format!("create_pull_request {}", request.head))?;
        if host
            .pulls
            .iter()
            .any(|pr| pr.head == request.head && pr.state == PrState::Open)
        {
            return Err(FlowError::CodeHost(format!(
                "a pull request already exists for {}",
                request.head
            )));
        }
        let number = host.pulls.len() as u64 + 1;
        let pr = PullRequest {
            number,
            url: format!("https://github.com/acme/widgets/pull/{number}"),
            state: PrState::Open,
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
            head_sha: None,
        };
        host.pulls.push(pr.clone());
        Ok(pr)
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        let mut host = self.state.lock().unwrap();
        host.check(&format!("merge_pull_request {number}"))?;
        let pr = host
            .pulls
            .iter_mut()
            .find(|pr| pr.number == number)
            .ok_or_else(|| FlowError::CodeHost(format!("pull request #{number} not found")))?;
        if pr.state != PrState::Open {
            return Err(FlowError::CodeHost(format!(
                "pull request #{number} is not open"
            )));
        }
        pr.state = PrState::Merged;
        Ok(())
    }

    async fn ci_status(&self, pr: &PullRequest) -> Result<CiStatus> {
        let mut host = self.state.lock().unwrap();
        host.check(&format!("ci_status {}", pr.number))?;
        host.ci_polls += 1;
        let status = host
            .ci_script
            .pop_front()
            .unwrap_or_else(|| host.ci_default.clone());
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_repo_tracks_branches_and_remote() {
        let repo = FakeRepo::new("main");
        repo.create_branch("feature/x", "main").await.unwrap();
        repo.checkout("feature/x").await.unwrap();
        repo.make_dirty(&["a.rs"]);
        repo.commit_all("wip").await.unwrap();

        let ab = repo.ahead_behind("feature/x", "origin/main").await.unwrap();
        assert_eq!(ab, AheadBehind { ahead: 1, behind: 0 });

        repo.push("origin", "feature/x", true).await.unwrap();
        assert!(repo.remote_branches().contains(&"feature/x".to_string()));
    }

    #[tokio::test]
    async fn fake_repo_stash_by_label() {
        let repo = FakeRepo::new("main");
        repo.make_dirty(&["a.rs"]);
        repo.stash_push("one").await.unwrap();
        assert!(repo.working_tree().is_clean());
        assert!(!repo.stash_pop(Some("two")).await.unwrap());
        assert!(repo.stash_pop(Some("one")).await.unwrap());
        assert_eq!(repo.working_tree().modified, vec!["a.rs"]);
    }

    #[tokio::test]
    async fn fake_repo_injected_failure() {
        let repo = FakeRepo::new("main");
        repo.fail_on("push");
        assert!(repo.push("origin", "main", false).await.is_err());
        assert!(repo.called("push"));
    }

    #[tokio::test]
    async fn fake_host_ci_script_then_default() {
        let host = FakeCodeHost::new();
        let pr = host.with_pull("feature/x", "main", PrState::Open);
        host.script_ci([CiStatus::Pending]);
        assert_eq!(host.ci_status(&pr).await.unwrap(), CiStatus::Pending);
        assert_eq!(host.ci_status(&pr).await.unwrap(), CiStatus::Success);
        assert_eq!(host.ci_polls(), 2);
    }

    #[tokio::test]
    async fn fake_host_finds_newest_matching_pull() {
        let host = FakeCodeHost::new();
        host.with_pull("feature/x", "main", PrState::Merged);
        let open = host.with_pull("feature/x", "main", PrState::Open);

        let found = host
            .find_pull_request("feature/x", PrFilter::Any)
            .await
            .unwrap();
        assert_eq!(found, Some(open));
        let closed = host
            .find_pull_request("feature/x", PrFilter::Closed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.state, PrState::Merged);
    }
}
