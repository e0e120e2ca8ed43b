use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::session::{SessionId, WorkflowSession};
use crate::storage_traits::*;

/// Filesystem-backed session store, one JSON document per session.
///
/// Layout: `<root>/sessions/<session id>.json`
pub struct FsSessionStore {
    sessions_dir: PathBuf,
    /// Serializes writers so the create-time conflict scan cannot race.
    write_lock: Mutex<()>,
}

impl FsSessionStore {
    /// Create a new `FsSessionStore` rooted at `root`. Creates `root/sessions/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let sessions_dir = root.as_ref().join("sessions");
        fs::create_dir_all(&sessions_dir)?;
        Ok(Self {
            sessions_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn session_path(&self, id: &SessionId) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", id.as_str()))
    }

    fn read_session(path: &Path) -> StorageResult<Option<WorkflowSession>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Atomic write: temp file in the same directory, then rename.
    fn write_session(&self, session: &WorkflowSession) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(session)?;
        let mut tmp = NamedTempFile::new_in(&self.sessions_dir)?;
        tmp.write_all(&json)?;
        tmp.persist(self.session_path(session.id()))
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    /// Load every readable session. Unparseable files are skipped.
    fn scan(&self) -> StorageResult<Vec<WorkflowSession>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.sessions_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_session(&path) {
                Ok(Some(session)) => out.push(session),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session file"),
            }
        }
        Ok(out)
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StorageError::Backend("session store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SessionStore for FsSessionStore {
    async fn create(&self, session: &WorkflowSession) -> StorageResult<()> {
        let _guard = self.lock()?;
        let existing = self.scan()?;
        check_create_conflicts(session, &existing)?;
        debug!(session_id = %session.id(), branch = session.branch(), "creating session file");
        self.write_session(session)
    }

    async fn get(&self, id: &SessionId) -> StorageResult<Option<WorkflowSession>> {
        Self::read_session(&self.session_path(id))
    }

    async fn get_by_branch(&self, branch: &str) -> StorageResult<Option<WorkflowSession>> {
        Ok(pick_branch_session(
            self.scan()?.into_iter().filter(|s| s.branch() == branch),
        ))
    }

    async fn update(&self, session: &WorkflowSession) -> StorageResult<()> {
        let _guard = self.lock()?;
        if !self.session_path(session.id()).exists() {
            return Err(StorageError::NotFound {
                id: session.id().to_string(),
            });
        }
        self.write_session(session)
    }

    async fn list(&self, include_terminal: bool) -> StorageResult<Vec<WorkflowSession>> {
        Ok(finish_listing(self.scan()?, include_terminal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::WorkflowKind;

    fn make_store() -> (tempfile::TempDir, FsSessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn writes_one_file_per_session() {
        let (dir, store) = make_store();
        let s = WorkflowSession::new("feature/a", "main", WorkflowKind::Feature);
        store.create(&s).await.unwrap();

        let path = dir
            .path()
            .join("sessions")
            .join(format!("{}.json", s.id()));
        assert!(path.exists());
        let entries: Vec<_> = fs::read_dir(dir.path().join("sessions")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_skipped_in_listing() {
        let (dir, store) = make_store();
        let s = WorkflowSession::new("feature/a", "main", WorkflowKind::Feature);
        store.create(&s).await.unwrap();
        fs::write(dir.path().join("sessions").join("junk.json"), b"{not json").unwrap();

        let listed = store.list(true).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), s.id());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let (dir, store) = make_store();
        let mut s = WorkflowSession::new("feature/a", "main", WorkflowKind::Feature);
        store.create(&s).await.unwrap();
        s.transition(crate::SessionState::ChangesCommitted, "commit")
            .unwrap();
        store.update(&s).await.unwrap();
        drop(store);

        let reopened = FsSessionStore::new(dir.path()).unwrap();
        let got = reopened.get(s.id()).await.unwrap().unwrap();
        assert_eq!(got, s);
    }
}
