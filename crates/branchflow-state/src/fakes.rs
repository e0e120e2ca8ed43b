//! In-memory fake for the session store (testing only)
//!
//! `MemorySessionStore` satisfies the [`SessionStore`] contract without
//! touching disk or a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::session::{SessionId, WorkflowSession};
use crate::storage_traits::*;

/// In-memory session store backed by a `HashMap<id, session>`.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, WorkflowSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &WorkflowSession) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        check_create_conflicts(session, sessions.values())?;
        sessions.insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> StorageResult<Option<WorkflowSession>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.get(id).cloned())
    }

    async fn get_by_branch(&self, branch: &str) -> StorageResult<Option<WorkflowSession>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(pick_branch_session(
            sessions.values().filter(|s| s.branch() == branch).cloned(),
        ))
    }

    async fn update(&self, session: &WorkflowSession) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(session.id()) {
            Some(slot) => {
                *slot = session.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound {
                id: session.id().to_string(),
            }),
        }
    }

    async fn list(&self, include_terminal: bool) -> StorageResult<Vec<WorkflowSession>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(finish_listing(
            sessions.values().cloned().collect(),
            include_terminal,
        ))
    }
}
