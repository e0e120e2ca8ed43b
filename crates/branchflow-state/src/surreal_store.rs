//! SurrealDB-backed SessionStore implementation
//!
//! Each session is one row in the `sessions` table. The row carries the
//! columns branch lookups filter on, plus the full session as a JSON
//! document so the history round-trips exactly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::session::{SessionId, WorkflowSession};
use crate::storage_traits::*;

/// Session row as stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRow {
    /// SurrealDB record ID
    id: Option<surrealdb::sql::Thing>,
    /// Session id (UUID string)
    session_id: String,
    branch: String,
    /// State name, e.g. "PR_CREATED"
    state: String,
    /// False once the session is COMPLETE or ABORTED
    active: bool,
    /// Serialized `WorkflowSession`
    record: String,
}

impl SessionRow {
    fn from_session(session: &WorkflowSession) -> StorageResult<Self> {
        Ok(SessionRow {
            id: None,
            session_id: session.id().to_string(),
            branch: session.branch().to_string(),
            state: session.state().as_str().to_string(),
            active: session.is_active(),
            record: serde_json::to_string(session)?,
        })
    }

    fn into_session(self) -> StorageResult<WorkflowSession> {
        Ok(serde_json::from_str(&self.record)?)
    }
}

/// SurrealDB-backed implementation of [`SessionStore`].
pub struct SurrealSessionStore {
    db: Surreal<Any>,
}

impl SurrealSessionStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Open (or create) an embedded SurrealKV database under `path`.
    pub async fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        Self::connect(&format!("surrealkv://{}", path.display())).await
    }

    /// Connect to any SurrealDB endpoint, select `branchflow/main` and
    /// define the sessions table.
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url).await?;
        db.use_ns("branchflow").use_db("main").await?;
        init_sessions_table(&db).await?;
        info!(url, "SurrealSessionStore connected");
        Ok(Self { db })
    }

    async fn fetch_rows(
        &self,
        sql: &'static str,
        key: &'static str,
        value: String,
    ) -> StorageResult<Vec<SessionRow>> {
        let mut res = self.db.query(sql).bind((key, value)).await?;
        let rows: Vec<SessionRow> = res.take(0)?;
        Ok(rows)
    }

    async fn fetch_row(&self, id: &str) -> StorageResult<Option<SessionRow>> {
        let rows = self
            .fetch_rows(
                "SELECT * FROM sessions WHERE session_id = $sid",
                "sid",
                id.to_string(),
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

/// Define the `sessions` table and its indexes. Idempotent.
///
/// ```text
/// TABLE sessions {
///   session_id: STRING (unique)
///   branch:     STRING (indexed)
///   state:      STRING
///   active:     BOOL
///   record:     STRING (JSON)
/// }
/// ```
async fn init_sessions_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing sessions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS sessions SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_session_id ON TABLE sessions COLUMNS session_id UNIQUE;

        DEFINE INDEX IF NOT EXISTS idx_branch ON TABLE sessions COLUMNS branch;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}

#[async_trait]
impl SessionStore for SurrealSessionStore {
    async fn create(&self, session: &WorkflowSession) -> StorageResult<()> {
        let mut existing = self
            .fetch_rows(
                "SELECT * FROM sessions WHERE branch = $branch",
                "branch",
                session.branch().to_string(),
            )
            .await?
            .into_iter()
            .map(SessionRow::into_session)
            .collect::<StorageResult<Vec<_>>>()?;
        if let Some(row) = self.fetch_row(session.id().as_str()).await? {
            existing.push(row.into_session()?);
        }
        check_create_conflicts(session, &existing)?;

        debug!(session_id = %session.id(), branch = session.branch(), "creating session row");
        let _created: Option<SessionRow> = self
            .db
            .create("sessions")
            .content(SessionRow::from_session(session)?)
            .await?;
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> StorageResult<Option<WorkflowSession>> {
        self.fetch_row(id.as_str())
            .await?
            .map(SessionRow::into_session)
            .transpose()
    }

    async fn get_by_branch(&self, branch: &str) -> StorageResult<Option<WorkflowSession>> {
        let sessions = self
            .fetch_rows(
                "SELECT * FROM sessions WHERE branch = $branch",
                "branch",
                branch.to_string(),
            )
            .await?
            .into_iter()
            .map(SessionRow::into_session)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(pick_branch_session(sessions))
    }

    async fn update(&self, session: &WorkflowSession) -> StorageResult<()> {
        let existing = self
            .fetch_row(session.id().as_str())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                id: session.id().to_string(),
            })?;

        let mut updated = SessionRow::from_session(session)?;
        updated.id = existing.id;
        let sid = session.id().to_string();

        self.db
            .query("UPDATE sessions CONTENT $row WHERE session_id = $sid")
            .bind(("row", updated))
            .bind(("sid", sid))
            .await?
            .check()?;
        Ok(())
    }

    async fn list(&self, include_terminal: bool) -> StorageResult<Vec<WorkflowSession>> {
        let mut res = self.db.query("SELECT * FROM sessions").await?;
        let rows: Vec<SessionRow> = res.take(0)?;
        let sessions = rows
            .into_iter()
            .map(SessionRow::into_session)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(finish_listing(sessions, include_terminal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionState, WorkflowKind};

    #[tokio::test]
    async fn test_surreal_session_update_keeps_single_row() {
        let store = SurrealSessionStore::in_memory().await.unwrap();
        let mut s = WorkflowSession::new("feature/a", "main", WorkflowKind::Feature);
        store.create(&s).await.unwrap();

        s.transition(SessionState::ChangesCommitted, "commit").unwrap();
        store.update(&s).await.unwrap();
        s.transition(SessionState::Pushed, "ship:push").unwrap();
        store.update(&s).await.unwrap();

        let all = store.list(true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state(), SessionState::Pushed);
        assert_eq!(all[0].history().len(), 2);
    }
}
