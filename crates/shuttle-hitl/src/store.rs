//! Store contract for human-in-the-loop requests, plus an in-memory and a
//! persistent (SQLite) implementation.
//!
//! The persistent variant follows `shuttle-store::catalog`'s rusqlite idiom
//! (WAL pragmas, blocking connection wrapped via `spawn_blocking`); the
//! in-memory variant uses the same reader/writer-locked map idiom as
//! `shuttle-core::registry::LocalRegistry`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use shuttle_core::error::Error;

use crate::model::{HumanRequest, Priority, RequestStatus, RequestType};

#[async_trait]
pub trait HumanRequestStore: Send + Sync {
    async fn store(&self, request: HumanRequest) -> Result<(), Error>;
    async fn get(&self, id: &str) -> Result<Option<HumanRequest>, Error>;
    async fn update(&self, request: HumanRequest) -> Result<(), Error>;
    async fn list_pending(&self) -> Result<Vec<HumanRequest>, Error>;
    async fn list_by_session(&self, session_id: &str) -> Result<Vec<HumanRequest>, Error>;

    /// Atomically transitions a request out of `pending`. Fails with
    /// `"already responded (status: <s>)"` if the request is already
    /// terminal, guaranteeing at-most-one response per request.
    async fn respond(
        &self,
        id: &str,
        status: RequestStatus,
        response: String,
        responded_by: String,
        response_data: HashMap<String, serde_json::Value>,
    ) -> Result<HumanRequest, Error>;
}

/// Reader/writer-locked `id -> request` map. Reads and writes deep-copy the
/// request so external mutation of the returned value can never leak back
/// into stored state.
#[derive(Default)]
pub struct InMemoryHumanRequestStore {
    requests: RwLock<HashMap<String, HumanRequest>>,
}

impl InMemoryHumanRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HumanRequestStore for InMemoryHumanRequestStore {
    async fn store(&self, request: HumanRequest) -> Result<(), Error> {
        self.requests.write().expect("hitl store lock poisoned").insert(request.id.clone(), request);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<HumanRequest>, Error> {
        Ok(self.requests.read().expect("hitl store lock poisoned").get(id).cloned())
    }

    async fn update(&self, request: HumanRequest) -> Result<(), Error> {
        self.requests.write().expect("hitl store lock poisoned").insert(request.id.clone(), request);
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<HumanRequest>, Error> {
        Ok(self
            .requests
            .read()
            .expect("hitl store lock poisoned")
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<HumanRequest>, Error> {
        Ok(self
            .requests
            .read()
            .expect("hitl store lock poisoned")
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn respond(
        &self,
        id: &str,
        status: RequestStatus,
        response: String,
        responded_by: String,
        response_data: HashMap<String, serde_json::Value>,
        ) -> Result<HumanRequest, Error> {
        let mut requests = self.requests.write().expect("hitl store lock poisoned");
        let request = requests.get_mut(id).ok_or_else(|| Error::Resolver(format!("no such human request: {id}")))?;
        if request.status.is_terminal() {
            return Err(Error::Resolver(format!("already responded (status: {})", request.status)));
        }
        request.status = status;
        request.response = response;
        request.response_data = response_data;
        request.responded_at = Some(chrono::Utc::now().timestamp_millis());
        request.responded_by = Some(responded_by);
        Ok(request.clone())
    }
}

/// SQL-backed persistent variant: a single `human_requests` table, times as
/// unix-millis, `context`/`response_data` as JSON text.
pub struct SqliteHumanRequestStore {
    db_path: std::path::PathBuf,
}

impl SqliteHumanRequestStore {
    pub fn new(db_path: impl Into<std::path::PathBuf>) -> Result<Self, Error> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let store = Self { db_path };
        store.ensure_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, Error> {
        let conn = Connection::open(&self.db_path).map_err(|e| Error::Resolver(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Resolver(e.to_string()))?;
        Ok(conn)
    }

    fn ensure_schema(&self) -> Result<(), Error> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS human_requests (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                question TEXT NOT NULL,
                context_json TEXT NOT NULL,
                request_type TEXT NOT NULL,
                priority TEXT NOT NULL,
                timeout_ms INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                response TEXT NOT NULL,
                response_data_json TEXT NOT NULL,
                responded_at INTEGER,
                responded_by TEXT
            )",
            [],
        )
        .map_err(|e| Error::Resolver(e.to_string()))?;

        for (name, column) in [
            ("idx_human_requests_status", "status"),
            ("idx_human_requests_session_id", "session_id"),
            ("idx_human_requests_agent_id", "agent_id"),
            ("idx_human_requests_priority", "priority"),
            ("idx_human_requests_created_at", "created_at"),
            ("idx_human_requests_expires_at", "expires_at"),
        ] {
            conn.execute(&format!("CREATE INDEX IF NOT EXISTS {name} ON human_requests({column})"), [])
                .map_err(|e| Error::Resolver(e.to_string()))?;
        }
        Ok(())
    }

    fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<HumanRequest> {
        let context_json: String = row.get("context_json")?;
        let response_data_json: String = row.get("response_data_json")?;
        let request_type: String = row.get("request_type")?;
        let priority: String = row.get("priority")?;
        let status: String = row.get("status")?;
        Ok(HumanRequest {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            session_id: row.get("session_id")?,
            question: row.get("question")?,
            context: serde_json::from_str(&context_json).unwrap_or_default(),
            request_type: request_type.parse().unwrap_or_default(),
            priority: priority.parse().unwrap_or_default(),
            timeout_ms: row.get("timeout_ms")?,
            created_at: row.get("created_at")?,
            expires_at: row.get("expires_at")?,
            status: parse_status(&status),
            response: row.get("response")?,
            response_data: serde_json::from_str(&response_data_json).unwrap_or_default(),
            responded_at: row.get("responded_at")?,
            responded_by: row.get("responded_by")?,
        })
    }
}

fn parse_status(s: &str) -> RequestStatus {
    match s {
        "approved" => RequestStatus::Approved,
        "rejected" => RequestStatus::Rejected,
        "responded" => RequestStatus::Responded,
        "timeout" => RequestStatus::Timeout,
        _ => RequestStatus::Pending,
    }
}

fn status_str(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "pending",
        RequestStatus::Approved => "approved",
        RequestStatus::Rejected => "rejected",
        RequestStatus::Responded => "responded",
        RequestStatus::Timeout => "timeout",
    }
}

#[async_trait]
impl HumanRequestStore for SqliteHumanRequestStore {
    async fn store(&self, request: HumanRequest) -> Result<(), Error> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| Error::Resolver(e.to_string()))?;
            conn.execute(
                "INSERT INTO human_requests (id, agent_id, session_id, question, context_json, request_type,
                    priority, timeout_ms, created_at, expires_at, status, response, response_data_json,
                    responded_at, responded_by)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
                params![
                    request.id,
                    request.agent_id,
                    request.session_id,
                    request.question,
                    serde_json::to_string(&request.context).unwrap_or_default(),
                    request.request_type.to_string(),
                    request.priority.to_string(),
                    request.timeout_ms,
                    request.created_at,
                    request.expires_at,
                    status_str(request.status),
                    request.response,
                    serde_json::to_string(&request.response_data).unwrap_or_default(),
                    request.responded_at,
                    request.responded_by,
                ],
            )
            .map_err(|e| Error::Resolver(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Resolver(format!("store task panicked: {e}")))?
    }

    async fn get(&self, id: &str) -> Result<Option<HumanRequest>, Error> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| Error::Resolver(e.to_string()))?;
            conn.query_row("SELECT * FROM human_requests WHERE id = ?1", params![id], SqliteHumanRequestStore::row_to_request)
                .map(Some)
                .or_else(|e| if matches!(e, rusqlite::Error::QueryReturnedNoRows) { Ok(None) } else { Err(Error::Resolver(e.to_string())) })
        })
        .await
        .map_err(|e| Error::Resolver(format!("get task panicked: {e}")))?
    }

    async fn update(&self, request: HumanRequest) -> Result<(), Error> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| Error::Resolver(e.to_string()))?;
            conn.execute(
                "UPDATE human_requests SET status=?2, response=?3, response_data_json=?4, responded_at=?5, responded_by=?6
                 WHERE id=?1",
                params![
                    request.id,
                    status_str(request.status),
                    request.response,
                    serde_json::to_string(&request.response_data).unwrap_or_default(),
                    request.responded_at,
                    request.responded_by,
                ],
            )
            .map_err(|e| Error::Resolver(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Resolver(format!("update task panicked: {e}")))?
    }

    async fn list_pending(&self) -> Result<Vec<HumanRequest>, Error> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| Error::Resolver(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT * FROM human_requests WHERE status = 'pending' ORDER BY created_at")
                .map_err(|e| Error::Resolver(e.to_string()))?;
            let rows: Result<Vec<_>, _> =
                stmt.query_map([], SqliteHumanRequestStore::row_to_request).map_err(|e| Error::Resolver(e.to_string()))?.collect();
            rows.map_err(|e| Error::Resolver(e.to_string()))
        })
        .await
        .map_err(|e| Error::Resolver(format!("list_pending task panicked: {e}")))?
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<HumanRequest>, Error> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| Error::Resolver(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT * FROM human_requests WHERE session_id = ?1 ORDER BY created_at")
                .map_err(|e| Error::Resolver(e.to_string()))?;
            let rows: Result<Vec<_>, _> = stmt
                .query_map(params![session_id], SqliteHumanRequestStore::row_to_request)
                .map_err(|e| Error::Resolver(e.to_string()))?
                .collect();
            rows.map_err(|e| Error::Resolver(e.to_string()))
        })
        .await
        .map_err(|e| Error::Resolver(format!("list_by_session task panicked: {e}")))?
    }

    async fn respond(
        &self,
        id: &str,
        status: RequestStatus,
        response: String,
        responded_by: String,
        response_data: HashMap<String, serde_json::Value>,
    ) -> Result<HumanRequest, Error> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&db_path).map_err(|e| Error::Resolver(e.to_string()))?;
            let tx = conn.transaction().map_err(|e| Error::Resolver(e.to_string()))?;

            let current_status: String = tx
                .query_row("SELECT status FROM human_requests WHERE id = ?1", params![id], |row| row.get(0))
                .map_err(|e| Error::Resolver(format!("no such human request: {id} ({e})")))?;
            if parse_status(&current_status).is_terminal() {
                return Err(Error::Resolver(format!("already responded (status: {current_status})")));
            }

            let responded_at = chrono::Utc::now().timestamp_millis();
            let response_data_json = serde_json::to_string(&response_data).unwrap_or_default();
            tx.execute(
                "UPDATE human_requests SET status=?2, response=?3, response_data_json=?4, responded_at=?5, responded_by=?6
                 WHERE id=?1",
                params![id, status_str(status), response, response_data_json, responded_at, responded_by],
            )
            .map_err(|e| Error::Resolver(e.to_string()))?;

            let updated = tx
                .query_row("SELECT * FROM human_requests WHERE id = ?1", params![id], SqliteHumanRequestStore::row_to_request)
                .map_err(|e| Error::Resolver(e.to_string()))?;
            tx.commit().map_err(|e| Error::Resolver(e.to_string()))?;
            Ok(updated)
        })
        .await
        .map_err(|e| Error::Resolver(format!("respond task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(now_ms: i64) -> HumanRequest {
        HumanRequest::new("agent-1", "session-1", "Proceed with deploy?", RequestType::Approval, Priority::High, 300_000, now_ms)
    }

    #[tokio::test]
    async fn respond_twice_fails_second_time_in_memory() {
        let store = InMemoryHumanRequestStore::new();
        let request = sample_request(1_000);
        store.store(request.clone()).await.unwrap();

        store.respond(&request.id, RequestStatus::Approved, "yes".to_string(), "alice".to_string(), HashMap::new()).await.unwrap();
        let err = store
            .respond(&request.id, RequestStatus::Rejected, "no".to_string(), "bob".to_string(), HashMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already responded"));
    }

    #[tokio::test]
    async fn list_pending_excludes_responded() {
        let store = InMemoryHumanRequestStore::new();
        let pending = sample_request(1_000);
        let mut responded = sample_request(2_000);
        responded.status = RequestStatus::Responded;
        store.store(pending.clone()).await.unwrap();
        store.store(responded).await.unwrap();

        let listed = store.list_pending().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, pending.id);
    }

    #[tokio::test]
    async fn sqlite_store_round_trips_and_enforces_at_most_one_response() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteHumanRequestStore::new(dir.path().join("hitl.sqlite3")).unwrap();
        let request = sample_request(1_000);
        store.store(request.clone()).await.unwrap();

        let fetched = store.get(&request.id).await.unwrap().unwrap();
        assert_eq!(fetched.question, request.question);
        assert_eq!(fetched.request_type, request.request_type);
        assert_eq!(fetched.priority, request.priority);

        store.respond(&request.id, RequestStatus::Approved, "ok".to_string(), "alice".to_string(), HashMap::new()).await.unwrap();
        let err = store
            .respond(&request.id, RequestStatus::Rejected, "no".to_string(), "bob".to_string(), HashMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already responded"));
    }

    #[tokio::test]
    async fn list_by_session_never_leaks_another_sessions_requests() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteHumanRequestStore::new(dir.path().join("hitl.sqlite3")).unwrap();

        let mut for_a = sample_request(1_000);
        for_a.session_id = "session-a".to_string();
        store.store(for_a.clone()).await.unwrap();

        let mut for_b = sample_request(2_000);
        for_b.session_id = "session-b".to_string();
        store.store(for_b).await.unwrap();

        let listed = store.list_by_session("session-b").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_id, "session-b");
        assert!(listed.iter().all(|r| r.id != for_a.id));
    }
}
