//! SQLite-backed [`StateStore`] implementation.
//!
//! Uses [`rusqlite`] for synchronous access, bridged to async via
//! [`tokio::task::spawn_blocking`] — the same shape as a conversational
//! session store, applied here to the control-plane tables instead of a
//! message log.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::StateStore;
use crate::error::{CortexError, Result};
use crate::model::{AgentDefinition, RunHandle, RunStatus, StepRecord, StepStatus};

/// A shared, schema-initialized SQLite connection.
///
/// Cloneable via `Arc<Mutex<Connection>>` — [`SqliteStateStore`] and a
/// [`crate::provider::CortexProvider`] may share one handle, exactly as the
/// scheduler wires a single backend session through both.
#[derive(Debug, Clone)]
pub struct SqliteSession {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSession {
    /// Opens (or creates) a database at `path` and initializes the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Opens an ephemeral in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA foreign_keys = ON;\
             PRAGMA busy_timeout = 5000;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS agent_definitions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_name      TEXT NOT NULL,
                definition_yaml TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'active',
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_agent_definitions_name
                ON agent_definitions (agent_name, status, created_at);

            CREATE TABLE IF NOT EXISTS agent_runs (
                run_id      TEXT PRIMARY KEY,
                agent_name  TEXT NOT NULL,
                input       TEXT NOT NULL DEFAULT '{}',
                status      TEXT NOT NULL DEFAULT 'PENDING',
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_agent_runs_status
                ON agent_runs (status, created_at);

            CREATE TABLE IF NOT EXISTS agent_steps (
                step_id     INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id      TEXT NOT NULL REFERENCES agent_runs (run_id) ON DELETE CASCADE,
                step_index  INTEGER NOT NULL,
                step_name   TEXT NOT NULL,
                status      TEXT NOT NULL,
                output      TEXT,
                model       TEXT NOT NULL DEFAULT 'unknown',
                tokens_used INTEGER NOT NULL DEFAULT 0,
                latency_ms  REAL NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (run_id, step_index)
            );

            CREATE TABLE IF NOT EXISTS agent_memory (
                run_id TEXT NOT NULL,
                key    TEXT NOT NULL,
                value  TEXT NOT NULL,
                PRIMARY KEY (run_id, key)
            );",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Bridges a synchronous closure onto the tokio blocking thread pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| CortexError::StateStore(format!("poisoned connection lock: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| CortexError::StateStore(format!("blocking task panicked: {e}")))?
    }
}

/// The backend-connected [`StateStore`].
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    session: SqliteSession,
}

impl SqliteStateStore {
    /// Wraps an already-open [`SqliteSession`].
    #[must_use]
    pub const fn new(session: SqliteSession) -> Self {
        Self { session }
    }

    /// Opens (or creates) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(SqliteSession::open(path)?))
    }

    /// Returns a handle to the underlying session, for wiring a
    /// [`crate::provider::CortexProvider`] against the same database.
    #[must_use]
    pub fn session(&self) -> SqliteSession {
        self.session.clone()
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn fetch_definition(&self, agent_name: &str) -> Result<Option<AgentDefinition>> {
        let agent_name = agent_name.to_string();
        let yaml = self
            .session
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT definition_yaml FROM agent_definitions \
                     WHERE agent_name = ?1 AND status = 'active' \
                     ORDER BY created_at DESC LIMIT 1",
                    params![agent_name],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(CortexError::from)
            })
            .await?;

        let Some(yaml) = yaml else { return Ok(None) };
        Ok(AgentDefinition::from_yaml(&yaml).unwrap_or(None))
    }

    async fn claim_pending_runs(&self, limit: usize) -> Result<Vec<RunHandle>> {
        #[allow(clippy::cast_possible_wrap)]
        let limit_i64 = limit as i64;
        self.session
            .blocking(move |conn| {
                conn.execute(
                    "UPDATE agent_runs SET status = 'RUNNING', updated_at = datetime('now') \
                     WHERE run_id IN ( \
                        SELECT run_id FROM agent_runs \
                        WHERE status = 'PENDING' \
                        ORDER BY created_at ASC LIMIT ?1 \
                     )",
                    params![limit_i64],
                )?;

                let mut stmt = conn.prepare(
                    "SELECT r.run_id, r.agent_name, r.input, r.status, \
                            COUNT(s.step_id) AS completed_steps \
                     FROM agent_runs r \
                     LEFT JOIN agent_steps s \
                        ON r.run_id = s.run_id AND s.status = 'SUCCESS' \
                     WHERE r.status = 'RUNNING' \
                       AND r.updated_at >= datetime('now', '-5 seconds') \
                     GROUP BY r.run_id, r.agent_name, r.input, r.status \
                     LIMIT ?1",
                )?;

                let rows = stmt
                    .query_map(params![limit_i64], |row| {
                        let run_id: String = row.get(0)?;
                        let agent_name: String = row.get(1)?;
                        let input_text: String = row.get(2)?;
                        let status_text: String = row.get(3)?;
                        #[allow(clippy::cast_sign_loss)]
                        let completed_steps: i64 = row.get(4)?;
                        Ok((run_id, agent_name, input_text, status_text, completed_steps))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(run_id, agent_name, input_text, status_text, completed_steps)| {
                        let input = serde_json::from_str(&input_text).unwrap_or(serde_json::Value::Null);
                        let status = RunStatus::parse(&status_text)?;
                        Ok(RunHandle {
                            run_id,
                            agent_name,
                            input,
                            status,
                            #[allow(clippy::cast_sign_loss)]
                            completed_steps: completed_steps as usize,
                            injected_definition: None,
                        })
                    })
                    .collect()
            })
            .await
    }

    async fn log_step(&self, run_id: &str, record: StepRecord) -> Result<()> {
        let run_id = run_id.to_string();
        #[allow(clippy::cast_possible_wrap)]
        let step_index = record.step_index as i64;
        self.session
            .blocking(move |conn| {
                conn.execute(
                    "INSERT INTO agent_steps \
                        (run_id, step_index, step_name, status, output, model, tokens_used, latency_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        run_id,
                        step_index,
                        record.step_name,
                        record.status.as_str(),
                        record.output,
                        record.model,
                        record.tokens_used,
                        record.latency_ms,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let run_id = run_id.to_string();
        self.session
            .blocking(move |conn| {
                conn.execute(
                    "UPDATE agent_runs SET status = ?1, updated_at = datetime('now') WHERE run_id = ?2",
                    params![status.as_str(), run_id],
                )?;
                Ok(())
            })
            .await
    }

    async fn save_memory(&self, _run_id: &str, _key: &str, _value: serde_json::Value) -> Result<()> {
        // Deliberately a no-op in the real backend — agent_memory exists as
        // an interface surface, not an in-use feature (matches the design
        // notes on save_memory's minimal core usage).
        Ok(())
    }

    async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>> {
        let run_id = run_id.to_string();
        self.session
            .blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT step_index, step_name, status, output, model, tokens_used, latency_ms \
                     FROM agent_steps WHERE run_id = ?1 ORDER BY step_index ASC",
                )?;
                let rows = stmt
                    .query_map(params![run_id], |row| {
                        let step_index: i64 = row.get(0)?;
                        let step_name: String = row.get(1)?;
                        let status_text: String = row.get(2)?;
                        let output: Option<String> = row.get(3)?;
                        let model: String = row.get(4)?;
                        let tokens_used: i64 = row.get(5)?;
                        let latency_ms: f64 = row.get(6)?;
                        Ok((step_index, step_name, status_text, output, model, tokens_used, latency_ms))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(step_index, step_name, status_text, output, model, tokens_used, latency_ms)| {
                        let status = if status_text == "SUCCESS" {
                            StepStatus::Success
                        } else {
                            StepStatus::Failed
                        };
                        Ok(StepRecord {
                            #[allow(clippy::cast_sign_loss)]
                            step_index: step_index as usize,
                            step_name,
                            status,
                            output: output.unwrap_or_default(),
                            model,
                            #[allow(clippy::cast_sign_loss)]
                            tokens_used: tokens_used as u32,
                            latency_ms,
                        })
                    })
                    .collect()
            })
            .await
    }

    async fn get_run_status(&self, run_id: &str) -> Result<Option<RunStatus>> {
        let run_id = run_id.to_string();
        let status_text = self
            .session
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT status FROM agent_runs WHERE run_id = ?1",
                    params![run_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(CortexError::from)
            })
            .await?;

        status_text.map(|s| RunStatus::parse(&s)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStateStore {
        SqliteStateStore::new(SqliteSession::in_memory().unwrap())
    }

    #[tokio::test]
    async fn claim_on_empty_pending_set_is_a_noop() {
        let store = store();
        let claimed = store.claim_pending_runs(10).await.unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn claim_transitions_pending_runs_to_running_with_resume_position() {
        let store = store();
        store
            .session
            .blocking(move |conn| {
                conn.execute(
                    "INSERT INTO agent_runs (run_id, agent_name, input, status) VALUES ('r1', 'a', '{}', 'PENDING')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let claimed = store.claim_pending_runs(10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].run_id, "r1");
        assert_eq!(claimed[0].completed_steps, 0);
        assert_eq!(store.get_run_status("r1").await.unwrap(), Some(RunStatus::Running));
    }

    #[tokio::test]
    async fn log_step_then_claim_reports_completed_steps() {
        let store = store();
        store
            .session
            .blocking(move |conn| {
                conn.execute(
                    "INSERT INTO agent_runs (run_id, agent_name, input, status) VALUES ('r2', 'a', '{}', 'RUNNING')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        store
            .log_step(
                "r2",
                StepRecord {
                    step_index: 0,
                    step_name: "s1".to_string(),
                    status: StepStatus::Success,
                    output: "done".to_string(),
                    model: "m".to_string(),
                    tokens_used: 0,
                    latency_ms: 1.0,
                },
            )
            .await
            .unwrap();

        let steps = store.list_steps("r2").await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_name, "s1");
    }

    #[tokio::test]
    async fn fetch_definition_returns_none_for_unknown_agent() {
        let store = store();
        assert!(store.fetch_definition("nope").await.unwrap().is_none());
    }
}
