//! The durable interface: claim pending runs, fetch definitions, log steps,
//! update run status, and a per-run memory slot.
//!
//! Expressed as a single [`StateStore`] trait with two implementations —
//! [`sqlite::SqliteStateStore`] (backend-connected) and
//! [`mock::MockStateStore`] (in-memory) — rather than one type branching on
//! a nullable session, per the design notes. Callers hold an
//! `Arc<dyn StateStore>` and never need to know which they have.

pub mod mock;
pub mod sqlite;

use async_trait::async_trait;

pub use mock::MockStateStore;
pub use sqlite::SqliteStateStore;

use crate::error::Result;
use crate::model::{AgentDefinition, RunHandle, RunStatus, StepRecord};

/// The durable operations the executor and scheduler depend on.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the most recently created `status = 'active'` definition
    /// for `agent_name`, or `None` if none exists (or the stored YAML
    /// fails to parse — see the design notes on treating `{}` as absent).
    async fn fetch_definition(&self, agent_name: &str) -> Result<Option<AgentDefinition>>;

    /// Atomically claims up to `limit` of the oldest `PENDING` runs,
    /// transitioning them to `RUNNING` and returning a [`RunHandle`] for
    /// each with its resume position (`completed_steps`) populated.
    ///
    /// Best-effort atomic per row, not a strong lock — see the concurrency
    /// model's discussion of the claim race.
    async fn claim_pending_runs(&self, limit: usize) -> Result<Vec<RunHandle>>;

    /// Appends a step row. Must not overwrite an existing
    /// `(run_id, step_index)` pair.
    async fn log_step(&self, run_id: &str, record: StepRecord) -> Result<()>;

    /// Sets a run's status and refreshes `updated_at`. Idempotent.
    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<()>;

    /// Per-run key/value store. Interface only — the real implementation
    /// is a deliberate no-op (see [`sqlite::SqliteStateStore::save_memory`]).
    async fn save_memory(&self, run_id: &str, key: &str, value: serde_json::Value) -> Result<()>;

    /// Returns every logged step for `run_id`, ordered by `step_index`.
    /// Used by `RunExecutor::get_run_summary`.
    async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>>;

    /// Returns a run's current status, if it exists.
    async fn get_run_status(&self, run_id: &str) -> Result<Option<RunStatus>>;
}
