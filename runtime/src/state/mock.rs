//! In-memory [`StateStore`] implementation, selected whenever no database
//! session is attached.
//!
//! Mirrors [`super::sqlite::SqliteStateStore`]'s observable semantics —
//! runs keyed by `run_id`, an append-only step log, a `(run_id, key)`
//! memory map — behind `tokio::sync::RwLock`s so multiple worker tasks can
//! share one instance concurrently.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::StateStore;
use crate::error::Result;
use crate::model::{AgentDefinition, RunHandle, RunStatus, StepRecord};

/// One run's mutable state inside the mock store.
#[derive(Debug, Clone)]
struct MockRun {
    agent_name: String,
    input: serde_json::Value,
    status: RunStatus,
    created_at: chrono::DateTime<Utc>,
}

/// In-memory [`StateStore`], used when no backend session is attached.
///
/// Test-only injection helpers (`add_run`, `add_definition`) let callers
/// seed state directly instead of going through a loader — the same
/// affordance the grounding corpus's in-memory session gives its tests.
#[derive(Debug, Default)]
pub struct MockStateStore {
    runs: RwLock<BTreeMap<String, MockRun>>,
    steps: RwLock<Vec<(String, StepRecord)>>,
    memory: RwLock<BTreeMap<(String, String), serde_json::Value>>,
    definitions: RwLock<BTreeMap<String, AgentDefinition>>,
}

impl MockStateStore {
    /// Creates an empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a `PENDING` run directly, bypassing any external creation path.
    pub async fn add_run(&self, run_id: impl Into<String>, agent_name: impl Into<String>, input: serde_json::Value) {
        self.runs.write().await.insert(
            run_id.into(),
            MockRun {
                agent_name: agent_name.into(),
                input,
                status: RunStatus::Pending,
                created_at: Utc::now(),
            },
        );
    }

    /// Registers a definition as the active one for `agent_name`.
    pub async fn add_definition(&self, definition: AgentDefinition) {
        self.definitions
            .write()
            .await
            .insert(definition.name.clone(), definition);
    }
}

#[async_trait]
impl StateStore for MockStateStore {
    async fn fetch_definition(&self, agent_name: &str) -> Result<Option<AgentDefinition>> {
        Ok(self.definitions.read().await.get(agent_name).cloned())
    }

    async fn claim_pending_runs(&self, limit: usize) -> Result<Vec<RunHandle>> {
        let mut runs = self.runs.write().await;
        let steps = self.steps.read().await;

        let mut pending: Vec<String> = runs
            .iter()
            .filter(|(_, r)| r.status == RunStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect();
        pending.sort_by_key(|id| runs[id].created_at);
        pending.truncate(limit);

        let mut claimed = Vec::with_capacity(pending.len());
        for run_id in pending {
            let run = runs.get_mut(&run_id).expect("just filtered from this map");
            run.status = RunStatus::Running;
            let completed_steps = steps
                .iter()
                .filter(|(id, s)| id == &run_id && s.status == crate::model::StepStatus::Success)
                .count();
            claimed.push(RunHandle {
                run_id: run_id.clone(),
                agent_name: run.agent_name.clone(),
                input: run.input.clone(),
                status: run.status,
                completed_steps,
                injected_definition: None,
            });
        }
        Ok(claimed)
    }

    async fn log_step(&self, run_id: &str, record: StepRecord) -> Result<()> {
        let mut steps = self.steps.write().await;
        debug_assert!(
            !steps
                .iter()
                .any(|(id, s)| id == run_id && s.step_index == record.step_index),
            "(run_id, step_index) must be unique"
        );
        steps.push((run_id.to_string(), record));
        Ok(())
    }

    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<()> {
        if let Some(run) = self.runs.write().await.get_mut(run_id) {
            run.status = status;
        }
        Ok(())
    }

    async fn save_memory(&self, run_id: &str, key: &str, value: serde_json::Value) -> Result<()> {
        self.memory
            .write()
            .await
            .insert((run_id.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>> {
        let mut steps: Vec<StepRecord> = self
            .steps
            .read()
            .await
            .iter()
            .filter(|(id, _)| id == run_id)
            .map(|(_, s)| s.clone())
            .collect();
        steps.sort_by_key(|s| s.step_index);
        Ok(steps)
    }

    async fn get_run_status(&self, run_id: &str) -> Result<Option<RunStatus>> {
        Ok(self.runs.read().await.get(run_id).map(|r| r.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn claim_on_empty_pending_set_is_a_noop() {
        let store = MockStateStore::new();
        assert!(store.claim_pending_runs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_transitions_oldest_pending_runs_first() {
        let store = MockStateStore::new();
        store.add_run("r1", "agent", json!({})).await;
        store.add_run("r2", "agent", json!({})).await;

        let claimed = store.claim_pending_runs(1).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].run_id, "r1");
        assert_eq!(store.get_run_status("r1").await.unwrap(), Some(RunStatus::Running));
        assert_eq!(store.get_run_status("r2").await.unwrap(), Some(RunStatus::Pending));
    }

    #[tokio::test]
    async fn log_step_then_claim_reports_completed_steps() {
        let store = MockStateStore::new();
        store.add_run("r1", "agent", json!({})).await;
        store.claim_pending_runs(10).await.unwrap();
        store
            .log_step(
                "r1",
                StepRecord {
                    step_index: 0,
                    step_name: "s1".to_string(),
                    status: crate::model::StepStatus::Success,
                    output: "ok".to_string(),
                    model: "m".to_string(),
                    tokens_used: 0,
                    latency_ms: 0.0,
                },
            )
            .await
            .unwrap();
        store.update_run_status("r1", RunStatus::Failed).await.unwrap();

        let claimed = store.claim_pending_runs(10).await.unwrap();
        // r1 is FAILED, not PENDING, so it isn't re-claimed here.
        assert!(claimed.is_empty());

        store.update_run_status("r1", RunStatus::Pending).await.unwrap();
        let claimed = store.claim_pending_runs(10).await.unwrap();
        assert_eq!(claimed[0].completed_steps, 1);
    }

    #[tokio::test]
    async fn update_run_status_is_idempotent() {
        let store = MockStateStore::new();
        store.add_run("r1", "agent", json!({})).await;
        store.update_run_status("r1", RunStatus::Completed).await.unwrap();
        store.update_run_status("r1", RunStatus::Completed).await.unwrap();
        assert_eq!(store.get_run_status("r1").await.unwrap(), Some(RunStatus::Completed));
    }
}
