//! Drives one claimed run from `RUNNING` to a terminal state.

use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};

use super::step::StepExecutor;
use crate::context::{self, Context};
use crate::error::{CortexError, Result};
use crate::model::{AgentDefinition, RunHandle, RunStatus, StepRecord, StepStatus};
use crate::provider::Provider;
use crate::state::StateStore;
use crate::tool::ToolRegistry;

/// Aggregated view of a run's step log, returned by
/// [`RunExecutor::get_run_summary`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Number of step rows logged for the run.
    pub step_count: usize,
    /// Sum of `tokens_used` across every logged step.
    pub total_tokens: u32,
    /// Sum of `latency_ms` across every logged step.
    pub total_latency_ms: f64,
    /// The run's current status.
    pub status: RunStatus,
}

/// Drives a single claimed run to completion or failure.
///
/// Holds no per-run state itself — every call is handed a fresh
/// [`RunHandle`] and the shared collaborators (store, provider, tool
/// registry) it needs, so one `RunExecutor` is reused across every run a
/// worker task picks up.
#[derive(Clone)]
pub struct RunExecutor {
    state_store: Arc<dyn StateStore>,
    provider: Arc<dyn Provider>,
    tool_registry: Arc<ToolRegistry>,
    step_executor: StepExecutor,
}

impl std::fmt::Debug for RunExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunExecutor").finish_non_exhaustive()
    }
}

impl RunExecutor {
    /// Builds a `RunExecutor` over shared collaborators.
    #[must_use]
    pub fn new(
        state_store: Arc<dyn StateStore>,
        provider: Arc<dyn Provider>,
        tool_registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            state_store,
            provider,
            tool_registry,
            step_executor: StepExecutor::new(),
        }
    }

    /// Drives `handle` from claim to a terminal state.
    ///
    /// Any uncaught error during the step loop aborts the run: it
    /// transitions to `FAILED` and the partial step log is left in place
    /// as the basis for a later [`Self::resume_run`].
    pub async fn execute(&self, handle: RunHandle) {
        let span = info_span!("run", run_id = %handle.run_id, agent_name = %handle.agent_name);
        async {
            if let Err(err) = self.drive(&handle).await {
                error!(error = %err, "run failed");
                if let Err(store_err) = self
                    .state_store
                    .update_run_status(&handle.run_id, RunStatus::Failed)
                    .await
                {
                    error!(error = %store_err, "failed to persist FAILED status");
                }
            }
        }
        .instrument(span)
        .await;
    }

    async fn drive(&self, handle: &RunHandle) -> Result<()> {
        self.state_store.update_run_status(&handle.run_id, RunStatus::Running).await?;

        let Some(definition) = self.load_definition(handle).await? else {
            warn!("no active definition and no injected definition; failing run");
            return Err(CortexError::definition_missing(handle.agent_name.clone()));
        };

        let start_index = handle.completed_steps;
        if start_index > definition.steps.len() {
            return Err(CortexError::StateStore(format!(
                "completed_steps ({start_index}) exceeds step count ({})",
                definition.steps.len()
            )));
        }

        let mut context = context::build_initial_context(&handle.input);
        if start_index > 0 {
            self.backfill_context(&handle.run_id, &mut context).await?;
        }

        for (index, step) in definition.steps.iter().enumerate().skip(start_index) {
            debug!(step_index = index, step_name = %step.name, step_type = %step.step_type, "executing step");

            let result = self
                .step_executor
                .execute(step, &definition.model, &context, self.provider.as_ref(), self.tool_registry.as_ref())
                .await?;

            let Some(result) = result else {
                return Err(CortexError::configuration(format!(
                    "step '{}' has unrecognized type '{}'",
                    step.name, step.step_type
                )));
            };

            self.state_store
                .log_step(
                    &handle.run_id,
                    StepRecord {
                        step_index: index,
                        step_name: step.name.clone(),
                        status: StepStatus::Success,
                        output: result.output_text.clone(),
                        model: definition.model.clone(),
                        tokens_used: result.tokens_used,
                        latency_ms: result.latency_ms,
                    },
                )
                .await?;

            context.insert(step.name.clone(), crate::context::ContextValue::Text(result.output_text));
        }

        self.state_store.update_run_status(&handle.run_id, RunStatus::Completed).await?;
        info!("run completed");
        Ok(())
    }

    async fn load_definition(&self, handle: &RunHandle) -> Result<Option<AgentDefinition>> {
        if let Some(def) = self.state_store.fetch_definition(&handle.agent_name).await? {
            return Ok(Some(def));
        }
        Ok(handle.injected_definition.clone())
    }

    /// Rebuilds the prior steps' context entries from the durable step log
    /// — necessary because a resumed run starts in a fresh process with no
    /// in-memory context from the attempt that logged those steps.
    async fn backfill_context(&self, run_id: &str, context: &mut Context) -> Result<()> {
        for record in self.state_store.list_steps(run_id).await? {
            if record.status == StepStatus::Success {
                context.insert(record.step_name, crate::context::ContextValue::Text(record.output));
            }
        }
        Ok(())
    }

    /// Transitions a `FAILED` run back to `PENDING`, making it eligible for
    /// the next claim cycle. Does not execute anything itself — resume
    /// position is recomputed from `completed_steps` at the next claim.
    pub async fn resume_run(&self, run_id: &str) -> Result<()> {
        self.state_store.update_run_status(run_id, RunStatus::Pending).await
    }

    /// Aggregates a run's step log into step count, summed tokens, summed
    /// latency, and current status.
    pub async fn get_run_summary(&self, run_id: &str) -> Result<Option<RunSummary>> {
        let Some(status) = self.state_store.get_run_status(run_id).await? else {
            return Ok(None);
        };
        let steps = self.state_store.list_steps(run_id).await?;
        Ok(Some(RunSummary {
            step_count: steps.len(),
            total_tokens: steps.iter().map(|s| s.tokens_used).sum(),
            total_latency_ms: steps.iter().map(|s| s.latency_ms).sum(),
            status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentDefinition, RetryPolicy, StepConfig};
    use crate::provider::MockProvider;
    use crate::state::MockStateStore;
    use serde_json::json;

    fn executor() -> (RunExecutor, Arc<MockStateStore>) {
        let store = Arc::new(MockStateStore::new());
        let executor = RunExecutor::new(
            store.clone(),
            Arc::new(MockProvider),
            Arc::new(ToolRegistry::new()),
        );
        (executor, store)
    }

    fn definition(name: &str, steps: Vec<StepConfig>) -> AgentDefinition {
        AgentDefinition {
            name: name.to_string(),
            model: "M".to_string(),
            steps,
            tools: Vec::new(),
            retry_policy: RetryPolicy::default(),
        }
    }

    fn instruction_step(name: &str, instruction: &str) -> StepConfig {
        StepConfig {
            name: name.to_string(),
            step_type: "INSTRUCTION".to_string(),
            instruction: Some(instruction.to_string()),
            tool_name: None,
            inputs: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn single_step_happy_path_completes_and_logs_one_step() {
        let (executor, store) = executor();
        store
            .add_definition(definition("A", vec![instruction_step("s1", "p1")]))
            .await;
        store.add_run("r1", "A", json!({})).await;
        let handle = store.claim_pending_runs(1).await.unwrap().remove(0);

        executor.execute(handle).await;

        assert_eq!(store.get_run_status("r1").await.unwrap(), Some(RunStatus::Completed));
        let steps = store.list_steps("r1").await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_name, "s1");
        assert_eq!(steps[0].output, "Explicit Mock Output");
        assert_eq!(steps[0].tokens_used, 0);
        assert_eq!(steps[0].model, "M");
    }

    #[tokio::test]
    async fn resume_skips_already_completed_steps() {
        let (executor, store) = executor();
        store
            .add_definition(definition(
                "A",
                vec![instruction_step("s1", "p1"), instruction_step("s2", "p2")],
            ))
            .await;
        store.add_run("r1", "A", json!({})).await;
        store
            .log_step(
                "r1",
                StepRecord {
                    step_index: 0,
                    step_name: "s1".to_string(),
                    status: StepStatus::Success,
                    output: "prior".to_string(),
                    model: "M".to_string(),
                    tokens_used: 5,
                    latency_ms: 1.0,
                },
            )
            .await
            .unwrap();

        let handle = store.claim_pending_runs(1).await.unwrap().remove(0);
        assert_eq!(handle.completed_steps, 1);

        executor.execute(handle).await;

        let steps = store.list_steps("r1").await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].step_name, "s2");
        assert_eq!(store.get_run_status("r1").await.unwrap(), Some(RunStatus::Completed));
    }

    #[tokio::test]
    async fn zero_step_definition_completes_with_no_step_rows() {
        let (executor, store) = executor();
        store.add_definition(definition("A", Vec::new())).await;
        store.add_run("r1", "A", json!({})).await;
        let handle = store.claim_pending_runs(1).await.unwrap().remove(0);

        executor.execute(handle).await;

        assert_eq!(store.get_run_status("r1").await.unwrap(), Some(RunStatus::Completed));
        assert!(store.list_steps("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_definition_fails_the_run_with_no_step_rows() {
        let (executor, store) = executor();
        store.add_run("r1", "unregistered", json!({})).await;
        let handle = store.claim_pending_runs(1).await.unwrap().remove(0);

        executor.execute(handle).await;

        assert_eq!(store.get_run_status("r1").await.unwrap(), Some(RunStatus::Failed));
        assert!(store.list_steps("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_run_returns_failed_run_to_pending() {
        let (executor, store) = executor();
        store.add_run("r1", "A", json!({})).await;
        store.update_run_status("r1", RunStatus::Failed).await.unwrap();

        executor.resume_run("r1").await.unwrap();

        assert_eq!(store.get_run_status("r1").await.unwrap(), Some(RunStatus::Pending));
    }

    #[tokio::test]
    async fn get_run_summary_aggregates_steps() {
        let (executor, store) = executor();
        store
            .add_definition(definition("A", vec![instruction_step("s1", "p1")]))
            .await;
        store.add_run("r1", "A", json!({})).await;
        let handle = store.claim_pending_runs(1).await.unwrap().remove(0);
        executor.execute(handle).await;

        let summary = executor.get_run_summary("r1").await.unwrap().expect("run exists");
        assert_eq!(summary.step_count, 1);
        assert_eq!(summary.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn tool_invocation_scenario_produces_summed_output() {
        let store = Arc::new(MockStateStore::new());
        let mut registry = ToolRegistry::new();
        registry.register("calculator", &["a", "b"], |input| {
            let a = input.get("a").and_then(serde_json::Value::as_i64).unwrap_or(0);
            let b = input.get("b").and_then(serde_json::Value::as_i64).unwrap_or(0);
            Ok(json!(a + b))
        });
        let executor = RunExecutor::new(store.clone(), Arc::new(MockProvider), Arc::new(registry));

        store
            .add_definition(definition(
                "calc",
                vec![StepConfig {
                    name: "add".to_string(),
                    step_type: "TOOL_USE".to_string(),
                    instruction: None,
                    tool_name: Some("calculator".to_string()),
                    inputs: serde_json::Map::new(),
                }],
            ))
            .await;
        store.add_run("r1", "calc", json!({"a": 10, "b": 20})).await;
        let handle = store.claim_pending_runs(1).await.unwrap().remove(0);

        executor.execute(handle).await;

        let steps = store.list_steps("r1").await.unwrap();
        assert_eq!(steps[0].output, "30");
        assert_eq!(store.get_run_status("r1").await.unwrap(), Some(RunStatus::Completed));
    }
}
