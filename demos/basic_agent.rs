//! Demonstrates a two-step agent — one instruction step, one tool-use step
//! — run end-to-end against the in-memory mock state store.
//!
//! Run with: `cargo run --example basic_agent`

use std::sync::Arc;

use cortex_runtime::model::{AgentDefinition, RetryPolicy, StepConfig};
use cortex_runtime::provider::MockProvider;
use cortex_runtime::{MockStateStore, RunExecutor, StateStore, ToolRegistry};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    println!("=== cortex-runtime basic agent demo ===\n");

    let mut tool_registry = ToolRegistry::new();
    tool_registry.register("calculator", &["a", "b"], |input| {
        let a = input.get("a").and_then(serde_json::Value::as_i64).unwrap_or(0);
        let b = input.get("b").and_then(serde_json::Value::as_i64).unwrap_or(0);
        Ok(serde_json::json!(a + b))
    });

    let definition = AgentDefinition {
        name: "invoice-helper".to_string(),
        model: "claude-3".to_string(),
        steps: vec![
            StepConfig {
                name: "summarize".to_string(),
                step_type: "INSTRUCTION".to_string(),
                instruction: Some("Summarize the attached invoice in one sentence.".to_string()),
                tool_name: None,
                inputs: serde_json::Map::new(),
            },
            StepConfig {
                name: "total".to_string(),
                step_type: "TOOL_USE".to_string(),
                instruction: None,
                tool_name: Some("calculator".to_string()),
                inputs: serde_json::Map::new(),
            },
        ],
        tools: vec!["calculator".to_string()],
        retry_policy: RetryPolicy::default(),
    };

    let state_store = Arc::new(MockStateStore::new());
    state_store.add_definition(definition).await;
    state_store
        .add_run("demo-run-1", "invoice-helper", serde_json::json!({"a": 120, "b": 30}))
        .await;

    let run_executor = RunExecutor::new(state_store.clone(), Arc::new(MockProvider), Arc::new(tool_registry));

    let handle = state_store
        .claim_pending_runs(1)
        .await
        .expect("claim should succeed against the mock store")
        .remove(0);

    run_executor.execute(handle).await;

    let status = state_store
        .get_run_status("demo-run-1")
        .await
        .expect("status lookup should succeed")
        .expect("run was just created");
    println!("final status: {status:?}");

    for step in state_store.list_steps("demo-run-1").await.expect("steps should list") {
        println!("  step {} ({}): {}", step.step_index, step.step_name, step.output);
    }
}
