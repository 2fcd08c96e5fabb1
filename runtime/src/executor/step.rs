//! Executes exactly one step against a context.

use std::time::Instant;

use tracing::warn;

use crate::context::Context;
use crate::error::Result;
use crate::model::StepConfig;
use crate::provider::Provider;
use crate::tool::ToolRegistry;

/// The normalized outcome of executing one step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The step's textual output — model completion text, a tool's
    /// stringified return value, or an encoded tool-failure message.
    pub output_text: String,
    /// Tokens reported by the provider; always 0 for `TOOL_USE` steps.
    pub tokens_used: u32,
    /// Wall-clock duration of the step, in milliseconds.
    pub latency_ms: f64,
}

/// Dispatches a single [`StepConfig`] by its declared `step_type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepExecutor;

impl StepExecutor {
    /// Creates a step executor. Stateless — every call is handed its
    /// collaborators explicitly, so one instance is reusable across steps
    /// and runs.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Executes `step` against `context`, dispatching on its `step_type`.
    ///
    /// Returns `Ok(None)` for an unrecognized `step_type` — the caller
    /// ([`crate::executor::run::RunExecutor`]) treats that as a failed
    /// step, per the data model.
    ///
    /// # Errors
    ///
    /// Returns an error only when the underlying provider call fails;
    /// tool failures are captured in the returned [`StepResult`] instead
    /// of propagating (see the `TOOL_USE` arm below).
    pub async fn execute(
        &self,
        step: &StepConfig,
        model: &str,
        context: &Context,
        provider: &dyn Provider,
        tool_registry: &ToolRegistry,
    ) -> Result<Option<StepResult>> {
        match step.step_type.as_str() {
            "INSTRUCTION" => {
                let instruction = step.instruction.as_deref().unwrap_or_default();
                let result = provider
                    .generate(instruction, model, &serde_json::json!({}))
                    .await?;
                Ok(Some(StepResult {
                    output_text: result.text,
                    tokens_used: result.tokens_used,
                    latency_ms: result.latency_ms,
                }))
            }
            "TOOL_USE" => {
                let tool_name = step.tool_name.as_deref().unwrap_or_default();
                let start = Instant::now();
                let output_text = match tool_registry.execute(tool_name, context) {
                    Ok(value) => stringify(&value),
                    Err(err) => {
                        warn!(tool = tool_name, error = %err, "tool invocation failed; encoding as step output");
                        format!("Error executing tool {tool_name}: {err}")
                    }
                };
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                Ok(Some(StepResult {
                    output_text,
                    tokens_used: 0,
                    latency_ms,
                }))
            }
            _ => Ok(None),
        }
    }
}

/// Renders a tool's return value the way a step's `output_text` expects —
/// a bare string for `Value::String`, JSON text otherwise.
fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
