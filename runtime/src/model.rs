//! Data model: agent definitions, steps, runs, and their YAML wire shape.
//!
//! [`AgentDefinition`] and [`StepConfig`] mirror the YAML document described
//! in the external interfaces — they derive both `Serialize` and
//! `Deserialize` so [`crate::state::sqlite::SqliteStateStore`] can round-trip
//! them through the `definition_yaml` column via `serde_yaml`.

use serde::{Deserialize, Serialize};

use crate::error::{CortexError, Result};

/// One step within an [`AgentDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique name of this step within its definition.
    pub name: String,
    /// Dispatch kind. Defaults to `INSTRUCTION` when absent from YAML.
    #[serde(rename = "type", default = "StepConfig::default_type")]
    pub step_type: String,
    /// Prompt template, required when `step_type == "INSTRUCTION"`.
    #[serde(default)]
    pub instruction: Option<String>,
    /// Registered tool name, required when `step_type == "TOOL_USE"`.
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Reserved for future parameterization; unused by the executor today.
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
}

impl StepConfig {
    fn default_type() -> String {
        "INSTRUCTION".to_string()
    }

    /// Validates that the fields required by `step_type` are present.
    ///
    /// Called at registration time (`AgentDefinition::validate`), not on
    /// every dispatch — the executor trusts a definition it already loaded.
    pub fn validate(&self) -> Result<()> {
        match self.step_type.as_str() {
            "INSTRUCTION" if self.instruction.is_none() => Err(CortexError::configuration(
                format!("step '{}' is type INSTRUCTION but has no instruction", self.name),
            )),
            "TOOL_USE" if self.tool_name.is_none() => Err(CortexError::configuration(format!(
                "step '{}' is type TOOL_USE but has no tool_name",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

/// Retry policy parsed from a definition but never consulted by the
/// executor (present for forward compatibility — see the design notes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries.
    #[serde(default = "RetryPolicy::default_max_retries")]
    pub max_retries: u32,
    /// Statuses that would trigger a retry, were one implemented.
    #[serde(default = "RetryPolicy::default_retry_on_status")]
    pub retry_on_status: Vec<String>,
}

impl RetryPolicy {
    fn default_max_retries() -> u32 {
        3
    }

    fn default_retry_on_status() -> Vec<String> {
        vec!["FAILED".to_string()]
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            retry_on_status: Self::default_retry_on_status(),
        }
    }
}

/// An agent: a model identifier plus an ordered, non-empty sequence of
/// steps. Parsed from the YAML `definition_yaml` column, or injected
/// directly for tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Name this definition is registered under.
    pub name: String,
    /// Provider-specific model identifier, e.g. `"claude-3"`.
    pub model: String,
    /// Ordered steps; execution proceeds strictly in this order.
    pub steps: Vec<StepConfig>,
    /// Declared tool names. Informational only — the registry is
    /// process-global, not scoped per definition.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Parsed but unused, per the design notes.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

/// The wrapped form some callers use: `{ agent: { ... } }`.
#[derive(Debug, Deserialize)]
struct WrappedDefinition {
    agent: AgentDefinition,
}

impl AgentDefinition {
    /// Validates every step, failing fast on the first invalid one.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Ok(());
        }
        for step in &self.steps {
            step.validate()?;
        }
        Ok(())
    }

    /// Parses a YAML document, accepting either the direct form or one
    /// wrapped under a top-level `agent:` key.
    ///
    /// Returns `Ok(None)` (not an error) for an empty document or one that
    /// doesn't match either shape — `fetch_definition` treats that the same
    /// as "no active definition", per the design notes.
    pub fn from_yaml(text: &str) -> Result<Option<Self>> {
        if let Ok(wrapped) = serde_yaml::from_str::<WrappedDefinition>(text) {
            return Ok(Some(wrapped.agent));
        }
        match serde_yaml::from_str::<Self>(text) {
            Ok(def) => Ok(Some(def)),
            Err(_) => Ok(None),
        }
    }
}

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Newly created or resumed; eligible for the next claim.
    Pending,
    /// Claimed by a worker and currently executing.
    Running,
    /// All steps succeeded.
    Completed,
    /// Aborted due to an uncaught error.
    Failed,
}

impl RunStatus {
    /// The exact uppercase string stored in the `status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parses the column value back into a [`RunStatus`].
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(CortexError::StateStore(format!("unknown run status '{other}'"))),
        }
    }
}

/// Step outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// The step produced output and the run may continue.
    Success,
    /// The step raised an uncaught error; the run fails.
    Failed,
}

impl StepStatus {
    /// The exact uppercase string stored in the `status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

/// A durable step row, as appended by [`crate::state::StateStore::log_step`].
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// 0-based position in the definition's step list.
    pub step_index: usize,
    /// The step's `name` field, copied from the definition.
    pub step_name: String,
    /// Outcome of executing the step.
    pub status: StepStatus,
    /// The step's textual output (or encoded error message).
    pub output: String,
    /// Model identifier the run's definition declared.
    pub model: String,
    /// Tokens reported by the provider, or 0 for tool steps.
    pub tokens_used: u32,
    /// Wall-clock duration of the step, in milliseconds.
    pub latency_ms: f64,
}

/// A claimed run handle, as returned by
/// [`crate::state::StateStore::claim_pending_runs`].
#[derive(Debug, Clone)]
pub struct RunHandle {
    /// Caller-supplied unique run identifier.
    pub run_id: String,
    /// Name of the agent definition this run targets.
    pub agent_name: String,
    /// The run's input payload.
    pub input: serde_json::Value,
    /// Status at claim time (always `RUNNING` for a freshly claimed run).
    pub status: RunStatus,
    /// Count of `SUCCESS` step rows already logged for this run; the
    /// authoritative resume position.
    pub completed_steps: usize,
    /// A definition injected directly onto the run for tests, bypassing
    /// `fetch_definition`. Never populated by the real backend.
    pub injected_definition: Option<AgentDefinition>,
}

/// Generates a fresh, unique `run_id` for a caller submitting a new run.
///
/// `run_id` is caller-supplied by design (§3 of the data model) — this is
/// a convenience for callers that have no natural identifier of their own
/// to key the run on, rather than an identifier the engine itself assigns.
#[must_use]
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_run_id_produces_unique_values() {
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[test]
    fn direct_form_parses() {
        let yaml = "name: A\nmodel: claude-3\nsteps:\n  - name: s1\n    type: INSTRUCTION\n    instruction: hi\n";
        let def = AgentDefinition::from_yaml(yaml).unwrap().expect("valid direct form");
        assert_eq!(def.name, "A");
        assert_eq!(def.steps.len(), 1);
        def.validate().unwrap();
    }

    #[test]
    fn wrapped_form_parses() {
        let yaml = "agent:\n  name: A\n  model: claude-3\n  steps:\n    - name: s1\n      instruction: hi\n";
        let def = AgentDefinition::from_yaml(yaml).unwrap().expect("valid wrapped form");
        assert_eq!(def.name, "A");
        // step_type defaults to INSTRUCTION when absent.
        assert_eq!(def.steps[0].step_type, "INSTRUCTION");
    }

    #[test]
    fn garbage_document_is_treated_as_absent_not_an_error() {
        assert!(AgentDefinition::from_yaml("not: a valid: definition: at: all: ::").is_ok());
    }

    #[test]
    fn validate_rejects_instruction_step_missing_instruction() {
        let step = StepConfig {
            name: "s1".to_string(),
            step_type: "INSTRUCTION".to_string(),
            instruction: None,
            tool_name: None,
            inputs: serde_json::Map::new(),
        };
        assert!(step.validate().is_err());
    }

    #[test]
    fn validate_rejects_tool_use_step_missing_tool_name() {
        let step = StepConfig {
            name: "s1".to_string(),
            step_type: "TOOL_USE".to_string(),
            instruction: None,
            tool_name: None,
            inputs: serde_json::Map::new(),
        };
        assert!(step.validate().is_err());
    }

    #[test]
    fn zero_step_definition_is_valid() {
        let def = AgentDefinition {
            name: "A".to_string(),
            model: "M".to_string(),
            steps: Vec::new(),
            tools: Vec::new(),
            retry_policy: RetryPolicy::default(),
        };
        def.validate().unwrap();
    }

    #[test]
    fn run_status_round_trips_through_its_string_form() {
        for status in [RunStatus::Pending, RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(RunStatus::parse("BOGUS").is_err());
    }
}
