//! The per-run context accumulator.
//!
//! Not durable — rebuilt fresh at the start of every [`RunExecutor::execute`]
//! call (including on resume) from the run's `input` plus whatever prior
//! steps already ran. See the data model's "Run context" section for the
//! exact construction rule.
//!
//! [`RunExecutor::execute`]: crate::executor::run::RunExecutor::execute

use std::collections::BTreeMap;

use serde_json::Value;

/// The reserved key under which the raw run input always lives.
pub const INPUT_KEY: &str = "input";

/// A tagged value carried in the [`Context`] map.
///
/// A closed sum type rather than a dynamically-typed scripting value, per
/// the design notes' call for a tagged union over a reflective `any`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    /// A step's textual output, or a string-typed input field.
    Text(String),
    /// A numeric input field, kept as the JSON number it was parsed from so
    /// integer-typed fields stay integer-typed (not widened through `f64`).
    Number(serde_json::Number),
    /// A nested object or array input field.
    Structured(Value),
    /// The raw, unmodified run input (always present under `"input"`).
    RawInput(Value),
}

impl ContextValue {
    /// Renders the value as a display string, the shape tool argument
    /// binding and prompt interpolation both want.
    #[must_use]
    pub fn as_display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Structured(v) | Self::RawInput(v) => {
                serde_json::to_string(v).unwrap_or_default()
            }
        }
    }

    /// Converts to a [`serde_json::Value`], preserving numeric/structured
    /// shape where possible — what [`crate::tool::ToolRegistry::execute`]
    /// hands to a tool's declared parameters.
    #[must_use]
    pub fn as_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Structured(v) | Self::RawInput(v) => v.clone(),
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s.clone()),
            Value::Number(n) => Self::Number(n.clone()),
            other => Self::Structured(other.clone()),
        }
    }
}

/// The per-run context: `input` plus its top-level keys (if it's a
/// mapping) plus prior steps' outputs, keyed by step name.
pub type Context = BTreeMap<String, ContextValue>;

/// Builds the initial context for a run: `{"input": handle.input}`, merging
/// in `handle.input`'s top-level keys if it is itself a JSON object.
///
/// The reserved `"input"` key is inserted first and is never shadowed by a
/// same-named top-level field of the input payload.
#[must_use]
pub fn build_initial_context(input: &Value) -> Context {
    let mut context = Context::new();
    context.insert(INPUT_KEY.to_string(), ContextValue::RawInput(input.clone()));

    if let Value::Object(map) = input {
        for (key, value) in map {
            if key == INPUT_KEY {
                continue;
            }
            context.insert(key.clone(), ContextValue::from_json(value));
        }
    }
    context
}

/// Converts a [`Context`] into the plain JSON object a tool invocation's
/// signature-directed binding filters down from.
#[must_use]
pub fn context_to_json_map(context: &Context) -> serde_json::Map<String, Value> {
    context
        .iter()
        .map(|(k, v)| (k.clone(), v.as_json()))
        .collect()
}
