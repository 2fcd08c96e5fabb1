//! Name→callable tool registry with signature-directed argument binding.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{CortexError, Result};

/// A registered tool: its declared parameter names plus the callable
/// itself.
///
/// Rust has no runtime reflection over closures, so — per the design
/// notes — a tool declares the parameter names it accepts up front at
/// registration time, in place of the Python source's `inspect.signature`
/// walk. The registry still performs the same filter: only context keys
/// named in `params` reach the callable.
struct ToolEntry {
    params: Vec<String>,
    func: Arc<dyn Fn(&serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value> + Send + Sync>,
}

/// Name→callable mapping with signature-directed argument binding.
///
/// The engine passes the entire per-run [`Context`] as a tool's input map;
/// signature filtering lets each tool declare exactly what it consumes.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `func` under `name`, declaring the parameter names it
    /// accepts from the input map. Last writer wins.
    pub fn register<F>(&mut self, name: impl Into<String>, params: &[&str], func: F)
    where
        F: Fn(&serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value>
            + Send
            + Sync
            + 'static,
    {
        self.tools.insert(
            name.into(),
            ToolEntry {
                params: params.iter().map(|s| (*s).to_string()).collect(),
                func: Arc::new(func),
            },
        );
    }

    /// Returns whether a tool is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Resolves `name` and invokes it with the subset of `context` whose
    /// keys match the tool's declared parameters. Extra context keys are
    /// silently ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CortexError::ToolNotFound`] if no tool is registered under
    /// `name`, or [`CortexError::ToolInvocation`] if the callable itself
    /// fails.
    pub fn execute(&self, name: &str, context: &Context) -> Result<serde_json::Value> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| CortexError::ToolNotFound(name.to_string()))?;

        let input_map = crate::context::context_to_json_map(context);
        let filtered: serde_json::Map<String, serde_json::Value> = input_map
            .into_iter()
            .filter(|(k, _)| entry.params.iter().any(|p| p == k))
            .collect();

        (entry.func)(&filtered).map_err(|e| CortexError::tool_invocation(name, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_initial_context;
    use serde_json::json;

    #[test]
    fn filters_input_to_declared_params_and_invokes() {
        let mut registry = ToolRegistry::new();
        registry.register("calculator", &["a", "b"], |input| {
            let a = input.get("a").and_then(serde_json::Value::as_i64).unwrap_or(0);
            let b = input.get("b").and_then(serde_json::Value::as_i64).unwrap_or(0);
            Ok(json!(a + b))
        });

        let context = build_initial_context(&json!({"a": 10, "b": 20, "c": "ignored"}));
        let result = registry.execute("calculator", &context).unwrap();
        assert_eq!(result, json!(30));
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let context = build_initial_context(&json!({}));
        let err = registry.execute("nope", &context).unwrap_err();
        assert!(matches!(err, CortexError::ToolNotFound(_)));
    }

    #[test]
    fn callable_failure_is_wrapped_as_tool_invocation_error() {
        let mut registry = ToolRegistry::new();
        registry.register("always_fails", &[], |_| {
            Err(CortexError::configuration("boom"))
        });
        let context = build_initial_context(&json!({}));
        let err = registry.execute("always_fails", &context).unwrap_err();
        assert!(matches!(err, CortexError::ToolInvocation { .. }));
    }

    #[test]
    fn last_writer_wins_on_duplicate_registration() {
        let mut registry = ToolRegistry::new();
        registry.register("tool", &[], |_| Ok(json!("first")));
        registry.register("tool", &[], |_| Ok(json!("second")));
        let context = build_initial_context(&json!({}));
        assert_eq!(registry.execute("tool", &context).unwrap(), json!("second"));
    }
}
