//! Language-model backend abstraction.
//!
//! [`Provider`] is the polymorphic interface `StepExecutor` dispatches
//! `INSTRUCTION` steps against. Two implementations ship with the core:
//! [`cortex::CortexProvider`] (session-backed, with a deterministic mock
//! fallback) and [`mock::MockProvider`] (always mock, for tests).

pub mod cortex;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cortex::CortexProvider;
pub use mock::MockProvider;

use crate::error::{CortexError, Result};
use crate::state::sqlite::SqliteSession;

/// The normalized result of one `generate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResult {
    /// The model's completion text.
    pub text: String,
    /// Tokens consumed by the call, if the backend reports them.
    pub tokens_used: u32,
    /// Wall-clock latency of the call, in milliseconds.
    pub latency_ms: f64,
    /// Opaque backend response, kept only for observability.
    #[serde(default)]
    pub raw_response: Option<serde_json::Value>,
}

/// A pluggable language-model backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Produces a completion for `prompt` against `model`.
    ///
    /// `config` is reserved for per-call backend options; the core never
    /// populates it (callers pass an empty object).
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        config: &serde_json::Value,
    ) -> Result<LLMResult>;
}

/// Selects a [`Provider`] by case-insensitive `kind`.
///
/// # Errors
///
/// Returns [`CortexError::Configuration`] for any `kind` other than
/// `"cortex"` or `"mock"`.
pub fn get_provider(kind: &str, session: Option<SqliteSession>) -> Result<Box<dyn Provider>> {
    match kind.to_lowercase().as_str() {
        "cortex" => Ok(Box::new(CortexProvider::new(session))),
        "mock" => Ok(Box::new(MockProvider)),
        other => Err(CortexError::configuration(format!(
            "unknown provider type: {other}"
        ))),
    }
}
