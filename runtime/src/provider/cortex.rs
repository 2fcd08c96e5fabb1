//! Session-backed provider, with a deterministic fallback when no session
//! is attached.

use async_trait::async_trait;
use std::time::Instant;

use super::{LLMResult, Provider};
use crate::error::Result;
use crate::state::sqlite::SqliteSession;

/// Completion backend that, when wired up to a real database session,
/// would issue the vendor completion call through it.
///
/// That call is out of scope here (§1) — `session` is only ever checked
/// for presence. When absent, `generate` falls back to a deterministic mock
/// whose text embeds the model name and a prefix of the prompt, which keeps
/// end-to-end tests meaningful without a backend attached.
#[derive(Debug, Clone)]
pub struct CortexProvider {
    session: Option<SqliteSession>,
}

impl CortexProvider {
    /// Builds a provider, optionally wired to a database session.
    #[must_use]
    pub const fn new(session: Option<SqliteSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Provider for CortexProvider {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        _config: &serde_json::Value,
    ) -> Result<LLMResult> {
        let start = Instant::now();

        if self.session.is_some() {
            // No vendor completion call is implemented in this core — a
            // real deployment would issue it here, against `self.session`.
        }

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let prefix: String = prompt.chars().take(50).collect();
        Ok(LLMResult {
            text: format!("Mock response from {model} for prompt: {prefix}..."),
            tokens_used: prompt.split_whitespace().count() as u32 + 10,
            latency_ms,
            raw_response: Some(serde_json::json!({"mock": true})),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_a_session_falls_back_to_deterministic_mock() {
        let provider = CortexProvider::new(None);
        let result = provider
            .generate("describe this invoice", "claude-3", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(result.text.starts_with("Mock response from claude-3 for prompt:"));
        assert!(result.text.contains("describe this invoice"));
        assert_eq!(result.tokens_used, 3 + 10);
    }
}
