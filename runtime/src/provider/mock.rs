//! Explicit mock provider, used in tests.

use async_trait::async_trait;

use super::{LLMResult, Provider};
use crate::error::Result;

/// Unconditionally returns a fixed result. No state, no backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProvider;

#[async_trait]
impl Provider for MockProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _model: &str,
        _config: &serde_json::Value,
    ) -> Result<LLMResult> {
        Ok(LLMResult {
            text: "Explicit Mock Output".to_string(),
            tokens_used: 0,
            latency_ms: 0.0,
            raw_response: Some(serde_json::json!({})),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_returns_the_same_fixed_result() {
        let provider = MockProvider;
        let r1 = provider.generate("p1", "m1", &serde_json::json!({})).await.unwrap();
        let r2 = provider.generate("p2", "m2", &serde_json::json!({})).await.unwrap();
        assert_eq!(r1.text, r2.text);
        assert_eq!(r1.tokens_used, 0);
        assert_eq!(r1.latency_ms, 0.0);
    }
}
