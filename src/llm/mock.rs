//! Deterministic mock gateway (§4.3), the default in every test in this
//! crate so nothing depends on network I/O.

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{strip_code_fences, validate_against_schema, LlmError, LlmGateway};

fn key_for(system: &str, user: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update([0u8]);
    hasher.update(user.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Scripted responses keyed by `sha256(system ++ "\0" ++ user)`, or by an
/// explicit caller-set key via [`MockLlmGateway::with_response`]. Unknown
/// keys return `LlmError::Unavailable` so tests can assert on fallback
/// behavior.
#[derive(Default)]
pub struct MockLlmGateway {
    responses: Mutex<FxHashMap<String, String>>,
}

impl MockLlmGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a response for an explicit key, bypassing the
    /// `(system, user)` hash. Useful when a test wants to script a response
    /// without reproducing the exact prompt text.
    #[must_use]
    pub fn with_response(self, key: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.lock().insert(key.into(), response.into());
        self
    }

    /// Registers a response keyed by the literal `(system, user)` pair.
    #[must_use]
    pub fn with_completion(self, system: &str, user: &str, response: impl Into<String>) -> Self {
        self.with_response(key_for(system, user), response)
    }
}

#[async_trait]
impl LlmGateway for MockLlmGateway {
    async fn complete(&self, system: &str, user: &str, _temperature: f32) -> Result<String, LlmError> {
        let key = key_for(system, user);
        self.responses
            .lock()
            .get(&key)
            .cloned()
            .ok_or(LlmError::Unavailable)
    }

    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
        _temperature: f32,
    ) -> Result<Value, LlmError> {
        let key = key_for(system, user);
        let raw = self.responses.lock().get(&key).cloned().ok_or(LlmError::Unavailable)?;
        let stripped = strip_code_fences(&raw);
        let value: Value = serde_json::from_str(stripped).map_err(|e| LlmError::InvalidOutput {
            reason: format!("not valid JSON: {e}"),
        })?;
        validate_against_schema(&value, schema)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_prompt_returns_unavailable() {
        let gateway = MockLlmGateway::new();
        let err = gateway.complete("sys", "user", 0.0).await.unwrap_err();
        assert_eq!(err, LlmError::Unavailable);
    }

    #[tokio::test]
    async fn scripted_completion_by_literal_prompt() {
        let gateway = MockLlmGateway::new().with_completion("sys", "user", "hello");
        let response = gateway.complete("sys", "user", 0.0).await.unwrap();
        assert_eq!(response, "hello");
    }

    #[tokio::test]
    async fn scripted_completion_by_explicit_key() {
        let gateway = MockLlmGateway::new().with_response("detect-format", "spikeglx");
        let response = gateway.complete("irrelevant", "irrelevant", 0.0).await;
        assert_eq!(response.unwrap_err(), LlmError::Unavailable);
    }

    #[tokio::test]
    async fn structured_completion_strips_fences_and_validates() {
        let schema = json!({ "type": "object", "required": ["intent"] });
        let gateway =
            MockLlmGateway::new().with_completion("sys", "user", "```json\n{\"intent\":\"provide\"}\n```");
        let value = gateway.complete_structured("sys", "user", &schema, 0.0).await.unwrap();
        assert_eq!(value["intent"], "provide");
    }

    #[tokio::test]
    async fn structured_completion_rejects_schema_mismatch() {
        let schema = json!({ "type": "object", "required": ["intent"] });
        let gateway = MockLlmGateway::new().with_completion("sys", "user", "{\"other\":1}");
        let err = gateway.complete_structured("sys", "user", &schema, 0.0).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidOutput { .. }));
    }
}
