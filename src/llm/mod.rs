//! Language Model Gateway (§4.3): two narrow capabilities — free-form
//! completion and schema-constrained structured completion — behind a trait
//! so the rest of the crate never depends on a concrete LLM client.

mod mock;

pub use mock::MockLlmGateway;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("language model backend unavailable")]
    #[diagnostic(
        code(orchestrator::llm::unavailable),
        help("callers must fall back to a deterministic pattern-based path")
    )]
    Unavailable,

    #[error("language model returned output that does not satisfy the schema: {reason}")]
    #[diagnostic(code(orchestrator::llm::invalid_output))]
    InvalidOutput { reason: String },
}

/// Abstract LLM capability. Every consumer must tolerate either method
/// failing and substitute a deterministic fallback (§4.3, §9).
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String, LlmError>;

    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
        temperature: f32,
    ) -> Result<Value, LlmError>;
}

/// Strips a single pair of enclosing ``` code fences (with an optional
/// language tag on the opening fence), as called for by §4.3.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_suffix("```").unwrap_or(body);
    match body.find('\n') {
        Some(idx) if body[..idx].trim().chars().all(|c| c.is_alphanumeric()) => body[idx + 1..].trim(),
        _ => body.trim(),
    }
}

/// Validates `value` against `schema`, mapping any failure to
/// `LlmError::InvalidOutput`.
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<(), LlmError> {
    let compiled = jsonschema::JSONSchema::compile(schema).map_err(|e| LlmError::InvalidOutput {
        reason: format!("caller-supplied schema does not compile: {e}"),
    })?;
    match compiled.validate(value) {
        Ok(()) => Ok(()),
        Err(errors) => {
            let reason = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            Err(LlmError::InvalidOutput { reason })
        }
    }
}
