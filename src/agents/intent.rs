//! Utterance Intent Classifier (§4.7.3): maps a user utterance during
//! `METADATA_COLLECTION` (or `VALIDATION_ANALYSIS`) to one of six intents.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::{LlmError, LlmGateway};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Provide,
    DeclineGlobal,
    DeclineField,
    RequestSequential,
    Cancel,
    Uncertain,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
struct IntentResult {
    intent: Intent,
    confidence: u8,
    reasoning: String,
}

const LLM_ACCEPT_THRESHOLD: u8 = 60;

const CANCEL_WORDS: &[&str] = &["cancel", "quit", "stop", "abort", "exit"];
const DECLINE_GLOBAL_PHRASES: &[&str] = &["skip for now", "just proceed", "no metadata", "i don't know", "i dont know"];
const DECLINE_FIELD_PHRASES: &[&str] = &["skip this one", "skip that one"];
const SEQUENTIAL_PHRASES: &[&str] = &["ask one by one", "one at a time", "one by one"];

/// Consults the LLM gateway first, accepting its answer at confidence ≥ 60;
/// falls back to keyword matching on failure, timeout, or low confidence
/// (§4.7.3). `single_field_asked` distinguishes `DECLINE_FIELD` from
/// `DECLINE_GLOBAL` when the question in flight named exactly one field.
/// `deadline` bounds the LLM round trip; an elapsed deadline falls back the
/// same as any other LLM failure.
pub async fn classify_intent(llm: &dyn LlmGateway, utterance: &str, single_field_asked: bool, deadline: Duration) -> Intent {
    if let Some(intent) = classify_via_llm(llm, utterance, deadline).await {
        return intent;
    }
    tracing::warn!(agent = "conversation", action = "classify_intent", reason = "llm_unavailable_or_low_confidence", "falling back to keyword classification");
    classify_via_keywords(utterance, single_field_asked)
}

async fn classify_via_llm(llm: &dyn LlmGateway, utterance: &str, deadline: Duration) -> Option<Intent> {
    let schema = serde_json::to_value(schemars::schema_for!(IntentResult)).ok()?;
    let system = "Classify the user's intent while collecting NWB metadata into one of: \
                  provide, decline_global, decline_field, request_sequential, cancel, uncertain.";
    let outcome = tokio::time::timeout(deadline, llm.complete_structured(system, utterance, &schema, 0.0))
        .await
        .unwrap_or(Err(LlmError::Unavailable));
    match outcome {
        Ok(value) => {
            let result: IntentResult = serde_json::from_value(value).ok()?;
            if result.confidence >= LLM_ACCEPT_THRESHOLD {
                Some(result.intent)
            } else {
                None
            }
        }
        Err(LlmError::Unavailable | LlmError::InvalidOutput { .. }) => None,
    }
}

fn classify_via_keywords(utterance: &str, single_field_asked: bool) -> Intent {
    let lower = utterance.trim().to_lowercase();
    if lower.is_empty() {
        return Intent::Uncertain;
    }
    if CANCEL_WORDS.iter().any(|w| lower.split_whitespace().any(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric()) == *w)) {
        return Intent::Cancel;
    }
    if DECLINE_GLOBAL_PHRASES.iter().any(|p| lower.contains(p)) {
        return Intent::DeclineGlobal;
    }
    if single_field_asked && DECLINE_FIELD_PHRASES.iter().any(|p| lower.contains(p)) {
        return Intent::DeclineField;
    }
    if SEQUENTIAL_PHRASES.iter().any(|p| lower.contains(p)) {
        return Intent::RequestSequential;
    }
    Intent::Provide
}
