//! Structured log entries recorded on the workflow state.
//!
//! Every error or noteworthy event the orchestrator produces is appended to
//! `WorkflowState`'s bounded log as a [`LogEntry`], never as a bare string.
//! This keeps correlation ids, scopes, and structured context queryable by
//! anything that later inspects the log (tests, a debug endpoint, an
//! operator).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a [`LogEntry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Which part of the system produced a [`LogEntry`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum LogScope {
    ConversionAgent { action: String },
    EvaluationAgent { action: String },
    ConversationAgent { action: String },
    Bus { agent: String, action: String },
    Interface { endpoint: String },
}

/// A single structured log record appended to the workflow state.
///
/// # Example
///
/// ```
/// use nwb_conversation_orchestrator::diagnostics::{LogEntry, LogLevel, LogScope};
/// use serde_json::json;
///
/// let entry = LogEntry::new(
///     LogLevel::Warning,
///     LogScope::ConversionAgent { action: "detect_format".into() },
///     "LLM detection unavailable, falling back to pattern matching",
/// )
/// .with_context(json!({ "input_path": "sub-01_g0_t0.imec0.ap.bin" }));
///
/// assert_eq!(entry.level, LogLevel::Warning);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub scope: LogScope,
    #[serde(default)]
    pub context: serde_json::Value,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, scope: LogScope, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            scope,
            context: serde_json::Value::Null,
            correlation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_carries_required_fields() {
        let entry = LogEntry::new(
            LogLevel::Error,
            LogScope::EvaluationAgent {
                action: "run_validation".into(),
            },
            "inspector timed out",
        );
        assert_eq!(entry.level, LogLevel::Error);
        assert!(!entry.message.is_empty());
    }

    #[test]
    fn severity_ordering_is_info_lt_warning_lt_error() {
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }
}
