//! The single authoritative workflow state (§3/§4.1).
//!
//! [`WorkflowState`] is the one mutable shared resource in the system. It is
//! mutated exclusively through the transition methods below, each of which
//! validates the source status, applies the change, bumps `updated_at`, and
//! emits exactly one [`WorkflowEvent`]. Every method takes the process-wide
//! write lock for its whole duration; no transition method calls another
//! while already holding it, so the effect is equivalent to the
//! re-entrant single lock described in §5.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::diagnostics::LogEntry;
use crate::event_bus::{EventEmitter, WorkflowEvent};
use crate::message::{HistoryTurn, Role};

/// Safety bound on the retry loop (§4.7.5). Not a UX bound: user decisions
/// (decline, cancel) terminate the loop earlier.
pub const MAX_RETRIES: u32 = 10;

/// Maximum number of turns kept in the rolling dialogue history window.
pub const HISTORY_WINDOW: usize = 50;

/// Maximum number of entries kept in the bounded structured log.
pub const LOG_WINDOW: usize = 200;

// ---------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Idle,
    Uploading,
    DetectingFormat,
    AwaitingUserInput,
    Converting,
    Validating,
    AwaitingRetryApproval,
    Completed,
    Failed,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Idle => "idle",
            ConversionStatus::Uploading => "uploading",
            ConversionStatus::DetectingFormat => "detecting_format",
            ConversionStatus::AwaitingUserInput => "awaiting_user_input",
            ConversionStatus::Converting => "converting",
            ConversionStatus::Validating => "validating",
            ConversionStatus::AwaitingRetryApproval => "awaiting_retry_approval",
            ConversionStatus::Completed => "completed",
            ConversionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionStatus::Completed | ConversionStatus::Failed)
    }

    /// Statuses during which a second upload or conversion start must be
    /// rejected with `Busy` at the external interface (§5).
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ConversionStatus::Uploading
                | ConversionStatus::DetectingFormat
                | ConversionStatus::Converting
                | ConversionStatus::Validating
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Passed,
    PassedWithIssues,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationDisposition {
    Passed,
    PassedImproved,
    PassedAccepted,
    FailedUserDeclined,
    FailedUserAbandoned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    None,
    FormatSelection,
    MetadataCollection,
    ValidationAnalysis,
    ImprovementDecision,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataRequestPolicy {
    NotAsked,
    AskedOnce,
    UserDeclined,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    UserProvided,
    AutoExtracted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataValue {
    pub value: String,
    pub confidence: u8,
    pub source: MetadataSource,
}

/// Result of format detection (§4.5 `detect_format`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum FormatDetection {
    Identified {
        format: String,
        confidence: u8,
        evidence: String,
    },
    Ambiguous {
        candidates: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    BestPractice,
}

/// A single normalized validator finding (§4.6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    pub location: String,
    pub check_name: String,
}

// ---------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------

/// The "Invariant" error class of §7: precondition violations that are not
/// user-facing. These surface as `Internal` at the external interface and
/// are logged at `ERROR`.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("cannot {action} from status {from:?}")]
    #[diagnostic(
        code(orchestrator::state::invalid_transition),
        help("this is a precondition violation, not a user-facing error")
    )]
    InvalidTransition {
        action: &'static str,
        from: ConversionStatus,
    },

    #[error("workflow is already terminal ({0:?})")]
    #[diagnostic(code(orchestrator::state::already_terminal))]
    AlreadyTerminal(ConversionStatus),

    #[error("correction attempt limit ({MAX_RETRIES}) reached")]
    #[diagnostic(code(orchestrator::state::retry_limit_exceeded))]
    RetryLimitExceeded,
}

// ---------------------------------------------------------------------
// Snapshot carried on every push event
// ---------------------------------------------------------------------

/// The post-transition view broadcast with every [`WorkflowEvent`]. Kept
/// small and self-consistent: there is never a snapshot with
/// `validation_outcome = PassedWithIssues` and
/// `status ∈ {Validating, Converting}` because it is only ever built from
/// already-committed state, inside the same lock acquisition that performed
/// the mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub status: ConversionStatus,
    pub conversation_phase: ConversationPhase,
    pub validation_outcome: Option<ValidationOutcome>,
    pub validation_disposition: Option<ValidationDisposition>,
    pub llm_message: Option<String>,
    pub issue_count: usize,
    pub correction_attempt: u32,
}

// ---------------------------------------------------------------------
// Inner state
// ---------------------------------------------------------------------

#[derive(Debug)]
pub struct WorkflowStateInner {
    pub session_id: Uuid,
    pub input_path: Option<PathBuf>,
    pub pending_input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub checksum: Option<String>,

    pub status: ConversionStatus,
    pub conversation_phase: ConversationPhase,
    /// The phase `record_user_turn` was called under for the most recent
    /// user turn, captured before that phase is advanced. Distinguishes a
    /// reply to a metadata question from a reply to, say, a format-selection
    /// question (§4.7.4 condition 4 only concerns the former).
    pub last_user_reply_phase: Option<ConversationPhase>,
    pub validation_outcome: Option<ValidationOutcome>,
    pub validation_disposition: Option<ValidationDisposition>,

    pub history: VecDeque<HistoryTurn>,
    pub llm_message: Option<String>,

    pub user_provided: FxHashMap<String, MetadataValue>,
    pub auto_extracted: FxHashMap<String, MetadataValue>,
    pub declined_fields: HashSet<String>,
    pub flagged_for_review: Vec<String>,

    pub metadata_request_policy: MetadataRequestPolicy,
    pub wants_sequential: bool,

    pub format_detection: Option<FormatDetection>,

    pub correction_attempt: u32,
    pub previous_issues_fingerprint: Option<u64>,
    pub user_provided_input_this_attempt: bool,
    pub auto_corrections_applied_this_attempt: bool,
    pub issues: Vec<Finding>,
    /// Consecutive retry iterations with an unchanged issue fingerprint and
    /// no attempt flags set (§4.7.5's no-progress guard).
    pub no_progress_streak: u32,
    /// Number of times the current `IMPROVEMENT_DECISION` question has been
    /// re-asked after an unrecognized reply (§4.7.2).
    pub reprompt_count: u32,

    /// Set once per terminal transition by `generate_reports` (§4.7.6);
    /// served by the `download("report")` endpoint.
    pub report_json: Option<serde_json::Value>,
    pub report_markdown: Option<String>,

    pub log: VecDeque<LogEntry>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for WorkflowStateInner {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            input_path: None,
            pending_input_path: None,
            output_path: None,
            checksum: None,
            status: ConversionStatus::Idle,
            conversation_phase: ConversationPhase::None,
            last_user_reply_phase: None,
            validation_outcome: None,
            validation_disposition: None,
            history: VecDeque::new(),
            llm_message: None,
            user_provided: FxHashMap::default(),
            auto_extracted: FxHashMap::default(),
            declined_fields: HashSet::new(),
            flagged_for_review: Vec::new(),
            metadata_request_policy: MetadataRequestPolicy::NotAsked,
            wants_sequential: false,
            format_detection: None,
            correction_attempt: 0,
            previous_issues_fingerprint: None,
            user_provided_input_this_attempt: false,
            auto_corrections_applied_this_attempt: false,
            issues: Vec::new(),
            no_progress_streak: 0,
            reprompt_count: 0,
            report_json: None,
            report_markdown: None,
            log: VecDeque::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl WorkflowStateInner {
    /// `effective = auto_extracted ∪ user_provided`, user wins on collision
    /// (invariant 5).
    pub fn effective(&self) -> FxHashMap<String, MetadataValue> {
        let mut merged = self.auto_extracted.clone();
        for (k, v) in &self.user_provided {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    fn push_history(&mut self, role: Role, text: &str) {
        self.history.push_back(HistoryTurn::new(role, text));
        while self.history.len() > HISTORY_WINDOW {
            self.history.pop_front();
        }
    }

    fn push_log(&mut self, entry: LogEntry) {
        self.log.push_back(entry);
        while self.log.len() > LOG_WINDOW {
            self.log.pop_front();
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            status: self.status,
            conversation_phase: self.conversation_phase,
            validation_outcome: self.validation_outcome,
            validation_disposition: self.validation_disposition,
            llm_message: self.llm_message.clone(),
            issue_count: self.issues.len(),
            correction_attempt: self.correction_attempt,
        }
    }

    /// True if the last user turn was recorded while `MetadataCollection` was
    /// the active phase, used by the Metadata Request Gate (§4.7.4 condition
    /// 4) to tell a reply to a metadata question apart from a reply to an
    /// unrelated question (e.g. format selection) that merely happens to be
    /// the most recent history turn.
    pub fn last_reply_was_metadata_collection(&self) -> bool {
        self.last_user_reply_phase == Some(ConversationPhase::MetadataCollection)
    }
}

// ---------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------

/// Cloneable handle to the single shared [`WorkflowStateInner`], guarded by
/// a `parking_lot::RwLock` (§5). All public mutation goes through the
/// methods here; nothing outside this module touches the lock directly.
#[derive(Clone)]
pub struct WorkflowStateHandle {
    inner: Arc<RwLock<WorkflowStateInner>>,
    emitter: Arc<dyn EventEmitter>,
}

impl WorkflowStateHandle {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(WorkflowStateInner::default())),
            emitter,
        }
    }

    /// Read-only access to the current state. Never mutates — used by
    /// `status()` and any code that just needs to look.
    pub fn read<R>(&self, f: impl FnOnce(&WorkflowStateInner) -> R) -> R {
        f(&self.inner.read())
    }

    fn emit(&self, event: WorkflowEvent) {
        // Event delivery is best-effort: a closed hub must never fail a
        // state transition (§5 ordering guarantees are about *delivered*
        // events, not about gating mutation on delivery).
        let _ = self.emitter.emit(event);
    }

    fn log_entry(&self, entry: LogEntry) {
        self.inner.write().push_log(entry);
    }

    pub fn log(&self, entry: LogEntry) {
        self.log_entry(entry);
    }

    // -- §4.1 transition operations -----------------------------------

    pub fn begin_upload(
        &self,
        path: PathBuf,
        metadata_hint: Option<FxHashMap<String, String>>,
    ) -> Result<(), StateError> {
        let mut guard = self.inner.write();

        if guard.status == ConversionStatus::AwaitingUserInput && !guard.history.is_empty() {
            guard.pending_input_path = Some(path);
            guard.updated_at = Utc::now();
            let snapshot = guard.snapshot();
            drop(guard);
            self.emit(WorkflowEvent::StatusChanged { snapshot });
            return Ok(());
        }

        if guard.status.is_busy() {
            return Err(StateError::InvalidTransition {
                action: "begin_upload",
                from: guard.status,
            });
        }
        if !(guard.status == ConversionStatus::Idle || guard.status.is_terminal()) {
            return Err(StateError::InvalidTransition {
                action: "begin_upload",
                from: guard.status,
            });
        }

        guard.input_path = Some(path);
        if let Some(hint) = metadata_hint {
            for (k, v) in hint {
                guard.auto_extracted.insert(
                    k,
                    MetadataValue {
                        value: v,
                        confidence: 100,
                        source: MetadataSource::AutoExtracted,
                    },
                );
            }
        }
        guard.status = ConversionStatus::Uploading;
        guard.updated_at = Utc::now();
        let snapshot = guard.snapshot();
        drop(guard);
        self.emit(WorkflowEvent::StatusChanged { snapshot });
        Ok(())
    }

    pub fn set_format_detection_started(&self) -> Result<(), StateError> {
        let mut guard = self.inner.write();
        if guard.status != ConversionStatus::Uploading {
            return Err(StateError::InvalidTransition {
                action: "set_format_detection_started",
                from: guard.status,
            });
        }
        guard.status = ConversionStatus::DetectingFormat;
        guard.updated_at = Utc::now();
        let snapshot = guard.snapshot();
        drop(guard);
        self.emit(WorkflowEvent::StatusChanged { snapshot });
        Ok(())
    }

    pub fn set_format_detection_result(&self, result: FormatDetection) -> Result<(), StateError> {
        let mut guard = self.inner.write();
        let gate_ok = guard.status == ConversionStatus::DetectingFormat
            || (guard.status == ConversionStatus::AwaitingUserInput
                && guard.conversation_phase == ConversationPhase::FormatSelection);
        if !gate_ok {
            return Err(StateError::InvalidTransition {
                action: "set_format_detection_result",
                from: guard.status,
            });
        }
        guard.format_detection = Some(result);
        guard.updated_at = Utc::now();
        Ok(())
    }

    pub fn enter_phase(&self, phase: ConversationPhase, llm_message: impl Into<String>) {
        let mut guard = self.inner.write();
        let message = llm_message.into();
        guard.status = ConversionStatus::AwaitingUserInput;
        guard.conversation_phase = phase;
        guard.llm_message = Some(message.clone());
        guard.push_history(Role::Assistant, &message);
        guard.updated_at = Utc::now();
        let snapshot = guard.snapshot();
        drop(guard);
        self.emit(WorkflowEvent::StatusChanged { snapshot });
    }

    pub fn record_user_turn(&self, text: &str) {
        let mut guard = self.inner.write();
        guard.last_user_reply_phase = Some(guard.conversation_phase);
        guard.push_history(Role::User, text);
        guard.updated_at = Utc::now();
    }

    pub fn record_assistant_turn(&self, text: &str) {
        let mut guard = self.inner.write();
        guard.push_history(Role::Assistant, text);
        guard.llm_message = Some(text.to_string());
        guard.updated_at = Utc::now();
    }

    /// Merges LLM-extracted (or user-confirmed) fields into `user_provided`,
    /// overriding on key collision (invariant 5). Not status-gated: metadata
    /// can arrive any time the Conversation Agent is processing a `PROVIDE`
    /// utterance, which is always while `AWAITING_USER_INPUT`.
    pub fn merge_user_provided(&self, fields: Vec<(String, MetadataValue)>) {
        let mut guard = self.inner.write();
        for (name, value) in fields {
            guard.user_provided.insert(name, value);
        }
        guard.updated_at = Utc::now();
    }

    pub fn add_flagged_for_review(&self, field: String) {
        let mut guard = self.inner.write();
        if !guard.flagged_for_review.contains(&field) {
            guard.flagged_for_review.push(field);
        }
    }

    pub fn decline_field(&self, field: &str) {
        let mut guard = self.inner.write();
        guard.declined_fields.insert(field.to_string());
        guard.updated_at = Utc::now();
    }

    pub fn set_metadata_request_policy(&self, policy: MetadataRequestPolicy) {
        self.inner.write().metadata_request_policy = policy;
    }

    pub fn set_wants_sequential(&self, value: bool) {
        self.inner.write().wants_sequential = value;
    }

    pub fn set_previous_issues_fingerprint(&self, fingerprint: Option<u64>) {
        self.inner.write().previous_issues_fingerprint = fingerprint;
    }

    pub fn mark_user_provided_input_this_attempt(&self) {
        self.inner.write().user_provided_input_this_attempt = true;
    }

    pub fn mark_auto_corrections_applied_this_attempt(&self) {
        self.inner.write().auto_corrections_applied_this_attempt = true;
    }

    pub fn clear_attempt_flags(&self) {
        let mut guard = self.inner.write();
        guard.user_provided_input_this_attempt = false;
        guard.auto_corrections_applied_this_attempt = false;
    }

    /// Moves a staged re-upload (invariant 7) into `input_path`, clearing
    /// `pending_input_path`. A no-op if nothing is staged.
    pub fn promote_pending_input(&self) {
        let mut guard = self.inner.write();
        if let Some(pending) = guard.pending_input_path.take() {
            guard.input_path = Some(pending);
        }
    }

    pub fn note_no_progress(&self) -> u32 {
        let mut guard = self.inner.write();
        guard.no_progress_streak += 1;
        guard.no_progress_streak
    }

    pub fn reset_no_progress(&self) {
        self.inner.write().no_progress_streak = 0;
    }

    pub fn increment_reprompt(&self) -> u32 {
        let mut guard = self.inner.write();
        guard.reprompt_count += 1;
        guard.reprompt_count
    }

    pub fn reset_reprompt(&self) {
        self.inner.write().reprompt_count = 0;
    }

    pub fn begin_conversion(&self) -> Result<(), StateError> {
        let mut guard = self.inner.write();
        let gate_ok = matches!(
            guard.status,
            ConversionStatus::DetectingFormat
                | ConversionStatus::AwaitingUserInput
                | ConversionStatus::AwaitingRetryApproval
        );
        if !gate_ok {
            return Err(StateError::InvalidTransition {
                action: "begin_conversion",
                from: guard.status,
            });
        }
        guard.user_provided_input_this_attempt = false;
        guard.auto_corrections_applied_this_attempt = false;
        guard.status = ConversionStatus::Converting;
        guard.updated_at = Utc::now();
        let snapshot = guard.snapshot();
        drop(guard);
        self.emit(WorkflowEvent::StatusChanged { snapshot });
        Ok(())
    }

    pub fn set_output(&self, path: PathBuf, checksum: String) -> Result<(), StateError> {
        let mut guard = self.inner.write();
        if guard.status != ConversionStatus::Converting {
            return Err(StateError::InvalidTransition {
                action: "set_output",
                from: guard.status,
            });
        }
        guard.output_path = Some(path);
        guard.checksum = Some(checksum);
        guard.status = ConversionStatus::Validating;
        guard.updated_at = Utc::now();
        let snapshot = guard.snapshot();
        drop(guard);
        self.emit(WorkflowEvent::StatusChanged { snapshot });
        Ok(())
    }

    pub fn set_validation_outcome(
        &self,
        outcome: ValidationOutcome,
        issues: Vec<Finding>,
    ) -> Result<(), StateError> {
        let mut guard = self.inner.write();
        if guard.status != ConversionStatus::Validating {
            return Err(StateError::InvalidTransition {
                action: "set_validation_outcome",
                from: guard.status,
            });
        }
        guard.validation_outcome = Some(outcome);
        guard.issues = issues;
        guard.updated_at = Utc::now();
        let snapshot = guard.snapshot();
        drop(guard);
        self.emit(WorkflowEvent::ValidationComplete { snapshot });
        Ok(())
    }

    /// §4.7.6 Outcome Dispatch: one atomic transition that sets status and
    /// phase/disposition together, so no subscriber ever observes
    /// `validation_outcome = PassedWithIssues` with `status ∈ {Validating,
    /// Converting}`.
    pub fn apply_outcome_dispatch(&self, outcome: ValidationOutcome) -> Result<(), StateError> {
        let mut guard = self.inner.write();
        if guard.validation_disposition.is_some() {
            return Err(StateError::AlreadyTerminal(guard.status));
        }
        match outcome {
            ValidationOutcome::Passed => {
                let disposition = if guard.correction_attempt == 0 {
                    ValidationDisposition::Passed
                } else {
                    ValidationDisposition::PassedImproved
                };
                guard.validation_disposition = Some(disposition);
                guard.status = ConversionStatus::Completed;
                guard.conversation_phase = ConversationPhase::None;
            }
            ValidationOutcome::PassedWithIssues => {
                guard.status = ConversionStatus::AwaitingUserInput;
                guard.conversation_phase = ConversationPhase::ImprovementDecision;
            }
            ValidationOutcome::Failed => {
                guard.status = ConversionStatus::AwaitingRetryApproval;
                guard.conversation_phase = ConversationPhase::ImprovementDecision;
            }
        }
        guard.updated_at = Utc::now();
        let snapshot = guard.snapshot();
        drop(guard);
        self.emit(WorkflowEvent::StatusChanged { snapshot });
        Ok(())
    }

    pub fn set_terminal(&self, disposition: ValidationDisposition) -> Result<(), StateError> {
        let mut guard = self.inner.write();
        if guard.status.is_terminal() {
            return Err(StateError::AlreadyTerminal(guard.status));
        }
        guard.validation_disposition = Some(disposition);
        guard.status = match disposition {
            ValidationDisposition::Passed
            | ValidationDisposition::PassedImproved
            | ValidationDisposition::PassedAccepted => ConversionStatus::Completed,
            ValidationDisposition::FailedUserDeclined
            | ValidationDisposition::FailedUserAbandoned => ConversionStatus::Failed,
        };
        guard.conversation_phase = ConversationPhase::None;
        guard.updated_at = Utc::now();
        let snapshot = guard.snapshot();
        drop(guard);
        self.emit(WorkflowEvent::StatusChanged { snapshot });
        Ok(())
    }

    pub fn increment_correction_attempt(&self) -> Result<u32, StateError> {
        let mut guard = self.inner.write();
        if guard.correction_attempt >= MAX_RETRIES {
            return Err(StateError::RetryLimitExceeded);
        }
        guard.correction_attempt += 1;
        guard.updated_at = Utc::now();
        Ok(guard.correction_attempt)
    }

    /// Reports a conversion progress tick (§4.5's milestones). Does not
    /// touch `status` or bump `updated_at` — purely an informational event
    /// for the push channel.
    pub fn emit_progress(&self, percentage: u8, phase: &str) {
        self.emit(WorkflowEvent::ConversionProgress {
            percentage,
            phase: phase.to_string(),
        });
    }

    /// Attaches the reports produced on a terminal transition (§4.7.6). Pure
    /// data attach: not a state-machine transition in its own right, so it
    /// does not emit an event (the terminal transition that precedes it
    /// already did).
    pub fn store_reports(&self, json: serde_json::Value, markdown: String) {
        let mut guard = self.inner.write();
        guard.report_json = Some(json);
        guard.report_markdown = Some(markdown);
    }

    pub fn reset(&self) {
        let mut guard = self.inner.write();
        *guard = WorkflowStateInner::default();
        drop(guard);
        self.emit(WorkflowEvent::Reset);
    }
}
