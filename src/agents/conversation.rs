//! Conversation Agent (§4.7): the orchestrator. Owns all dialogue, state
//! transitions, the retry loop, and every invocation of the Conversion and
//! Evaluation agents, which it reaches exclusively through the [`Bus`] —
//! never by holding their concrete types.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHasher};
use serde_json::json;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tracing::instrument;

use super::evaluation::{CorrectionAnalysis, Reports, ValidationResult};
use super::intent::{classify_intent, Intent};
use crate::backends::{ConversionBackend, InspectorBackend};
use crate::bus::{Bus, BusError};
use crate::config::OrchestratorConfig;
use crate::llm::{LlmError, LlmGateway};
use crate::schema;
use crate::state::{
    ConversationPhase, ConversionStatus, Finding, FormatDetection, MetadataRequestPolicy, MetadataSource,
    MetadataValue, Severity, ValidationDisposition, ValidationOutcome, WorkflowStateHandle,
};

#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    #[error("workflow is busy with an active conversion")]
    #[diagnostic(code(orchestrator::conversation::busy))]
    Busy,

    #[error("precondition not met: {0}")]
    #[diagnostic(code(orchestrator::conversation::invalid_state))]
    InvalidState(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    State(#[from] crate::state::StateError),

    #[error("internal error: {0}")]
    #[diagnostic(code(orchestrator::conversation::internal))]
    Internal(String),
}

pub struct ConversationAgent {
    state: WorkflowStateHandle,
    bus: Arc<Bus>,
    llm: Arc<dyn LlmGateway>,
    config: Arc<OrchestratorConfig>,
}

impl ConversationAgent {
    pub fn new(state: WorkflowStateHandle, bus: Arc<Bus>, llm: Arc<dyn LlmGateway>) -> Self {
        Self::with_config(state, bus, llm, Arc::new(OrchestratorConfig::default()))
    }

    pub fn with_config(state: WorkflowStateHandle, bus: Arc<Bus>, llm: Arc<dyn LlmGateway>, config: Arc<OrchestratorConfig>) -> Self {
        Self { state, bus, llm, config }
    }

    /// Runs `fut` against `self.config.llm_deadline()`, folding an elapsed
    /// deadline into [`LlmError::Unavailable`] so every existing fallback
    /// path (keyword classification, pattern extraction, a canned reply)
    /// triggers exactly as it does for any other LLM failure (§5).
    async fn with_llm_deadline<T>(&self, fut: impl std::future::Future<Output = Result<T, LlmError>>) -> Result<T, LlmError> {
        tokio::time::timeout(self.config.llm_deadline(), fut).await.unwrap_or(Err(LlmError::Unavailable))
    }

    /// Registers the Conversion and Evaluation agents' handlers on `bus`.
    /// Called once at startup; a later call replaces the previous handlers
    /// (useful for tests swapping in a failing backend).
    pub async fn register_agents(
        bus: &Bus,
        state: WorkflowStateHandle,
        conversion_llm: Arc<dyn LlmGateway>,
        conversion_backend: Arc<dyn ConversionBackend>,
        inspector_backend: Arc<dyn InspectorBackend>,
    ) {
        let conversion = Arc::new(super::conversion::ConversionAgent::new(conversion_llm, conversion_backend));
        let evaluation = Arc::new(super::evaluation::EvaluationAgent::new(inspector_backend));

        {
            let conversion = Arc::clone(&conversion);
            bus.register("conversion", "detect_format", move |req| {
                let conversion = Arc::clone(&conversion);
                async move {
                    let input_path = req["input_path"].as_str().unwrap_or_default();
                    let detection = conversion.detect_format(Path::new(input_path)).await;
                    serde_json::to_value(detection).map_err(to_handler_exception("conversion", "detect_format"))
                }
            })
            .await;
        }
        {
            let conversion = Arc::clone(&conversion);
            let state = state.clone();
            bus.register("conversion", "run_conversion", move |req| {
                let conversion = Arc::clone(&conversion);
                let state = state.clone();
                async move {
                    let input_path = PathBuf::from(req["input_path"].as_str().unwrap_or_default());
                    let format = req["format"].as_str().unwrap_or_default().to_string();
                    let output_path = PathBuf::from(req["output_path"].as_str().unwrap_or_default());
                    let metadata: FxHashMap<String, MetadataValue> =
                        serde_json::from_value(req["metadata"].clone()).unwrap_or_default();
                    let progress = |pct: u8, phase: &str| state.emit_progress(pct, phase);
                    conversion
                        .run_conversion(&input_path, &format, &metadata, &output_path, &progress)
                        .await
                        .map(|(path, checksum)| json!({ "output_path": path.to_string_lossy(), "checksum": checksum }))
                        .map_err(to_handler_exception("conversion", "run_conversion"))
                }
            })
            .await;
        }
        {
            let conversion = Arc::clone(&conversion);
            let state = state.clone();
            bus.register("conversion", "apply_corrections", move |req| {
                let conversion = Arc::clone(&conversion);
                let state = state.clone();
                async move {
                    let input_path = PathBuf::from(req["input_path"].as_str().unwrap_or_default());
                    let format = req["format"].as_str().unwrap_or_default().to_string();
                    let previous_output_path = PathBuf::from(req["previous_output_path"].as_str().unwrap_or_default());
                    let attempt = req["attempt"].as_u64().unwrap_or(1) as u32;
                    let metadata: FxHashMap<String, MetadataValue> =
                        serde_json::from_value(req["metadata"].clone()).unwrap_or_default();
                    let progress = |pct: u8, phase: &str| state.emit_progress(pct, phase);
                    conversion
                        .apply_corrections(&input_path, &format, &metadata, &previous_output_path, attempt, &progress)
                        .await
                        .map(|(path, checksum)| json!({ "output_path": path.to_string_lossy(), "checksum": checksum }))
                        .map_err(to_handler_exception("conversion", "apply_corrections"))
                }
            })
            .await;
        }
        {
            let evaluation = Arc::clone(&evaluation);
            bus.register("evaluation", "run_validation", move |req| {
                let evaluation = Arc::clone(&evaluation);
                async move {
                    let nwb_path = PathBuf::from(req["nwb_path"].as_str().unwrap_or_default());
                    let result = evaluation.run_validation(&nwb_path).await;
                    serde_json::to_value(result).map_err(to_handler_exception("evaluation", "run_validation"))
                }
            })
            .await;
        }
        {
            let evaluation = Arc::clone(&evaluation);
            bus.register("evaluation", "analyze_corrections", move |req| {
                let evaluation = Arc::clone(&evaluation);
                async move {
                    let issues: Vec<Finding> = serde_json::from_value(req["issues"].clone()).unwrap_or_default();
                    let metadata: FxHashMap<String, MetadataValue> =
                        serde_json::from_value(req["metadata"].clone()).unwrap_or_default();
                    let analysis = evaluation.analyze_corrections(&issues, &metadata);
                    serde_json::to_value(analysis).map_err(to_handler_exception("evaluation", "analyze_corrections"))
                }
            })
            .await;
        }
        {
            bus.register("evaluation", "generate_reports", move |req| {
                let evaluation = Arc::clone(&evaluation);
                async move {
                    let result: ValidationResult = serde_json::from_value(req["validation_result"].clone())
                        .map_err(to_handler_exception("evaluation", "generate_reports"))?;
                    let nwb_path = PathBuf::from(req["nwb_path"].as_str().unwrap_or_default());
                    let reports = evaluation.generate_reports(&result, &nwb_path);
                    serde_json::to_value(reports).map_err(to_handler_exception("evaluation", "generate_reports"))
                }
            })
            .await;
        }
    }

    // -- §4.7.1 -----------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn start_conversion(&self) -> Result<(), OrchestratorError> {
        let status = self.state.read(|s| s.status);
        if status != ConversionStatus::Uploading {
            return Err(if status.is_busy() {
                OrchestratorError::Busy
            } else {
                OrchestratorError::InvalidState(format!("cannot start a conversion from status {status:?}"))
            });
        }
        let input_path = self
            .state
            .read(|s| s.input_path.clone())
            .ok_or_else(|| OrchestratorError::InvalidState("no input has been uploaded".into()))?;

        self.populate_structural_defaults();
        self.state.set_format_detection_started()?;
        self.detect_and_continue(&input_path).await
    }

    /// Auto-derives the structural NWB fields (`identifier`,
    /// `session_start_time`) that have no reasonable conversational
    /// question — these come from the session itself, not the user.
    fn populate_structural_defaults(&self) {
        let (session_id, created_at) = self.state.read(|s| (s.session_id, s.created_at));
        self.state.merge_user_provided(vec![
            (
                "identifier".to_string(),
                MetadataValue { value: session_id.to_string(), confidence: 100, source: MetadataSource::AutoExtracted },
            ),
            (
                "session_start_time".to_string(),
                MetadataValue { value: created_at.to_rfc3339(), confidence: 100, source: MetadataSource::AutoExtracted },
            ),
        ]);
    }

    /// Auto-derives `session_description` once the format is known, unless
    /// the user already supplied one.
    fn populate_session_description(&self, format: &str) {
        let already_present = self.state.read(|s| s.effective().contains_key("session_description"));
        if already_present {
            return;
        }
        self.state.merge_user_provided(vec![(
            "session_description".to_string(),
            MetadataValue {
                value: format!("{format} recording converted to NWB"),
                confidence: 100,
                source: MetadataSource::AutoExtracted,
            },
        )]);
    }

    async fn detect_and_continue(&self, input_path: &Path) -> Result<(), OrchestratorError> {
        let response = self
            .bus
            .dispatch("conversion", "detect_format", json!({ "input_path": input_path.to_string_lossy() }))
            .await?;
        let detection: FormatDetection =
            serde_json::from_value(response).map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        self.state.set_format_detection_result(detection.clone())?;

        match detection {
            FormatDetection::Ambiguous { candidates } => {
                let message = format!(
                    "I couldn't automatically determine the acquisition format. Which of these is it: {}?",
                    candidates.join(", ")
                );
                self.state.enter_phase(ConversationPhase::FormatSelection, message);
                Ok(())
            }
            FormatDetection::Identified { format, .. } => self.continue_after_format(input_path, &format).await,
        }
    }

    async fn continue_after_format(&self, input_path: &Path, format: &str) -> Result<(), OrchestratorError> {
        self.populate_session_description(format);
        let effective = self.state.read(|s| s.effective());
        let (_, missing) = schema::validate(&effective);

        if self.metadata_gate_open(&missing) {
            self.state.set_metadata_request_policy(MetadataRequestPolicy::AskedOnce);
            let message = format!("Before I convert this, could you tell me about: {}?", missing.join(", "));
            self.state.enter_phase(ConversationPhase::MetadataCollection, message);
            return Ok(());
        }

        self.run_conversion_and_validate(input_path, format).await
    }

    /// The Metadata Request Gate (§4.7.4): all four conditions must hold.
    fn metadata_gate_open(&self, missing: &[&'static str]) -> bool {
        if missing.is_empty() {
            return false;
        }
        let (policy, declined, answered_metadata_request) =
            self.state.read(|s| (s.metadata_request_policy, s.declined_fields.clone(), s.last_reply_was_metadata_collection()));
        let not_all_declined = missing.iter().any(|m| !declined.contains(*m));
        not_all_declined && policy == MetadataRequestPolicy::NotAsked && !answered_metadata_request
    }

    async fn run_conversion_and_validate(&self, input_path: &Path, format: &str) -> Result<(), OrchestratorError> {
        self.state.begin_conversion()?;
        let output_path = deterministic_output_path(input_path);
        let metadata = self.state.read(|s| s.effective());
        let request = json!({
            "input_path": input_path.to_string_lossy(),
            "format": format,
            "output_path": output_path.to_string_lossy(),
            "metadata": metadata,
        });

        match self.bus.dispatch("conversion", "run_conversion", request).await {
            Ok(value) => {
                let parsed: RunConversionResponse =
                    serde_json::from_value(value).map_err(|e| OrchestratorError::Internal(e.to_string()))?;
                let output_path = PathBuf::from(parsed.output_path);
                self.state.set_output(output_path.clone(), parsed.checksum)?;
                self.run_validation_and_dispatch(&output_path, false).await
            }
            Err(e) => self.handle_conversion_failure(e).await,
        }
    }

    async fn handle_conversion_failure(&self, error: BusError) -> Result<(), OrchestratorError> {
        tracing::error!(agent = "conversation", action = "run_conversion", error = %error, "conversion backend failed");
        let explanation = self
            .with_llm_deadline(self.llm.complete(
                "Explain a data-conversion failure to a non-technical researcher in one short, reassuring sentence.",
                &error.to_string(),
                0.0,
            ))
            .await
            .unwrap_or_else(|_| "The conversion could not be completed due to an internal error.".to_string());
        self.state.record_assistant_turn(&explanation);
        self.finish_terminal(ValidationDisposition::FailedUserDeclined).await
    }

    async fn run_validation_and_dispatch(&self, output_path: &Path, is_retry: bool) -> Result<(), OrchestratorError> {
        let dispatch = self.bus.dispatch("evaluation", "run_validation", json!({ "nwb_path": output_path.to_string_lossy() }));
        let result = match tokio::time::timeout(self.config.inspector_deadline(), dispatch).await {
            Ok(response) => {
                let response = response?;
                serde_json::from_value::<ValidationResult>(response).map_err(|e| OrchestratorError::Internal(e.to_string()))?
            }
            Err(_) => {
                tracing::warn!(
                    agent = "conversation",
                    action = "run_validation",
                    deadline_secs = self.config.inspector_deadline().as_secs(),
                    "inspector invocation exceeded its deadline, synthesizing critical finding"
                );
                ValidationResult {
                    outcome: ValidationOutcome::Failed,
                    findings: vec![Finding {
                        severity: Severity::Critical,
                        message: "inspector invocation exceeded its deadline".to_string(),
                        location: output_path.display().to_string(),
                        check_name: "inspector_availability".into(),
                    }],
                }
            }
        };

        if is_retry {
            let prev_fp = self.state.read(|s| s.previous_issues_fingerprint);
            let (input_flag, autofix_flag) =
                self.state.read(|s| (s.user_provided_input_this_attempt, s.auto_corrections_applied_this_attempt));
            let new_fp = fingerprint_issues(&result.findings);
            if Some(new_fp) == prev_fp && !input_flag && !autofix_flag {
                let streak = self.state.note_no_progress();
                if streak >= 2 {
                    return self.finish_terminal(ValidationDisposition::FailedUserDeclined).await;
                }
                self.state.record_assistant_turn(
                    "This correction attempt made no measurable progress, but you're still in control — \
                     you can retry again or accept the current result.",
                );
            } else {
                self.state.reset_no_progress();
            }
        }

        self.state.set_validation_outcome(result.outcome, result.findings.clone())?;
        self.dispatch_outcome(&result, output_path).await
    }

    /// §4.7.6 Outcome Dispatch.
    async fn dispatch_outcome(&self, result: &ValidationResult, output_path: &Path) -> Result<(), OrchestratorError> {
        match result.outcome {
            ValidationOutcome::Passed => {
                self.state.apply_outcome_dispatch(ValidationOutcome::Passed)?;
                self.generate_and_store_reports(result, output_path).await;
                Ok(())
            }
            ValidationOutcome::PassedWithIssues => {
                self.state.apply_outcome_dispatch(ValidationOutcome::PassedWithIssues)?;
                self.state.record_assistant_turn(
                    "Validation passed with some issues. Would you like me to try to improve it, or accept it as-is?",
                );
                Ok(())
            }
            ValidationOutcome::Failed => {
                self.state.apply_outcome_dispatch(ValidationOutcome::Failed)?;
                self.state
                    .record_assistant_turn("Validation failed. Would you like to approve another correction attempt?");
                Ok(())
            }
        }
    }

    async fn generate_and_store_reports(&self, result: &ValidationResult, output_path: &Path) {
        let request = json!({ "validation_result": result, "nwb_path": output_path.to_string_lossy() });
        if let Ok(value) = self.bus.dispatch("evaluation", "generate_reports", request).await {
            if let Ok(reports) = serde_json::from_value::<Reports>(value) {
                self.state.store_reports(reports.json, reports.markdown);
            }
        }
    }

    async fn finish_terminal(&self, disposition: ValidationDisposition) -> Result<(), OrchestratorError> {
        self.state.set_terminal(disposition)?;
        let (outcome, issues, output_path) = self.state.read(|s| (s.validation_outcome, s.issues.clone(), s.output_path.clone()));
        if let (Some(outcome), Some(output_path)) = (outcome, output_path) {
            let result = ValidationResult { outcome, findings: issues };
            self.generate_and_store_reports(&result, &output_path).await;
        }
        Ok(())
    }

    // -- §4.7.2 -------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn chat(&self, text: &str) -> Result<(), OrchestratorError> {
        let phase = self.state.read(|s| s.conversation_phase);
        self.state.record_user_turn(text);

        match phase {
            ConversationPhase::FormatSelection => self.handle_format_selection(text).await,
            ConversationPhase::MetadataCollection => self.handle_classified_utterance(text, true).await,
            ConversationPhase::ValidationAnalysis => self.handle_classified_utterance(text, false).await,
            ConversationPhase::ImprovementDecision => self.apply_improvement_choice(text).await,
            ConversationPhase::None => self.handle_general_query(text).await,
        }
    }

    async fn handle_format_selection(&self, text: &str) -> Result<(), OrchestratorError> {
        let lower = text.to_lowercase();
        let matched = [
            ("spikeglx", "SpikeGLX"),
            ("open ephys", "OpenEphys"),
            ("openephys", "OpenEphys"),
            ("neuropixels", "Neuropixels"),
        ]
        .into_iter()
        .find(|(keyword, _)| lower.contains(keyword));

        match matched {
            Some((_, format)) => {
                self.state.set_format_detection_result(FormatDetection::Identified {
                    format: format.to_string(),
                    confidence: 100,
                    evidence: "user selection".to_string(),
                })?;
                let input_path = self
                    .state
                    .read(|s| s.pending_input_path.clone().or_else(|| s.input_path.clone()))
                    .ok_or_else(|| OrchestratorError::InvalidState("no input path available".into()))?;
                self.state.promote_pending_input();
                self.continue_after_format(&input_path, format).await
            }
            None => {
                self.state
                    .record_assistant_turn("I didn't recognize that format — please choose SpikeGLX, OpenEphys, or Neuropixels.");
                Ok(())
            }
        }
    }

    /// Shared routing for `METADATA_COLLECTION` and `VALIDATION_ANALYSIS`
    /// (§4.7.2, §4.7.3).
    async fn handle_classified_utterance(&self, text: &str, in_metadata_collection: bool) -> Result<(), OrchestratorError> {
        let single_field_asked = {
            let effective = self.state.read(|s| s.effective());
            schema::validate(&effective).1.len() == 1
        };
        let intent = classify_intent(self.llm.as_ref(), text, single_field_asked, self.config.llm_deadline()).await;

        match intent {
            Intent::Cancel => self.finish_terminal(ValidationDisposition::FailedUserAbandoned).await,
            Intent::DeclineGlobal => {
                if in_metadata_collection {
                    self.state.set_metadata_request_policy(MetadataRequestPolicy::UserDeclined);
                    self.state.log(crate::diagnostics::LogEntry::new(
                        crate::diagnostics::LogLevel::Warning,
                        crate::diagnostics::LogScope::ConversationAgent { action: "decline_metadata".into() },
                        "user declined to provide additional metadata; proceeding with auto-extracted fields only",
                    ));
                    self.state.record_assistant_turn("Okay, proceeding without additional metadata.");
                    self.resume_after_metadata_decision().await
                } else {
                    self.finish_terminal(ValidationDisposition::FailedUserAbandoned).await
                }
            }
            Intent::DeclineField => {
                let missing_before = { let effective = self.state.read(|s| s.effective()); schema::validate(&effective).1 };
                if let Some(field) = missing_before.first() {
                    self.state.decline_field(field);
                }
                let (missing, declined) = self.state.read(|s| {
                    let effective = s.effective();
                    (schema::validate(&effective).1, s.declined_fields.clone())
                });
                let remaining: Vec<&str> = missing.into_iter().filter(|m| !declined.contains(*m)).collect();
                if remaining.is_empty() {
                    self.resume_after_metadata_decision().await
                } else {
                    let message = format!("Could you still provide: {}?", remaining.join(", "));
                    self.state.enter_phase(ConversationPhase::MetadataCollection, message);
                    Ok(())
                }
            }
            Intent::RequestSequential => {
                self.state.set_wants_sequential(true);
                let (missing, declined) = self.state.read(|s| {
                    let effective = s.effective();
                    (schema::validate(&effective).1, s.declined_fields.clone())
                });
                let next = missing.into_iter().find(|m| !declined.contains(*m));
                let message = match next {
                    Some(field) => format!("Sure, one at a time. What is the {field}?"),
                    None => "Thanks, I have everything I need.".to_string(),
                };
                self.state.enter_phase(ConversationPhase::MetadataCollection, message);
                Ok(())
            }
            Intent::Provide => self.handle_provide(text).await,
            Intent::Uncertain => {
                self.state.record_assistant_turn("Sorry, I didn't catch that — could you rephrase?");
                Ok(())
            }
        }
    }

    async fn handle_provide(&self, text: &str) -> Result<(), OrchestratorError> {
        let already_known: Vec<String> = self.state.read(|s| s.effective().keys().cloned().collect());
        let missing_before: Vec<String> = {
            let effective = self.state.read(|s| s.effective());
            schema::validate(&effective).1.iter().map(|s| s.to_string()).collect()
        };

        let prompt = schema::generate_extraction_prompt(text, &already_known);
        let fields = match self.with_llm_deadline(self.llm.complete_structured(&prompt.system, &prompt.user, &prompt.schema, 0.0)).await {
            Ok(value) => serde_json::from_value::<schema::ExtractionResult>(value).map(|r| r.fields).ok(),
            Err(_) => None,
        };
        let fields = match fields {
            Some(fields) => fields,
            None => {
                tracing::warn!(agent = "conversation", action = "handle_provide", reason = "llm_unavailable", "falling back to keyword extraction");
                fallback_extract(text)
            }
        };

        let mut merged = Vec::new();
        for field in &fields {
            let normalized_value = schema::normalize(&field.name, &field.value);
            if field.confidence < 50 {
                self.state.add_flagged_for_review(field.name.clone());
            } else if field.confidence < 80 {
                tracing::warn!(agent = "conversation", action = "handle_provide", field = %field.name, confidence = field.confidence, "accepted metadata field with moderate confidence");
            }
            merged.push((field.name.clone(), MetadataValue { value: normalized_value, confidence: field.confidence, source: MetadataSource::UserProvided }));
        }
        self.state.merge_user_provided(merged);
        self.state.mark_user_provided_input_this_attempt();

        let extracted_new_required = fields.iter().any(|f| missing_before.iter().any(|m| m == &f.name));
        if !extracted_new_required {
            self.state.set_metadata_request_policy(MetadataRequestPolicy::UserDeclined);
        }

        self.resume_after_metadata_decision().await
    }

    async fn resume_after_metadata_decision(&self) -> Result<(), OrchestratorError> {
        let attempt = self.state.read(|s| s.correction_attempt);
        if attempt > 0 {
            self.continue_retry_conversion().await
        } else {
            let input_path = self
                .state
                .read(|s| s.pending_input_path.clone().or_else(|| s.input_path.clone()))
                .ok_or_else(|| OrchestratorError::InvalidState("no input path available".into()))?;
            self.state.promote_pending_input();
            let format = self
                .state
                .read(|s| format_name(&s.format_detection))
                .ok_or_else(|| OrchestratorError::InvalidState("format not yet determined".into()))?;
            self.run_conversion_and_validate(&input_path, &format).await
        }
    }

    async fn handle_general_query(&self, text: &str) -> Result<(), OrchestratorError> {
        let summary = self.state.read(|s| format!("status={:?} phase={:?}", s.status, s.conversation_phase));
        let system = "You are a helpful assistant answering questions about an ongoing NWB conversion workflow. \
                      Use the provided status summary for context and keep your answer short.";
        let user = format!("status: {summary}\nquestion: {text}");
        let reply = self
            .with_llm_deadline(self.llm.complete(system, &user, 0.3))
            .await
            .unwrap_or_else(|_| "I don't have enough information to answer that right now.".to_string());
        self.state.record_assistant_turn(&reply);
        Ok(())
    }

    // -- §4.7.5 Retry Loop, entered from IMPROVEMENT_DECISION/retry approval -

    #[instrument(skip(self))]
    pub async fn decide_improvement(&self, choice: &str) -> Result<(), OrchestratorError> {
        if self.state.read(|s| s.conversation_phase) != ConversationPhase::ImprovementDecision {
            return Err(OrchestratorError::InvalidState("not awaiting an improvement decision".into()));
        }
        self.apply_improvement_choice(choice).await
    }

    async fn apply_improvement_choice(&self, raw: &str) -> Result<(), OrchestratorError> {
        match normalize_choice(raw) {
            Some("improve") => {
                self.state.reset_reprompt();
                self.retry_loop_iteration().await
            }
            Some("accept") => {
                self.state.reset_reprompt();
                self.finish_terminal(ValidationDisposition::PassedAccepted).await
            }
            _ => self.reprompt_or_default_improvement().await,
        }
    }

    async fn reprompt_or_default_improvement(&self) -> Result<(), OrchestratorError> {
        let count = self.state.increment_reprompt();
        if count >= 2 {
            self.state.reset_reprompt();
            self.finish_terminal(ValidationDisposition::PassedAccepted).await
        } else {
            self.state.record_assistant_turn("Please reply 'improve' or 'accept'.");
            Ok(())
        }
    }

    #[instrument(skip(self))]
    pub async fn decide_retry(&self, choice: &str) -> Result<(), OrchestratorError> {
        if self.state.read(|s| s.status) != ConversionStatus::AwaitingRetryApproval {
            return Err(OrchestratorError::InvalidState("not awaiting retry approval".into()));
        }
        match normalize_choice(choice) {
            Some("approve") => self.retry_loop_iteration().await,
            Some("decline") => self.finish_terminal(ValidationDisposition::FailedUserDeclined).await,
            _ => Err(OrchestratorError::InvalidState("choice must be 'approve' or 'decline'".into())),
        }
    }

    async fn retry_loop_iteration(&self) -> Result<(), OrchestratorError> {
        if let Err(crate::state::StateError::RetryLimitExceeded) = self.state.increment_correction_attempt() {
            return self.finish_terminal(ValidationDisposition::FailedUserDeclined).await;
        }

        let issues_before = self.state.read(|s| s.issues.clone());
        self.state.set_previous_issues_fingerprint(Some(fingerprint_issues(&issues_before)));
        self.state.clear_attempt_flags();

        let effective = self.state.read(|s| s.effective());
        let response = self
            .bus
            .dispatch("evaluation", "analyze_corrections", json!({ "issues": issues_before, "metadata": effective }))
            .await?;
        let analysis: CorrectionAnalysis =
            serde_json::from_value(response).map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        if !analysis.user_input_required.is_empty() {
            let message = format!("To continue fixing this, I need: {}", analysis.user_input_required.join(", "));
            self.state.enter_phase(ConversationPhase::MetadataCollection, message);
            return Ok(());
        }

        if !analysis.auto_fixable.is_empty() {
            let fields = analysis
                .auto_fixable
                .iter()
                .map(|fix| (fix.field.clone(), MetadataValue { value: fix.value.clone(), confidence: 100, source: MetadataSource::AutoExtracted }))
                .collect();
            self.state.merge_user_provided(fields);
            self.state.mark_auto_corrections_applied_this_attempt();
        }

        self.continue_retry_conversion().await
    }

    async fn continue_retry_conversion(&self) -> Result<(), OrchestratorError> {
        let (input_path, format, previous_output, attempt) = self.state.read(|s| {
            (
                s.pending_input_path.clone().or_else(|| s.input_path.clone()),
                format_name(&s.format_detection),
                s.output_path.clone(),
                s.correction_attempt,
            )
        });
        let input_path = input_path.ok_or_else(|| OrchestratorError::InvalidState("no input path available".into()))?;
        let format = format.ok_or_else(|| OrchestratorError::InvalidState("format not yet determined".into()))?;
        let previous_output = previous_output.ok_or_else(|| OrchestratorError::InvalidState("no previous output to correct".into()))?;

        self.state.begin_conversion()?;
        self.state.promote_pending_input();
        let metadata = self.state.read(|s| s.effective());

        let request = json!({
            "input_path": input_path.to_string_lossy(),
            "format": format,
            "previous_output_path": previous_output.to_string_lossy(),
            "metadata": metadata,
            "attempt": attempt,
        });
        match self.bus.dispatch("conversion", "apply_corrections", request).await {
            Ok(value) => {
                let parsed: RunConversionResponse =
                    serde_json::from_value(value).map_err(|e| OrchestratorError::Internal(e.to_string()))?;
                let output_path = PathBuf::from(parsed.output_path);
                self.state.set_output(output_path.clone(), parsed.checksum)?;
                self.run_validation_and_dispatch(&output_path, true).await
            }
            Err(e) => self.handle_conversion_failure(e).await,
        }
    }
}

#[derive(serde::Deserialize)]
struct RunConversionResponse {
    output_path: String,
    checksum: String,
}

fn format_name(detection: &Option<FormatDetection>) -> Option<String> {
    match detection {
        Some(FormatDetection::Identified { format, .. }) => Some(format.clone()),
        _ => None,
    }
}

fn deterministic_output_path(input_path: &Path) -> PathBuf {
    let dir = input_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join("output.nwb")
}

fn normalize_choice(raw: &str) -> Option<&'static str> {
    let lower = raw.trim().to_lowercase();
    if lower.contains("improve") {
        Some("improve")
    } else if lower.contains("accept") {
        Some("accept")
    } else if lower.contains("approve") {
        Some("approve")
    } else if lower.contains("decline") {
        Some("decline")
    } else {
        None
    }
}

/// Order-independent signature of `{severity, check_name, location}` tuples
/// (§4.7.5).
fn fingerprint_issues(issues: &[Finding]) -> u64 {
    let mut keys: Vec<String> = issues
        .iter()
        .map(|f| format!("{:?}|{}|{}", f.severity, f.check_name, f.location))
        .collect();
    keys.sort_unstable();
    let mut hasher = FxHasher::default();
    keys.hash(&mut hasher);
    hasher.finish()
}

fn to_handler_exception<E>(agent: &'static str, action: &'static str) -> impl Fn(E) -> BusError
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |e| BusError::HandlerException { agent: agent.to_string(), action: action.to_string(), source: Box::new(e) }
}

/// Keyword-based metadata extraction used when the LLM gateway is
/// unavailable (§4.7.4). Deliberately conservative: a field is only reported
/// when a recognizable token is present, with moderate confidence so the
/// Metadata Schema Registry's auto-accept policy still flags it for review
/// when appropriate.
fn fallback_extract(text: &str) -> Vec<schema::ExtractedField> {
    let lower = text.to_lowercase();
    let mut fields = Vec::new();

    for (keyword, _binomial) in [("mouse", ()), ("mice", ()), ("rat", ()), ("macaque", ()), ("zebrafish", ())] {
        if lower.split_whitespace().any(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric()) == keyword) {
            fields.push(field("species", keyword, 65, "species keyword match"));
            break;
        }
    }

    if lower.split_whitespace().any(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric()) == "male") {
        fields.push(field("sex", "male", 65, "sex keyword match"));
    } else if lower.split_whitespace().any(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric()) == "female") {
        fields.push(field("sex", "female", 65, "sex keyword match"));
    }

    for institution in ["MIT", "UCL", "UCSF", "UCSD", "NIH", "CSHL"] {
        if text.split_whitespace().any(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric()) == institution) {
            fields.push(field("institution", institution, 70, "institution abbreviation match"));
            break;
        }
    }

    if let Some(age_value) = scan_age(&lower) {
        fields.push(field("age", &age_value, 60, "age phrase match"));
    }

    if let Some(name) = scan_experimenter(text) {
        fields.push(field("experimenter", &name, 60, "name following honorific"));
    }

    if let Some(subject_id) = scan_subject_id(&lower) {
        fields.push(field("subject_id", &subject_id, 55, "alphanumeric token following 'subject'"));
    }

    fields
}

fn field(name: &str, value: &str, confidence: u8, reasoning: &str) -> schema::ExtractedField {
    schema::ExtractedField { name: name.to_string(), value: value.to_string(), confidence, reasoning: reasoning.to_string() }
}

fn scan_age(lower: &str) -> Option<String> {
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    for (i, tok) in tokens.iter().enumerate() {
        let digits: String = tok.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            continue;
        }
        if tok.starts_with('p') {
            return Some(format!("P{digits}"));
        }
        if let Some(next) = tokens.get(i + 1) {
            if next.starts_with("day") || next.starts_with("week") || next.starts_with("month") {
                return Some(format!("{digits} {next}"));
            }
        }
    }
    None
}

fn scan_experimenter(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for (i, tok) in tokens.iter().enumerate() {
        if tok.trim_end_matches('.') == "Dr" {
            let rest: Vec<&str> = tokens[i + 1..]
                .iter()
                .take(2)
                .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
                .filter(|t| !t.is_empty())
                .collect();
            if !rest.is_empty() {
                return Some(rest.join(" "));
            }
        }
    }
    None
}

fn scan_subject_id(lower: &str) -> Option<String> {
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    for (i, tok) in tokens.iter().enumerate() {
        if *tok == "subject" {
            if let Some(next) = tokens.get(i + 1) {
                let cleaned = next.trim_matches(|c: char| !c.is_alphanumeric());
                if !cleaned.is_empty() {
                    return Some(cleaned.to_string());
                }
            }
        }
    }
    None
}
