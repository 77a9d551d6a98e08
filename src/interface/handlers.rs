//! Request/reply handlers for the non-upload, non-SSE endpoints of §6.
//!
//! Each handler only reads state directly or spawns the Conversation Agent
//! action on the shared task executor and returns immediately, per §5's
//! "handlers only read state or enqueue an orchestrator action".

use axum::extract::{Path as AxumPath, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::state::ConversionStatus;

use super::{AppState, InterfaceError};

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: ConversionStatus,
    pub conversation_phase: crate::state::ConversationPhase,
    pub validation_outcome: Option<crate::state::ValidationOutcome>,
    pub validation_disposition: Option<crate::state::ValidationDisposition>,
    pub llm_message: Option<String>,
    pub conversation_history: Vec<crate::message::HistoryTurn>,
    pub metadata_missing: Vec<&'static str>,
    pub correction_attempt: u32,
    pub output_ready: bool,
    pub can_retry: bool,
}

pub async fn status(State(app): State<AppState>) -> Json<StatusResponse> {
    let response = app.state.read(|s| {
        let (_, missing) = crate::schema::validate(&s.effective());
        StatusResponse {
            status: s.status,
            conversation_phase: s.conversation_phase,
            validation_outcome: s.validation_outcome,
            validation_disposition: s.validation_disposition,
            llm_message: s.llm_message.clone(),
            conversation_history: s.history.iter().cloned().collect(),
            metadata_missing: missing,
            correction_attempt: s.correction_attempt,
            output_ready: s.status == ConversionStatus::Completed && s.output_path.is_some(),
            can_retry: s.status == ConversionStatus::AwaitingRetryApproval,
        }
    });
    Json(response)
}

pub async fn start_conversion(State(app): State<AppState>) -> Result<(), InterfaceError> {
    let agent = app.agent.clone();
    tokio::spawn(async move {
        if let Err(e) = agent.start_conversion().await {
            tracing::warn!(action = "start_conversion", error = %e, "orchestrator action failed");
        }
    });
    Ok(())
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

pub async fn chat(State(app): State<AppState>, Json(request): Json<ChatRequest>) -> Result<(), InterfaceError> {
    if request.message.trim().is_empty() {
        return Err(InterfaceError::InvalidInput("message must not be empty".into()));
    }
    let agent = app.agent.clone();
    tokio::spawn(async move {
        if let Err(e) = agent.chat(&request.message).await {
            tracing::warn!(action = "chat", error = %e, "orchestrator action failed");
        }
    });
    Ok(())
}

#[derive(Deserialize)]
pub struct ChoiceRequest {
    pub choice: String,
}

pub async fn improvement_decision(State(app): State<AppState>, Json(request): Json<ChoiceRequest>) -> Result<(), InterfaceError> {
    let agent = app.agent.clone();
    let choice = request.choice;
    tokio::spawn(async move {
        if let Err(e) = agent.decide_improvement(&choice).await {
            tracing::warn!(action = "decide_improvement", error = %e, "orchestrator action failed");
        }
    });
    Ok(())
}

pub async fn retry_approval(State(app): State<AppState>, Json(request): Json<ChoiceRequest>) -> Result<(), InterfaceError> {
    let agent = app.agent.clone();
    let choice = request.choice;
    tokio::spawn(async move {
        if let Err(e) = agent.decide_retry(&choice).await {
            tracing::warn!(action = "decide_retry", error = %e, "orchestrator action failed");
        }
    });
    Ok(())
}

pub async fn reset(State(app): State<AppState>) -> Result<(), InterfaceError> {
    app.state.reset();
    Ok(())
}

pub async fn download(State(app): State<AppState>, AxumPath(kind): AxumPath<String>) -> Result<impl IntoResponse, InterfaceError> {
    let (status, output_path, report_json, report_markdown) =
        app.state.read(|s| (s.status, s.output_path.clone(), s.report_json.clone(), s.report_markdown.clone()));

    let output_present = output_path.is_some();
    if !(status == ConversionStatus::Completed || (status == ConversionStatus::Failed && output_present)) {
        return Err(InterfaceError::NotFound("no output is available for this workflow".into()));
    }

    match kind.as_str() {
        "nwb" => {
            let path = output_path.ok_or_else(|| InterfaceError::NotFound("no output file has been produced".into()))?;
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| InterfaceError::Internal(format!("failed to read {}: {e}", path.display())))?;
            Ok((
                [(header::CONTENT_TYPE, "application/octet-stream")],
                bytes,
            )
                .into_response())
        }
        "report" => {
            let json = report_json.ok_or_else(|| InterfaceError::NotFound("no report has been generated".into()))?;
            let _ = report_markdown;
            Ok(([(header::CONTENT_TYPE, "application/json")], Json(json)).into_response())
        }
        other => Err(InterfaceError::InvalidInput(format!("unknown download kind {other:?}"))),
    }
}
