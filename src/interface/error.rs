//! Reply envelope error taxonomy for the external interface (§6).
//!
//! Maps the five exit conditions of §6 onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::agents::OrchestratorError;
use crate::bus::BusError;
use crate::state::StateError;

#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("workflow is busy with an active conversion")]
    Busy,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("precondition not met: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<OrchestratorError> for InterfaceError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Busy => InterfaceError::Busy,
            OrchestratorError::InvalidState(reason) => InterfaceError::InvalidState(reason),
            OrchestratorError::Bus(BusError::AgentNotFound { agent, action }) => {
                InterfaceError::Internal(format!("no handler registered for {agent}.{action}"))
            }
            OrchestratorError::Bus(BusError::HandlerException { agent, action, source }) => {
                InterfaceError::Internal(format!("{agent}.{action} failed: {source}"))
            }
            OrchestratorError::State(e) => InterfaceError::Internal(e.to_string()),
            OrchestratorError::Internal(reason) => InterfaceError::Internal(reason),
        }
    }
}

impl From<StateError> for InterfaceError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::InvalidTransition { action, from } => {
                InterfaceError::InvalidState(format!("cannot {action} from {from:?}"))
            }
            StateError::AlreadyTerminal(status) => InterfaceError::InvalidState(format!("workflow already terminal ({status:?})")),
            StateError::RetryLimitExceeded => InterfaceError::Internal(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for InterfaceError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            InterfaceError::Busy => (StatusCode::CONFLICT, "busy"),
            InterfaceError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            InterfaceError::InvalidState(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_state"),
            InterfaceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error surfaced at the external interface");
        }
        let body = ErrorBody {
            error: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
