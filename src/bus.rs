//! In-process message bus (§4.2).
//!
//! Distinct from [`crate::event_bus`]: this is a request/response registry
//! keyed by `(agent_name, action_name)` that the Conversation Agent uses to
//! invoke operations on the Conversion and Evaluation Agents without holding
//! a direct reference to their concrete types. `crate::event_bus` is the
//! one-way push channel to external subscribers; this bus never touches it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

/// Opaque request payload dispatched to a handler.
pub type Request = Value;
/// Opaque response payload returned by a handler.
pub type Response = Value;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, BusError>> + Send>>;
type Handler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Error, Diagnostic)]
pub enum BusError {
    #[error("no handler registered for {agent}.{action}")]
    #[diagnostic(code(orchestrator::bus::agent_not_found))]
    AgentNotFound { agent: String, action: String },

    #[error("handler for {agent}.{action} raised: {source}")]
    #[diagnostic(code(orchestrator::bus::handler_exception))]
    HandlerException {
        agent: String,
        action: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Registry of `(agent_name, action_name) -> handler`.
///
/// Registration happens once at startup; dispatch is read-mostly after that,
/// so an `RwLock` favors the common path.
#[derive(Clone, Default)]
pub struct Bus {
    handlers: Arc<RwLock<FxHashMap<(String, String), Handler>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `agent.action`. A later call with the same key
    /// replaces the previous handler, matching how tests swap in stub agents.
    pub async fn register<F, Fut>(&self, agent: impl Into<String>, action: impl Into<String>, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, BusError>> + Send + 'static,
    {
        let key = (agent.into(), action.into());
        let wrapped: Handler = Arc::new(move |req| Box::pin(handler(req)));
        self.handlers.write().await.insert(key, wrapped);
    }

    /// Dispatch `request` to the handler registered for `agent.action`.
    pub async fn dispatch(&self, agent: &str, action: &str, request: Request) -> Result<Response, BusError> {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&(agent.to_string(), action.to_string())).cloned()
        };
        match handler {
            Some(handler) => handler(request).await,
            None => Err(BusError::AgentNotFound {
                agent: agent.to_string(),
                action: action.to_string(),
            }),
        }
    }

    pub async fn is_registered(&self, agent: &str, action: &str) -> bool {
        self.handlers
            .read()
            .await
            .contains_key(&(agent.to_string(), action.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_routes_to_registered_handler() {
        let bus = Bus::new();
        bus.register("conversion", "detect_format", |_req| async move {
            Ok(json!({ "format": "spikeglx" }))
        })
        .await;

        let response = bus.dispatch("conversion", "detect_format", json!({})).await.unwrap();
        assert_eq!(response, json!({ "format": "spikeglx" }));
    }

    #[tokio::test]
    async fn dispatch_to_unknown_agent_returns_agent_not_found() {
        let bus = Bus::new();
        let err = bus.dispatch("evaluation", "run_validation", json!({})).await.unwrap_err();
        assert!(matches!(err, BusError::AgentNotFound { .. }));
    }

    #[tokio::test]
    async fn later_registration_replaces_earlier_handler() {
        let bus = Bus::new();
        bus.register("conversion", "run_conversion", |_| async move { Ok(json!(1)) })
            .await;
        bus.register("conversion", "run_conversion", |_| async move { Ok(json!(2)) })
            .await;
        let response = bus.dispatch("conversion", "run_conversion", json!({})).await.unwrap();
        assert_eq!(response, json!(2));
    }

    #[tokio::test]
    async fn handler_error_is_wrapped_as_handler_exception() {
        let bus = Bus::new();
        bus.register("evaluation", "run_validation", |_| async move {
            Err(BusError::HandlerException {
                agent: "evaluation".into(),
                action: "run_validation".into(),
                source: "inspector crashed".into(),
            })
        })
        .await;
        let err = bus
            .dispatch("evaluation", "run_validation", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::HandlerException { .. }));
    }
}
