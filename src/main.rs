//! Binary entry point: wires the shared workflow state, message bus, the
//! three agents, and the `axum` external interface together and serves it.

use std::net::SocketAddr;
use std::sync::Arc;

use nwb_conversation_orchestrator::agents::ConversationAgent;
use nwb_conversation_orchestrator::backends::{StubConversionBackend, StubInspectorBackend};
use nwb_conversation_orchestrator::bus::Bus;
use nwb_conversation_orchestrator::config::ConfigBuilder;
use nwb_conversation_orchestrator::event_bus::EventBus;
use nwb_conversation_orchestrator::interface::{router, AppState};
use nwb_conversation_orchestrator::llm::MockLlmGateway;
use nwb_conversation_orchestrator::state::WorkflowStateHandle;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())).init();

    let config = Arc::new(
        ConfigBuilder::new()
            .with_env()?
            .build()?,
    );

    let event_bus = Arc::new(EventBus::default());
    event_bus.start();
    let state = WorkflowStateHandle::new(event_bus.get_emitter());

    let bus = Arc::new(Bus::new());
    ConversationAgent::register_agents(
        &bus,
        state.clone(),
        Arc::new(MockLlmGateway::new()),
        Arc::new(StubConversionBackend),
        Arc::new(StubInspectorBackend::new()),
    )
    .await;

    let agent = Arc::new(ConversationAgent::with_config(
        state.clone(),
        bus,
        Arc::new(MockLlmGateway::new()),
        Arc::clone(&config),
    ));

    let app_state = AppState {
        state,
        agent,
        config,
        event_bus,
    };
    let app = router(app_state);

    let addr: SocketAddr = "127.0.0.1:8787".parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving the conversion orchestrator");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
