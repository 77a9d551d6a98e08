//! # NWB Conversation Orchestrator
//!
//! A three-agent conversational state machine that drives raw
//! neurophysiology recordings (SpikeGLX, Open Ephys, Neuropixels) through
//! format detection, metadata collection, NWB conversion, and iterative
//! validation against DANDI archive requirements.
//!
//! ## Core concepts
//!
//! - **[`state::WorkflowState`]**-equivalent (`WorkflowStateHandle`): the one
//!   mutable shared resource, mutated only through its transition methods.
//! - **[`bus::Bus`]**: an in-process `(agent, action) -> handler` registry
//!   the Conversation Agent uses to invoke the other two agents.
//! - **[`agents::ConversationAgent`]**: the orchestrator — owns dialogue,
//!   state transitions, and the retry loop.
//! - **[`interface`]**: the `axum` router exposing it all over HTTP plus SSE.
//!
//! ## Quick start
//!
//! ```
//! use nwb_conversation_orchestrator::event_bus::EventBus;
//! use nwb_conversation_orchestrator::state::WorkflowStateHandle;
//!
//! let event_bus = EventBus::default();
//! let state = WorkflowStateHandle::new(event_bus.get_emitter());
//! let snapshot = state.read(|s| s.snapshot());
//! assert_eq!(snapshot.status.as_str(), "idle");
//! ```
//!
//! ## Module guide
//!
//! - [`message`] — dialogue-history turn types
//! - [`diagnostics`] — structured log entries recorded on the workflow state
//! - [`event_bus`] — the push channel (server → client)
//! - [`state`] — the single authoritative workflow state
//! - [`bus`] — the in-process agent message bus
//! - [`schema`] — the NWB/DANDI metadata schema registry
//! - [`llm`] — the language model gateway abstraction
//! - [`backends`] — the conversion/inspector collaborator traits and stubs
//! - [`agents`] — the Conversion, Evaluation, and Conversation agents
//! - [`config`] — layered runtime configuration
//! - [`interface`] — the external HTTP + SSE interface

pub mod agents;
pub mod backends;
pub mod bus;
pub mod config;
pub mod diagnostics;
pub mod event_bus;
pub mod interface;
pub mod llm;
pub mod message;
pub mod schema;
pub mod state;
