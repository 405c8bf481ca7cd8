//! Core multi-agent orchestration engine: graph-based agent execution,
//! tool-calling, human-in-the-loop interrupts, delegation, budgets, and
//! usage accounting.
//!
//! The public surface is [`orchestrator::Orchestrator`] — everything else
//! (event bus, registry, tool runtime, model factory, ...) is assembled once
//! at process startup and handed to it. See `SPEC_FULL.md` for the full
//! component breakdown; each module here corresponds to one of its C1-C11
//! components.

pub mod budget;
pub mod checkpoint;
pub mod clients;
pub mod config;
pub mod data;
pub mod delegation;
pub mod error;
pub mod event_bus;
pub mod graph;
pub mod interrupt_manager;
pub mod model_factory;
pub mod orchestrator;
pub mod registry;
pub mod tool_runtime;
pub mod tools;
pub mod usage;

pub use clients::{ClientWrapper, ToolDefinition};
pub use config::EngineConfig;
pub use error::EngineError;
pub use event_bus::EventBus;
pub use orchestrator::{
    AgentDirectory, CancelOutcome, ExecuteOptions, ExecuteRequest, ExecutionFailure, ExecutionResult, Orchestrator,
    UsageSummary,
};
