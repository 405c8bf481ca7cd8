//! Shared data model for the orchestration engine.
//!
//! Mirrors the shapes in `client_wrapper.rs` (`Message`, `Role`, token usage)
//! and `event.rs` (tagged-union events), generalized from a single-agent chat
//! session into the execution/delegation/interrupt vocabulary this engine needs.

mod agent_config;
mod delegation;
mod event;
mod execution;
mod interrupt;
mod message;
mod usage;

pub use agent_config::{AgentConfig, AgentRole, BudgetLimits, ModelOptions};
pub use delegation::DelegationKey;
pub use event::Event;
pub use execution::{Execution, ExecutionMode, ExecutionStatus, ExecutionStep, StepKind};
pub use interrupt::{Interrupt, InterruptConfig, InterruptResponse, InterruptResponseKind};
pub use message::{Message, Role, ToolCallRequest, ToolCallResult};
pub use usage::{UsageRecord, UsageRecordTokens};
