//! Crate-level error taxonomy.
//!
//! Each fallible boundary returns a component-local error enum (`ToolRuntimeError`,
//! `InterruptError`, `DelegationError`, `BudgetError`, `ModelFactoryError`,
//! `RegistryError`) implementing [`std::error::Error`] via a hand-written `Display`,
//! matching the `OrchestrationError`/`ToolError`/`CouncilError` style this engine was
//! grounded on. At the Orchestrator/graph-executor boundary those convert into one
//! classified [`EngineError`] via `From` impls, so the public API surface always
//! returns a single, documented error kind.

use std::error::Error;
use std::fmt;

use crate::budget::BudgetError;
use crate::delegation::DelegationError;
use crate::interrupt_manager::InterruptError;
use crate::model_factory::ModelFactoryError;
use crate::registry::RegistryError;
use crate::tool_runtime::ToolRuntimeError;

/// The classified failure kind returned on the public API surface, matching
/// the error taxonomy kinds enumerated for the engine (config, validation,
/// timeout, tool, model, approval, delegation-depth, budget, cancellation,
/// provider-availability).
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Missing agent, unknown model, unknown tool. Non-retryable.
    ConfigError(String),
    /// Tool arguments failed schema validation.
    ValidationError(String),
    /// A tool, node, or execution deadline was exceeded.
    Timeout(String),
    /// A tool handler returned an application error.
    ToolError(String),
    /// The LLM call failed after exhausting retries.
    ModelError(String),
    /// A human approval was not granted within the interrupt TTL.
    ApprovalTimeout,
    /// A delegation chain exceeded the configured maximum depth.
    DelegationDepthExceeded { depth: usize, max_depth: usize },
    /// `max_tool_calls` or `max_agent_steps` was hit; not a failure by itself.
    BudgetExceeded(String),
    /// The execution was cooperatively cancelled.
    Cancelled,
    /// The configured model backend is unreachable or uncredentialed.
    ProviderUnavailable(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ConfigError(msg) => write!(f, "config error: {}", msg),
            EngineError::ValidationError(msg) => write!(f, "validation error: {}", msg),
            EngineError::Timeout(msg) => write!(f, "timeout: {}", msg),
            EngineError::ToolError(msg) => write!(f, "tool error: {}", msg),
            EngineError::ModelError(msg) => write!(f, "model error: {}", msg),
            EngineError::ApprovalTimeout => write!(f, "approval timed out"),
            EngineError::DelegationDepthExceeded { depth, max_depth } => write!(
                f,
                "delegation depth {} exceeds maximum {}",
                depth, max_depth
            ),
            EngineError::BudgetExceeded(msg) => write!(f, "budget exceeded: {}", msg),
            EngineError::Cancelled => write!(f, "execution cancelled"),
            EngineError::ProviderUnavailable(msg) => write!(f, "provider unavailable: {}", msg),
        }
    }
}

impl Error for EngineError {}

impl From<ToolRuntimeError> for EngineError {
    fn from(e: ToolRuntimeError) -> Self {
        match e {
            ToolRuntimeError::NotFound(name) => {
                EngineError::ConfigError(format!("unknown tool: {}", name))
            }
            ToolRuntimeError::InvalidArgs(msg) => EngineError::ValidationError(msg),
            ToolRuntimeError::Timeout(name) => {
                EngineError::Timeout(format!("tool '{}' exceeded its deadline", name))
            }
            ToolRuntimeError::ExecutionFailed(msg) => EngineError::ToolError(msg),
        }
    }
}

impl From<InterruptError> for EngineError {
    fn from(e: InterruptError) -> Self {
        match e {
            InterruptError::Expired => EngineError::ApprovalTimeout,
            InterruptError::AlreadyResolved => {
                EngineError::ValidationError("interrupt already resolved".into())
            }
            InterruptError::InFlight => {
                EngineError::ValidationError("an interrupt is already pending".into())
            }
            InterruptError::NotFound => {
                EngineError::ConfigError("no pending interrupt for execution".into())
            }
        }
    }
}

impl From<DelegationError> for EngineError {
    fn from(e: DelegationError) -> Self {
        match e {
            DelegationError::DepthExceeded { depth, max_depth } => {
                EngineError::DelegationDepthExceeded { depth, max_depth }
            }
            DelegationError::ChildFailed(msg) => EngineError::ToolError(msg),
            DelegationError::ChildTimedOut => EngineError::Timeout("delegation timed out".into()),
        }
    }
}

impl From<BudgetError> for EngineError {
    fn from(e: BudgetError) -> Self {
        match e {
            BudgetError::WallClockExceeded => {
                EngineError::Timeout("wall-clock budget exceeded".into())
            }
            BudgetError::ToolCallsExceeded => {
                EngineError::BudgetExceeded("max_tool_calls exceeded".into())
            }
            BudgetError::AgentStepsExceeded => {
                EngineError::BudgetExceeded("max_agent_steps exceeded".into())
            }
        }
    }
}

impl From<ModelFactoryError> for EngineError {
    fn from(e: ModelFactoryError) -> Self {
        match e {
            ModelFactoryError::ProviderUnavailable(msg) => EngineError::ProviderUnavailable(msg),
            ModelFactoryError::ModelUnknown(id) => {
                EngineError::ConfigError(format!("unknown model: {}", id))
            }
            ModelFactoryError::ToolBindingUnsupported(id) => EngineError::ConfigError(format!(
                "model '{}' does not support tool binding",
                id
            )),
        }
    }
}

impl From<RegistryError> for EngineError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => {
                EngineError::ConfigError(format!("unknown execution: {}", id))
            }
        }
    }
}
