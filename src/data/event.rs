//! The event tagged union emitted on the Event Bus (C1).
//!
//! Generalizes `event.rs`'s `AgentEvent`/`OrchestrationEvent` split into one
//! flat sum type scoped to execution lifecycle, per §3/§9 ("replace with a sum
//! type enumerating every event variant; compile-time exhaustiveness checks on
//! subscribers").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::UsageRecordTokens;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "execution.started")]
    ExecutionStarted {
        execution_id: String,
        agent_id: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "execution.completed")]
    ExecutionCompleted {
        execution_id: String,
        final_content: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "execution.failed")]
    ExecutionFailed {
        execution_id: String,
        kind: String,
        message: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "execution.step")]
    ExecutionStep {
        execution_id: String,
        step_id: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "tool.invoking")]
    ToolInvoking {
        execution_id: String,
        tool_name: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "tool.completed")]
    ToolCompleted {
        execution_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "delegation.requested")]
    DelegationRequested {
        execution_id: String,
        target_agent_id: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "delegation.progress")]
    DelegationProgress {
        execution_id: String,
        target_agent_id: String,
        progress: u8,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "delegation.completed")]
    DelegationCompleted {
        execution_id: String,
        target_agent_id: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "approval.requested")]
    ApprovalRequested {
        execution_id: String,
        tool_name: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "approval.resolved")]
    ApprovalResolved {
        execution_id: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "usage.recorded")]
    UsageRecorded {
        execution_id: String,
        usage: UsageRecordTokens,
        ts: DateTime<Utc>,
    },
}

impl Event {
    pub fn execution_id(&self) -> &str {
        match self {
            Event::ExecutionStarted { execution_id, .. }
            | Event::ExecutionCompleted { execution_id, .. }
            | Event::ExecutionFailed { execution_id, .. }
            | Event::ExecutionStep { execution_id, .. }
            | Event::ToolInvoking { execution_id, .. }
            | Event::ToolCompleted { execution_id, .. }
            | Event::DelegationRequested { execution_id, .. }
            | Event::DelegationProgress { execution_id, .. }
            | Event::DelegationCompleted { execution_id, .. }
            | Event::ApprovalRequested { execution_id, .. }
            | Event::ApprovalResolved { execution_id, .. }
            | Event::UsageRecorded { execution_id, .. } => execution_id,
        }
    }
}
