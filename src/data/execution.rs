//! Execution lifecycle data.
//!
//! `thread_key = {agent_id}_{mode}` segregates direct vs. supervised history per
//! §3 — two executions for the same agent in different modes never share
//! `messages`, which is the basis for testable property 5 (thread segregation).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Message, UsageRecordTokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Direct,
    Supervised,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Direct => write!(f, "direct"),
            ExecutionMode::Supervised => write!(f, "supervised"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Running,
    AwaitingApproval,
    Delegating,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl ExecutionStatus {
    /// Terminal states are monotone (testable property 2): once here, an
    /// execution's status never changes again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
                | ExecutionStatus::TimedOut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Thinking,
    ToolCall,
    ToolResult,
    DelegationStart,
    DelegationEnd,
    ApprovalRequest,
    ApprovalResponse,
    Error,
    Finalize,
}

/// One append-only entry in an execution's step log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: StepKind,
    pub agent_id: String,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExecutionStep {
    pub fn new(id: impl Into<String>, kind: StepKind, agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            kind,
            agent_id: agent_id.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// One end-to-end run of the orchestrator, owned exclusively by the task
/// driving its graph. External readers only ever see a cloned snapshot
/// returned by the Execution Registry (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub thread_key: String,
    pub mode: ExecutionMode,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub messages: Vec<Message>,
    pub steps: Vec<ExecutionStep>,
    pub usage_accum: UsageRecordTokens,
    pub metadata: HashMap<String, serde_json::Value>,
    pub parent_execution_id: Option<String>,
}

impl Execution {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        user_id: impl Into<String>,
        mode: ExecutionMode,
    ) -> Self {
        let agent_id = agent_id.into();
        let thread_key = format!("{}_{}", agent_id, mode);
        Self {
            id: id.into(),
            agent_id,
            user_id: user_id.into(),
            thread_key,
            mode,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            messages: Vec::new(),
            steps: Vec::new(),
            usage_accum: UsageRecordTokens::default(),
            metadata: HashMap::new(),
            parent_execution_id: None,
        }
    }

    /// Transition to a new status. A no-op once the execution is already
    /// terminal, enforcing testable property 2.
    pub fn transition(&mut self, status: ExecutionStatus) {
        if self.status.is_terminal() {
            return;
        }
        if status.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        self.status = status;
    }
}
