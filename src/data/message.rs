//! Conversation message shapes.
//!
//! Grounded on `client_wrapper.rs`'s `Message`/`Role`/`NativeToolCall`, extended
//! with the `tool_call_id` correlation and `usage_metadata` the spec's data
//! model names explicitly (§3).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::UsageRecordTokens;

/// Who authored a [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    System,
    Human,
    AI,
    /// Carries the id of the tool call this message is a result for.
    Tool { tool_call_id: String },
}

/// A single entry in an execution's message history.
///
/// Content is stored as `Arc<str>` so histories can be cheaply cloned when
/// building the narrowed supervisor view (`orchestrator.rs::build_history`),
/// mirroring `client_wrapper::Message`'s use of `Arc<str>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Arc<str>,
    /// Non-empty only on AI messages that requested tool execution.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default)]
    pub usage_metadata: Option<UsageRecordTokens>,
    /// Set on a Tool message produced by a delegation, keyed by the
    /// originating `delegate_to_*` tool-call id. `build_history`'s context
    /// filter never splits messages sharing this id across its truncation
    /// boundary (§9 OQ2).
    #[serde(default)]
    pub delegation_group: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn human(id: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            role: Role::Human,
            content: content.into(),
            tool_calls: Vec::new(),
            usage_metadata: None,
            delegation_group: None,
            created_at: Utc::now(),
        }
    }

    pub fn system(id: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            usage_metadata: None,
            delegation_group: None,
            created_at: Utc::now(),
        }
    }

    pub fn ai(id: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            role: Role::AI,
            content: content.into(),
            tool_calls: Vec::new(),
            usage_metadata: None,
            delegation_group: None,
            created_at: Utc::now(),
        }
    }

    pub fn tool_result(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::Tool {
                tool_call_id: tool_call_id.into(),
            },
            content: content.into(),
            tool_calls: Vec::new(),
            usage_metadata: None,
            delegation_group: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_usage(mut self, usage: UsageRecordTokens) -> Self {
        self.usage_metadata = Some(usage);
        self
    }

    pub fn with_delegation_group(mut self, group: impl Into<String>) -> Self {
        self.delegation_group = Some(group.into());
        self
    }
}

/// A tool call requested by an AI message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args_json: serde_json::Value,
}

/// The structured outcome of executing a [`ToolCallRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub ok: bool,
    /// Populated when `ok`.
    pub value_json: Option<serde_json::Value>,
    /// Populated when `!ok`.
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl ToolCallResult {
    pub fn success(id: impl Into<String>, value_json: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            ok: true,
            value_json: Some(value_json),
            error_message: None,
            duration_ms,
        }
    }

    pub fn failure(id: impl Into<String>, error_message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            ok: false,
            value_json: None,
            error_message: Some(error_message.into()),
            duration_ms,
        }
    }
}
