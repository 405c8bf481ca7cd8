//! Human-in-the-loop approval data types, consumed by the Interrupt Manager (C6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::ToolCallRequest;

/// Which response kinds a particular interrupt accepts; a tool's registration
/// may restrict this (e.g. a destructive tool might disallow `ignore`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InterruptConfig {
    pub allow_accept: bool,
    pub allow_edit: bool,
    pub allow_respond: bool,
    pub allow_ignore: bool,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            allow_accept: true,
            allow_edit: true,
            allow_respond: true,
            allow_ignore: true,
        }
    }
}

/// A pending human approval request, blocking the graph at the `approval` node
/// until resolved or expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interrupt {
    pub execution_id: String,
    pub thread_key: String,
    pub tool_call: ToolCallRequest,
    pub config: InterruptConfig,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptResponseKind {
    Accept,
    Edit,
    Respond,
    Ignore,
}

/// The UI's resolution of a pending [`Interrupt`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptResponse {
    #[serde(rename = "type")]
    pub kind: InterruptResponseKind,
    /// Present for `Edit`: replacement tool-call arguments.
    pub args: Option<serde_json::Value>,
    /// Present for `Respond`: free-form text bypassing the tool's schema
    /// entirely, per the Open Question decision in DESIGN.md.
    pub text: Option<String>,
}
