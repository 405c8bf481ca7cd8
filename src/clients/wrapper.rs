//! The uniform LLM provider contract.
//!
//! Kept close to `client_wrapper.rs`'s `ClientWrapper` trait, whose
//! `send_message(messages, tools) -> Message` shape already matches the
//! spec's "the engine assumes a uniform capability: invoke(messages, tools)
//! -> {content, tool_calls, usage}" almost verbatim (§1). Providers are
//! explicitly out of scope; this trait is the one seam the engine depends on.

use std::error::Error;

use async_trait::async_trait;

use crate::data::{Message, UsageRecordTokens};

/// Schema handed to the provider alongside a chat request, derived from
/// `ToolRuntime`'s registered tools.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Trait-driven abstraction over a concrete LLM provider. Implementations
/// must be `Send + Sync` to be shared across the async tasks driving
/// concurrent executions (§5 requires ≥100 concurrent executions per
/// process without head-of-line blocking).
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send a request/response chat completion. When `tools` is `Some` and
    /// non-empty, implementations MUST use native tool-calling if the
    /// provider supports it (§4.4); the returned [`Message`] carries
    /// non-empty `tool_calls` when the provider selected one or more tools.
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// The model identifier this client was constructed for (e.g. `"gpt-4.1-nano"`).
    fn model_name(&self) -> &str;

    /// Token usage for the most recently completed [`send_message`] call, if
    /// the provider reports it. Mirrors `client_wrapper::ClientWrapper::get_last_usage`.
    async fn last_usage(&self) -> Option<UsageRecordTokens> {
        None
    }
}
