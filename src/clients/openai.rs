//! OpenAI Chat Completions client.
//!
//! Grounded on `clients/openai.rs`'s `OpenAIClient`, trimmed of the
//! `openai-rust2` dependency, streaming, and DALL-E image generation (none of
//! which are in scope — the spec treats the provider client as an opaque
//! `invoke(messages, tools) -> {content, tool_calls, usage}` collaborator).
//! Talks to `/v1/chat/completions` directly over `reqwest`, the same HTTP
//! stack the teacher uses underneath its SDK wrapper.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::clients::wrapper::{ClientWrapper, ToolDefinition};
use crate::data::{Message, Role, ToolCallRequest, UsageRecordTokens};

pub struct OpenAIClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    last_usage: Mutex<Option<UsageRecordTokens>>,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, "https://api.openai.com/v1")
    }

    pub fn with_base_url(api_key: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            last_usage: Mutex::new(None),
        }
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatResponseToolCall>,
}

#[derive(Deserialize)]
struct ChatResponseToolCall {
    id: String,
    function: ChatResponseFunctionCall,
}

#[derive(Deserialize)]
struct ChatResponseFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

fn to_wire_message(msg: &Message) -> WireMessage {
    let tool_call_id = match &msg.role {
        Role::Tool { tool_call_id } => Some(tool_call_id.clone()),
        _ => None,
    };
    let role = match &msg.role {
        Role::System => "system",
        Role::Human => "user",
        Role::AI => "assistant",
        Role::Tool { .. } => "tool",
    };
    let tool_calls = if msg.tool_calls.is_empty() {
        None
    } else {
        Some(
            msg.tool_calls
                .iter()
                .map(|tc| WireToolCall {
                    id: tc.id.clone(),
                    kind: "function",
                    function: WireFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.args_json.to_string(),
                    },
                })
                .collect(),
        )
    };
    WireMessage {
        role,
        content: msg.content.to_string(),
        tool_call_id,
        tool_calls,
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let wire_messages: Vec<WireMessage> = messages.iter().map(to_wire_message).collect();
        let wire_tools: Option<Vec<WireTool>> = tools.map(|defs| {
            defs.into_iter()
                .map(|d| WireTool {
                    kind: "function",
                    function: WireFunctionDef {
                        name: d.name,
                        description: d.description,
                        parameters: d.parameters_schema,
                    },
                })
                .collect()
        });

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": wire_messages,
        });
        if let Some(wire_tools) = wire_tools {
            body["tools"] = serde_json::to_value(wire_tools)?;
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "OpenAI chat completion request failed");
                Box::<dyn Error + Send + Sync>::from(format!("OpenAI request error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("OpenAI API error ({}): {}", status, text).into());
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or("OpenAI response contained no choices")?;

        let usage = parsed.usage.map(|u| UsageRecordTokens {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        if let Some(usage) = usage {
            *self.last_usage.lock().await = Some(usage);
        }

        let tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| {
                let args_json = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::Null);
                ToolCallRequest {
                    id: tc.id,
                    name: tc.function.name,
                    args_json,
                }
            })
            .collect();

        let mut ai_message = Message::ai("resp", choice.message.content.unwrap_or_default())
            .with_tool_calls(tool_calls);
        if let Some(usage) = usage {
            ai_message = ai_message.with_usage(usage);
        }
        Ok(ai_message)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn last_usage(&self) -> Option<UsageRecordTokens> {
        *self.last_usage.lock().await
    }
}

pub fn shared(api_key: impl Into<String>, model: impl Into<String>) -> Arc<dyn ClientWrapper> {
    Arc::new(OpenAIClient::new(api_key, model))
}
