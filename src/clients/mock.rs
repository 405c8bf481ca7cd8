//! Deterministic in-memory test double for [`ClientWrapper`].
//!
//! Grounded on `tests/planner_tests.rs`'s `SequentialMockClient`: a queue of
//! canned responses consumed one per call, with an atomic counter so
//! concurrent callers each see a distinct response. `ClientWrapper` exists as
//! a trait precisely so integration tests can stub the provider this way
//! instead of hitting a real LLM.

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::clients::wrapper::{ClientWrapper, ToolDefinition};
use crate::data::{Message, ToolCallRequest};

/// One scripted turn: plain text, or text plus tool calls the executor should
/// see as if the LLM requested them.
pub struct ScriptedResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ScriptedResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                name: name.into(),
                args_json: args,
            }],
        }
    }
}

/// Replays a fixed script of responses, one per `send_message` call, in
/// order. Panics (via `Err`) if the script is exhausted, which surfaces test
/// bugs loudly instead of silently looping.
pub struct SequentialMockClient {
    model: String,
    responses: Mutex<Vec<ScriptedResponse>>,
    call_count: AtomicUsize,
}

impl SequentialMockClient {
    pub fn new(model: impl Into<String>, responses: Vec<ScriptedResponse>) -> Self {
        Self {
            model: model.into(),
            responses: Mutex::new(responses.into_iter().rev().collect()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientWrapper for SequentialMockClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.responses.lock().unwrap();
        let next = queue
            .pop()
            .ok_or("SequentialMockClient script exhausted")?;
        Ok(Message::ai("mock", next.content).with_tool_calls(next.tool_calls))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
