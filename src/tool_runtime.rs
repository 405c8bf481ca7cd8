//! C5 — Tool Runtime: registration, schema validation, per-tool timeout,
//! approval gating.
//!
//! Grounded on `tool_protocol.rs`'s `ToolRegistry`/`ToolMetadata`/`ToolResult`,
//! extended with a `requires_approval` gate (raised as a control signal, not
//! an error, per §4.5 step 3) and a `tokio::time::timeout` wrapper around
//! handler execution.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::clients::wrapper::ToolDefinition;
use crate::data::{ToolCallRequest, ToolCallResult};

#[derive(Debug, Clone)]
pub enum ToolRuntimeError {
    NotFound(String),
    InvalidArgs(String),
    Timeout(String),
    ExecutionFailed(String),
}

impl fmt::Display for ToolRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolRuntimeError::NotFound(name) => write!(f, "tool not found: {}", name),
            ToolRuntimeError::InvalidArgs(msg) => write!(f, "invalid tool arguments: {}", msg),
            ToolRuntimeError::Timeout(name) => write!(f, "tool '{}' timed out", name),
            ToolRuntimeError::ExecutionFailed(msg) => write!(f, "tool execution failed: {}", msg),
        }
    }
}

impl Error for ToolRuntimeError {}

/// Request-scoped data passed into every tool invocation, per §4.5's
/// "Context carries: user_id, execution_id, agent_id, request_scoped_credentials,
/// cancellation handle" -- the explicit `Context` value §9 calls for in place
/// of implicit per-request shared state.
#[derive(Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub execution_id: String,
    pub agent_id: String,
    pub cancellation: tokio_util::sync::CancellationToken,
}

/// A tool handler: arbitrary async logic taking validated JSON args and a
/// [`ToolContext`], returning a JSON result or an error string. Tools MUST
/// observe `ctx.cancellation` and abort I/O promptly when signaled.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value, String>;
}

/// A registered tool: its schema plus the handler that executes it.
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
    pub requires_approval: bool,
    handler: Arc<dyn ToolHandler>,
}

/// Control signal raised by [`ToolRuntime::invoke`] when a tool call must be
/// routed to the Interrupt Manager before it can run (§4.5 step 3: "NOT an
/// error -- a control signal").
pub enum InvokeOutcome {
    Result(ToolCallResult),
    RequiresApproval,
}

/// Immutable-after-startup tool registry with per-call timeout enforcement.
/// Names are globally unique per process (§4.5); reads are lock-free once
/// registration is complete since `tools` is a plain `HashMap` behind no lock
/// -- registration happens once at startup, matching §5's "Tool registry:
/// immutable after startup; concurrent reads lock-free".
pub struct ToolRuntime {
    tools: HashMap<String, RegisteredTool>,
    default_timeout: Duration,
}

impl ToolRuntime {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout,
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        requires_approval: bool,
        handler: Arc<dyn ToolHandler>,
    ) {
        let name = name.into();
        self.tools.insert(
            name.clone(),
            RegisteredTool {
                name,
                description: description.into(),
                schema,
                requires_approval,
                handler,
            },
        );
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn requires_approval(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.requires_approval).unwrap_or(false)
    }

    /// Tool schemas in the shape the Model Factory binds to an LLM request.
    pub fn tool_definitions(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters_schema: t.schema.clone(),
            })
            .collect()
    }

    /// §4.5's `invoke(name, args, ctx) -> ToolCallResult`, generalized to
    /// return a control signal for approval-gated tools instead of executing
    /// them inline.
    pub async fn invoke(
        &self,
        request: &ToolCallRequest,
        ctx: &ToolContext,
    ) -> Result<InvokeOutcome, ToolRuntimeError> {
        let tool = self
            .tools
            .get(&request.name)
            .ok_or_else(|| ToolRuntimeError::NotFound(request.name.clone()))?;

        validate_against_schema(&request.args_json, &tool.schema)
            .map_err(ToolRuntimeError::InvalidArgs)?;

        if tool.requires_approval {
            return Ok(InvokeOutcome::RequiresApproval);
        }

        self.execute_unchecked(tool, request, ctx).await.map(InvokeOutcome::Result)
    }

    /// Validate and run a call that has already cleared the approval gate
    /// (either it never required one, or a human just accepted/edited it at
    /// the approval node) -- the executor's single entry point for the
    /// `tools` node, which must never re-raise `RequiresApproval` for a call
    /// it already resolved.
    pub async fn execute_approved(
        &self,
        request: &ToolCallRequest,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, ToolRuntimeError> {
        let tool = self
            .tools
            .get(&request.name)
            .ok_or_else(|| ToolRuntimeError::NotFound(request.name.clone()))?;
        validate_against_schema(&request.args_json, &tool.schema).map_err(ToolRuntimeError::InvalidArgs)?;
        self.execute_unchecked(tool, request, ctx).await
    }

    /// Execute a tool that has already cleared approval (or never needed
    /// it), bypassing both the approval check and schema validation --
    /// used internally once [`Self::execute_approved`] has validated, and by
    /// callers that validated some other way.
    pub async fn execute_unchecked(
        &self,
        tool: &RegisteredTool,
        request: &ToolCallRequest,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, ToolRuntimeError> {
        let started = std::time::Instant::now();
        let outcome = timeout(
            self.default_timeout,
            tool.handler.call(request.args_json.clone(), ctx),
        )
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Err(_) => {
                tracing::warn!(tool = %tool.name, duration_ms, "tool call timed out");
                Err(ToolRuntimeError::Timeout(tool.name.clone()))
            }
            Ok(Ok(value)) => {
                tracing::info!(tool = %tool.name, duration_ms, "tool call completed");
                Ok(ToolCallResult::success(request.id.clone(), value, duration_ms))
            }
            Ok(Err(message)) => {
                tracing::warn!(tool = %tool.name, duration_ms, error = %message, "tool call failed");
                Ok(ToolCallResult::failure(request.id.clone(), message, duration_ms))
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }
}

/// Minimal structural validation: every `required` top-level property named in
/// the schema's `required` array must be present in `args`. Full JSON-Schema
/// validation is out of scope; this matches the spec's "validate args against
/// schema" requirement (§4.5 step 2) without adding a schema-validator
/// dependency the teacher never carried.
fn validate_against_schema(args: &serde_json::Value, schema: &serde_json::Value) -> Result<(), String> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let obj = args.as_object();
    for field in required {
        let Some(field_name) = field.as_str() else { continue };
        let present = obj.map(|o| o.contains_key(field_name)).unwrap_or(false);
        if !present {
            return Err(format!("missing required field: {}", field_name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, String> {
            Ok(args)
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            user_id: "user-1".into(),
            execution_id: "exec-1".into(),
            agent_id: "specialist".into(),
            cancellation: tokio_util::sync::CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let runtime = ToolRuntime::new(Duration::from_secs(1));
        let request = ToolCallRequest {
            id: "call-1".into(),
            name: "does_not_exist".into(),
            args_json: serde_json::json!({}),
        };
        let result = runtime.invoke(&request, &ctx()).await;
        assert!(matches!(result, Err(ToolRuntimeError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_required_arg_is_rejected() {
        let mut runtime = ToolRuntime::new(Duration::from_secs(1));
        runtime.register(
            "echo",
            "echoes input",
            serde_json::json!({"type": "object", "required": ["value"]}),
            false,
            Arc::new(Echo),
        );
        let request = ToolCallRequest {
            id: "call-1".into(),
            name: "echo".into(),
            args_json: serde_json::json!({}),
        };
        let result = runtime.invoke(&request, &ctx()).await;
        assert!(matches!(result, Err(ToolRuntimeError::InvalidArgs(_))));
    }

    #[tokio::test]
    async fn approval_required_tool_signals_instead_of_running() {
        let mut runtime = ToolRuntime::new(Duration::from_secs(1));
        runtime.register("danger", "needs approval", serde_json::json!({}), true, Arc::new(Echo));
        let request = ToolCallRequest {
            id: "call-1".into(),
            name: "danger".into(),
            args_json: serde_json::json!({}),
        };
        let outcome = runtime.invoke(&request, &ctx()).await.unwrap();
        assert!(matches!(outcome, InvokeOutcome::RequiresApproval));
    }

    #[tokio::test]
    async fn successful_call_returns_result() {
        let mut runtime = ToolRuntime::new(Duration::from_secs(1));
        runtime.register("echo", "echoes input", serde_json::json!({}), false, Arc::new(Echo));
        let request = ToolCallRequest {
            id: "call-1".into(),
            name: "echo".into(),
            args_json: serde_json::json!({"value": 42}),
        };
        match runtime.invoke(&request, &ctx()).await.unwrap() {
            InvokeOutcome::Result(result) => assert!(result.ok),
            InvokeOutcome::RequiresApproval => panic!("did not expect approval gate"),
        }
    }

    #[tokio::test]
    async fn execute_approved_runs_a_tool_that_requires_approval() {
        let mut runtime = ToolRuntime::new(Duration::from_secs(1));
        runtime.register("danger", "needs approval", serde_json::json!({}), true, Arc::new(Echo));
        let request = ToolCallRequest {
            id: "call-1".into(),
            name: "danger".into(),
            args_json: serde_json::json!({}),
        };

        assert!(matches!(runtime.invoke(&request, &ctx()).await.unwrap(), InvokeOutcome::RequiresApproval));

        let result = runtime.execute_approved(&request, &ctx()).await.unwrap();
        assert!(result.ok, "execute_approved must not re-raise the approval gate once a human has accepted it");
    }

    #[tokio::test]
    async fn execute_approved_still_validates_args() {
        let mut runtime = ToolRuntime::new(Duration::from_secs(1));
        runtime.register(
            "echo",
            "echoes input",
            serde_json::json!({"type": "object", "required": ["value"]}),
            false,
            Arc::new(Echo),
        );
        let request = ToolCallRequest {
            id: "call-1".into(),
            name: "echo".into(),
            args_json: serde_json::json!({}),
        };
        let result = runtime.execute_approved(&request, &ctx()).await;
        assert!(matches!(result, Err(ToolRuntimeError::InvalidArgs(_))));
    }
}
