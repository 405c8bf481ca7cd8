//! Built-in tools shipped with the engine.
//!
//! Grounded on `tools/mod.rs`'s module list, trimmed to the one tool with no
//! external side effects (`bash`/`filesystem`/`http_client`/`memory` are
//! dropped per DESIGN.md's Trimming section -- they execute the host's shell
//! or filesystem, well outside this engine's scope).

mod calculator;

pub use calculator::{Calculator, CalculatorError, CalculatorResult};

use std::sync::Arc;

use async_trait::async_trait;

use crate::tool_runtime::{ToolContext, ToolHandler, ToolRuntime};

/// Adapts the stateless [`Calculator`] to [`ToolHandler`] so it can be
/// registered against a [`ToolRuntime`].
struct CalculatorHandler {
    calculator: Calculator,
}

#[async_trait]
impl ToolHandler for CalculatorHandler {
    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, String> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or("missing required field: expression")?;

        let value = self
            .calculator
            .evaluate(expression)
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({ "result": value }))
    }
}

fn calculator_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "expression": {
                "type": "string",
                "description": "A mathematical expression, e.g. \"sqrt(16) + sin(pi/2)\" or \"mean([1,2,3])\"",
            }
        },
        "required": ["expression"],
    })
}

/// Registers all built-in tools against `runtime`. Called once at startup
/// (§5's "Tool registry: immutable after startup").
pub fn register_builtin_tools(runtime: &mut ToolRuntime) {
    runtime.register(
        "calculator",
        "Evaluates arithmetic, trigonometric, logarithmic, and statistical expressions.",
        calculator_schema(),
        false,
        Arc::new(CalculatorHandler {
            calculator: Calculator::new(),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ToolCallRequest;
    use crate::tool_runtime::InvokeOutcome;
    use std::time::Duration;

    fn ctx() -> ToolContext {
        ToolContext {
            user_id: "user-1".into(),
            execution_id: "exec-1".into(),
            agent_id: "specialist".into(),
            cancellation: tokio_util::sync::CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn calculator_tool_evaluates_expression() {
        let mut runtime = ToolRuntime::new(Duration::from_secs(5));
        register_builtin_tools(&mut runtime);

        let request = ToolCallRequest {
            id: "call-1".into(),
            name: "calculator".into(),
            args_json: serde_json::json!({"expression": "2 + 2 * 3"}),
        };
        match runtime.invoke(&request, &ctx()).await.unwrap() {
            InvokeOutcome::Result(result) => {
                assert!(result.ok);
                let value = result.value_json.unwrap();
                assert_eq!(value["result"].as_f64().unwrap(), 8.0);
            }
            InvokeOutcome::RequiresApproval => panic!("calculator should not require approval"),
        }
    }

    #[tokio::test]
    async fn calculator_tool_rejects_missing_expression() {
        let mut runtime = ToolRuntime::new(Duration::from_secs(5));
        register_builtin_tools(&mut runtime);

        let request = ToolCallRequest {
            id: "call-1".into(),
            name: "calculator".into(),
            args_json: serde_json::json!({}),
        };
        let result = runtime.invoke(&request, &ctx()).await;
        assert!(result.is_err());
    }
}
