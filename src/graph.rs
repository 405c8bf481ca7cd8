//! C8 — Graph Builder & Executor.
//!
//! Grounded on `agent.rs`'s `Agent::send` tool-calling loop (iteration
//! counter, parse-then-dispatch tool calls, event emission around each LLM
//! round-trip), generalized from one flat loop into the explicit
//! agent/check_approval/approval/tools/terminal nodes §4.8 names, so each
//! phase can be independently cancelled, budgeted, and observed.
//!
//! The graph for a given [`AgentConfig`] is a pure function of its shape
//! (`role`, `tool_names`, `sub_agent_ids`) and is compiled once per
//! `(agent_id, config_revision)` and cached (§4.8 ADDED), avoiding rebuilding
//! node wiring/tool schemas on every execution of the same agent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::budget::{BudgetError, ExecutionBudget};
use crate::checkpoint::{CheckpointStore, StateBlob};
use crate::clients::wrapper::ToolDefinition;
use crate::data::{
    AgentConfig, Event, Execution, ExecutionStatus, ExecutionStep, InterruptConfig,
    InterruptResponseKind, Message, StepKind, ToolCallRequest,
};
use crate::delegation::{DelegationCoordinator, DelegationError, DelegationOutcome, DelegationRequest};
use crate::error::EngineError;
use crate::event_bus::EventBus;
use crate::interrupt_manager::InterruptManager;
use crate::model_factory::ModelFactory;
use crate::tool_runtime::{ToolContext, ToolRuntime};

/// Node pointer recorded in a checkpoint taken while blocked on human
/// approval -- the only non-terminal point §4.11 requires to survive a
/// process restart.
pub const NODE_POINTER_AWAITING_APPROVAL: &str = "awaiting_approval";
pub const NODE_POINTER_TERMINAL: &str = "terminal";

const DELEGATION_TOOL_PREFIX: &str = "delegate_to_";

/// Spawns and awaits a child execution on behalf of a `delegate_to_*` tool
/// call. Implemented by the Orchestrator; kept as a trait here so this module
/// never depends on `orchestrator.rs` (which itself depends on this one).
#[async_trait]
pub trait ChildExecutor: Send + Sync {
    async fn execute_child(
        &self,
        parent_execution_id: &str,
        source_agent_id: &str,
        target_agent_id: &str,
        task_description: &str,
        depth: usize,
    ) -> DelegationOutcome;

    /// Re-emit a child's progress signal on the parent's event stream as
    /// `delegation.progress` and feed it into the parent's own adaptive
    /// extension (§4.7 point 5, §1 "progress relay"). No-op if the parent
    /// execution already finished or is unknown to the caller.
    async fn relay_delegation_progress(&self, parent_execution_id: &str, target_agent_id: &str, progress: u8);
}

/// Knobs for the optional, off-by-default supervisor routing heuristic.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub enable_synthetic_delegation: bool,
    pub synthetic_delegation_threshold: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enable_synthetic_delegation: false,
            synthetic_delegation_threshold: 0.34,
        }
    }
}

/// The compiled, cacheable shape of one agent's graph: which tool schemas are
/// bound to LLM calls and which tool names are delegation handoffs.
pub struct CompiledGraph {
    pub agent_id: String,
    pub config_revision: u64,
    pub tool_definitions: Vec<ToolDefinition>,
    /// `delegate_to_{sub_agent_id}` -> `sub_agent_id`.
    pub delegation_targets: HashMap<String, String>,
}

fn delegation_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "task_description": {"type": "string"},
            "context": {"type": "string"},
        },
        "required": ["task_description"],
    })
}

fn compile_graph(agent_config: &AgentConfig, tool_runtime: &ToolRuntime) -> CompiledGraph {
    let mut tool_definitions = tool_runtime.tool_definitions(&agent_config.tool_names);
    let mut delegation_targets = HashMap::new();
    for sub_agent_id in &agent_config.sub_agent_ids {
        let tool_name = format!("{}{}", DELEGATION_TOOL_PREFIX, sub_agent_id);
        tool_definitions.push(ToolDefinition {
            name: tool_name.clone(),
            description: format!("Delegate a task to the '{}' agent.", sub_agent_id),
            parameters_schema: delegation_schema(),
        });
        delegation_targets.insert(tool_name, sub_agent_id.clone());
    }
    CompiledGraph {
        agent_id: agent_config.id.clone(),
        config_revision: agent_config.config_revision(),
        tool_definitions,
        delegation_targets,
    }
}

/// Process-wide cache of compiled graphs, keyed by `(agent_id, config_revision)`.
pub struct GraphCache {
    compiled: tokio::sync::Mutex<HashMap<(String, u64), Arc<CompiledGraph>>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self {
            compiled: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_compile(&self, agent_config: &AgentConfig, tool_runtime: &ToolRuntime) -> Arc<CompiledGraph> {
        let key = (agent_config.id.clone(), agent_config.config_revision());
        let mut guard = self.compiled.lock().await;
        if let Some(existing) = guard.get(&key) {
            return existing.clone();
        }
        let compiled = Arc::new(compile_graph(agent_config, tool_runtime));
        guard.insert(key, compiled.clone());
        compiled
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one execution's compiled graph to a terminal state.
pub struct GraphExecutor {
    pub model_factory: Arc<ModelFactory>,
    pub tool_runtime: Arc<ToolRuntime>,
    pub interrupt_manager: Arc<InterruptManager>,
    pub delegation_coordinator: Arc<DelegationCoordinator>,
    pub event_bus: Arc<EventBus>,
    pub child_executor: Option<Arc<dyn ChildExecutor>>,
    pub checkpoint_store: Arc<dyn CheckpointStore>,
    pub config: GraphConfig,
}

/// A tool call that has cleared the approval gate, either ready to run or
/// already resolved into a fabricated Tool message.
enum ResolvedCall {
    Execute(ToolCallRequest),
    Fabricated(Message),
}

impl GraphExecutor {
    /// Drive `execution` through its compiled graph until it reaches a
    /// terminal [`ExecutionStatus`]. Mutates `execution` in place; the caller
    /// (the Orchestrator) is responsible for persisting it to the registry.
    pub async fn run(
        &self,
        execution: &mut Execution,
        agent_config: &AgentConfig,
        graph: &CompiledGraph,
        budget: &ExecutionBudget,
        delegation_depth: usize,
        cancellation: &CancellationToken,
    ) -> Result<(), EngineError> {
        execution.transition(ExecutionStatus::Running);

        let mut force_finalize_hint_sent = false;

        loop {
            if cancellation.is_cancelled() {
                execution.transition(ExecutionStatus::Cancelled);
                return Err(EngineError::Cancelled);
            }

            // `max_tool_calls`/`max_agent_steps` force-finalize rather than
            // fail the execution (§4.3 "budget_exceeded ... not a failure");
            // only the wall-clock dimension is a genuine failure.
            // `check()` already applies the wall-clock-wins tie-break.
            let mut budget_force_finalize = false;
            if let Err(e) = budget.check().await {
                match e {
                    BudgetError::WallClockExceeded => {
                        execution.transition(ExecutionStatus::TimedOut);
                        return Err(e.into());
                    }
                    BudgetError::ToolCallsExceeded | BudgetError::AgentStepsExceeded => {
                        budget_force_finalize = true;
                    }
                }
            }

            let steps_so_far = budget.record_agent_step().await;
            let force_finalize = budget_force_finalize || steps_so_far > budget.limits().max_agent_steps;

            // Adaptive extension (§4.3) and the delegation progress relay
            // (§1/§4.7 point 5) both key off the same step-based progress
            // proxy: how far through the agent-step budget this execution is.
            let progress = ((steps_so_far as u64 * 100) / budget.limits().max_agent_steps.max(1) as u64).min(100) as u8;
            budget.on_progress(progress).await;
            if let (Some(parent_id), Some(child_executor)) = (execution.parent_execution_id.clone(), &self.child_executor) {
                child_executor.relay_delegation_progress(&parent_id, &execution.agent_id, progress).await;
            }

            let tool_defs = if force_finalize {
                if !force_finalize_hint_sent {
                    force_finalize_hint_sent = true;
                    execution.messages.push(Message::system(
                        format!("step-hint-{}", steps_so_far),
                        "You have used all available tool-calling steps. Produce a final answer now without calling any more tools.",
                    ));
                }
                None
            } else {
                Some(graph.tool_definitions.clone())
            };

            let ai_message = self
                .invoke_model(execution, agent_config, tool_defs, cancellation)
                .await?;

            let step = ExecutionStep::new(
                format!("step-{}", execution.steps.len()),
                if force_finalize { StepKind::Finalize } else { StepKind::Thinking },
                agent_config.id.clone(),
                ai_message.content.to_string(),
            );
            execution.steps.push(step);
            self.event_bus.emit(Event::ExecutionStep {
                execution_id: execution.id.clone(),
                step_id: format!("step-{}", execution.steps.len()),
                ts: chrono::Utc::now(),
            });

            let tool_calls = ai_message.tool_calls.clone();
            execution.messages.push(ai_message);

            if tool_calls.is_empty() || force_finalize {
                let final_content = execution
                    .messages
                    .last()
                    .map(|m| m.content.to_string())
                    .unwrap_or_default();
                execution.metadata.insert(
                    "final_content".to_string(),
                    serde_json::Value::String(final_content),
                );
                if force_finalize {
                    execution.metadata.insert("force_finalized".to_string(), serde_json::Value::Bool(true));
                }
                execution.transition(ExecutionStatus::Completed);
                return Ok(());
            }

            if cancellation.is_cancelled() {
                execution.transition(ExecutionStatus::Cancelled);
                return Err(EngineError::Cancelled);
            }

            let needs_approval: Vec<&ToolCallRequest> = tool_calls
                .iter()
                .filter(|tc| self.tool_runtime.requires_approval(&tc.name))
                .collect();

            let resolved: Vec<ResolvedCall> = if needs_approval.is_empty() {
                tool_calls.into_iter().map(ResolvedCall::Execute).collect()
            } else {
                execution.transition(ExecutionStatus::AwaitingApproval);
                // Persist before blocking: this is the one non-terminal point
                // the engine must be able to survive a process restart at
                // (§4.11), since `run_approval_node` awaits a `oneshot`
                // receiver that does not outlive this process.
                self.checkpoint_store
                    .save(
                        &execution.id,
                        StateBlob::from_execution(execution, NODE_POINTER_AWAITING_APPROVAL, steps_so_far),
                    )
                    .await;
                let resolved = self.run_approval_node(execution, tool_calls, cancellation).await?;
                execution.transition(ExecutionStatus::Running);
                resolved
            };

            let tool_messages = self
                .run_tools_node(execution, agent_config, resolved, budget, delegation_depth, cancellation)
                .await?;
            execution.messages.extend(tool_messages);
        }
    }

    /// Continue an execution that was loaded from a checkpoint taken at
    /// [`NODE_POINTER_AWAITING_APPROVAL`] (§4.11, §6.5). The suspended approval
    /// wait itself cannot survive a process restart -- the `oneshot` receiver
    /// lived only in the old process's stack -- so this re-derives the
    /// pending tool calls from the last AI message and re-enters the approval
    /// node fresh, then falls through to the ordinary loop in [`Self::run`]
    /// for everything after.
    pub async fn resume_after_approval(
        &self,
        execution: &mut Execution,
        agent_config: &AgentConfig,
        graph: &CompiledGraph,
        budget: &ExecutionBudget,
        delegation_depth: usize,
        cancellation: &CancellationToken,
    ) -> Result<(), EngineError> {
        let tool_calls = execution
            .messages
            .iter()
            .rev()
            .find(|m| !m.tool_calls.is_empty())
            .map(|m| m.tool_calls.clone())
            .ok_or_else(|| EngineError::ConfigError("checkpoint has no pending tool calls to resume".into()))?;

        // The interrupt pending in whatever process took this checkpoint has
        // no live waiter anymore; drop it so `run_approval_node`'s fresh
        // `request` below doesn't see a stale in-flight entry for this id.
        self.interrupt_manager.cancel(&execution.id).await;

        let resolved = self.run_approval_node(execution, tool_calls, cancellation).await?;
        execution.transition(ExecutionStatus::Running);

        let tool_messages = self
            .run_tools_node(execution, agent_config, resolved, budget, delegation_depth, cancellation)
            .await?;
        execution.messages.extend(tool_messages);

        self.run(execution, agent_config, graph, budget, delegation_depth, cancellation).await
    }

    async fn invoke_model(
        &self,
        execution: &Execution,
        agent_config: &AgentConfig,
        tool_defs: Option<Vec<ToolDefinition>>,
        cancellation: &CancellationToken,
    ) -> Result<Message, EngineError> {
        let client = self
            .model_factory
            .get(&agent_config.model, &agent_config.model_options)
            .await?;

        let call = client.send_message(&execution.messages, tool_defs);
        let ai_message = tokio::select! {
            result = call => result.map_err(|e| EngineError::ModelError(e.to_string()))?,
            _ = cancellation.cancelled() => return Err(EngineError::Cancelled),
        };

        // `usage.recorded` is emitted exactly once per usage-bearing AI
        // message, by the Usage Recorder's end-of-execution pass (C10,
        // `Orchestrator::record_usage`) so the emission carries priced
        // `UsageRecord` data rather than raw token counts twice over.
        Ok(ai_message)
    }

    async fn run_approval_node(
        &self,
        execution: &Execution,
        tool_calls: Vec<ToolCallRequest>,
        cancellation: &CancellationToken,
    ) -> Result<Vec<ResolvedCall>, EngineError> {
        let mut resolved = Vec::with_capacity(tool_calls.len());

        for tool_call in tool_calls {
            if !self.tool_runtime.requires_approval(&tool_call.name) {
                resolved.push(ResolvedCall::Execute(tool_call));
                continue;
            }

            self.event_bus.emit(Event::ApprovalRequested {
                execution_id: execution.id.clone(),
                tool_name: tool_call.name.clone(),
                ts: chrono::Utc::now(),
            });

            let receiver = self
                .interrupt_manager
                .request(
                    execution.id.clone(),
                    execution.thread_key.clone(),
                    tool_call.clone(),
                    InterruptConfig::default(),
                    format!("approval required for tool '{}'", tool_call.name),
                )
                .await?;

            let response = tokio::select! {
                result = receiver => result.map_err(|_| EngineError::ApprovalTimeout)?,
                _ = cancellation.cancelled() => return Err(EngineError::Cancelled),
            };

            self.event_bus.emit(Event::ApprovalResolved {
                execution_id: execution.id.clone(),
                ts: chrono::Utc::now(),
            });

            let resolved_call = match response.kind {
                InterruptResponseKind::Accept => ResolvedCall::Execute(tool_call),
                InterruptResponseKind::Edit => {
                    let args = response.args.unwrap_or(tool_call.args_json.clone());
                    ResolvedCall::Execute(ToolCallRequest { args_json: args, ..tool_call })
                }
                InterruptResponseKind::Respond => {
                    let text = response.text.unwrap_or_default();
                    ResolvedCall::Fabricated(Message::tool_result(
                        format!("tool-msg-{}", tool_call.id),
                        tool_call.id,
                        text,
                    ))
                }
                InterruptResponseKind::Ignore => ResolvedCall::Fabricated(Message::tool_result(
                    format!("tool-msg-{}", tool_call.id),
                    tool_call.id,
                    "cancelled by user",
                )),
            };
            resolved.push(resolved_call);
        }

        Ok(resolved)
    }

    async fn run_tools_node(
        &self,
        execution: &Execution,
        agent_config: &AgentConfig,
        resolved: Vec<ResolvedCall>,
        budget: &ExecutionBudget,
        delegation_depth: usize,
        cancellation: &CancellationToken,
    ) -> Result<Vec<Message>, EngineError> {
        let mut messages: Vec<Option<Message>> = Vec::with_capacity(resolved.len());
        let mut pending_execute: Vec<(usize, ToolCallRequest)> = Vec::new();

        for (idx, call) in resolved.into_iter().enumerate() {
            match call {
                ResolvedCall::Fabricated(msg) => messages.push(Some(msg)),
                ResolvedCall::Execute(tc) => {
                    messages.push(None);
                    pending_execute.push((idx, tc));
                }
            }
        }

        let (delegations, direct): (Vec<_>, Vec<_>) = pending_execute
            .into_iter()
            .partition(|(_, tc)| graph_is_delegation(tc));

        if !direct.is_empty() {
            let ctx = ToolContext {
                user_id: execution.user_id.clone(),
                execution_id: execution.id.clone(),
                agent_id: agent_config.id.clone(),
                cancellation: cancellation.clone(),
            };
            // These calls have already cleared the approval gate -- either
            // they never needed one, or `run_approval_node` just granted it
            // -- so execute directly rather than going back through
            // `invoke()`, which would just raise `RequiresApproval` again.
            let futures = direct.iter().map(|(_, tc)| {
                let ctx = ctx.clone();
                async move {
                    self.event_bus.emit(Event::ToolInvoking {
                        execution_id: ctx.execution_id.clone(),
                        tool_name: tc.name.clone(),
                        ts: chrono::Utc::now(),
                    });
                    budget.record_tool_call().await;
                    let outcome = self.tool_runtime.execute_approved(tc, &ctx).await;
                    (tc.id.clone(), tc.name.clone(), outcome)
                }
            });
            let outcomes = futures_util::future::join_all(futures).await;
            for ((idx, _tc), (id, name, outcome)) in direct.iter().zip(outcomes) {
                let result = outcome?;
                self.event_bus.emit(Event::ToolCompleted {
                    execution_id: execution.id.clone(),
                    tool_name: name,
                    success: result.ok,
                    duration_ms: result.duration_ms,
                    ts: chrono::Utc::now(),
                });
                messages[*idx] = Some(tool_result_message(&id, &result));
            }
        }

        // Run concurrently, not sequentially: two `delegate_to_*` calls in the
        // same round naming the same target+task are exactly the case the
        // Delegation Coordinator's single-flight dedup exists for, and that
        // only has a chance to trigger if both requests are in flight at once.
        let delegation_futures = delegations.iter().map(|(_, tc)| {
            let target_agent_id = graph_delegation_target(tc);
            let task_description = tc
                .args_json
                .get("task_description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            self.event_bus.emit(Event::DelegationRequested {
                execution_id: execution.id.clone(),
                target_agent_id: target_agent_id.clone(),
                ts: chrono::Utc::now(),
            });
            async move {
                let outcome = self
                    .run_delegation(
                        execution.id.clone(),
                        agent_config.id.clone(),
                        target_agent_id.clone(),
                        task_description,
                        delegation_depth,
                    )
                    .await;
                (target_agent_id, outcome)
            }
        });
        let delegation_outcomes = futures_util::future::join_all(delegation_futures).await;

        for ((idx, tc), (target_agent_id, outcome)) in delegations.iter().zip(delegation_outcomes) {
            // Tagged with the originating tool-call id so a history truncation
            // never splits a delegation's messages across the cut (§9 OQ2) --
            // today a delegation always produces exactly one Tool message, but
            // the tag keeps `build_history`'s grouping correct if that changes.
            let message = match outcome {
                Ok(child_message) => {
                    self.event_bus.emit(Event::DelegationCompleted {
                        execution_id: execution.id.clone(),
                        target_agent_id,
                        ts: chrono::Utc::now(),
                    });
                    Message::tool_result(format!("tool-msg-{}", tc.id), tc.id.clone(), child_message.content.clone())
                }
                Err(DelegationError::ChildTimedOut) => Message::tool_result(
                    format!("tool-msg-{}", tc.id),
                    tc.id.clone(),
                    serde_json::json!({"error": "timeout", "kind": "timeout"}).to_string(),
                ),
                Err(e) => Message::tool_result(
                    format!("tool-msg-{}", tc.id),
                    tc.id.clone(),
                    serde_json::json!({"error": e.to_string()}).to_string(),
                ),
            }
            .with_delegation_group(tc.id.clone());
            messages[*idx] = Some(message);
        }

        Ok(messages.into_iter().map(|m| m.expect("every resolved call produces exactly one message")).collect())
    }

    async fn run_delegation(
        &self,
        parent_execution_id: String,
        source_agent_id: String,
        target_agent_id: String,
        task_description: String,
        depth: usize,
    ) -> DelegationOutcome {
        let Some(child_executor) = self.child_executor.clone() else {
            return Err(DelegationError::ChildFailed("no sub-agents configured".into()));
        };

        let request = DelegationRequest {
            parent_execution_id: parent_execution_id.clone(),
            source_agent_id: source_agent_id.clone(),
            target_agent_id: target_agent_id.clone(),
            task_description: task_description.clone(),
            depth,
        };

        self.delegation_coordinator
            .delegate(request, move || {
                Box::pin(async move {
                    child_executor
                        .execute_child(&parent_execution_id, &source_agent_id, &target_agent_id, &task_description, depth)
                        .await
                })
            })
            .await
    }
}

fn graph_is_delegation(tc: &ToolCallRequest) -> bool {
    tc.name.starts_with(DELEGATION_TOOL_PREFIX)
}

fn graph_delegation_target(tc: &ToolCallRequest) -> String {
    tc.name
        .strip_prefix(DELEGATION_TOOL_PREFIX)
        .unwrap_or(&tc.name)
        .to_string()
}

fn tool_result_message(id: &str, result: &crate::data::ToolCallResult) -> Message {
    let content = if result.ok {
        result
            .value_json
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default()
    } else {
        serde_json::json!({ "error": result.error_message.clone().unwrap_or_default() }).to_string()
    };
    Message::tool_result(format!("tool-msg-{}", id), id.to_string(), content)
}

/// The off-by-default supervisor heuristic from §4.8: if the LLM produced no
/// tool_calls on its first step and a specialist's tags overlap the human
/// message's tokens above `threshold`, synthesize a delegation call. Disabled
/// unless [`GraphConfig::enable_synthetic_delegation`] is set.
pub fn maybe_synthetic_delegation(
    config: &GraphConfig,
    human_message: &str,
    candidate_tags: &HashSet<String>,
) -> bool {
    if !config.enable_synthetic_delegation {
        return false;
    }
    let tokens: HashSet<String> = human_message
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return false;
    }
    let overlap = candidate_tags.iter().filter(|t| tokens.contains(*t)).count();
    (overlap as f32 / tokens.len() as f32) >= config.synthetic_delegation_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_delegation_disabled_by_default() {
        let config = GraphConfig::default();
        let mut tags = HashSet::new();
        tags.insert("poem".to_string());
        assert!(!maybe_synthetic_delegation(&config, "write me a poem", &tags));
    }

    #[test]
    fn synthetic_delegation_fires_above_threshold_when_enabled() {
        let config = GraphConfig {
            enable_synthetic_delegation: true,
            synthetic_delegation_threshold: 0.2,
        };
        let mut tags = HashSet::new();
        tags.insert("poem".to_string());
        assert!(maybe_synthetic_delegation(&config, "write me a poem", &tags));
    }

    #[test]
    fn delegation_tool_name_round_trips() {
        let tc = ToolCallRequest {
            id: "call-1".into(),
            name: "delegate_to_ami".into(),
            args_json: serde_json::json!({}),
        };
        assert!(graph_is_delegation(&tc));
        assert_eq!(graph_delegation_target(&tc), "ami");
    }
}
