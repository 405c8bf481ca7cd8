//! End-to-end scenarios driven entirely through the public `Orchestrator`
//! surface, with mock LLM clients standing in for real providers.

mod support;

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentflow_engine::clients::wrapper::{ToolDefinition};
use agentflow_engine::clients::{mock::ScriptedResponse, ClientWrapper};
use agentflow_engine::data::{
    AgentConfig, AgentRole, BudgetLimits, ExecutionStatus, InterruptResponse, InterruptResponseKind, Message,
};
use agentflow_engine::orchestrator::{CancelOutcome, ExecuteOptions, ExecuteRequest};
use agentflow_engine::tool_runtime::{ToolContext, ToolHandler, ToolRuntime};
use agentflow_engine::tools::register_builtin_tools;
use agentflow_engine::EngineConfig;
use async_trait::async_trait;

use support::{HarnessBuilder, ModelScript};

/// A tool that always requires human approval before running; used to drive
/// the approval-gated scenarios.
struct NotifyUser;

#[async_trait]
impl ToolHandler for NotifyUser {
    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, String> {
        Ok(args)
    }
}

fn notify_user_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]})
}

/// A tool handler that never returns within the default per-tool timeout.
struct StallForever;

#[async_trait]
impl ToolHandler for StallForever {
    async fn call(&self, _args: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(serde_json::Value::Null)
    }
}

/// A client whose `send_message` never resolves on its own -- it only ever
/// completes if the caller cancels it, matching how a real HTTP call to a
/// provider would be aborted (exercised by Scenario F).
struct HangingClient {
    model: String,
}

#[async_trait]
impl ClientWrapper for HangingClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Message::ai("never", "unreachable"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scenario A: direct mode, single tool call, then a final answer.
#[tokio::test]
async fn scenario_a_direct_mode_single_tool_call() {
    let harness = HarnessBuilder::new("supervisor")
        .with_agent(
            AgentConfig::new("calc-agent", AgentRole::Specialist, "calc-model")
                .with_tool_names(vec!["calculator".to_string()]),
        )
        .with_model(ModelScript::sequential(
            "calc-model",
            vec![
                ScriptedResponse::tool_call("calculator", serde_json::json!({"expression": "21 * 2"})),
                ScriptedResponse::text("The answer is 42."),
            ],
        ))
        .with_tools(register_builtin_tools)
        .build()
        .await;

    let result = harness
        .orchestrator
        .execute(ExecuteRequest {
            input: "What is 21 * 2?".into(),
            agent_id: "calc-agent".into(),
            user_id: "user-1".into(),
            prior_messages: Vec::new(),
            force_supervised: false,
            options: ExecuteOptions::default(),
        })
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.final_content.as_deref(), Some("The answer is 42."));
    assert!(result.error.is_none());

    let snapshot = harness.orchestrator.get_snapshot(&result.execution_id).await.unwrap();
    let tool_result_present = snapshot
        .messages
        .iter()
        .any(|m| matches!(m.role, agentflow_engine::data::Role::Tool { .. }));
    assert!(tool_result_present, "expected the calculator's result to be recorded as a Tool message");
}

/// Scenario B: supervised mode. The supervisor must clear a human approval
/// gate before it may delegate to a specialist, then finalizes on the
/// specialist's output.
#[tokio::test]
async fn scenario_b_supervised_delegation_with_approval() {
    let harness = HarnessBuilder::new("supervisor")
        .with_agent(
            AgentConfig::new("supervisor", AgentRole::Supervisor, "supervisor-model")
                .with_tool_names(vec!["notify_user".to_string()])
                .with_sub_agents(["writer".to_string()]),
        )
        .with_agent(AgentConfig::new("writer", AgentRole::SubAgent, "writer-model"))
        .with_model(ModelScript::sequential(
            "supervisor-model",
            vec![
                ScriptedResponse::tool_call("notify_user", serde_json::json!({"message": "starting work"})),
                ScriptedResponse::tool_call(
                    "delegate_to_writer",
                    serde_json::json!({"task_description": "write a haiku about rust"}),
                ),
                ScriptedResponse::text("Here is the haiku the writer produced."),
            ],
        ))
        .with_model(ModelScript::sequential(
            "writer-model",
            vec![ScriptedResponse::text("Borrowed lines compile / ownership moves like seasons / the build is green")],
        ))
        .with_tools(|runtime: &mut ToolRuntime| {
            runtime.register("notify_user", "notifies the user", notify_user_schema(), true, Arc::new(NotifyUser));
        })
        .build()
        .await;

    let orchestrator = harness.orchestrator.clone();
    let handle = tokio::spawn(async move {
        orchestrator
            .execute(ExecuteRequest {
                input: "Write a haiku about Rust".into(),
                agent_id: "supervisor".into(),
                user_id: "user-1".into(),
                prior_messages: Vec::new(),
                force_supervised: true,
                options: ExecuteOptions::default(),
            })
            .await
    });

    let mut subscription = harness.event_bus.subscribe();
    let mut approval_execution_id = None;
    for _ in 0..50 {
        if let Some(agentflow_engine::data::Event::ApprovalRequested { execution_id, .. }) =
            tokio::time::timeout(Duration::from_secs(2), subscription.next()).await.ok().flatten()
        {
            approval_execution_id = Some(execution_id);
            break;
        }
    }
    let execution_id = approval_execution_id.expect("expected an approval request to be raised");

    harness
        .orchestrator
        .respond_to_interrupt(
            &execution_id,
            InterruptResponse {
                kind: InterruptResponseKind::Accept,
                args: None,
                text: None,
            },
        )
        .await
        .unwrap();

    let result = handle.await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.final_content.as_deref(), Some("Here is the haiku the writer produced."));
}

/// Scenario C: a tool call that never returns within its timeout surfaces as
/// a partial, non-panicking failure rather than hanging the execution.
#[tokio::test]
async fn scenario_c_tool_timeout_yields_partial_failure() {
    let mut cfg = EngineConfig::default();
    cfg.tool_timeout_ms = 50;

    let harness = HarnessBuilder::new("supervisor")
        .with_cfg(cfg)
        .with_agent(
            AgentConfig::new("specialist", AgentRole::Specialist, "stall-model")
                .with_tool_names(vec!["stall".to_string()]),
        )
        .with_model(ModelScript::sequential(
            "stall-model",
            vec![ScriptedResponse::tool_call("stall", serde_json::json!({}))],
        ))
        .with_tools(|runtime: &mut ToolRuntime| {
            runtime.register("stall", "never returns", serde_json::json!({}), false, Arc::new(StallForever));
        })
        .build()
        .await;

    let result = harness
        .orchestrator
        .execute(ExecuteRequest {
            input: "do the slow thing".into(),
            agent_id: "specialist".into(),
            user_id: "user-1".into(),
            prior_messages: Vec::new(),
            force_supervised: false,
            options: ExecuteOptions::default(),
        })
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    let failure = result.error.expect("expected a recorded failure");
    assert_eq!(failure.kind, "timeout");
    assert!(failure.partial, "a timeout after the human turn was recorded should be a partial failure");
}

/// Scenario D: hitting the step budget does not fail the execution -- the
/// graph force-finalizes with whatever answer the model gives once tool use
/// is withdrawn.
#[tokio::test]
async fn scenario_d_budget_exceeded_forces_finalize() {
    let harness = HarnessBuilder::new("supervisor")
        .with_agent(
            AgentConfig::new("specialist", AgentRole::Specialist, "budget-model")
                .with_tool_names(vec!["calculator".to_string()])
                .with_budget_override(BudgetLimits {
                    wall_clock_ms: None,
                    max_tool_calls: None,
                    max_agent_steps: Some(1),
                }),
        )
        .with_model(ModelScript::sequential(
            "budget-model",
            vec![
                ScriptedResponse::tool_call("calculator", serde_json::json!({"expression": "1 + 1"})),
                ScriptedResponse::text("I ran out of steps, but my best answer is 2."),
            ],
        ))
        .with_tools(register_builtin_tools)
        .build()
        .await;

    let result = harness
        .orchestrator
        .execute(ExecuteRequest {
            input: "keep going forever".into(),
            agent_id: "specialist".into(),
            user_id: "user-1".into(),
            prior_messages: Vec::new(),
            force_supervised: false,
            options: ExecuteOptions::default(),
        })
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.final_content.as_deref(), Some("I ran out of steps, but my best answer is 2."));

    let snapshot = harness.orchestrator.get_snapshot(&result.execution_id).await.unwrap();
    assert_eq!(snapshot.metadata.get("force_finalized"), Some(&serde_json::Value::Bool(true)));
    assert!(
        snapshot.steps.iter().any(|s| s.kind == agentflow_engine::data::StepKind::Finalize),
        "the forced last step should be recorded as StepKind::Finalize, not Thinking"
    );
}

/// Scenario E: two identical concurrent `delegate_to_*` calls in the same
/// round collapse onto a single child execution.
#[tokio::test]
async fn scenario_e_single_flight_delegation_dedup() {
    let spawn_count = Arc::new(AtomicUsize::new(0));

    struct CountingWriterClient {
        model: String,
        spawn_count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ClientWrapper for CountingWriterClient {
        async fn send_message(
            &self,
            _messages: &[Message],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<Message, Box<dyn Error + Send + Sync>> {
            self.spawn_count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(Message::ai("writer-reply", "done"))
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    let harness = HarnessBuilder::new("supervisor")
        .with_agent(
            AgentConfig::new("supervisor", AgentRole::Supervisor, "supervisor-model")
                .with_sub_agents(["writer".to_string()]),
        )
        .with_agent(AgentConfig::new("writer", AgentRole::SubAgent, "writer-model"))
        .with_model(ModelScript::custom(
            "supervisor-model",
            Arc::new(double_delegate_client("supervisor-model")),
        ))
        .with_model(ModelScript::custom(
            "writer-model",
            Arc::new(CountingWriterClient {
                model: "writer-model".into(),
                spawn_count: spawn_count.clone(),
            }),
        ))
        .build()
        .await;

    let result = harness
        .orchestrator
        .execute(ExecuteRequest {
            input: "write a poem, and double check it got written".into(),
            agent_id: "supervisor".into(),
            user_id: "user-1".into(),
            force_supervised: true,
            prior_messages: Vec::new(),
            options: ExecuteOptions::default(),
        })
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(
        spawn_count.load(Ordering::SeqCst),
        1,
        "two identical concurrent delegate_to_writer calls in one round must share a single child execution"
    );
}

/// A supervisor client whose first (and only scripted) reply issues two
/// identical `delegate_to_writer` tool calls in the same round, then a second
/// call finalizes once the tool results are appended.
struct DoubleDelegateClient {
    model: String,
    call_count: AtomicUsize,
}

#[async_trait]
impl ClientWrapper for DoubleDelegateClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            let args = serde_json::json!({"task_description": "write a poem about rust"});
            Ok(Message::ai("supervisor-step-1", "")
                .with_tool_calls(vec![
                    agentflow_engine::data::ToolCallRequest {
                        id: "call-a".into(),
                        name: "delegate_to_writer".into(),
                        args_json: args.clone(),
                    },
                    agentflow_engine::data::ToolCallRequest {
                        id: "call-b".into(),
                        name: "delegate_to_writer".into(),
                        args_json: args,
                    },
                ]))
        } else {
            Ok(Message::ai("supervisor-step-2", "Done -- delegated once, got two acknowledgements."))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn double_delegate_client(model: &str) -> DoubleDelegateClient {
    DoubleDelegateClient {
        model: model.to_string(),
        call_count: AtomicUsize::new(0),
    }
}

/// Scenario F: cancelling a parent execution propagates to its in-flight
/// delegated child within the same tick.
#[tokio::test]
async fn scenario_f_cancel_propagates_to_delegated_child() {
    let harness = HarnessBuilder::new("supervisor")
        .with_agent(
            AgentConfig::new("supervisor", AgentRole::Supervisor, "supervisor-model")
                .with_sub_agents(["writer".to_string()]),
        )
        .with_agent(AgentConfig::new("writer", AgentRole::SubAgent, "writer-model"))
        .with_model(ModelScript::sequential(
            "supervisor-model",
            vec![ScriptedResponse::tool_call(
                "delegate_to_writer",
                serde_json::json!({"task_description": "write something that never arrives"}),
            )],
        ))
        .with_model(ModelScript::custom(
            "writer-model",
            Arc::new(HangingClient { model: "writer-model".into() }),
        ))
        .build()
        .await;

    let orchestrator = harness.orchestrator.clone();
    let handle = tokio::spawn(async move {
        orchestrator
            .execute(ExecuteRequest {
                input: "delegate and then never come back".into(),
                agent_id: "supervisor".into(),
                user_id: "user-1".into(),
                force_supervised: true,
                prior_messages: Vec::new(),
                options: ExecuteOptions::default(),
            })
            .await
    });

    // Give the supervisor time to reach the delegation call and spawn the
    // child before we cancel the parent.
    let mut parent_id = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let active = harness.orchestrator.registry().list_active().await;
        if let Some(root) = active.iter().find(|e| e.parent_execution_id.is_none()) {
            parent_id = Some(root.id.clone());
            break;
        }
    }
    let parent_id = parent_id.expect("expected the parent execution to become visible in the registry");

    let outcome = harness.orchestrator.cancel(&parent_id).await;
    assert_eq!(outcome, CancelOutcome::Ok);

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("cancelled execution should resolve quickly")
        .unwrap();
    assert_eq!(result.status, ExecutionStatus::Cancelled);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let active = harness.orchestrator.registry().list_active().await;
    assert!(
        active.is_empty(),
        "the delegated child should also have reached a terminal (cancelled) state"
    );
}

/// Scenario G: a delegated child's step progress is relayed onto the parent's
/// event stream as `delegation.progress` rather than going unobserved.
#[tokio::test]
async fn scenario_g_delegation_progress_relays_to_parent_stream() {
    let harness = HarnessBuilder::new("supervisor")
        .with_agent(
            AgentConfig::new("supervisor", AgentRole::Supervisor, "supervisor-model")
                .with_sub_agents(["writer".to_string()]),
        )
        .with_agent(AgentConfig::new("writer", AgentRole::SubAgent, "writer-model"))
        .with_model(ModelScript::sequential(
            "supervisor-model",
            vec![
                ScriptedResponse::tool_call(
                    "delegate_to_writer",
                    serde_json::json!({"task_description": "write a poem about rust"}),
                ),
                ScriptedResponse::text("Delegation done."),
            ],
        ))
        .with_model(ModelScript::sequential("writer-model", vec![ScriptedResponse::text("a poem")]))
        .build()
        .await;

    let mut subscription = harness.event_bus.subscribe();
    let result = harness
        .orchestrator
        .execute(ExecuteRequest {
            input: "write a poem".into(),
            agent_id: "supervisor".into(),
            user_id: "user-1".into(),
            force_supervised: true,
            prior_messages: Vec::new(),
            options: ExecuteOptions::default(),
        })
        .await;
    assert_eq!(result.status, ExecutionStatus::Completed);

    let mut saw_relayed_progress = false;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), subscription.next()).await {
        if let agentflow_engine::data::Event::DelegationProgress { execution_id, .. } = event {
            if execution_id == result.execution_id {
                saw_relayed_progress = true;
            }
        }
    }
    assert!(
        saw_relayed_progress,
        "the writer's step progress should be relayed onto the supervisor's execution stream"
    );
}

/// Scenario H: an execution suspended on an approval gate can be resumed from
/// its checkpoint after the original in-process task is gone, simulating
/// picking the execution back up after a process restart.
#[tokio::test]
async fn scenario_h_resume_from_checkpoint_after_approval_gate() {
    let harness = HarnessBuilder::new("supervisor")
        .with_agent(
            AgentConfig::new("specialist", AgentRole::Specialist, "specialist-model")
                .with_tool_names(vec!["notify_user".to_string()]),
        )
        .with_model(ModelScript::sequential(
            "specialist-model",
            vec![
                ScriptedResponse::tool_call("notify_user", serde_json::json!({"message": "starting work"})),
                ScriptedResponse::text("All done."),
            ],
        ))
        .with_tools(|runtime: &mut ToolRuntime| {
            runtime.register("notify_user", "notifies the user", notify_user_schema(), true, Arc::new(NotifyUser));
        })
        .build()
        .await;

    let orchestrator = harness.orchestrator.clone();
    let handle = tokio::spawn(async move {
        orchestrator
            .execute(ExecuteRequest {
                input: "do the thing".into(),
                agent_id: "specialist".into(),
                user_id: "user-1".into(),
                force_supervised: false,
                prior_messages: Vec::new(),
                options: ExecuteOptions::default(),
            })
            .await
    });

    let mut subscription = harness.event_bus.subscribe();
    let mut execution_id = None;
    for _ in 0..50 {
        if let Some(agentflow_engine::data::Event::ApprovalRequested { execution_id: id, .. }) =
            tokio::time::timeout(Duration::from_secs(2), subscription.next()).await.ok().flatten()
        {
            execution_id = Some(id);
            break;
        }
    }
    let execution_id = execution_id.expect("expected an approval request to be raised");

    // Simulate a process restart: the original task (and its in-memory
    // `oneshot` receiver) is gone, but the checkpoint it saved before
    // blocking survives since the checkpoint store is shared.
    handle.abort();
    let _ = handle.await;

    let resume_handle = {
        let orchestrator = harness.orchestrator.clone();
        let execution_id = execution_id.clone();
        tokio::spawn(async move { orchestrator.resume(&execution_id).await })
    };

    let mut resumed_approval_seen = false;
    for _ in 0..50 {
        if let Some(agentflow_engine::data::Event::ApprovalRequested { execution_id: id, .. }) =
            tokio::time::timeout(Duration::from_secs(2), subscription.next()).await.ok().flatten()
        {
            if id == execution_id {
                resumed_approval_seen = true;
                break;
            }
        }
    }
    assert!(resumed_approval_seen, "resuming should re-enter the approval node and ask again");

    harness
        .orchestrator
        .respond_to_interrupt(
            &execution_id,
            InterruptResponse {
                kind: InterruptResponseKind::Accept,
                args: None,
                text: None,
            },
        )
        .await
        .unwrap();

    let result = resume_handle.await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.final_content.as_deref(), Some("All done."));
}

/// A client that returns scripted text but stamps every reply with token
/// usage, so the usage recorder has something to turn into a record.
struct UsageReportingClient {
    model: String,
    replies: Mutex<std::collections::VecDeque<&'static str>>,
}

#[async_trait]
impl ClientWrapper for UsageReportingClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let content = self.replies.lock().unwrap().pop_front().unwrap_or("done");
        Ok(Message::ai(format!("mock-{}", uuid::Uuid::new_v4()), content)
            .with_usage(agentflow_engine::data::UsageRecordTokens::new(10, 5)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scenario I: exactly one `usage.recorded` event is emitted per usage-bearing
/// AI message, never two, regardless of how many tool-calling rounds happen.
#[tokio::test]
async fn scenario_i_usage_recorded_emitted_once_per_ai_message() {
    let harness = HarnessBuilder::new("supervisor")
        .with_agent(AgentConfig::new("calc-agent", AgentRole::Specialist, "calc-model"))
        .with_model(ModelScript::custom(
            "calc-model",
            Arc::new(UsageReportingClient {
                model: "calc-model".into(),
                replies: Mutex::new(std::collections::VecDeque::from(["The answer is 4."])),
            }),
        ))
        .with_tools(register_builtin_tools)
        .build()
        .await;

    let mut subscription = harness.event_bus.subscribe();
    let result = harness
        .orchestrator
        .execute(ExecuteRequest {
            input: "What is 2 + 2?".into(),
            agent_id: "calc-agent".into(),
            user_id: "user-1".into(),
            prior_messages: Vec::new(),
            force_supervised: false,
            options: ExecuteOptions::default(),
        })
        .await;
    assert_eq!(result.status, ExecutionStatus::Completed);

    let mut usage_recorded_count = 0;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), subscription.next()).await {
        if let agentflow_engine::data::Event::UsageRecorded { execution_id, .. } = event {
            if execution_id == result.execution_id {
                usage_recorded_count += 1;
            }
        }
    }
    assert_eq!(
        usage_recorded_count, 1,
        "the single usage-bearing AI message should record usage exactly once, not twice"
    );
}
