//! C9 — Orchestrator: the one entry point external callers drive.
//!
//! Grounded on `agent.rs`'s top-level `send`/`chat` surface and
//! `orchestration.rs`'s mode resolution (`OrchestrationMode::{Direct,
//! Hierarchical}`), generalized into the full `execute`/`cancel`/
//! `get_snapshot`/`subscribe`/`respond_to_interrupt` surface of §6.1. Also
//! implements [`ChildExecutor`] so delegation (C7/C8) recurses back through
//! this same type rather than needing a second orchestration path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::budget::ExecutionBudget;
use crate::checkpoint::{CheckpointStore, StateBlob};
use crate::config::EngineConfig;
use crate::data::{AgentConfig, Event, Execution, ExecutionMode, ExecutionStatus, Message, ModelOptions, Role};
use crate::delegation::{DelegationCoordinator, DelegationError, DelegationOutcome};
use crate::error::EngineError;
use crate::event_bus::{EventBus, Subscription};
use crate::graph::{
    ChildExecutor, CompiledGraph, GraphCache, GraphConfig, GraphExecutor, NODE_POINTER_AWAITING_APPROVAL,
    NODE_POINTER_TERMINAL,
};
use crate::interrupt_manager::InterruptManager;
use crate::model_factory::ModelFactory;
use crate::registry::{ExecutionRegistry, SharedRegistry};
use crate::tool_runtime::ToolRuntime;
use crate::usage::UsageRecorder;

const CONTEXT_FILTER_TOOL_MESSAGES: usize = 5;

/// One call into the engine (§6.1).
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub timeout_ms: Option<u64>,
    pub max_tool_calls: Option<u32>,
    pub max_agent_steps: Option<u32>,
    pub model_override: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub input: String,
    pub agent_id: String,
    pub user_id: String,
    pub prior_messages: Vec<Message>,
    pub force_supervised: bool,
    pub options: ExecuteOptions,
}

#[derive(Debug, Clone)]
pub struct UsageSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    pub kind: String,
    pub message: String,
    pub partial: bool,
}

/// The terminal result of one `execute()` call (§6.1).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub final_content: Option<String>,
    pub usage: UsageSummary,
    pub error: Option<ExecutionFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Ok,
    NotFound,
    AlreadyTerminal,
}

/// Registered agents, consulted to resolve `agent_id` -> [`AgentConfig`] and
/// to decide supervised-vs-direct mode. Config storage itself is out of scope
/// (§1); this is the minimal in-memory collaborator the engine needs to run.
pub struct AgentDirectory {
    agents: RwLock<HashMap<String, AgentConfig>>,
    supervisor_id: String,
}

impl AgentDirectory {
    pub fn new(supervisor_id: impl Into<String>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            supervisor_id: supervisor_id.into(),
        }
    }

    pub async fn register(&self, config: AgentConfig) {
        self.agents.write().await.insert(config.id.clone(), config);
    }

    pub async fn get(&self, agent_id: &str) -> Result<AgentConfig, EngineError> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| EngineError::ConfigError(format!("unknown agent: {}", agent_id)))
    }

    pub fn supervisor_id(&self) -> &str {
        &self.supervisor_id
    }
}

/// The fully-wired engine. One instance per process; cheap to clone (every
/// field is an `Arc`) so it can be handed to background tasks (e.g. a
/// sweeper) without lifetime gymnastics.
#[derive(Clone)]
pub struct Orchestrator {
    cfg: EngineConfig,
    agents: Arc<AgentDirectory>,
    registry: SharedRegistry,
    event_bus: Arc<EventBus>,
    model_factory: Arc<ModelFactory>,
    tool_runtime: Arc<ToolRuntime>,
    interrupt_manager: Arc<InterruptManager>,
    delegation_coordinator: Arc<DelegationCoordinator>,
    graph_cache: Arc<GraphCache>,
    graph_config: GraphConfig,
    usage_recorder: Arc<UsageRecorder>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    cancellations: Arc<RwLock<HashMap<String, CancellationToken>>>,
    /// Live executions' budgets, keyed by execution id. Lets a delegated
    /// child reach its parent's [`ExecutionBudget`] to feed the progress
    /// relay's adaptive extension (§4.7 point 5), the same lookup-by-id
    /// shape `cancellations` uses for cancel propagation.
    budgets: Arc<RwLock<HashMap<String, Arc<ExecutionBudget>>>>,
    default_fallback_model: Option<String>,
}

impl Orchestrator {
    pub fn new(
        cfg: EngineConfig,
        agents: Arc<AgentDirectory>,
        tool_runtime: Arc<ToolRuntime>,
        event_bus: Arc<EventBus>,
        model_factory: Arc<ModelFactory>,
        usage_recorder: Arc<UsageRecorder>,
        checkpoint_store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let alias_map = HashMap::new();
        let max_depth = cfg.max_delegation_depth;
        let interrupt_manager = Arc::new(InterruptManager::new(cfg.interrupt_ttl()));
        let registry = Arc::new(ExecutionRegistry::new(cfg.registry_capacity));
        Self {
            agents,
            registry,
            event_bus,
            model_factory,
            tool_runtime,
            interrupt_manager,
            delegation_coordinator: Arc::new(DelegationCoordinator::new(alias_map, max_depth)),
            graph_cache: Arc::new(GraphCache::new()),
            graph_config: GraphConfig::default(),
            usage_recorder,
            checkpoint_store,
            cancellations: Arc::new(RwLock::new(HashMap::new())),
            budgets: Arc::new(RwLock::new(HashMap::new())),
            default_fallback_model: None,
            cfg,
        }
    }

    pub fn with_default_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.default_fallback_model = Some(model.into());
        self
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    /// Run every pending interrupt expiry check once. Callers typically loop
    /// this on an interval (e.g. via a background task spawned alongside the
    /// orchestrator); the engine itself never spawns tasks implicitly.
    pub async fn sweep_expired_interrupts(&self) -> usize {
        self.interrupt_manager.expire_older_than(chrono::Utc::now()).await
    }

    pub async fn execute(&self, request: ExecuteRequest) -> ExecutionResult {
        let execution_id = uuid::Uuid::new_v4().to_string();
        self.execute_with_id(execution_id, request, 0, None, None).await
    }

    /// `parent_cancellation` is `Some` only for delegated child executions, so
    /// that a parent `cancel()` propagates to every in-flight child (§5
    /// "parent execution cancel propagates to children") via
    /// `CancellationToken::child_token`. `parent_execution_id` is recorded on
    /// the child's [`Execution`] for the same reason the registry exists:
    /// so a caller can tell which live executions belong to one root call.
    async fn execute_with_id(
        &self,
        execution_id: String,
        request: ExecuteRequest,
        delegation_depth: usize,
        parent_cancellation: Option<CancellationToken>,
        parent_execution_id: Option<String>,
    ) -> ExecutionResult {
        let supervisor_id = self.agents.supervisor_id().to_string();
        let mode = if request.force_supervised || request.agent_id == supervisor_id {
            ExecutionMode::Supervised
        } else {
            ExecutionMode::Direct
        };
        let resolved_agent_id = if mode == ExecutionMode::Supervised {
            supervisor_id
        } else {
            request.agent_id.clone()
        };

        let agent_config = match self.agents.get(&resolved_agent_id).await {
            Ok(cfg) => cfg,
            Err(e) => return failure_result(execution_id, e, false),
        };

        let mut execution = Execution::new(execution_id.clone(), resolved_agent_id.clone(), request.user_id.clone(), mode);
        execution.messages = build_history(mode, &request, &agent_config);
        execution.parent_execution_id = parent_execution_id;

        self.registry.create(execution.clone()).await;
        self.event_bus.emit(Event::ExecutionStarted {
            execution_id: execution.id.clone(),
            agent_id: execution.agent_id.clone(),
            ts: chrono::Utc::now(),
        });

        let budget = Arc::new(self.build_budget(&agent_config, &request.options));
        let cancellation = match parent_cancellation {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        self.cancellations.write().await.insert(execution_id.clone(), cancellation.clone());
        self.budgets.write().await.insert(execution_id.clone(), budget.clone());

        let mut effective_model = agent_config.model.clone();
        let result = self.drive(&mut execution, &agent_config, &budget, delegation_depth, &cancellation).await;

        match result {
            Ok(()) => {
                self.cancellations.write().await.remove(&execution_id);
                self.budgets.write().await.remove(&execution_id);
                self.checkpoint_store
                    .save(
                        &execution_id,
                        StateBlob::from_execution(&execution, NODE_POINTER_TERMINAL, budget.agent_steps().await),
                    )
                    .await;
                let usage = self.record_usage(&execution, &effective_model);
                let _ = self.registry.update(&execution_id, |stored| *stored = execution.clone()).await;

                let final_content = execution
                    .metadata
                    .get("final_content")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                self.event_bus.emit(Event::ExecutionCompleted {
                    execution_id: execution_id.clone(),
                    final_content: final_content.clone().unwrap_or_default(),
                    ts: chrono::Utc::now(),
                });
                ExecutionResult {
                    execution_id,
                    status: execution.status,
                    final_content,
                    usage,
                    error: None,
                }
            }
            Err(e) => {
                if let EngineError::ProviderUnavailable(_) = &e {
                    if let Some(fallback_model) = &self.default_fallback_model {
                        effective_model = fallback_model.clone();
                    }
                }
                let (e, _fell_back) = self.maybe_fallback(&e, &agent_config, &mut execution, &budget, delegation_depth, &cancellation).await;
                self.cancellations.write().await.remove(&execution_id);
                self.budgets.write().await.remove(&execution_id);
                self.checkpoint_store
                    .save(
                        &execution_id,
                        StateBlob::from_execution(&execution, NODE_POINTER_TERMINAL, budget.agent_steps().await),
                    )
                    .await;
                let usage = self.record_usage(&execution, &effective_model);
                let _ = self.registry.update(&execution_id, |stored| *stored = execution.clone()).await;

                match e {
                    None => {
                        let final_content = execution
                            .metadata
                            .get("final_content")
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string());
                        ExecutionResult {
                            execution_id,
                            status: execution.status,
                            final_content,
                            usage,
                            error: None,
                        }
                    }
                    Some(e) => {
                        let kind = error_kind(&e);
                        let message = e.to_string();
                        self.event_bus.emit(Event::ExecutionFailed {
                            execution_id: execution_id.clone(),
                            kind: kind.clone(),
                            message: message.clone(),
                            ts: chrono::Utc::now(),
                        });
                        ExecutionResult {
                            execution_id,
                            status: execution.status,
                            final_content: None,
                            usage,
                            error: Some(ExecutionFailure {
                                kind,
                                message,
                                partial: !execution.messages.is_empty(),
                            }),
                        }
                    }
                }
            }
        }
    }

    /// One-shot fallback to a configured default model when the graph failed
    /// because the primary provider was unavailable, per §4.9: "the
    /// Orchestrator MAY implement a one-shot fallback to a default model if
    /// ProviderUnavailable is raised during model acquisition."
    async fn maybe_fallback(
        &self,
        error: &EngineError,
        agent_config: &AgentConfig,
        execution: &mut Execution,
        budget: &ExecutionBudget,
        delegation_depth: usize,
        cancellation: &CancellationToken,
    ) -> (Option<EngineError>, bool) {
        let EngineError::ProviderUnavailable(_) = error else {
            return (Some(error.clone()), false);
        };
        let Some(fallback_model) = &self.default_fallback_model else {
            return (Some(error.clone()), false);
        };
        if fallback_model == &agent_config.model {
            return (Some(error.clone()), false);
        }

        let mut fallback_config = agent_config.clone();
        fallback_config.model = fallback_model.clone();
        execution.status = ExecutionStatus::Running;
        let result = self.drive(execution, &fallback_config, budget, delegation_depth, cancellation).await;
        match result {
            Ok(()) => (None, true),
            Err(e) => (Some(e), true),
        }
    }

    async fn drive(
        &self,
        execution: &mut Execution,
        agent_config: &AgentConfig,
        budget: &ExecutionBudget,
        delegation_depth: usize,
        cancellation: &CancellationToken,
    ) -> Result<(), EngineError> {
        let graph: Arc<CompiledGraph> = self.graph_cache.get_or_compile(agent_config, &self.tool_runtime).await;
        let executor = GraphExecutor {
            model_factory: self.model_factory.clone(),
            tool_runtime: self.tool_runtime.clone(),
            interrupt_manager: self.interrupt_manager.clone(),
            delegation_coordinator: self.delegation_coordinator.clone(),
            event_bus: self.event_bus.clone(),
            child_executor: Some(Arc::new(self.clone()) as Arc<dyn ChildExecutor>),
            checkpoint_store: self.checkpoint_store.clone(),
            config: self.graph_config.clone(),
        };
        executor.run(execution, agent_config, &graph, budget, delegation_depth, cancellation).await
    }

    fn build_budget(&self, agent_config: &AgentConfig, options: &ExecuteOptions) -> ExecutionBudget {
        let mut config = agent_config.clone();
        if options.timeout_ms.is_some() || options.max_tool_calls.is_some() || options.max_agent_steps.is_some() {
            let mut overrides = config.budget_override.clone().unwrap_or_default();
            if let Some(v) = options.timeout_ms {
                overrides.wall_clock_ms = Some(v);
            }
            if let Some(v) = options.max_tool_calls {
                overrides.max_tool_calls = Some(v);
            }
            if let Some(v) = options.max_agent_steps {
                overrides.max_agent_steps = Some(v);
            }
            config.budget_override = Some(overrides);
        }
        if let Some(model) = &options.model_override {
            config.model = model.clone();
        }
        ExecutionBudget::new(&config, self.cfg.clone())
    }

    fn record_usage(&self, execution: &Execution, model: &str) -> UsageSummary {
        let mut summary = UsageSummary {
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            cost_usd: 0.0,
        };
        for message in &execution.messages {
            if message.role != Role::AI {
                continue;
            }
            if let Some(record) = self.usage_recorder.record(
                &execution.id,
                &execution.user_id,
                &execution.agent_id,
                model,
                message,
            ) {
                summary.input_tokens += record.input_tokens;
                summary.output_tokens += record.output_tokens;
                summary.total_tokens += record.total_tokens;
                summary.cost_usd += record.cost_usd;
            }
        }
        summary
    }

    pub async fn cancel(&self, execution_id: &str) -> CancelOutcome {
        let Some(execution) = self.registry.get(execution_id).await else {
            return CancelOutcome::NotFound;
        };
        if execution.status.is_terminal() {
            return CancelOutcome::AlreadyTerminal;
        }
        if let Some(token) = self.cancellations.read().await.get(execution_id) {
            token.cancel();
            CancelOutcome::Ok
        } else {
            CancelOutcome::NotFound
        }
    }

    pub async fn get_snapshot(&self, execution_id: &str) -> Option<Execution> {
        self.registry.get(execution_id).await
    }

    pub fn subscribe(&self, execution_id: Option<String>) -> Subscription {
        match execution_id {
            Some(id) => self.event_bus.subscribe_execution(id),
            None => self.event_bus.subscribe(),
        }
    }

    pub async fn respond_to_interrupt(
        &self,
        execution_id: &str,
        response: crate::data::InterruptResponse,
    ) -> Result<(), EngineError> {
        self.interrupt_manager.respond(execution_id, response).await.map_err(EngineError::from)
    }

    /// Resume an execution suspended at [`NODE_POINTER_AWAITING_APPROVAL`]
    /// from its last checkpoint (§4.11, §6.5, testable property 9) -- the
    /// path a caller takes after a process restart finds a live execution
    /// still `AwaitingApproval` in the registry but with no in-process
    /// `oneshot` receiver to answer it.
    pub async fn resume(&self, execution_id: &str) -> ExecutionResult {
        let Some(blob) = self.checkpoint_store.load(execution_id).await else {
            return failure_result(
                execution_id.to_string(),
                EngineError::ConfigError(format!("no checkpoint for execution: {}", execution_id)),
                false,
            );
        };
        if blob.node_pointer != NODE_POINTER_AWAITING_APPROVAL {
            return failure_result(
                execution_id.to_string(),
                EngineError::ConfigError("checkpoint is not resumable (execution already reached a terminal node)".into()),
                false,
            );
        }
        let Some(mut execution) = self.registry.get(execution_id).await else {
            return failure_result(
                execution_id.to_string(),
                EngineError::ConfigError(format!("unknown execution: {}", execution_id)),
                false,
            );
        };
        execution.messages = blob.messages;
        execution.steps = blob.steps;

        let agent_config = match self.agents.get(&execution.agent_id).await {
            Ok(cfg) => cfg,
            Err(e) => return failure_result(execution_id.to_string(), e, false),
        };

        let budget = Arc::new(ExecutionBudget::resume(&agent_config, self.cfg.clone(), blob.agent_steps_count));
        let cancellation = CancellationToken::new();
        self.cancellations.write().await.insert(execution_id.to_string(), cancellation.clone());
        self.budgets.write().await.insert(execution_id.to_string(), budget.clone());

        let graph = self.graph_cache.get_or_compile(&agent_config, &self.tool_runtime).await;
        let executor = GraphExecutor {
            model_factory: self.model_factory.clone(),
            tool_runtime: self.tool_runtime.clone(),
            interrupt_manager: self.interrupt_manager.clone(),
            delegation_coordinator: self.delegation_coordinator.clone(),
            event_bus: self.event_bus.clone(),
            child_executor: Some(Arc::new(self.clone()) as Arc<dyn ChildExecutor>),
            checkpoint_store: self.checkpoint_store.clone(),
            config: self.graph_config.clone(),
        };

        let result = executor
            .resume_after_approval(&mut execution, &agent_config, &graph, &budget, 0, &cancellation)
            .await;

        self.cancellations.write().await.remove(execution_id);
        self.budgets.write().await.remove(execution_id);
        self.checkpoint_store
            .save(
                execution_id,
                StateBlob::from_execution(&execution, NODE_POINTER_TERMINAL, budget.agent_steps().await),
            )
            .await;
        let usage = self.record_usage(&execution, &agent_config.model);
        let _ = self.registry.update(execution_id, |stored| *stored = execution.clone()).await;

        match result {
            Ok(()) => {
                let final_content = execution
                    .metadata
                    .get("final_content")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                self.event_bus.emit(Event::ExecutionCompleted {
                    execution_id: execution_id.to_string(),
                    final_content: final_content.clone().unwrap_or_default(),
                    ts: chrono::Utc::now(),
                });
                ExecutionResult {
                    execution_id: execution_id.to_string(),
                    status: execution.status,
                    final_content,
                    usage,
                    error: None,
                }
            }
            Err(e) => {
                let kind = error_kind(&e);
                let message = e.to_string();
                self.event_bus.emit(Event::ExecutionFailed {
                    execution_id: execution_id.to_string(),
                    kind: kind.clone(),
                    message: message.clone(),
                    ts: chrono::Utc::now(),
                });
                ExecutionResult {
                    execution_id: execution_id.to_string(),
                    status: execution.status,
                    final_content: None,
                    usage,
                    error: Some(ExecutionFailure {
                        kind,
                        message,
                        partial: !execution.messages.is_empty(),
                    }),
                }
            }
        }
    }
}

#[async_trait]
impl ChildExecutor for Orchestrator {
    async fn execute_child(
        &self,
        parent_execution_id: &str,
        source_agent_id: &str,
        target_agent_id: &str,
        task_description: &str,
        depth: usize,
    ) -> DelegationOutcome {
        let canonical_target = self.delegation_coordinator.canonicalize(target_agent_id);
        let child_id = format!("{}-child-{}", parent_execution_id, uuid::Uuid::new_v4());

        let request = ExecuteRequest {
            input: task_description.to_string(),
            agent_id: canonical_target,
            user_id: source_agent_id.to_string(),
            prior_messages: Vec::new(),
            force_supervised: false,
            options: ExecuteOptions::default(),
        };

        let parent_token = self.cancellations.read().await.get(parent_execution_id).cloned();
        let result = self
            .execute_with_id(child_id, request, depth + 1, parent_token, Some(parent_execution_id.to_string()))
            .await;

        match result.error {
            Some(failure) if failure.kind == "timeout" => Err(DelegationError::ChildTimedOut),
            Some(failure) => Err(DelegationError::ChildFailed(failure.message)),
            None => {
                let content = result.final_content.unwrap_or_default();
                Ok(Arc::new(Message::ai(format!("delegation-result-{}", result.execution_id), content)))
            }
        }
    }

    async fn relay_delegation_progress(&self, parent_execution_id: &str, target_agent_id: &str, progress: u8) {
        if let Some(parent_budget) = self.budgets.read().await.get(parent_execution_id).cloned() {
            parent_budget.on_progress(progress).await;
        }
        self.event_bus.emit(Event::DelegationProgress {
            execution_id: parent_execution_id.to_string(),
            target_agent_id: target_agent_id.to_string(),
            progress,
            ts: chrono::Utc::now(),
        });
    }
}

/// §4.9 step 4: supervisors see a narrowed view of history so a new human
/// turn never re-triggers processing of an already-delegated task; specialists
/// see the full thread unchanged.
fn build_history(mode: ExecutionMode, request: &ExecuteRequest, agent_config: &AgentConfig) -> Vec<Message> {
    let human_message = Message::human(format!("human-{}", uuid::Uuid::new_v4()), request.input.clone());

    if mode == ExecutionMode::Direct {
        let mut history = request.prior_messages.clone();
        history.push(human_message);
        return history;
    }

    let mut history = Vec::new();
    if !agent_config.system_prompt.is_empty() {
        history.push(Message::system("system", agent_config.system_prompt.clone()));
    }
    let tool_messages: Vec<Message> = request
        .prior_messages
        .iter()
        .filter(|m| matches!(m.role, Role::Tool { .. }))
        .cloned()
        .collect();
    history.extend(windowed_tool_messages(&tool_messages, CONTEXT_FILTER_TOOL_MESSAGES));
    history.push(human_message);
    history
}

/// Select the last `limit` tool messages, but never split a delegation's
/// messages (those sharing one `delegation_group`) across the cut -- if the
/// naive cut point falls inside a group that already has an earlier member
/// included, the window grows backward to take the whole group (§9 OQ2).
fn windowed_tool_messages(messages: &[Message], limit: usize) -> Vec<Message> {
    if messages.len() <= limit {
        return messages.to_vec();
    }
    let mut start = messages.len() - limit;
    while start > 0 {
        let Some(group) = &messages[start].delegation_group else {
            break;
        };
        let group_split_by_cut = messages[..start]
            .iter()
            .any(|m| m.delegation_group.as_deref() == Some(group.as_str()));
        if !group_split_by_cut {
            break;
        }
        start -= 1;
    }
    messages[start..].to_vec()
}

fn error_kind(e: &EngineError) -> String {
    match e {
        EngineError::ConfigError(_) => "config_error",
        EngineError::ValidationError(_) => "validation_error",
        EngineError::Timeout(_) => "timeout",
        EngineError::ToolError(_) => "tool_error",
        EngineError::ModelError(_) => "model_error",
        EngineError::ApprovalTimeout => "approval_timeout",
        EngineError::DelegationDepthExceeded { .. } => "delegation_depth_exceeded",
        EngineError::BudgetExceeded(_) => "budget_exceeded",
        EngineError::Cancelled => "cancelled",
        EngineError::ProviderUnavailable(_) => "provider_unavailable",
    }
    .to_string()
}

fn failure_result(execution_id: String, e: EngineError, partial: bool) -> ExecutionResult {
    ExecutionResult {
        execution_id,
        status: ExecutionStatus::Failed,
        final_content: None,
        usage: UsageSummary {
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            cost_usd: 0.0,
        },
        error: Some(ExecutionFailure {
            kind: error_kind(&e),
            message: e.to_string(),
            partial,
        }),
    }
}
