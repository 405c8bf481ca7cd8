//! Shared harness for the engine's integration tests: wires a fully in-memory
//! `Orchestrator` (mock LLM clients, in-memory checkpoint store, no network)
//! so each scenario test only has to describe agents, scripts, and tools.

use std::sync::Arc;

use agentflow_engine::checkpoint::InMemoryCheckpointStore;
use agentflow_engine::clients::mock::{ScriptedResponse, SequentialMockClient};
use agentflow_engine::clients::ClientWrapper;
use agentflow_engine::data::{AgentConfig, ModelOptions};
use agentflow_engine::event_bus::EventBus;
use agentflow_engine::model_factory::ModelFactory;
use agentflow_engine::orchestrator::{AgentDirectory, Orchestrator};
use agentflow_engine::tool_runtime::ToolRuntime;
use agentflow_engine::usage::{NullPricingTable, UsageRecorder};
use agentflow_engine::EngineConfig;

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub agents: Arc<AgentDirectory>,
    pub event_bus: Arc<EventBus>,
}

/// One model's scripted behavior: a model id and the client that should answer
/// for it. Plain [`ScriptedResponse`] scripts cover most scenarios; a few
/// (timeouts, cancellation) need a hand-rolled [`ClientWrapper`], hence `Arc<dyn
/// ClientWrapper>` rather than `Vec<ScriptedResponse>` directly.
pub struct ModelScript {
    pub model_id: &'static str,
    pub client: Arc<dyn ClientWrapper>,
}

impl ModelScript {
    pub fn sequential(model_id: &'static str, responses: Vec<ScriptedResponse>) -> Self {
        Self {
            model_id,
            client: Arc::new(SequentialMockClient::new(model_id, responses)),
        }
    }

    pub fn custom(model_id: &'static str, client: Arc<dyn ClientWrapper>) -> Self {
        Self { model_id, client }
    }
}

pub struct HarnessBuilder {
    cfg: EngineConfig,
    supervisor_id: String,
    agent_configs: Vec<AgentConfig>,
    model_scripts: Vec<ModelScript>,
    tool_setup: Box<dyn FnOnce(&mut ToolRuntime)>,
    fallback_model: Option<String>,
}

impl HarnessBuilder {
    pub fn new(supervisor_id: impl Into<String>) -> Self {
        Self {
            cfg: EngineConfig::default(),
            supervisor_id: supervisor_id.into(),
            agent_configs: Vec::new(),
            model_scripts: Vec::new(),
            tool_setup: Box::new(|_| {}),
            fallback_model: None,
        }
    }

    pub fn with_cfg(mut self, cfg: EngineConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_agent(mut self, config: AgentConfig) -> Self {
        self.agent_configs.push(config);
        self
    }

    pub fn with_model(mut self, script: ModelScript) -> Self {
        self.model_scripts.push(script);
        self
    }

    pub fn with_tools(mut self, setup: impl FnOnce(&mut ToolRuntime) + 'static) -> Self {
        self.tool_setup = Box::new(setup);
        self
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    pub async fn build(self) -> Harness {
        let directory = Arc::new(AgentDirectory::new(self.supervisor_id));
        for agent in self.agent_configs {
            directory.register(agent).await;
        }

        let mut tool_runtime = ToolRuntime::new(self.cfg.tool_timeout());
        (self.tool_setup)(&mut tool_runtime);
        let tool_runtime = Arc::new(tool_runtime);

        let event_bus = Arc::new(EventBus::new());
        let model_factory = Arc::new(ModelFactory::new());
        for script in self.model_scripts {
            model_factory
                .insert(script.model_id, &ModelOptions::default(), script.client)
                .await;
        }
        let usage_recorder = Arc::new(UsageRecorder::new(Arc::new(NullPricingTable), event_bus.clone()));
        let checkpoint_store = Arc::new(InMemoryCheckpointStore::new());

        let mut orchestrator = Orchestrator::new(
            self.cfg,
            directory.clone(),
            tool_runtime,
            event_bus.clone(),
            model_factory,
            usage_recorder,
            checkpoint_store,
        );
        if let Some(model) = self.fallback_model {
            orchestrator = orchestrator.with_default_fallback_model(model);
        }

        Harness {
            orchestrator,
            agents: directory,
            event_bus,
        }
    }
}
