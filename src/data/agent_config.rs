//! Agent configuration, consumed (never mutated) by the engine.
//!
//! Config storage is explicitly out of scope (§1); the engine only consumes an
//! in-memory `AgentConfig` assembled by a collaborator. Builder methods follow
//! `agent.rs`'s `with_max_tokens`/`with_system_prompt` pattern.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRole {
    Supervisor,
    Specialist,
    SubAgent,
}

/// Per-agent override of the role-default budgets in §4.3. `None` fields fall
/// back to the role default resolved by `crate::budget`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub wall_clock_ms: Option<u64>,
    pub max_tool_calls: Option<u32>,
    pub max_agent_steps: Option<u32>,
}

/// Model parameters bundled as the options hash key consumed by the Model
/// Factory (§4.4) — `hash(options)` is computed from this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// Immutable per-execution agent definition.
///
/// Invariant: a supervisor's `tool_names` includes a `delegate_to_{sub_agent_id}`
/// entry for every ID in `sub_agent_ids` (enforced by
/// [`AgentConfig::delegation_tool_names`] rather than at construction, since the
/// delegation tools are registered by the engine automatically per §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub role: AgentRole,
    pub model: String,
    pub system_prompt: String,
    pub tool_names: Vec<String>,
    pub sub_agent_ids: BTreeSet<String>,
    pub parent_agent_id: Option<String>,
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub budget_override: Option<BudgetLimits>,
    #[serde(default)]
    pub model_options: ModelOptions,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, role: AgentRole, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            model: model.into(),
            system_prompt: String::new(),
            tool_names: Vec::new(),
            sub_agent_ids: BTreeSet::new(),
            parent_agent_id: None,
            tags: BTreeSet::new(),
            budget_override: None,
            model_options: ModelOptions::default(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tool_names(mut self, names: Vec<String>) -> Self {
        self.tool_names = names;
        self
    }

    pub fn with_sub_agents(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.sub_agent_ids = ids.into_iter().collect();
        self
    }

    pub fn with_budget_override(mut self, limits: BudgetLimits) -> Self {
        self.budget_override = Some(limits);
        self
    }

    pub fn with_model_options(mut self, options: ModelOptions) -> Self {
        self.model_options = options;
        self
    }

    /// The `delegate_to_*` tool name for each registered sub-agent, per §6.3.
    pub fn delegation_tool_names(&self) -> Vec<String> {
        self.sub_agent_ids
            .iter()
            .map(|id| format!("delegate_to_{}", id))
            .collect()
    }

    /// Hash of the fields that affect graph shape (`role`, `tool_names`,
    /// `sub_agent_ids`), used as the cache key for the compiled graph (§4.8 ADDED).
    pub fn config_revision(&self) -> u64 {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.role).as_bytes());
        for name in &self.tool_names {
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
        }
        for id in &self.sub_agent_ids {
            hasher.update(id.as_bytes());
            hasher.update(b"\0");
        }
        let digest = hasher.finalize();
        u64::from_be_bytes(digest[0..8].try_into().unwrap())
    }
}
