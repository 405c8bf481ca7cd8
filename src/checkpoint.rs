//! C11 — Checkpoint Store.
//!
//! Grounded on the hash-chained, serde-based persistence idiom of
//! `thought_chain.rs` (append-only records carrying a schema version),
//! generalized to a plain keyed store since durable on-disk chaining is out
//! of scope (persistence is an explicit non-goal; only the *shape* of a
//! versioned opaque blob survives). Default implementation is in-memory, per
//! §4.11 — "used only to resume from an interrupt that crossed a process
//! boundary; in-memory executions do not require it."

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::data::{Execution, ExecutionStep, Message};

pub const SCHEMA_VERSION: u32 = 1;

/// Opaque, versioned snapshot of an execution's resumable state (§6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateBlob {
    pub schema_version: u32,
    pub messages: Vec<Message>,
    pub steps: Vec<ExecutionStep>,
    pub node_pointer: String,
    pub agent_steps_count: u32,
}

impl StateBlob {
    pub fn from_execution(execution: &Execution, node_pointer: impl Into<String>, agent_steps_count: u32) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            messages: execution.messages.clone(),
            steps: execution.steps.clone(),
            node_pointer: node_pointer.into(),
            agent_steps_count,
        }
    }
}

/// `save`/`load` contract for resuming an execution across a process boundary.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, execution_id: &str, blob: StateBlob);
    async fn load(&self, execution_id: &str) -> Option<StateBlob>;
    async fn clear(&self, execution_id: &str);
}

/// In-memory default. Production deployments swap in a durable store behind
/// the same trait; nothing else in the engine depends on the concrete type.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    blobs: RwLock<HashMap<String, StateBlob>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, execution_id: &str, blob: StateBlob) {
        self.blobs.write().await.insert(execution_id.to_string(), blob);
    }

    async fn load(&self, execution_id: &str) -> Option<StateBlob> {
        self.blobs.read().await.get(execution_id).cloned()
    }

    async fn clear(&self, execution_id: &str) {
        self.blobs.write().await.remove(execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ExecutionMode;

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = InMemoryCheckpointStore::new();
        let execution = Execution::new("exec-1", "specialist", "user-1", ExecutionMode::Direct);
        let blob = StateBlob::from_execution(&execution, "agent", 2);

        store.save("exec-1", blob).await;
        let loaded = store.load("exec-1").await.unwrap();
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert_eq!(loaded.node_pointer, "agent");
        assert_eq!(loaded.agent_steps_count, 2);
    }

    #[tokio::test]
    async fn load_missing_execution_returns_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load("does-not-exist").await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_the_checkpoint() {
        let store = InMemoryCheckpointStore::new();
        let execution = Execution::new("exec-1", "specialist", "user-1", ExecutionMode::Direct);
        store.save("exec-1", StateBlob::from_execution(&execution, "agent", 0)).await;
        store.clear("exec-1").await;
        assert!(store.load("exec-1").await.is_none());
    }
}
