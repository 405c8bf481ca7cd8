//! C2 — Execution Registry: process-wide map of live executions with LRU
//! eviction over terminal entries.
//!
//! Grounded on the `Arc<RwLock<_>>`-guarded shared state pattern used
//! throughout `agent.rs` for concurrently-read, occasionally-mutated state,
//! generalized here into an explicit capacity-bounded map since the spec
//! requires bounded memory for long-running processes (§4.2, default 10,000
//! live entries).

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::data::Execution;

#[derive(Debug, Clone)]
pub enum RegistryError {
    NotFound(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound(id) => write!(f, "execution not found: {}", id),
        }
    }
}

impl Error for RegistryError {}

struct Entry {
    execution: Execution,
    /// Monotonically increasing insertion/touch counter, used to find the
    /// oldest terminal entry without storing timestamps redundantly.
    sequence: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    next_sequence: u64,
    capacity: usize,
}

/// Concurrent-safe map of [`Execution`]s. External readers only ever see a
/// cloned snapshot (§3 "copy-on-read"); only the owning graph executor calls
/// [`ExecutionRegistry::update`].
pub struct ExecutionRegistry {
    inner: RwLock<Inner>,
}

impl ExecutionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                next_sequence: 0,
                capacity,
            }),
        }
    }

    /// Insert a new execution, evicting the oldest terminal entry first if
    /// the registry is at capacity. `CapacityExhausted` is impossible by
    /// design per §4.2: eviction always runs before insert.
    pub async fn create(&self, execution: Execution) -> String {
        let id = execution.id.clone();
        let mut inner = self.inner.write().await;
        if inner.entries.len() >= inner.capacity {
            evict_oldest_terminal(&mut inner);
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.insert(id.clone(), Entry { execution, sequence });
        id
    }

    pub async fn get(&self, id: &str) -> Option<Execution> {
        let inner = self.inner.read().await;
        inner.entries.get(id).map(|e| e.execution.clone())
    }

    /// Apply a mutation to the stored execution. Only the owning executor
    /// should call this.
    pub async fn update<F>(&self, id: &str, mutation: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut Execution),
    {
        let mut inner = self.inner.write().await;
        match inner.entries.get_mut(id) {
            Some(entry) => {
                mutation(&mut entry.execution);
                Ok(())
            }
            None => Err(RegistryError::NotFound(id.to_string())),
        }
    }

    pub async fn list_active(&self) -> Vec<Execution> {
        let inner = self.inner.read().await;
        inner
            .entries
            .values()
            .filter(|e| !e.execution.status.is_terminal())
            .map(|e| e.execution.clone())
            .collect()
    }

    /// Evict terminal executions whose `ended_at` is older than `grace`.
    pub async fn evict_terminal_older_than(&self, grace: Duration) -> usize {
        let mut inner = self.inner.write().await;
        let now = chrono::Utc::now();
        let grace = chrono::Duration::from_std(grace).unwrap_or_default();
        let stale: Vec<String> = inner
            .entries
            .iter()
            .filter_map(|(id, entry)| {
                let ended_at = entry.execution.ended_at?;
                if entry.execution.status.is_terminal() && now - ended_at >= grace {
                    Some(id.clone())
                } else {
                    None
                }
            })
            .collect();
        let count = stale.len();
        for id in stale {
            inner.entries.remove(&id);
        }
        count
    }
}

fn evict_oldest_terminal(inner: &mut Inner) {
    let oldest = inner
        .entries
        .iter()
        .filter(|(_, e)| e.execution.status.is_terminal())
        .min_by_key(|(_, e)| e.sequence)
        .map(|(id, _)| id.clone());
    if let Some(id) = oldest {
        inner.entries.remove(&id);
    }
}

/// Process-wide handle to the registry. `Arc` rather than a bare struct
/// because C9 (Orchestrator), C7 (Delegation Coordinator), and the public API
/// surface all need shared read/write access from independent tasks.
pub type SharedRegistry = Arc<ExecutionRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ExecutionMode;

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let registry = ExecutionRegistry::new(10);
        let execution = Execution::new("exec-1", "specialist", "user-1", ExecutionMode::Direct);
        registry.create(execution).await;

        let fetched = registry.get("exec-1").await.unwrap();
        assert_eq!(fetched.agent_id, "specialist");
    }

    #[tokio::test]
    async fn evicts_oldest_terminal_at_capacity() {
        let registry = ExecutionRegistry::new(1);
        let mut first = Execution::new("exec-1", "specialist", "user-1", ExecutionMode::Direct);
        first.transition(crate::data::ExecutionStatus::Completed);
        registry.create(first).await;

        let second = Execution::new("exec-2", "specialist", "user-1", ExecutionMode::Direct);
        registry.create(second).await;

        assert!(registry.get("exec-1").await.is_none());
        assert!(registry.get("exec-2").await.is_some());
    }

    #[tokio::test]
    async fn update_mutates_in_place() {
        let registry = ExecutionRegistry::new(10);
        let execution = Execution::new("exec-1", "specialist", "user-1", ExecutionMode::Direct);
        registry.create(execution).await;

        registry
            .update("exec-1", |e| e.transition(crate::data::ExecutionStatus::Completed))
            .await
            .unwrap();

        let fetched = registry.get("exec-1").await.unwrap();
        assert_eq!(fetched.status, crate::data::ExecutionStatus::Completed);
    }
}
