//! C7 — Delegation Coordinator: canonicalization, single-flight dedup,
//! cross-context promise resolution, depth bound, progress relay.
//!
//! Grounded on `council.rs`/`council_session.rs`'s multi-agent handoff
//! patterns and `orchestration.rs`'s `OrchestrationMode::Hierarchical`
//! (lead-delegates-to-specialist shape), generalized into an explicit
//! coordinator the graph executor calls through rather than an inline
//! council loop. Single-flight dedup uses `futures_util::future::Shared`
//! (already a teacher dependency via `futures-util`), which gives cross-context
//! resolution "for free": every caller holding the same [`DelegationKey`]
//! awaits clones of the same future, stored in one process-wide map (§4.7
//! point 5), rather than the result being local to whichever task happened
//! to issue the original call.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::data::{DelegationKey, Message};

#[derive(Debug, Clone)]
pub enum DelegationError {
    DepthExceeded { depth: usize, max_depth: usize },
    ChildFailed(String),
    ChildTimedOut,
}

impl fmt::Display for DelegationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegationError::DepthExceeded { depth, max_depth } => {
                write!(f, "delegation depth {} exceeds maximum {}", depth, max_depth)
            }
            DelegationError::ChildFailed(msg) => write!(f, "delegated execution failed: {}", msg),
            DelegationError::ChildTimedOut => write!(f, "delegated execution timed out"),
        }
    }
}

impl Error for DelegationError {}

/// The outcome of a completed delegation, ready to be wrapped as a Tool
/// message on the parent (§4.7 "Termination").
pub type DelegationOutcome = Result<Arc<Message>, DelegationError>;
type SharedDelegation = Shared<BoxFuture<'static, DelegationOutcome>>;

/// One inbound delegation request, handed to the spawn function the caller
/// supplies (the graph executor, which alone knows how to drive a child
/// execution through the Orchestrator -- avoiding a circular dependency
/// between this module and `orchestrator.rs`).
pub struct DelegationRequest {
    pub parent_execution_id: String,
    pub source_agent_id: String,
    pub target_agent_id: String,
    pub task_description: String,
    pub depth: usize,
}

/// Coordinates agent-to-agent handoffs. Holds no reference to the Orchestrator;
/// callers provide a spawn closure per call.
pub struct DelegationCoordinator {
    alias_map: HashMap<String, String>,
    max_depth: usize,
    in_flight: Mutex<HashMap<DelegationKey, SharedDelegation>>,
}

impl DelegationCoordinator {
    pub fn new(alias_map: HashMap<String, String>, max_depth: usize) -> Self {
        Self {
            alias_map,
            max_depth,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn canonicalize(&self, target_agent_id: &str) -> String {
        self.alias_map
            .get(target_agent_id)
            .cloned()
            .unwrap_or_else(|| target_agent_id.to_string())
    }

    /// Delegates `request`, deduping against any identical in-flight delegation.
    /// `spawn` is invoked at most once per distinct [`DelegationKey`]; every
    /// caller -- the original and any that arrive while it's running -- gets
    /// a clone of the same outcome.
    pub async fn delegate<F>(&self, request: DelegationRequest, spawn: F) -> DelegationOutcome
    where
        F: FnOnce() -> BoxFuture<'static, DelegationOutcome> + Send + 'static,
    {
        if request.depth >= self.max_depth {
            return Err(DelegationError::DepthExceeded {
                depth: request.depth,
                max_depth: self.max_depth,
            });
        }

        let key = DelegationKey::new(
            request.parent_execution_id,
            request.source_agent_id,
            &request.target_agent_id,
            &request.task_description,
            &self.alias_map,
        );

        let shared = {
            let mut guard = self.in_flight.lock().await;
            if let Some(existing) = guard.get(&key) {
                existing.clone()
            } else {
                let fut: SharedDelegation = spawn().shared();
                guard.insert(key.clone(), fut.clone());
                fut
            }
        };

        let outcome = shared.await;

        // Single-flight entries are scoped to "currently running"; once
        // resolved, drop it so a later textually-identical delegation (e.g.
        // a retry after the child already completed) spawns fresh rather than
        // replaying a stale result forever.
        self.in_flight.lock().await.remove(&key);

        outcome
    }
}
