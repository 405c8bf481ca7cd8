//! Delegation handoff key, used by the Delegation Coordinator (C7) for
//! single-flight dedup (testable property 4).

use sha2::{Digest, Sha256};

/// Canonicalized identity of one handoff attempt. Two calls with equal keys
/// are the same logical delegation and MUST share one child execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DelegationKey {
    pub parent_execution_id: String,
    pub source_agent_id: String,
    pub target_agent_canonical_id: String,
    pub task_hash: String,
}

impl DelegationKey {
    /// Build a key from raw call data, canonicalizing the target agent ID via
    /// `alias_map` (e.g. `"ami"` -> `"ami-creative"`) and hashing the task
    /// description so textually-identical handoffs dedupe exactly.
    pub fn new(
        parent_execution_id: impl Into<String>,
        source_agent_id: impl Into<String>,
        target_agent_id: &str,
        task_description: &str,
        alias_map: &std::collections::HashMap<String, String>,
    ) -> Self {
        let canonical = alias_map
            .get(target_agent_id)
            .cloned()
            .unwrap_or_else(|| target_agent_id.to_string());
        let mut hasher = Sha256::new();
        hasher.update(task_description.as_bytes());
        let task_hash = format!("{:x}", hasher.finalize());
        Self {
            parent_execution_id: parent_execution_id.into(),
            source_agent_id: source_agent_id.into(),
            target_agent_canonical_id: canonical,
            task_hash,
        }
    }
}
