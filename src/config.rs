//! Layered engine configuration.
//!
//! Generalizes `cloudllm::CloudLLMConfig` (a single hand-built struct, no
//! file-format parser) into the full set of §6.4 knobs. Resolution order is
//! explicit builder overrides, then environment variables, then the hard
//! defaults below — `EngineConfig::from_env` is the one place in the engine
//! that reads `std::env` directly.

use std::time::Duration;

/// The resolved set of env-configurable knobs consumed by C3, C6, C7, and C2.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub progress_min_delta: u8,
    pub no_progress_no_extend_ms: u64,
    pub extend_on_progress_ms: u64,
    pub max_total_extension_ms: u64,

    pub delegation_poll_ms: u64,
    pub delegation_timeout_ms: u64,
    pub max_delegation_depth: usize,

    pub interrupt_ttl_ms: u64,

    pub registry_capacity: usize,
    pub registry_terminal_grace_ms: u64,

    pub tool_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            progress_min_delta: 5,
            no_progress_no_extend_ms: 60_000,
            extend_on_progress_ms: 60_000,
            max_total_extension_ms: 180_000,

            delegation_poll_ms: 750,
            delegation_timeout_ms: 180_000,
            max_delegation_depth: 3,

            interrupt_ttl_ms: 300_000,

            registry_capacity: 10_000,
            registry_terminal_grace_ms: 60_000,

            tool_timeout_ms: 60_000,
        }
    }
}

impl EngineConfig {
    /// Overlay recognized environment variables (§6.4) on top of the hard
    /// defaults. Unset or unparsable variables fall back silently to the
    /// current value, matching the "just a struct" philosophy of the config
    /// this was generalized from.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.overlay_env();
        cfg
    }

    fn overlay_env(&mut self) {
        if let Some(v) = env_u8("PROGRESS_MIN_DELTA") {
            self.progress_min_delta = v;
        }
        if let Some(v) = env_u64("NO_PROGRESS_NO_EXTEND_MS") {
            self.no_progress_no_extend_ms = v;
        }
        if let Some(v) = env_u64("EXTEND_ON_PROGRESS_MS") {
            self.extend_on_progress_ms = v;
        }
        if let Some(v) = env_u64("MAX_TOTAL_EXTENSION_MS") {
            self.max_total_extension_ms = v;
        }
        if let Some(v) = env_u64("DELEGATION_POLL_MS") {
            self.delegation_poll_ms = v;
        }
        if let Some(v) = env_u64("DELEGATION_TIMEOUT_MS") {
            self.delegation_timeout_ms = v;
        }
        if let Some(v) = env_usize("MAX_DELEGATION_DEPTH") {
            self.max_delegation_depth = v;
        }
        if let Some(v) = env_u64("INTERRUPT_TTL_MS") {
            self.interrupt_ttl_ms = v;
        }
        if let Some(v) = env_usize("REGISTRY_CAPACITY") {
            self.registry_capacity = v;
        }
        if let Some(v) = env_u64("REGISTRY_TERMINAL_GRACE_MS") {
            self.registry_terminal_grace_ms = v;
        }
        if let Some(v) = env_u64("TOOL_TIMEOUT_MS") {
            self.tool_timeout_ms = v;
        }
    }

    pub fn interrupt_ttl(&self) -> Duration {
        Duration::from_millis(self.interrupt_ttl_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn registry_terminal_grace(&self) -> Duration {
        Duration::from_millis(self.registry_terminal_grace_ms)
    }
}

/// Install a `tracing_subscriber` formatter honoring `RUST_LOG`
/// (`EnvFilter` syntax, default `info`), per §2a/§6.4 ADDED. Call once at
/// process init; safe to call multiple times in tests (errors are ignored).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_u8(key: &str) -> Option<u8> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}
