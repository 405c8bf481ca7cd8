//! C3 — Budget/Timeout Manager: per-execution wall-clock, tool-call, and
//! agent-step budgets with adaptive deadline extension.
//!
//! No teacher module executes budgets directly today; the per-execution
//! deadline idiom follows `tokio::time` usage visible in the clients'
//! connection-timeout configuration, generalized into an explicit manager
//! since the spec's adaptive-extension policy (§4.3) has no teacher analogue.

use std::error::Error;
use std::fmt;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::data::{AgentConfig, AgentRole, BudgetLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetError {
    WallClockExceeded,
    ToolCallsExceeded,
    AgentStepsExceeded,
}

impl fmt::Display for BudgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetError::WallClockExceeded => write!(f, "wall-clock budget exceeded"),
            BudgetError::ToolCallsExceeded => write!(f, "max_tool_calls exceeded"),
            BudgetError::AgentStepsExceeded => write!(f, "max_agent_steps exceeded"),
        }
    }
}

impl Error for BudgetError {}

/// Resolved `{wall_clock_ms, max_tool_calls, max_agent_steps}` for one
/// execution, per §4.3's role defaults: supervisor 600_000ms/40/20,
/// specialist 300_000ms/30/15, with a 60_000ms hard cap per tool regardless
/// of role.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedBudget {
    pub wall_clock_ms: u64,
    pub max_tool_calls: u32,
    pub max_agent_steps: u32,
    pub per_tool_ms: u64,
}

impl ResolvedBudget {
    pub fn for_role(role: AgentRole, override_: Option<&BudgetLimits>) -> Self {
        let (wall_clock_ms, max_tool_calls, max_agent_steps) = match role {
            AgentRole::Supervisor => (600_000, 40, 20),
            AgentRole::Specialist | AgentRole::SubAgent => (300_000, 30, 15),
        };
        let mut resolved = Self {
            wall_clock_ms,
            max_tool_calls,
            max_agent_steps,
            per_tool_ms: 60_000,
        };
        if let Some(o) = override_ {
            if let Some(v) = o.wall_clock_ms {
                resolved.wall_clock_ms = v;
            }
            if let Some(v) = o.max_tool_calls {
                resolved.max_tool_calls = v;
            }
            if let Some(v) = o.max_agent_steps {
                resolved.max_agent_steps = v;
            }
        }
        resolved
    }
}

struct Inner {
    deadline: Instant,
    tool_calls: u32,
    agent_steps: u32,
    total_extension_ms: u64,
    last_progress: u8,
    last_progress_at: Instant,
}

/// Tracks budget consumption for a single execution. One instance per
/// execution, owned by that execution's graph executor.
pub struct ExecutionBudget {
    limits: ResolvedBudget,
    cfg: EngineConfig,
    inner: Mutex<Inner>,
}

impl ExecutionBudget {
    pub fn new(agent_config: &AgentConfig, cfg: EngineConfig) -> Self {
        let limits = ResolvedBudget::for_role(agent_config.role, agent_config.budget_override.as_ref());
        let now = Instant::now();
        Self {
            limits,
            cfg,
            inner: Mutex::new(Inner {
                deadline: now + Duration::from_millis(limits.wall_clock_ms),
                tool_calls: 0,
                agent_steps: 0,
                total_extension_ms: 0,
                last_progress: 0,
                last_progress_at: now,
            }),
        }
    }

    /// Rebuild a budget for an execution resumed from a checkpoint (§4.11),
    /// restoring its agent-step count but starting a fresh wall-clock
    /// deadline -- the original deadline was relative to a process that may
    /// have been down for an unbounded time, so a resumed execution gets the
    /// role's full budget back rather than inheriting an already-expired one.
    pub fn resume(agent_config: &AgentConfig, cfg: EngineConfig, agent_steps_count: u32) -> Self {
        let budget = Self::new(agent_config, cfg);
        budget.inner.try_lock().expect("freshly constructed, uncontended").agent_steps = agent_steps_count;
        budget
    }

    pub fn limits(&self) -> ResolvedBudget {
        self.limits
    }

    /// Check whether the execution is still within budget. Returns the first
    /// dimension found to be exceeded; `wall_clock` wins ties per §4.3.
    pub async fn check(&self) -> Result<(), BudgetError> {
        let inner = self.inner.lock().await;
        if Instant::now() >= inner.deadline {
            return Err(BudgetError::WallClockExceeded);
        }
        if inner.tool_calls > self.limits.max_tool_calls {
            return Err(BudgetError::ToolCallsExceeded);
        }
        if inner.agent_steps > self.limits.max_agent_steps {
            return Err(BudgetError::AgentStepsExceeded);
        }
        Ok(())
    }

    pub async fn record_agent_step(&self) -> u32 {
        let mut inner = self.inner.lock().await;
        inner.agent_steps += 1;
        inner.agent_steps
    }

    pub async fn record_tool_call(&self) -> u32 {
        let mut inner = self.inner.lock().await;
        inner.tool_calls += 1;
        inner.tool_calls
    }

    pub async fn agent_steps(&self) -> u32 {
        self.inner.lock().await.agent_steps
    }

    pub async fn tool_calls(&self) -> u32 {
        self.inner.lock().await.tool_calls
    }

    pub async fn deadline(&self) -> Instant {
        self.inner.lock().await.deadline
    }

    /// Apply a progress signal (monotonic 0..=100). Extends the deadline by
    /// `extend_on_progress_ms` once per qualifying jump (>= `progress_min_delta`
    /// since the last extension), unless `no_progress_no_extend_ms` has
    /// elapsed since the last progress change, or the cumulative extension
    /// already hit `max_total_extension_ms` (testable property 12).
    pub async fn on_progress(&self, progress: u8) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let stalled = now.saturating_duration_since(inner.last_progress_at)
            >= Duration::from_millis(self.cfg.no_progress_no_extend_ms);
        if stalled {
            return;
        }

        let delta = progress.saturating_sub(inner.last_progress);
        if delta < self.cfg.progress_min_delta {
            return;
        }

        inner.last_progress = progress;
        inner.last_progress_at = now;

        let remaining_budget = self
            .cfg
            .max_total_extension_ms
            .saturating_sub(inner.total_extension_ms);
        if remaining_budget == 0 {
            return;
        }
        let extension = self.cfg.extend_on_progress_ms.min(remaining_budget);
        inner.deadline += Duration::from_millis(extension);
        inner.total_extension_ms += extension;
    }
}
