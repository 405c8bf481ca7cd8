//! Token accounting and usage ledger types.
//!
//! `UsageRecordTokens` mirrors `client_wrapper::TokenUsage`; `UsageRecord` is the
//! ADDED first-class type from SPEC_FULL §3/§4.10, elevated because it crosses
//! the public API boundary (returned from `execute()` and the `usage.recorded`
//! event payload).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many tokens were spent on prompt vs. completion for a single LLM call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageRecordTokens {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageRecordTokens {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    pub fn accumulate(&mut self, other: &UsageRecordTokens) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One billable usage entry, produced by the Usage & Credit Recorder (C10) for
/// every AI message that carries `usage_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub execution_id: String,
    pub user_id: String,
    pub agent_id: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub credits: f64,
    pub timestamp: DateTime<Utc>,
}
