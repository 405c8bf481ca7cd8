//! C10 — Usage & Credit Recorder.
//!
//! Grounded on the token-usage accumulation in `agent.rs`'s
//! `send`/`generate_with_tokens`, generalized into a standalone recorder that
//! turns an AI message's `usage_metadata` into a priced [`UsageRecord`] and
//! emits `usage.recorded`. Per §4.10 ADDED, pricing is a pluggable trait so
//! "policy is external" holds literally.

use std::sync::Arc;

use crate::data::{Event, Message, UsageRecord};
use crate::event_bus::EventBus;

/// A model's per-token pricing, expressed per 1000 tokens to keep the numbers
/// human-sized (matches how providers publish rates).
#[derive(Debug, Clone, Copy)]
pub struct PricingRate {
    pub input_per_1k_usd: f64,
    pub output_per_1k_usd: f64,
    /// Conversion from USD to the platform's internal credit unit.
    pub credits_per_usd: f64,
}

/// Pluggable cost policy, indexed by model ID.
pub trait PricingTable: Send + Sync {
    fn rate_for(&self, model_id: &str) -> Option<PricingRate>;
}

/// The default pricing table: every model is free. Keeps the recorder usable
/// out of the box while making "no billing policy configured" explicit rather
/// than silently wrong.
pub struct NullPricingTable;

impl PricingTable for NullPricingTable {
    fn rate_for(&self, _model_id: &str) -> Option<PricingRate> {
        None
    }
}

/// Extracts usage from AI messages and emits priced [`UsageRecord`]s.
pub struct UsageRecorder {
    pricing: Arc<dyn PricingTable>,
    event_bus: Arc<EventBus>,
}

impl UsageRecorder {
    pub fn new(pricing: Arc<dyn PricingTable>, event_bus: Arc<EventBus>) -> Self {
        Self { pricing, event_bus }
    }

    pub fn with_null_pricing(event_bus: Arc<EventBus>) -> Self {
        Self::new(Arc::new(NullPricingTable), event_bus)
    }

    /// Builds and emits a [`UsageRecord`] for one AI message, if it carries
    /// usage metadata. Returns `None` for messages with no usage (e.g. a
    /// force-finalize round against a model that didn't report tokens).
    pub fn record(
        &self,
        execution_id: &str,
        user_id: &str,
        agent_id: &str,
        model: &str,
        message: &Message,
    ) -> Option<UsageRecord> {
        let usage = message.usage_metadata?;
        let rate = self.pricing.rate_for(model);
        let (cost_usd, credits) = match rate {
            Some(rate) => {
                let cost = (usage.input_tokens as f64 / 1000.0) * rate.input_per_1k_usd
                    + (usage.output_tokens as f64 / 1000.0) * rate.output_per_1k_usd;
                (cost, cost * rate.credits_per_usd)
            }
            None => (0.0, 0.0),
        };

        let record = UsageRecord {
            execution_id: execution_id.to_string(),
            user_id: user_id.to_string(),
            agent_id: agent_id.to_string(),
            model: model.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
            cost_usd,
            credits,
            timestamp: chrono::Utc::now(),
        };

        self.event_bus.emit(Event::UsageRecorded {
            execution_id: execution_id.to_string(),
            usage,
            ts: record.timestamp,
        });

        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Role, UsageRecordTokens};

    struct FlatRate;
    impl PricingTable for FlatRate {
        fn rate_for(&self, _model_id: &str) -> Option<PricingRate> {
            Some(PricingRate {
                input_per_1k_usd: 0.01,
                output_per_1k_usd: 0.02,
                credits_per_usd: 100.0,
            })
        }
    }

    fn ai_message_with_usage(input: u64, output: u64) -> Message {
        let mut msg = Message::ai("m", "done");
        msg.usage_metadata = Some(UsageRecordTokens::new(input, output));
        msg
    }

    #[test]
    fn null_pricing_yields_zero_cost() {
        let recorder = UsageRecorder::with_null_pricing(Arc::new(EventBus::new()));
        let record = recorder
            .record("exec-1", "user-1", "specialist", "gpt-4.1-nano", &ai_message_with_usage(100, 50))
            .unwrap();
        assert_eq!(record.cost_usd, 0.0);
        assert_eq!(record.credits, 0.0);
        assert_eq!(record.total_tokens, 150);
    }

    #[test]
    fn priced_table_computes_cost_and_credits() {
        let recorder = UsageRecorder::new(Arc::new(FlatRate), Arc::new(EventBus::new()));
        let record = recorder
            .record("exec-1", "user-1", "specialist", "gpt-4.1-nano", &ai_message_with_usage(1000, 1000))
            .unwrap();
        assert!((record.cost_usd - 0.03).abs() < 1e-9);
        assert!((record.credits - 3.0).abs() < 1e-9);
    }

    #[test]
    fn message_without_usage_yields_no_record() {
        let recorder = UsageRecorder::with_null_pricing(Arc::new(EventBus::new()));
        let message = Message::human("m", "hi");
        assert!(matches!(message.role, Role::Human));
        assert!(recorder.record("exec-1", "user-1", "specialist", "gpt-4.1-nano", &message).is_none());
    }
}
