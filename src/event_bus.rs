//! C1 — Event Bus: typed pub/sub with back-pressure-tolerant fan-out.
//!
//! Generalizes `event.rs`'s `EventHandler` push-callback into a real broadcast
//! channel, because the spec requires independent subscriber back-pressure
//! (bounded per-subscriber queue, oldest-dropped-on-overflow) rather than one
//! shared handler object that every emitter blocks on.

use tokio::sync::broadcast;
use tracing::warn;

use crate::data::Event;

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// A handle subscribers use to receive [`Event`]s, optionally narrowed to one
/// execution or one set of event kinds.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    execution_id: Option<String>,
}

impl Subscription {
    /// Await the next event that matches this subscription's filter,
    /// transparently skipping events for other executions. Returns `None`
    /// once the bus is dropped (no more emitters will ever publish).
    ///
    /// A lagged subscriber (queue overflow) is logged and treated as "skip
    /// forward" rather than as an error, per §4.1 ("Fails with SubscriberGone
    /// silently (log + drop)" generalized to "lag silently, keep going").
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Some(filter_id) = &self.execution_id {
                        if event.execution_id() != filter_id {
                            continue;
                        }
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, oldest events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Typed pub/sub backbone. Emission is synchronous from the emitter's
/// perspective (`emit` never awaits a subscriber); delivery fan-out is handled
/// by `tokio::sync::broadcast`'s internal ring buffer, which gives us the
/// "bounded queue, drop oldest, count lag" semantics in one primitive instead
/// of hand-rolling per-subscriber channels.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers. Ordering guarantee: events
    /// emitted from the same call site (same execution) are delivered to
    /// every subscriber in emission order, since `broadcast::Sender::send` is
    /// a synchronous append to the shared ring buffer.
    pub fn emit(&self, event: Event) {
        // No live subscribers is not an error -- it just means nobody's listening yet.
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event on the bus.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            execution_id: None,
        }
    }

    /// Subscribe to events for a single execution only.
    pub fn subscribe_execution(&self, execution_id: impl Into<String>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            execution_id: Some(execution_id.into()),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn started(execution_id: &str) -> Event {
        Event::ExecutionStarted {
            execution_id: execution_id.to_string(),
            agent_id: "specialist".to_string(),
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_in_emission_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.emit(started("exec-1"));
        bus.emit(started("exec-2"));

        let first = sub.next().await.unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(first.execution_id(), "exec-1");
        assert_eq!(second.execution_id(), "exec-2");
    }

    #[tokio::test]
    async fn filters_by_execution() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_execution("exec-2");
        bus.emit(started("exec-1"));
        bus.emit(started("exec-2"));

        let event = sub.next().await.unwrap();
        assert_eq!(event.execution_id(), "exec-2");
    }

    #[tokio::test]
    async fn emit_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.emit(started("exec-1"));
    }
}
