//! C6 — Interrupt Manager: human-in-the-loop approval state machine.
//!
//! State machine per interrupt:
//! `created -> pending -> resolved -> done`, with a `pending -> expired` branch
//! on TTL elapse. Grounded on the request/response turn-taking shape visible
//! in `council_session.rs`, generalized into an explicit enum rather than
//! implicit "whose turn is it" bookkeeping, and on `tool_protocol.rs`'s manual
//! `Error` idiom for `InterruptError`.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{oneshot, Mutex};

use crate::data::{Interrupt, InterruptConfig, InterruptResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptError {
    InFlight,
    NotFound,
    AlreadyResolved,
    Expired,
}

impl fmt::Display for InterruptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptError::InFlight => write!(f, "execution already has a pending interrupt"),
            InterruptError::NotFound => write!(f, "no interrupt pending for execution"),
            InterruptError::AlreadyResolved => write!(f, "interrupt was already resolved"),
            InterruptError::Expired => write!(f, "interrupt expired before a response arrived"),
        }
    }
}

impl Error for InterruptError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InterruptState {
    Pending,
    Resolved,
    Expired,
    Done,
}

struct Entry {
    interrupt: Interrupt,
    state: InterruptState,
    waiter: Option<oneshot::Sender<InterruptResponse>>,
}

/// Tracks at most one pending interrupt per execution (§4.6's concurrency
/// contract) and resolves/expires them via an explicit state machine.
pub struct InterruptManager {
    inner: Mutex<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl InterruptManager {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Registers a pending interrupt and returns a receiver the caller awaits
    /// (with its own timeout) for the resolution. Returns `InFlight` if the
    /// execution already has one pending.
    pub async fn request(
        &self,
        execution_id: impl Into<String>,
        thread_key: impl Into<String>,
        tool_call: crate::data::ToolCallRequest,
        config: InterruptConfig,
        description: impl Into<String>,
    ) -> Result<oneshot::Receiver<InterruptResponse>, InterruptError> {
        let execution_id = execution_id.into();
        let mut guard = self.inner.lock().await;

        if let Some(existing) = guard.get(&execution_id) {
            if existing.state == InterruptState::Pending {
                return Err(InterruptError::InFlight);
            }
        }

        let now = Utc::now();
        let interrupt = Interrupt {
            execution_id: execution_id.clone(),
            thread_key: thread_key.into(),
            tool_call,
            config,
            description: description.into(),
            created_at: now,
            expires_at: now + chrono::Duration::from_std(self.default_ttl).unwrap_or(chrono::Duration::seconds(300)),
        };

        let (tx, rx) = oneshot::channel();
        guard.insert(
            execution_id,
            Entry {
                interrupt,
                state: InterruptState::Pending,
                waiter: Some(tx),
            },
        );
        Ok(rx)
    }

    /// Resolves a pending interrupt, unblocking `request`'s waiter. Idempotent:
    /// a second call against an already-resolved/expired interrupt returns
    /// `AlreadyResolved`/`Expired` rather than panicking (testable property 7).
    pub async fn respond(
        &self,
        execution_id: &str,
        response: InterruptResponse,
    ) -> Result<(), InterruptError> {
        let mut guard = self.inner.lock().await;
        let entry = guard
            .get_mut(execution_id)
            .ok_or(InterruptError::NotFound)?;

        match entry.state {
            InterruptState::Pending => {
                entry.state = InterruptState::Resolved;
                if let Some(waiter) = entry.waiter.take() {
                    let _ = waiter.send(response);
                }
                entry.state = InterruptState::Done;
                Ok(())
            }
            InterruptState::Expired => Err(InterruptError::Expired),
            InterruptState::Resolved | InterruptState::Done => Err(InterruptError::AlreadyResolved),
        }
    }

    /// Drops any interrupt tracked for `execution_id`, pending or not. Used
    /// when resuming an execution from a checkpoint (§4.11): the interrupt
    /// that was pending in the process that took the checkpoint has no live
    /// waiter anymore, so it must not block a fresh `request` for the same
    /// execution from being registered.
    pub async fn cancel(&self, execution_id: &str) {
        self.inner.lock().await.remove(execution_id);
    }

    /// Non-blocking read for UI polling.
    pub async fn peek(&self, execution_id: &str) -> Option<Interrupt> {
        let guard = self.inner.lock().await;
        guard
            .get(execution_id)
            .filter(|e| e.state == InterruptState::Pending)
            .map(|e| e.interrupt.clone())
    }

    /// Scans for interrupts whose `expires_at` has passed and trips them to
    /// `expired`, waking their waiter by dropping the sender (the receiver
    /// observes `RecvError`, which the caller maps to `ApprovalTimeout`).
    /// Returns the number of interrupts expired.
    pub async fn expire_older_than(&self, now: chrono::DateTime<Utc>) -> usize {
        let mut guard = self.inner.lock().await;
        let mut expired = 0;
        for entry in guard.values_mut() {
            if entry.state == InterruptState::Pending && entry.interrupt.expires_at <= now {
                entry.state = InterruptState::Expired;
                entry.waiter.take();
                expired += 1;
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{InterruptResponseKind, ToolCallRequest};

    fn tool_call() -> ToolCallRequest {
        ToolCallRequest {
            id: "call-1".into(),
            name: "danger".into(),
            args_json: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn respond_unblocks_waiter() {
        let manager = InterruptManager::new(Duration::from_secs(300));
        let rx = manager
            .request("exec-1", "thread-1", tool_call(), InterruptConfig::default(), "needs approval")
            .await
            .unwrap();

        manager
            .respond("exec-1", InterruptResponse { kind: InterruptResponseKind::Accept, args: None, text: None })
            .await
            .unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.kind, InterruptResponseKind::Accept);
    }

    #[tokio::test]
    async fn second_request_while_pending_is_rejected() {
        let manager = InterruptManager::new(Duration::from_secs(300));
        let _rx = manager
            .request("exec-1", "thread-1", tool_call(), InterruptConfig::default(), "first")
            .await
            .unwrap();

        let second = manager
            .request("exec-1", "thread-1", tool_call(), InterruptConfig::default(), "second")
            .await;
        assert!(matches!(second, Err(InterruptError::InFlight)));
    }

    #[tokio::test]
    async fn cancel_clears_a_pending_entry_so_a_fresh_request_is_accepted() {
        let manager = InterruptManager::new(Duration::from_secs(300));
        let _rx = manager
            .request("exec-1", "thread-1", tool_call(), InterruptConfig::default(), "first")
            .await
            .unwrap();

        manager.cancel("exec-1").await;

        let second = manager
            .request("exec-1", "thread-1", tool_call(), InterruptConfig::default(), "second")
            .await;
        assert!(second.is_ok(), "a fresh request after cancel should not see a stale in-flight entry");
    }

    #[tokio::test]
    async fn respond_is_idempotent() {
        let manager = InterruptManager::new(Duration::from_secs(300));
        let _rx = manager
            .request("exec-1", "thread-1", tool_call(), InterruptConfig::default(), "needs approval")
            .await
            .unwrap();

        manager
            .respond("exec-1", InterruptResponse { kind: InterruptResponseKind::Accept, args: None, text: None })
            .await
            .unwrap();

        let second = manager
            .respond("exec-1", InterruptResponse { kind: InterruptResponseKind::Accept, args: None, text: None })
            .await;
        assert!(matches!(second, Err(InterruptError::AlreadyResolved)));
    }

    #[tokio::test]
    async fn expire_older_than_trips_pending_interrupts() {
        let manager = InterruptManager::new(Duration::from_millis(1));
        let rx = manager
            .request("exec-1", "thread-1", tool_call(), InterruptConfig::default(), "needs approval")
            .await
            .unwrap();

        let future = Utc::now() + chrono::Duration::seconds(10);
        let expired_count = manager.expire_older_than(future).await;
        assert_eq!(expired_count, 1);
        assert!(rx.await.is_err());
    }
}
