//! Request correlation
//!
//! Outstanding calls are kept in a concurrent map keyed by correlation id.
//! Callers insert; the read loop removes on response, callers remove on
//! timeout, and the supervisor drains the map on connection loss. Whoever
//! removes an entry owns its completion handle, so each call is resolved at
//! most once.

use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::CancelReason;
use crate::protocol::RpcError;

/// How a pending call ended, as seen by its waiter
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    Remote(RpcError),
    Canceled(CancelReason),
}

pub type Resolution = Result<Value, Failure>;

#[derive(Debug)]
struct PendingRequest {
    method: String,
    issued_at: Instant,
    completion: oneshot::Sender<Resolution>,
}

/// Tracks calls awaiting a response
#[derive(Debug, Default)]
pub struct Correlator {
    pending: DashMap<String, PendingRequest>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and get the receiver its resolution arrives on
    pub fn register(&self, id: String, method: &str) -> oneshot::Receiver<Resolution> {
        let (completion, receiver) = oneshot::channel();
        self.pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                issued_at: Instant::now(),
                completion,
            },
        );
        receiver
    }

    /// Resolve the call with this id
    ///
    /// Returns `false` when no call is waiting on it (already resolved,
    /// timed out, or never issued).
    pub fn complete(&self, id: &str, outcome: Result<Value, RpcError>) -> bool {
        let Some((_, pending)) = self.pending.remove(id) else {
            return false;
        };

        tracing::debug!(
            "Response for {} ({}) after {:?}",
            pending.method,
            id,
            pending.issued_at.elapsed()
        );
        let _ = pending.completion.send(outcome.map_err(Failure::Remote));
        true
    }

    /// Forget a call without resolving it
    pub fn evict(&self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Cancel every outstanding call, returning how many there were
    pub fn cancel_all(&self, reason: CancelReason) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();

        ids.iter()
            .filter_map(|id| self.pending.remove(id))
            .map(|(_, pending)| {
                let _ = pending.completion.send(Err(Failure::Canceled(reason)));
            })
            .count()
    }

    /// Number of outstanding calls
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
