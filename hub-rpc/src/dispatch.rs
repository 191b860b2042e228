//! Inbound message dispatch
//!
//! Runs inside a connection's read loop. Responses resolve their pending
//! call; notifications are projected onto derived state and republished to
//! notification subscribers.
//!
//! A projection may need a follow-up call before it is complete ("play
//! started" needs the item's metadata). The call is issued from a separate
//! task so the read loop keeps servicing messages, including the follow-up's
//! own response. Its result comes back to the read loop as a [`Deferred`]
//! update, keeping the read loop the only writer of derived state.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::client::Inner;
use crate::projection::{FollowUp, Projection};
use crate::protocol::{Envelope, Notification};
use crate::state::StateUpdate;

/// Work handed back to the read loop from other tasks
#[derive(Debug)]
pub(crate) enum Deferred {
    /// Handshake results; `ack` fires once they are applied
    Confirm {
        updates: Vec<StateUpdate>,
        ack: oneshot::Sender<()>,
    },
    /// Result of a projection's follow-up call
    FollowUp { epoch: u64, updates: Vec<StateUpdate> },
}

pub(crate) struct Dispatcher {
    inner: Arc<Inner>,
    deferred: mpsc::UnboundedSender<Deferred>,
    /// Bumped whenever the playing item changes; follow-up results from an
    /// older epoch are stale
    item_epoch: u64,
}

impl Dispatcher {
    pub(crate) fn new(inner: Arc<Inner>, deferred: mpsc::UnboundedSender<Deferred>) -> Self {
        Self {
            inner,
            deferred,
            item_epoch: 0,
        }
    }

    /// Handle one complete inbound message
    pub(crate) fn dispatch(&mut self, message: &[u8]) {
        match Envelope::parse(message) {
            Ok(Envelope::Response { id, outcome }) => {
                if !self.inner.correlator.complete(&id, outcome) {
                    self.inner.counters.late_response();
                    tracing::debug!("Dropping response for unknown or expired id {}", id);
                }
            }
            Ok(Envelope::Notification(notification)) => self.notify(notification),
            Err(e) => tracing::warn!("Ignoring inbound message: {}", e),
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.inner.counters.notification();

        match self
            .inner
            .handlers
            .project(&notification.method, &notification.data)
        {
            Some(projection) => self.project(projection),
            None => tracing::debug!("No projection for notification {}", notification.method),
        }

        // No subscribers is fine
        let _ = self.inner.notifications.send(notification);
    }

    fn project(&mut self, projection: Projection) {
        if projection.changes_item() {
            self.item_epoch = self.item_epoch.wrapping_add(1);
        }

        self.apply(projection.updates);

        if let Some(follow_up) = projection.follow_up {
            self.call_out(follow_up);
        }
    }

    /// Issue a follow-up call without blocking the read loop
    fn call_out(&self, follow_up: FollowUp) {
        let inner = Arc::clone(&self.inner);
        let deferred = self.deferred.clone();
        let epoch = self.item_epoch;

        tracing::debug!("Issuing follow-up {} for item epoch {}", follow_up.method, epoch);
        self.inner.tasks.spawn(async move {
            match inner
                .call_raw(follow_up.method, Some(follow_up.params))
                .await
            {
                Ok(result) => {
                    let updates = (follow_up.complete)(result);
                    // The read loop may be gone by now
                    let _ = deferred.send(Deferred::FollowUp { epoch, updates });
                }
                Err(e) => tracing::debug!("Follow-up {} failed: {}", follow_up.method, e),
            }
        });
    }

    /// Apply work handed back from another task
    pub(crate) fn apply_deferred(&mut self, deferred: Deferred) {
        match deferred {
            Deferred::Confirm { updates, ack } => {
                self.apply(updates);
                let _ = ack.send(());
            }
            Deferred::FollowUp { epoch, updates } if epoch == self.item_epoch => {
                self.apply(updates);
            }
            Deferred::FollowUp { epoch, .. } => {
                tracing::debug!(
                    "Discarding follow-up result for item epoch {} (now {})",
                    epoch,
                    self.item_epoch
                );
            }
        }
    }

    fn apply(&self, updates: Vec<StateUpdate>) {
        for update in updates {
            self.inner.state.apply(update);
        }
    }
}
