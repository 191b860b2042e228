//! Client counters
//!
//! Counters are bumped from the call path and the read loop with relaxed
//! atomics and read back as a [`ClientStats`] snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of client activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Calls that reached the transport
    pub calls_issued: u64,
    /// Calls answered with a result
    pub calls_succeeded: u64,
    /// Calls answered with an error payload, or whose result failed to decode
    pub calls_failed: u64,
    /// Calls canceled by their timeout
    pub calls_timed_out: u64,
    /// Calls canceled for any other reason (not connected, connection lost, disposed)
    pub calls_canceled: u64,
    /// Responses that matched no outstanding call
    pub late_responses: u64,
    /// Notifications received
    pub notifications: u64,
    /// Successful connects
    pub connects: u64,
    /// Connection losses
    pub disconnects: u64,
    /// Calls currently awaiting a response
    pub pending: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    calls_issued: AtomicU64,
    calls_succeeded: AtomicU64,
    calls_failed: AtomicU64,
    calls_timed_out: AtomicU64,
    calls_canceled: AtomicU64,
    late_responses: AtomicU64,
    notifications: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
}

macro_rules! bump {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl Counters {
    bump! {
        call_issued => calls_issued,
        call_succeeded => calls_succeeded,
        call_failed => calls_failed,
        call_timed_out => calls_timed_out,
        call_canceled => calls_canceled,
        late_response => late_responses,
        notification => notifications,
        connected => connects,
        disconnected => disconnects,
    }

    pub(crate) fn snapshot(&self, pending: usize) -> ClientStats {
        ClientStats {
            calls_issued: self.calls_issued.load(Ordering::Relaxed),
            calls_succeeded: self.calls_succeeded.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            calls_timed_out: self.calls_timed_out.load(Ordering::Relaxed),
            calls_canceled: self.calls_canceled.load(Ordering::Relaxed),
            late_responses: self.late_responses.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            pending,
        }
    }
}
