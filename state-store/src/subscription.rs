//! Async receivers over change events
//!
//! Both receivers sit on `tokio::sync::broadcast` channels. A subscriber that
//! falls behind skips the events it missed and continues with the oldest one
//! still buffered.

use tokio::sync::broadcast;

use crate::event::{Change, ChangeEvent};

/// Receiver for one property's typed transitions
pub type PropertyReceiver<P> = Subscription<Change<P>>;

/// Receiver for store-wide key-level change events
pub type ChangeReceiver = Subscription<ChangeEvent>;

/// A lag-tolerant broadcast receiver
///
/// # Example
///
/// ```rust,ignore
/// let mut volume = store.subscribe::<Volume>();
/// while let Some(change) = volume.recv().await {
///     println!("volume {:?} -> {:?}", change.old, change.new);
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(receiver: broadcast::Receiver<T>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Change subscriber lagged, skipped {} events", skipped);
                    continue;
                }
            }
        }
    }

    /// Take the next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Change subscriber lagged, skipped {} events", skipped);
                    continue;
                }
            }
        }
    }

    /// Drain every event currently buffered
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
