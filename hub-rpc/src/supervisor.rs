//! Connection supervision
//!
//! Owns the live link to the hub: single-flight connection establishment,
//! the per-connection read loop, loss detection, and the periodic
//! reconnection loop.
//!
//! ```text
//! connect() ──► establish ──► link installed ──► read loop ──► handshake ──► Connected event
//!                                                   │
//!                                   closed / error  ▼
//!                 reset state ◄── connection_lost ──► cancel pending calls
//!                                                   │
//!                                                   ▼
//!                                  reconnect loop: tick ─► connect() ─► ...
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use hub_transport::{Received, Transport, TransportError};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::Inner;
use crate::dispatch::{Deferred, Dispatcher};
use crate::error::{CancelReason, ConnectError};
use crate::projection::HANDSHAKE;
use crate::reassembly::Reassembler;
use crate::state::StateUpdate;

/// Lifecycle of the client's single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection transitions, as broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connected and handshake finished
    Connected,
    /// The connection was lost or the client was disposed
    Disconnected { reason: String },
}

type ConnectAttempt = Shared<BoxFuture<'static, Result<(), ConnectError>>>;

/// One live connection
pub(crate) struct Link {
    pub(crate) id: u64,
    pub(crate) transport: Arc<dyn Transport>,
    /// Scope of this connection's read loop
    cancel: CancellationToken,
    deferred: mpsc::UnboundedSender<Deferred>,
}

impl Link {
    /// Hand confirmed values to the read loop and wait until they are applied
    ///
    /// Returns without applying anything once the read loop has exited.
    pub(crate) async fn confirm(&self, updates: Vec<StateUpdate>) {
        let (ack, applied) = oneshot::channel();
        if self.deferred.send(Deferred::Confirm { updates, ack }).is_ok() {
            let _ = applied.await;
        }
    }
}

/// Connection bookkeeping shared by the client and its tasks
pub(crate) struct Supervisor {
    link: RwLock<Option<Arc<Link>>>,
    connecting: Mutex<Option<ConnectAttempt>>,
    status: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    reconnecting: AtomicBool,
    next_link_id: AtomicU64,
}

impl Supervisor {
    pub(crate) fn new(event_capacity: usize) -> Self {
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            link: RwLock::new(None),
            connecting: Mutex::new(None),
            status,
            events,
            reconnecting: AtomicBool::new(false),
            next_link_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn current_link(&self) -> Option<Arc<Link>> {
        self.link.read().clone()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.link.read().is_some()
    }

    pub(crate) fn is_current(&self, id: u64) -> bool {
        self.link.read().as_ref().is_some_and(|link| link.id == id)
    }

    /// Remove the link if it is still the current one
    fn release(&self, id: u64) -> bool {
        let mut link = self.link.write();
        if link.as_ref().is_some_and(|current| current.id == id) {
            *link = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn take_link(&self) -> Option<Arc<Link>> {
        self.link.write().take()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        // send_replace works with no receivers
        self.status.send_replace(state);
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Connecting
// ============================================================================

/// Connect, sharing any attempt already in flight
pub(crate) async fn connect(inner: &Arc<Inner>) -> Result<(), ConnectError> {
    if inner.is_disposed() {
        return Err(ConnectError::Disposed);
    }

    let attempt = {
        let mut slot = inner.supervisor.connecting.lock();
        if let Some(attempt) = slot.clone() {
            attempt
        } else if inner.supervisor.is_connected() {
            return Ok(());
        } else {
            let handle = inner.tasks.spawn(establish(Arc::clone(inner)));
            let attempt = async move {
                handle
                    .await
                    .unwrap_or_else(|e| Err(ConnectError::Aborted(e.to_string())))
            }
            .boxed()
            .shared();
            *slot = Some(attempt.clone());
            attempt
        }
    };

    attempt.await
}

/// Fire-and-forget connect, used by calls made while disconnected
pub(crate) fn request_connect(inner: &Arc<Inner>) {
    if inner.is_disposed() {
        return;
    }

    let tasks = inner.tasks.clone();
    let inner = Arc::clone(inner);
    tasks.spawn(async move {
        if let Err(e) = connect(&inner).await {
            tracing::debug!("Requested connect failed: {}", e);
        }
    });
}

async fn establish(inner: Arc<Inner>) -> Result<(), ConnectError> {
    let outcome = open(&inner).await;
    // The slot is set before this task can take the lock
    inner.supervisor.connecting.lock().take();
    outcome
}

async fn open(inner: &Arc<Inner>) -> Result<(), ConnectError> {
    let endpoint = inner.connector.endpoint();
    let connect_timeout = inner.config.connect_timeout;

    inner.supervisor.set_state(ConnectionState::Connecting);
    tracing::info!("Connecting to {}", endpoint);

    let connected = tokio::select! {
        _ = inner.shutdown.cancelled() => Err(ConnectError::Disposed),
        result = tokio::time::timeout(connect_timeout, inner.connector.connect()) => match result {
            Ok(Ok(transport)) => Ok(transport),
            Ok(Err(e)) => Err(ConnectError::Transport(e)),
            Err(_) => Err(ConnectError::Timeout(connect_timeout)),
        },
    };

    let transport: Arc<dyn Transport> = match connected {
        Ok(transport) => Arc::from(transport),
        Err(e) => {
            if !inner.supervisor.is_connected() {
                inner.supervisor.set_state(ConnectionState::Disconnected);
            }
            tracing::warn!("Failed to connect to {}: {}", endpoint, e);
            return Err(e);
        }
    };

    let (deferred_tx, deferred_rx) = mpsc::unbounded_channel();
    let link = Arc::new(Link {
        id: inner.supervisor.next_link_id.fetch_add(1, Ordering::Relaxed),
        transport,
        cancel: inner.shutdown.child_token(),
        deferred: deferred_tx,
    });

    if inner.is_disposed() {
        let _ = link.transport.close().await;
        return Err(ConnectError::Disposed);
    }

    *inner.supervisor.link.write() = Some(Arc::clone(&link));
    inner.counters.connected();
    inner.supervisor.set_state(ConnectionState::Connected);
    inner
        .tasks
        .spawn(read_loop(Arc::clone(inner), Arc::clone(&link), deferred_rx));

    if inner.config.handshake {
        handshake(inner).await;
    }

    if !inner.supervisor.is_current(link.id) {
        tracing::warn!("Connection to {} lost during handshake", endpoint);
        return Err(ConnectError::Transport(TransportError::Closed));
    }

    tracing::info!("Connected to {}", endpoint);
    inner.supervisor.emit(ConnectionEvent::Connected);
    Ok(())
}

/// Seed derived state from the hub's current values
///
/// Each call confirms its field on success. Failures are logged and leave
/// the affected fields at their defaults.
async fn handshake(inner: &Arc<Inner>) {
    let calls = HANDSHAKE.into_iter().map(|method| async move {
        if let Err(e) = inner.call_raw(method, None).await {
            tracing::warn!("Handshake call {} failed: {}", method, e);
        }
    });

    futures::future::join_all(calls).await;
}

// ============================================================================
// Read loop
// ============================================================================

enum Exit {
    Canceled,
    Lost(String),
}

async fn read_loop(
    inner: Arc<Inner>,
    link: Arc<Link>,
    mut deferred_rx: mpsc::UnboundedReceiver<Deferred>,
) {
    let mut reassembler = Reassembler::new(inner.pool.clone(), inner.config.max_message_size);
    let mut dispatcher = Dispatcher::new(Arc::clone(&inner), link.deferred.clone());

    tracing::debug!("Read loop {} started", link.id);

    let exit = loop {
        tokio::select! {
            biased;

            _ = link.cancel.cancelled() => break Exit::Canceled,

            Some(deferred) = deferred_rx.recv() => dispatcher.apply_deferred(deferred),

            received = link.transport.receive() => match received {
                Ok(Received::Fragment(fragment)) => match reassembler.push(fragment) {
                    Ok(Some(message)) => dispatcher.dispatch(&message),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Discarding inbound message: {}", e),
                },
                Ok(Received::Closed) => break Exit::Lost("closed by remote".to_string()),
                Err(e) => break Exit::Lost(e.to_string()),
            },
        }
    };

    if reassembler.discard_partial() {
        tracing::debug!("Discarded partially received message");
    }

    match exit {
        Exit::Canceled => {
            tracing::debug!("Read loop {} canceled", link.id);
            // Normally the disposer already took the link
            if inner.supervisor.release(link.id) {
                let _ = link.transport.close().await;
            }
        }
        Exit::Lost(reason) => connection_lost(&inner, &link, reason).await,
    }
}

async fn connection_lost(inner: &Arc<Inner>, link: &Link, reason: String) {
    if !inner.supervisor.release(link.id) {
        return;
    }
    link.cancel.cancel();

    tracing::warn!(
        "Connection to {} lost: {}",
        inner.connector.endpoint(),
        reason
    );
    inner.counters.disconnected();

    let reset = inner.state.reset();
    inner.supervisor.set_state(ConnectionState::Disconnected);
    inner.supervisor.emit(ConnectionEvent::Disconnected { reason });

    let canceled = inner.correlator.cancel_all(CancelReason::ConnectionLost);
    tracing::debug!(
        "Reset {} state fields and canceled {} pending calls",
        reset,
        canceled
    );

    let _ = link.transport.close().await;
    start_reconnecting(inner);
}

// ============================================================================
// Reconnection
// ============================================================================

fn start_reconnecting(inner: &Arc<Inner>) {
    if inner.is_disposed() || inner.supervisor.reconnecting.swap(true, Ordering::SeqCst) {
        return;
    }

    inner.tasks.spawn(reconnect_loop(Arc::clone(inner)));
}

async fn reconnect_loop(inner: Arc<Inner>) {
    let period = inner.config.reconnect_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Reconnecting every {:?}", period);

    let mut attempt: u32 = 0;
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => {
                tracing::debug!("Reconnection loop canceled");
                break;
            }
            _ = ticker.tick() => {}
        }

        attempt += 1;
        match connect(&inner).await {
            Ok(()) => {
                inner.supervisor.reconnecting.store(false, Ordering::SeqCst);
                // A loss right after connecting saw the flag still set
                if inner.supervisor.is_connected()
                    || inner
                        .supervisor
                        .reconnecting
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                {
                    tracing::info!("Reconnected after {} attempts", attempt);
                    return;
                }
            }
            Err(ConnectError::Disposed) => break,
            Err(e) => tracing::debug!("Reconnection attempt {} failed: {}", attempt, e),
        }
    }

    inner.supervisor.reconnecting.store(false, Ordering::SeqCst);
}
