//! The hub client façade

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hub_transport::Connector;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::correlator::{Correlator, Failure};
use crate::error::{CallError, CancelReason, ConfigError, ConnectError, Result};
use crate::pool::BufferPool;
use crate::projection::{self, HandlerTable};
use crate::protocol::{Notification, Request};
use crate::state::DeviceState;
use crate::stats::{ClientStats, Counters};
use crate::supervisor::{self, ConnectionEvent, ConnectionState, Link, Supervisor};

/// State shared between the client handle and its background tasks
pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Box<dyn Connector>,
    pub(crate) correlator: Correlator,
    pub(crate) state: DeviceState,
    pub(crate) counters: Counters,
    pub(crate) pool: BufferPool,
    pub(crate) handlers: HandlerTable,
    pub(crate) notifications: broadcast::Sender<Notification>,
    pub(crate) supervisor: Supervisor,
    /// Parent of every read loop's scope; canceled on dispose
    pub(crate) shutdown: CancellationToken,
    pub(crate) tasks: TaskTracker,
    disposed: AtomicBool,
}

/// Removes a pending entry when the waiting call ends, however it ends
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.evict(self.id);
    }
}

impl Inner {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Issue one call and wait for its raw result
    pub(crate) async fn call_raw(
        self: &Arc<Self>,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value> {
        if self.is_disposed() {
            return Err(CallError::Disposed);
        }

        let Some(link) = self.supervisor.current_link() else {
            tracing::debug!("Call {} while disconnected; requesting a connect", method);
            self.counters.call_canceled();
            supervisor::request_connect(self);
            return Err(CallError::canceled(method, CancelReason::NotConnected));
        };

        self.call_on(link, method, params).await
    }

    /// Issue one call on `link`
    async fn call_on(
        self: &Arc<Self>,
        link: Arc<Link>,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value> {
        let id = Uuid::new_v4().to_string();
        let payload = Request::new(&id, method, params.as_ref())
            .encode()
            .map_err(|source| CallError::Encode {
                method: method.to_string(),
                source,
            })?;

        let receiver = self.correlator.register(id.clone(), method);
        let _pending = PendingGuard {
            correlator: &self.correlator,
            id: &id,
        };

        // Lost between taking the link and registering: the bulk cancel
        // already ran and would not see this entry
        if !self.supervisor.is_current(link.id) {
            self.counters.call_canceled();
            return Err(CallError::canceled(method, CancelReason::ConnectionLost));
        }

        if let Err(source) = link.transport.send(payload).await {
            tracing::warn!("Failed to send {}: {}", method, source);
            self.counters.call_failed();
            return Err(CallError::Transport {
                method: method.to_string(),
                source,
            });
        }
        self.counters.call_issued();
        tracing::debug!("Sent {} ({})", method, id);

        let call_timeout = self.config.call_timeout;
        match tokio::time::timeout(call_timeout, receiver).await {
            Ok(Ok(Ok(result))) => {
                self.counters.call_succeeded();
                if let Some(confirmation) = projection::confirmation(method) {
                    let params = params.unwrap_or(Value::Null);
                    match (confirmation.decode)(&params, &result) {
                        Some(update) => link.confirm(vec![update]).await,
                        None => tracing::warn!("Unexpected {} result: {}", method, result),
                    }
                }
                Ok(result)
            }
            Ok(Ok(Err(Failure::Remote(error)))) => {
                self.counters.call_failed();
                Err(CallError::Remote {
                    method: method.to_string(),
                    code: error.code,
                    message: error.message,
                })
            }
            Ok(Ok(Err(Failure::Canceled(reason)))) => {
                self.counters.call_canceled();
                Err(CallError::canceled(method, reason))
            }
            // The entry was dropped without a resolution
            Ok(Err(_)) => {
                self.counters.call_canceled();
                Err(CallError::canceled(method, CancelReason::ConnectionLost))
            }
            Err(_) => {
                // Evicted by the guard; a late response is dropped
                tracing::debug!("Call {} ({}) timed out after {:?}", method, id, call_timeout);
                self.counters.call_timed_out();
                Err(CallError::canceled(method, CancelReason::Timeout(call_timeout)))
            }
        }
    }
}

/// Async RPC client for one media player hub
///
/// Owns a single connection to the hub's endpoint, correlates calls with
/// their responses, projects notifications onto [`DeviceState`] and
/// reconnects on its own after the connection drops.
///
/// # Example
///
/// ```rust,ignore
/// use hub_rpc::HubClient;
/// use hub_transport::WebSocketConnector;
///
/// let client = HubClient::new(WebSocketConnector::new("ws://192.168.1.20:9000/api")?);
/// client.connect().await?;
///
/// let volume: u8 = client.call("getVolume", None).await?;
/// let mut changes = client.state().subscribe::<hub_rpc::Volume>();
///
/// client.dispose().await;
/// ```
pub struct HubClient {
    inner: Arc<Inner>,
}

impl HubClient {
    /// Create a client with the default configuration
    ///
    /// Nothing is connected until [`connect`](Self::connect) or the first call.
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::build(Box::new(connector), ClientConfig::default())
    }

    /// Create a client with a custom configuration
    pub fn with_config(
        connector: impl Connector + 'static,
        config: ClientConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(Box::new(connector), config))
    }

    fn build(connector: Box<dyn Connector>, config: ClientConfig) -> Self {
        let (notifications, _) = broadcast::channel(config.event_capacity);

        let inner = Inner {
            connector,
            correlator: Correlator::new(),
            state: DeviceState::new(config.event_capacity),
            counters: Counters::default(),
            pool: BufferPool::new(
                config.buffer_pool_capacity,
                config.buffer_size,
                config.max_retained_buffer,
            ),
            handlers: HandlerTable::new(),
            notifications,
            supervisor: Supervisor::new(config.event_capacity),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            disposed: AtomicBool::new(false),
            config,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Connect to the hub
    ///
    /// Concurrent callers share one attempt and all receive its outcome.
    /// Returns immediately when already connected.
    pub async fn connect(&self) -> std::result::Result<(), ConnectError> {
        supervisor::connect(&self.inner).await
    }

    /// Call `method` and deserialize its result
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<R> {
        let result = self.inner.call_raw(method, params).await?;
        self.decode(method, result)
    }

    /// Call `method` with any serializable params
    pub async fn call_with<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(|source| CallError::Encode {
            method: method.to_string(),
            source,
        })?;
        self.call(method, Some(params)).await
    }

    /// Call `method` and return its result untouched
    pub async fn call_raw(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.inner.call_raw(method, params).await
    }

    fn decode<R: DeserializeOwned>(&self, method: &str, result: Value) -> Result<R> {
        serde_json::from_value(result).map_err(|source| {
            tracing::warn!("Failed to decode result of {}: {}", method, source);
            self.inner.counters.call_failed();
            CallError::Decode {
                method: method.to_string(),
                source,
            }
        })
    }

    /// Derived state of the hub
    pub fn state(&self) -> DeviceState {
        self.inner.state.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.supervisor.is_connected()
    }

    /// Watch the connection state
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.watch()
    }

    /// Connected and disconnected transitions
    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.supervisor.subscribe()
    }

    /// Every notification the hub pushes, recognized or not
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    pub fn stats(&self) -> ClientStats {
        self.inner.counters.snapshot(self.inner.correlator.len())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn endpoint(&self) -> String {
        self.inner.connector.endpoint()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Shut the client down
    ///
    /// Cancels the read loop and any reconnection, closes the transport,
    /// cancels outstanding calls and waits (bounded by the shutdown timeout)
    /// for background tasks to finish. Derived state then returns to its
    /// defaults. Safe to call more than once, and without ever having
    /// connected.
    pub async fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Disposing client for {}", inner.connector.endpoint());
        inner.shutdown.cancel();

        let link = inner.supervisor.take_link();
        let was_connected = link.is_some();
        if let Some(link) = link {
            if let Err(e) = link.transport.close().await {
                tracing::debug!("Error closing transport: {}", e);
            }
        }

        let canceled = inner.correlator.cancel_all(CancelReason::Disposed);
        if canceled > 0 {
            tracing::debug!("Canceled {} pending calls", canceled);
        }

        inner.tasks.close();
        if tokio::time::timeout(inner.config.shutdown_timeout, inner.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                "{} background tasks still running after {:?}",
                inner.tasks.len(),
                inner.config.shutdown_timeout
            );
        }

        // The read loop has stopped writing by now
        let reset = inner.state.reset();
        tracing::debug!("Reset {} state fields", reset);

        inner.supervisor.set_state(ConnectionState::Disconnected);
        if was_connected {
            inner.supervisor.emit(ConnectionEvent::Disconnected {
                reason: "disposed".to_string(),
            });
        }
    }
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("endpoint", &self.inner.connector.endpoint())
            .field("state", &self.inner.supervisor.state())
            .field("disposed", &self.inner.is_disposed())
            .finish()
    }
}

impl Drop for HubClient {
    fn drop(&mut self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Background tasks observe the token and exit on their own
        self.inner.shutdown.cancel();
        self.inner.supervisor.take_link();
        self.inner.correlator.cancel_all(CancelReason::Disposed);
        self.inner.supervisor.set_state(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_transport::mock;

    #[test]
    fn test_with_config_validates() {
        let (connector, _remote) = mock::pair();
        let config = ClientConfig::new().with_event_capacity(0);
        assert!(HubClient::with_config(connector, config).is_err());
    }

    #[tokio::test]
    async fn test_disposed_client_rejects_calls_and_connects() {
        let (connector, remote) = mock::pair();
        let client = HubClient::new(connector);

        client.dispose().await;
        assert!(client.is_disposed());

        let result: Result<u8> = client.call("getVolume", None).await;
        assert!(matches!(result, Err(CallError::Disposed)));
        assert_eq!(client.connect().await, Err(ConnectError::Disposed));
        assert_eq!(remote.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_call_on_released_link_is_connection_lost() {
        let (connector, mut remote) = mock::pair();
        let config = ClientConfig::new()
            .with_handshake(false)
            .with_reconnect_interval(std::time::Duration::from_secs(60));
        let client = HubClient::with_config(connector, config).unwrap();
        let inner = Arc::clone(&client.inner);

        let (connected, session) = tokio::join!(client.connect(), remote.accept());
        assert_eq!(connected, Ok(()));
        let session = session.unwrap();
        let stale = inner.supervisor.current_link().unwrap();

        let mut events = client.subscribe_connection();
        session.fail("connection reset");
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::Disconnected { .. }
        ));

        // A call that took the link just before it was released
        let error = inner.call_on(stale, "getVolume", None).await.unwrap_err();
        assert_eq!(error.cancel_reason(), Some(CancelReason::ConnectionLost));
        assert_eq!(remote.write_count(), 0);
        assert!(inner.correlator.is_empty());

        client.dispose().await;
    }

    #[tokio::test]
    async fn test_pending_guard_evicts_on_drop() {
        let correlator = Correlator::new();
        let id = "call-1".to_string();
        let _receiver = correlator.register(id.clone(), "getVolume");
        {
            let _guard = PendingGuard {
                correlator: &correlator,
                id: &id,
            };
            assert_eq!(correlator.len(), 1);
        }
        assert!(correlator.is_empty());
    }
}
