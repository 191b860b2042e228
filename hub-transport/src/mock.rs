//! Scripted in-memory transport for tests
//!
//! [`pair`] returns a [`MockConnector`] to hand to the client under test and a
//! [`MockRemote`] that plays the hub. Every successful connect yields a
//! [`MockSession`] on the remote side, through which a test reads the
//! messages the client wrote and pushes fragments, closures or failures back.
//!
//! ```rust,ignore
//! let (connector, mut remote) = hub_transport::mock::pair();
//! let client = HubClient::new(connector);
//!
//! let (_, session) = tokio::join!(client.connect(), remote.accept());
//! let mut session = session.unwrap();
//! let request = session.next_sent().await;
//! session.push(r#"{"id":"...","result":42}"#);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::{Connector, Fragment, Received, Transport, TransportError};

const MOCK_ENDPOINT: &str = "mock://hub";

/// Create a connected connector/remote pair
pub fn pair() -> (MockConnector, MockRemote) {
    let (session_tx, session_rx) = mpsc::unbounded_channel();
    let counters = Arc::new(Counters::default());

    let connector = MockConnector {
        sessions: session_tx,
        counters: Arc::clone(&counters),
    };
    let remote = MockRemote {
        sessions: session_rx,
        counters,
    };

    (connector, remote)
}

#[derive(Debug, Default)]
struct Counters {
    refuse: AtomicBool,
    connects: AtomicUsize,
    writes: AtomicUsize,
}

/// What the remote side can inject into the client's read path
#[derive(Debug)]
enum Inbound {
    Fragment(Fragment),
    Close,
    Fail(String),
}

/// Client-side connector backed by in-memory channels
#[derive(Debug, Clone)]
pub struct MockConnector {
    sessions: mpsc::UnboundedSender<MockSession>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        if self.counters.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                endpoint: MOCK_ENDPOINT.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        self.sessions
            .send(MockSession {
                sent: sent_rx,
                inbound: inbound_tx,
            })
            .map_err(|_| TransportError::Connect {
                endpoint: MOCK_ENDPOINT.to_string(),
                reason: "remote dropped".to_string(),
            })?;

        Ok(Box::new(MockTransport {
            sent: sent_tx,
            inbound: Mutex::new(inbound_rx),
            counters: Arc::clone(&self.counters),
            closed: AtomicBool::new(false),
        }))
    }

    fn endpoint(&self) -> String {
        MOCK_ENDPOINT.to_string()
    }
}

struct MockTransport {
    sent: mpsc::UnboundedSender<Bytes>,
    inbound: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        self.sent
            .send(payload)
            .map_err(|_| TransportError::Send("remote session dropped".to_string()))?;
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn receive(&self) -> Result<Received, TransportError> {
        match self.inbound.lock().await.recv().await {
            Some(Inbound::Fragment(fragment)) => Ok(Received::Fragment(fragment)),
            Some(Inbound::Close) | None => Ok(Received::Closed),
            Some(Inbound::Fail(reason)) => Err(TransportError::Receive(reason)),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The hub side of the mock
#[derive(Debug)]
pub struct MockRemote {
    sessions: mpsc::UnboundedReceiver<MockSession>,
    counters: Arc<Counters>,
}

impl MockRemote {
    /// Wait for the client to open the next connection
    pub async fn accept(&mut self) -> Option<MockSession> {
        self.sessions.recv().await
    }

    /// Make subsequent connection attempts fail (or succeed again)
    pub fn refuse_connections(&self, refuse: bool) {
        self.counters.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connection attempts made, refused ones included
    pub fn connect_count(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Number of messages written by the client across all sessions
    pub fn write_count(&self) -> usize {
        self.counters.writes.load(Ordering::SeqCst)
    }
}

/// One accepted connection, seen from the hub
#[derive(Debug)]
pub struct MockSession {
    sent: mpsc::UnboundedReceiver<Bytes>,
    inbound: mpsc::UnboundedSender<Inbound>,
}

impl MockSession {
    /// Wait for the next message written by the client
    ///
    /// Returns `None` once the client's transport has been dropped.
    pub async fn next_sent(&mut self) -> Option<Bytes> {
        self.sent.recv().await
    }

    /// Take a message the client already wrote, without waiting
    pub fn try_next_sent(&mut self) -> Option<Bytes> {
        self.sent.try_recv().ok()
    }

    /// Deliver a whole message in a single read
    pub fn push(&self, message: impl Into<Bytes>) -> bool {
        self.push_fragment(Fragment::complete(message))
    }

    /// Deliver one physical read
    pub fn push_fragment(&self, fragment: Fragment) -> bool {
        self.inbound.send(Inbound::Fragment(fragment)).is_ok()
    }

    /// Close the connection from the hub side
    pub fn close(&self) -> bool {
        self.inbound.send(Inbound::Close).is_ok()
    }

    /// Make the client's next read fail
    pub fn fail(&self, reason: &str) -> bool {
        self.inbound.send(Inbound::Fail(reason.to_string())).is_ok()
    }

    /// Whether the client still holds this connection
    pub fn is_open(&self) -> bool {
        !self.inbound.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_through_session() {
        let (connector, mut remote) = pair();
        let transport = connector.connect().await.unwrap();
        let mut session = remote.accept().await.unwrap();

        transport.send(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(session.next_sent().await.unwrap(), Bytes::from_static(b"ping"));
        assert_eq!(remote.write_count(), 1);

        session.push_fragment(Fragment::partial("a"));
        session.push("b");
        assert_eq!(
            transport.receive().await.unwrap(),
            Received::Fragment(Fragment::partial("a"))
        );
        assert_eq!(
            transport.receive().await.unwrap(),
            Received::Fragment(Fragment::complete("b"))
        );

        session.close();
        assert_eq!(transport.receive().await.unwrap(), Received::Closed);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let (connector, remote) = pair();
        remote.refuse_connections(true);

        assert!(connector.connect().await.is_err());
        assert_eq!(remote.connect_count(), 1);
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_failure_and_closed_send() {
        let (connector, mut remote) = pair();
        let transport = connector.connect().await.unwrap();
        let session = remote.accept().await.unwrap();

        session.fail("reset by peer");
        assert_eq!(
            transport.receive().await.unwrap_err(),
            TransportError::Receive("reset by peer".to_string())
        );

        transport.close().await.unwrap();
        assert_eq!(
            transport.send(Bytes::from_static(b"late")).await.unwrap_err(),
            TransportError::Closed
        );
        assert_eq!(remote.write_count(), 0);
    }
}
