//! Private transport layer for player-hub
//!
//! This crate defines the message-oriented duplex transport consumed by the
//! RPC client: a [`Connector`] that establishes connections and a
//! [`Transport`] that moves raw message bytes in both directions.
//!
//! Reads are reported as [`Fragment`]s. A logical message may span several
//! fragments; the last one carries `end_of_message`. Closure of the
//! connection is reported as [`Received::Closed`], distinct from errors.
//!
//! Two implementations are provided:
//!
//! - [`WebSocketConnector`]: a `tokio-tungstenite` client for `ws://`/`wss://` endpoints
//! - `mock` (feature `test-support`): a scripted in-memory transport for tests

mod error;
mod websocket;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use error::TransportError;
pub use websocket::{WebSocketConnector, WebSocketTransport};

use async_trait::async_trait;
use bytes::Bytes;

/// A single physical read from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Bytes produced by this read
    pub data: Bytes,
    /// Whether this read completes a logical message
    pub end_of_message: bool,
}

impl Fragment {
    /// A fragment that is a whole message by itself
    pub fn complete(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            end_of_message: true,
        }
    }

    /// A fragment that is followed by more parts of the same message
    pub fn partial(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            end_of_message: false,
        }
    }
}

/// Outcome of a successful receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Another fragment arrived
    Fragment(Fragment),
    /// The remote end closed the connection
    Closed,
}

/// A live, connected duplex transport
///
/// `send` may be called concurrently from many tasks while a single task
/// drives `receive`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one complete logical message
    async fn send(&self, payload: Bytes) -> Result<(), TransportError>;

    /// Wait for the next fragment
    ///
    /// Must be cancel-safe: dropping the future before it completes loses no
    /// data, so it can be raced inside `tokio::select!`.
    async fn receive(&self) -> Result<Received, TransportError>;

    /// Close the connection, releasing the underlying resources
    async fn close(&self) -> Result<(), TransportError>;
}

/// Factory for connections to a single endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new connection
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;

    /// Human-readable endpoint, used in logs
    fn endpoint(&self) -> String;
}
