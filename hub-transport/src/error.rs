//! Error types for the hub transport

use thiserror::Error;

/// Errors that can occur while talking to the hub over the transport
///
/// Errors carry their causes as text so they can be cloned and shared
/// between every caller waiting on the same connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The endpoint could not be parsed or uses an unsupported scheme
    #[error("Invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Establishing the connection failed (unreachable host, refused, handshake)
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Writing a message failed
    #[error("Send failed: {0}")]
    Send(String),

    /// Reading from the connection failed
    #[error("Receive failed: {0}")]
    Receive(String),

    /// The connection is already closed
    #[error("Transport closed")]
    Closed,
}
