//! Error types for the hub RPC client

use std::time::Duration;

use hub_transport::TransportError;
use thiserror::Error;

/// Why a call was canceled rather than answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// No connection was available; a connect attempt has been requested
    NotConnected,
    /// No response arrived within the call timeout
    Timeout(Duration),
    /// The connection dropped while the call was outstanding
    ConnectionLost,
    /// The client was disposed while the call was outstanding
    Disposed,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::NotConnected => write!(f, "not connected"),
            CancelReason::Timeout(after) => write!(f, "no response within {:?}", after),
            CancelReason::ConnectionLost => write!(f, "connection lost"),
            CancelReason::Disposed => write!(f, "client disposed"),
        }
    }
}

/// Errors returned from [`HubClient::call`](crate::HubClient::call) and friends
#[derive(Debug, Error)]
pub enum CallError {
    /// The client was disposed before the call was made
    #[error("Client has been disposed")]
    Disposed,

    /// The call produced no result; callers may retry
    #[error("Call `{method}` canceled: {reason}")]
    Canceled {
        method: String,
        reason: CancelReason,
    },

    /// The hub answered with an error payload
    #[error("Call `{method}` failed with code {code}: {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
    },

    /// The result could not be deserialized into the requested type
    #[error("Failed to decode result of `{method}`: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The params could not be serialized
    #[error("Failed to encode params for `{method}`: {source}")]
    Encode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// Writing the request failed
    #[error("Transport error during `{method}`: {source}")]
    Transport {
        method: String,
        #[source]
        source: TransportError,
    },
}

impl CallError {
    pub(crate) fn canceled(method: &str, reason: CancelReason) -> Self {
        CallError::Canceled {
            method: method.to_string(),
            reason,
        }
    }

    /// Whether the call was canceled (not connected, timed out, connection lost or disposed)
    pub fn is_canceled(&self) -> bool {
        matches!(self, CallError::Canceled { .. })
    }

    /// The cancellation reason, if this is a canceled outcome
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            CallError::Canceled { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Errors from establishing a connection
///
/// Clonable so that every caller sharing a single in-flight attempt receives
/// the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The client was disposed
    #[error("Client has been disposed")]
    Disposed,

    /// The transport did not connect within the connect timeout
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// The transport refused or failed the connection
    #[error("Connect failed: {0}")]
    Transport(#[from] TransportError),

    /// The connect task ended without producing an outcome
    #[error("Connect attempt aborted: {0}")]
    Aborted(String),
}

/// Invalid client configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from reassembling fragments into messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReassemblyError {
    /// A logical message grew beyond the configured limit
    #[error("Message of at least {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },
}

/// Errors from interpreting an inbound message as an envelope
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not valid JSON, or not a JSON object
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// The `id` field has a type that cannot be correlated
    #[error("Invalid correlation id: {0}")]
    InvalidId(String),

    /// A request from the hub to the client, which is not supported
    #[error("Unsupported inbound request `{method}` with id {id}")]
    InboundRequest { id: String, method: String },

    /// Neither an id nor a method
    #[error("Envelope has neither id nor method")]
    Unrecognized,
}

/// Convenience type alias for call results
pub type Result<T> = std::result::Result<T, CallError>;
