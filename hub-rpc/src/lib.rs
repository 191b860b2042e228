//! Player Hub RPC Client
//!
//! An asynchronous RPC client for media player hubs speaking a JSON envelope
//! protocol over a persistent, message-oriented connection.
//!
//! # Features
//!
//! - **Correlated Calls**: concurrent calls matched to responses by a random v4 UUID
//! - **Bounded Waits**: every call, connect and reconnection probe has a timeout or period
//! - **Derived State**: volume, mute, playback status and now-playing metadata
//!   projected from hub notifications, with typed change subscriptions
//! - **Supervision**: single-flight connect, loss detection and periodic reconnection
//! - **Fragment Reassembly**: pooled buffers, zero-copy for single-fragment messages
//!
//! # Architecture
//!
//! ```text
//! HubClient::call ─► Correlator ─► Transport::send
//!                        ▲
//!                        │ response
//! Transport::receive ─► Reassembler ─► Dispatcher ─► notification ─► DeviceState ─► subscribers
//!        (read loop, one per connection, owned by the supervisor)
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hub_rpc::{HubClient, Volume};
//! use hub_transport::WebSocketConnector;
//!
//! let client = HubClient::new(WebSocketConnector::new("ws://192.168.1.20:9000/api")?);
//! client.connect().await?;
//!
//! println!("Volume: {}", client.state().volume());
//!
//! let mut volume = client.state().subscribe::<Volume>();
//! while let Some(change) = volume.recv().await {
//!     println!("Volume {} -> {}", change.old.0, change.new.0);
//! }
//! ```
//!
//! Calls made while disconnected return a canceled error immediately and
//! request a connect in the background; retrying shortly after succeeds once
//! the connection is up.

mod client;
mod correlator;
mod dispatch;
mod supervisor;

pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod projection;
pub mod protocol;
pub mod reassembly;
pub mod state;
pub mod stats;

pub use client::HubClient;
pub use config::ClientConfig;
pub use error::{
    CallError, CancelReason, ConfigError, ConnectError, ProtocolError, ReassemblyError, Result,
};
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use projection::methods;
pub use protocol::{Notification, RpcError};
pub use state::{DeviceState, Mute, NowPlaying, PlaybackStatus, Volume};
pub use stats::ClientStats;
pub use supervisor::{ConnectionEvent, ConnectionState};

pub use state_store::{Change, ChangeEvent, ChangeReceiver, Property, PropertyReceiver};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::client::HubClient;
    pub use crate::config::ClientConfig;
    pub use crate::error::{CallError, CancelReason, ConnectError};
    pub use crate::state::{DeviceState, Mute, NowPlaying, PlaybackStatus, Volume};
    pub use crate::supervisor::{ConnectionEvent, ConnectionState};
    pub use state_store::{Change, Property};
}
