//! Configuration for the hub RPC client
//!
//! Controls call and connect timeouts, the reconnection period, reassembly
//! limits and buffer pooling, and channel capacities.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for a [`HubClient`](crate::HubClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on waiting for one call's response
    /// Default: 2.5 seconds
    pub call_timeout: Duration,

    /// Bound on one transport connect
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Period between reconnection probes after a connection loss
    /// Default: 60 seconds
    pub reconnect_interval: Duration,

    /// Read current volume and mute right after connecting
    /// Default: true
    pub handshake: bool,

    /// Largest logical message the reassembler accepts
    /// Default: 16 MiB
    pub max_message_size: usize,

    /// Buffers retained by the reassembly pool
    /// Default: 16
    pub buffer_pool_capacity: usize,

    /// Initial capacity of pooled buffers
    /// Default: 8 KiB
    pub buffer_size: usize,

    /// Buffers that grew beyond this are dropped instead of pooled
    /// Default: 1 MiB
    pub max_retained_buffer: usize,

    /// Capacity of state, connection and notification broadcast channels
    /// Default: 64
    pub event_capacity: usize,

    /// Bound on joining background tasks during dispose
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(2500),
            connect_timeout: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(60),
            handshake: true,
            max_message_size: 16 * 1024 * 1024,
            buffer_pool_capacity: 16,
            buffer_size: 8 * 1024,
            max_retained_buffer: 1024 * 1024,
            event_capacity: 64,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Create a new ClientConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timeouts and quick reconnection, for interactive front ends
    pub fn responsive() -> Self {
        Self {
            call_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(3),
            reconnect_interval: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Small pool and channels for constrained hosts
    pub fn resource_efficient() -> Self {
        Self {
            buffer_pool_capacity: 2,
            buffer_size: 4 * 1024,
            max_retained_buffer: 64 * 1024,
            event_capacity: 16,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("Call timeout", self.call_timeout),
            ("Connect timeout", self.connect_timeout),
            ("Reconnect interval", self.reconnect_interval),
            ("Shutdown timeout", self.shutdown_timeout),
        ];
        for (name, value) in durations {
            if value == Duration::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        let sizes = [
            ("Max message size", self.max_message_size),
            ("Buffer pool capacity", self.buffer_pool_capacity),
            ("Buffer size", self.buffer_size),
            ("Event capacity", self.event_capacity),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.max_retained_buffer < self.buffer_size {
            return Err(ConfigError::Invalid(
                "Max retained buffer must be at least the buffer size".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_handshake(mut self, enabled: bool) -> Self {
        self.handshake = enabled;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_buffer_pool(mut self, capacity: usize, buffer_size: usize) -> Self {
        self.buffer_pool_capacity = capacity;
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
