//! Test helpers for driving a `HubClient` against the in-memory hub.
//!
//! This module provides:
//! - A client configuration with short timers
//! - `HubSide`, a thin wrapper over a mock session that decodes requests and
//!   writes responses and notifications
//! - Connect and barrier helpers

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use hub_rpc::{ClientConfig, HubClient};
use hub_transport::mock::{MockRemote, MockSession};
use serde_json::{json, Value};

/// Upper bound on any single wait in a test
pub const WAIT: Duration = Duration::from_secs(2);

/// Short timers so tests never sit on the defaults
pub fn test_config() -> ClientConfig {
    ClientConfig::new()
        .with_call_timeout(Duration::from_millis(500))
        .with_connect_timeout(Duration::from_secs(1))
        .with_reconnect_interval(Duration::from_millis(50))
        .with_shutdown_timeout(Duration::from_secs(1))
}

/// Await `future`, failing the test if it takes longer than [`WAIT`]
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("Timed out waiting")
}

/// A request as written by the client
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub id: String,
    pub method: String,
    pub params: Value,
}

/// The hub's end of one connection
pub struct HubSide {
    pub session: MockSession,
}

impl HubSide {
    pub fn new(session: MockSession) -> Self {
        Self { session }
    }

    /// Next request the client wrote
    pub async fn next_request(&mut self) -> SentRequest {
        let bytes = within(self.session.next_sent())
            .await
            .expect("Client transport dropped");
        let value: Value = serde_json::from_slice(&bytes).expect("Request is not JSON");

        SentRequest {
            id: value["id"].as_str().expect("Request without id").to_string(),
            method: value["method"]
                .as_str()
                .expect("Request without method")
                .to_string(),
            params: value.get("params").cloned().unwrap_or(Value::Null),
        }
    }

    /// Next request, which must be for `method`
    pub async fn expect(&mut self, method: &str) -> SentRequest {
        let request = self.next_request().await;
        assert_eq!(request.method, method, "Unexpected request {:?}", request);
        request
    }

    pub fn respond(&self, id: &str, result: Value) {
        self.send(json!({"id": id, "result": result}));
    }

    pub fn respond_error(&self, id: &str, code: i64, message: &str) {
        self.send(json!({"id": id, "error": {"code": code, "message": message}}));
    }

    pub fn notify(&self, method: &str, data: Value) {
        self.send(json!({"method": method, "params": {"data": data}}));
    }

    pub fn send(&self, message: Value) {
        assert!(
            self.session.push(message.to_string()),
            "Client side of the session is gone"
        );
    }

    /// Answer the post-connect volume and mute reads
    pub async fn serve_handshake(&mut self, volume: i64, muted: bool) {
        for _ in 0..2 {
            let request = self.next_request().await;
            match request.method.as_str() {
                "getVolume" => self.respond(&request.id, json!(volume)),
                "getMute" => self.respond(&request.id, json!(muted)),
                other => panic!("Unexpected handshake request {}", other),
            }
        }
    }
}

/// Connect `client`, serving the handshake when it is enabled
pub async fn connect(
    client: &HubClient,
    remote: &mut MockRemote,
    volume: i64,
    muted: bool,
) -> HubSide {
    let handshake = client.config().handshake;
    let (connected, hub) = tokio::join!(client.connect(), async {
        let session = within(remote.accept())
            .await
            .expect("Connector dropped");
        let mut hub = HubSide::new(session);
        if handshake {
            hub.serve_handshake(volume, muted).await;
        }
        hub
    });

    connected.expect("Connect failed");
    hub
}

/// Round-trip a call so every message pushed before it has been dispatched
pub async fn sync(client: &HubClient, hub: &mut HubSide) {
    let (result, _) = tokio::join!(client.call_raw("ping", None), async {
        let request = hub.expect("ping").await;
        hub.respond(&request.id, Value::Null);
    });
    result.expect("Barrier call failed");
}
