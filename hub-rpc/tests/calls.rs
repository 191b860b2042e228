//! Call correlation tests.
//!
//! These tests verify, against the in-memory hub:
//! - Results reach exactly the call that issued them
//! - Calls while disconnected are canceled without touching the transport
//! - Timed-out calls are evicted and their late responses dropped
//! - Error payloads and undecodable results surface as typed errors

mod test_helpers;

use std::time::{Duration, Instant};

use futures::future::join_all;
use hub_rpc::{CallError, CancelReason, HubClient, Volume};
use hub_transport::mock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use test_helpers::{connect, sync, test_config, within};

#[tokio::test]
async fn test_end_to_end_call_and_notification() {
    let (connector, mut remote) = mock::pair();
    let client = HubClient::with_config(connector, test_config().with_handshake(false)).unwrap();
    let mut hub = connect(&client, &mut remote, 0, false).await;
    assert_eq!(client.state().volume(), 0);

    let (volume, _) = tokio::join!(client.call::<u8>("getVolume", None), async {
        let request = hub.expect("getVolume").await;
        assert_eq!(request.params, Value::Null);
        hub.respond(&request.id, json!(42));
    });
    assert_eq!(tokio_test::assert_ok!(volume), 42);
    assert_eq!(client.state().volume(), 42);

    let mut changes = client.state().subscribe::<Volume>();
    hub.notify("volumeChanged", json!({"volume": 55}));
    sync(&client, &mut hub).await;

    let changes = changes.drain();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].old, Volume(42));
    assert_eq!(changes[0].new, Volume(55));
    assert_eq!(client.state().volume(), 55);

    client.dispose().await;
}

#[tokio::test]
async fn test_set_calls_confirm_derived_state() {
    let (connector, mut remote) = mock::pair();
    let client = HubClient::with_config(connector, test_config().with_handshake(false)).unwrap();
    let mut hub = connect(&client, &mut remote, 0, false).await;
    let mut volume = client.state().subscribe::<Volume>();

    // Acknowledged without an echo: the requested level stands
    let (set, _) = tokio::join!(client.call_raw("setVolume", Some(json!({"volume": 20}))), async {
        let request = hub.expect("setVolume").await;
        hub.respond(&request.id, Value::Null);
    });
    assert!(set.is_ok());
    assert_eq!(client.state().volume(), 20);

    // The hub echoes the level it applied
    let (set, _) = tokio::join!(client.call_raw("setVolume", Some(json!({"volume": 140}))), async {
        let request = hub.expect("setVolume").await;
        hub.respond(&request.id, json!(100));
    });
    assert!(set.is_ok());
    assert_eq!(client.state().volume(), 100);

    let (muted, _) = tokio::join!(client.call::<bool>("getMute", None), async {
        let request = hub.expect("getMute").await;
        hub.respond(&request.id, json!(true));
    });
    assert!(muted.unwrap());
    assert!(client.state().is_muted());

    let (unmuted, _) = tokio::join!(client.call_raw("setMute", Some(json!({"muted": false}))), async {
        let request = hub.expect("setMute").await;
        hub.respond(&request.id, json!("ok"));
    });
    assert!(unmuted.is_ok());
    assert!(!client.state().is_muted());

    let changes = volume.drain();
    assert_eq!(changes.len(), 2);
    assert_eq!((changes[0].old, changes[0].new), (Volume(0), Volume(20)));
    assert_eq!((changes[1].old, changes[1].new), (Volume(20), Volume(100)));

    client.dispose().await;
}

#[tokio::test]
async fn test_concurrent_calls_get_their_own_results() {
    let (connector, mut remote) = mock::pair();
    let client = HubClient::with_config(connector, test_config().with_handshake(false)).unwrap();
    let mut hub = connect(&client, &mut remote, 0, false).await;

    const CALLS: u64 = 16;
    let calls = join_all(
        (0..CALLS).map(|n| client.call::<u64>("getItem", Some(json!({"id": n})))),
    );

    let (results, _) = tokio::join!(calls, async {
        let mut requests = Vec::new();
        for _ in 0..CALLS {
            requests.push(hub.expect("getItem").await);
        }
        // Answer in reverse order of arrival
        for request in requests.iter().rev() {
            let n = request.params["id"].as_u64().unwrap();
            hub.respond(&request.id, json!(n * 10));
        }
    });

    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), n as u64 * 10);
    }

    let stats = client.stats();
    assert_eq!(stats.calls_issued, CALLS);
    assert_eq!(stats.calls_succeeded, CALLS);
    assert_eq!(stats.pending, 0);

    client.dispose().await;
}

#[tokio::test]
async fn test_call_while_disconnected_is_canceled_without_writing() {
    let (connector, remote) = mock::pair();
    remote.refuse_connections(true);
    let config = test_config();
    let connect_timeout = config.connect_timeout;
    let client = HubClient::with_config(connector, config).unwrap();

    let started = Instant::now();
    let result = client.call::<u8>("getVolume", None).await;
    assert!(started.elapsed() < connect_timeout);

    let error = result.unwrap_err();
    assert_eq!(error.cancel_reason(), Some(CancelReason::NotConnected));
    assert_eq!(remote.write_count(), 0);

    // A connect was requested in the background
    within(async {
        while remote.connect_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(remote.write_count(), 0);
    assert_eq!(client.stats().calls_canceled, 1);

    client.dispose().await;
}

#[tokio::test]
async fn test_requested_connect_lets_a_retry_succeed() {
    let (connector, mut remote) = mock::pair();
    let client = HubClient::with_config(connector, test_config().with_handshake(false)).unwrap();

    let error = client.call::<bool>("getMute", None).await.unwrap_err();
    assert!(error.is_canceled());

    let session = within(remote.accept()).await.unwrap();
    let mut hub = test_helpers::HubSide::new(session);
    within(async {
        while !client.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    let (muted, _) = tokio::join!(client.call::<bool>("getMute", None), async {
        let request = hub.expect("getMute").await;
        hub.respond(&request.id, json!(true));
    });
    assert!(muted.unwrap());

    client.dispose().await;
}

#[tokio::test]
async fn test_late_response_is_dropped() {
    let (connector, mut remote) = mock::pair();
    let config = test_config()
        .with_handshake(false)
        .with_call_timeout(Duration::from_millis(100));
    let client = HubClient::with_config(connector, config).unwrap();
    let mut hub = connect(&client, &mut remote, 0, false).await;

    let (timed_out, stale) = tokio::join!(client.call::<u8>("getVolume", None), async {
        hub.expect("getVolume").await
    });
    assert_eq!(
        timed_out.unwrap_err().cancel_reason(),
        Some(CancelReason::Timeout(Duration::from_millis(100)))
    );
    assert_eq!(client.stats().pending, 0);

    // The stale answer arrives before the next call's answer
    hub.respond(&stale.id, json!(1));
    let (volume, _) = tokio::join!(client.call::<u8>("getVolume", None), async {
        let request = hub.expect("getVolume").await;
        assert_ne!(request.id, stale.id);
        hub.respond(&request.id, json!(2));
    });
    assert_eq!(volume.unwrap(), 2);

    let stats = client.stats();
    assert_eq!(stats.calls_timed_out, 1);
    assert_eq!(stats.late_responses, 1);
    assert_eq!(stats.calls_succeeded, 1);

    client.dispose().await;
}

#[tokio::test]
async fn test_remote_error_is_typed() {
    let (connector, mut remote) = mock::pair();
    let client = HubClient::with_config(connector, test_config().with_handshake(false)).unwrap();
    let mut hub = connect(&client, &mut remote, 0, false).await;

    let (result, _) = tokio::join!(client.call::<Value>("setVolume", Some(json!({"volume": 300}))), async {
        let request = hub.expect("setVolume").await;
        hub.respond_error(&request.id, -32602, "volume out of range");
    });

    match result {
        Err(CallError::Remote {
            method,
            code,
            message,
        }) => {
            assert_eq!(method, "setVolume");
            assert_eq!(code, -32602);
            assert_eq!(message, "volume out of range");
        }
        other => panic!("Expected remote error, got {:?}", other),
    }
    assert_eq!(client.stats().calls_failed, 1);

    client.dispose().await;
}

#[derive(Debug, Serialize)]
struct SeekParams {
    position: u32,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Position {
    position: u32,
    duration: u32,
}

#[tokio::test]
async fn test_typed_params_and_results() {
    let (connector, mut remote) = mock::pair();
    let client = HubClient::with_config(connector, test_config().with_handshake(false)).unwrap();
    let mut hub = connect(&client, &mut remote, 0, false).await;

    let (position, _) = tokio::join!(
        client.call_with::<_, Position>("seek", &SeekParams { position: 90 }),
        async {
            let request = hub.expect("seek").await;
            assert_eq!(request.params, json!({"position": 90}));
            hub.respond(&request.id, json!({"position": 90, "duration": 337}));
        }
    );
    assert_eq!(
        position.unwrap(),
        Position {
            position: 90,
            duration: 337
        }
    );

    let (decoded, _) = tokio::join!(client.call::<Position>("getPosition", None), async {
        let request = hub.expect("getPosition").await;
        hub.respond(&request.id, json!("not a position"));
    });
    let error = tokio_test::assert_err!(decoded);
    assert!(matches!(error, CallError::Decode { ref method, .. } if method == "getPosition"));

    client.dispose().await;
}
