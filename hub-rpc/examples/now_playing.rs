//! Connect to a hub and print derived state as it changes.
//!
//! ```text
//! PLAYER_HUB_LOG_MODE=development cargo run --example now_playing -- ws://192.168.1.20:9000/api
//! ```

use std::time::Duration;

use hub_rpc::{ClientConfig, ConnectionEvent, HubClient, NowPlaying, PlaybackStatus, Volume};
use hub_transport::WebSocketConnector;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    hub_rpc::init_logging_from_env()?;

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9000/api".to_string());

    println!("1. Connecting to {}...", endpoint);
    let connector = WebSocketConnector::new(&endpoint)?;
    let client = HubClient::with_config(
        connector,
        ClientConfig::responsive().with_call_timeout(Duration::from_secs(3)),
    )?;
    client.connect().await?;
    println!("✓ Connected");

    let state = client.state();
    println!("\n2. Current state");
    println!("   Volume:   {}%", state.volume());
    println!("   Muted:    {}", state.is_muted());
    println!("   Playback: {}", state.playback());

    println!("\n3. Watching for changes (Ctrl+C to quit)...");
    let mut volume = state.subscribe::<Volume>();
    let mut playback = state.subscribe::<PlaybackStatus>();
    let mut now_playing = state.subscribe::<NowPlaying>();
    let mut connection = client.subscribe_connection();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(change) = volume.recv() => {
                println!("   Volume {}% -> {}%", change.old.0, change.new.0);
            }
            Some(change) = playback.recv() => {
                println!("   Playback {} -> {}", change.old, change.new);
            }
            Some(change) = now_playing.recv() => match change.new.title {
                Some(title) => println!(
                    "   Now playing: {} ({})",
                    title,
                    change.new.description.unwrap_or_default()
                ),
                None => println!("   Nothing playing"),
            },
            Ok(event) = connection.recv() => match event {
                ConnectionEvent::Connected => println!("✓ Reconnected"),
                ConnectionEvent::Disconnected { reason } => {
                    println!("✗ Disconnected: {} (retrying in the background)", reason)
                }
            },
        }
    }

    println!("\n4. Disposing client...");
    client.dispose().await;
    println!("✓ Done");
    Ok(())
}
