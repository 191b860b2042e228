//! Notification projection table
//!
//! Maps notification methods to pure handler functions that turn a
//! notification's `params.data` into derived-state updates. The table is a
//! fixed array, indexed once at client construction.
//!
//! | Method          | Effect                                                        |
//! |-----------------|---------------------------------------------------------------|
//! | `volumeChanged` | volume (clamped to 0-100), mute when `muted` is present       |
//! | `muteChanged`   | mute                                                          |
//! | `playStarted`   | playing; metadata fetched with a follow-up `getItem {id}`     |
//! | `playPaused`    | paused                                                        |
//! | `playResumed`   | playing                                                       |
//! | `playStopped`   | stopped, now-playing cleared                                  |

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::state::{Mute, NowPlaying, PlaybackStatus, StateUpdate, Volume};

/// Wire method names
pub mod methods {
    pub const VOLUME_CHANGED: &str = "volumeChanged";
    pub const MUTE_CHANGED: &str = "muteChanged";
    pub const PLAY_STARTED: &str = "playStarted";
    pub const PLAY_PAUSED: &str = "playPaused";
    pub const PLAY_RESUMED: &str = "playResumed";
    pub const PLAY_STOPPED: &str = "playStopped";

    pub const GET_VOLUME: &str = "getVolume";
    pub const GET_MUTE: &str = "getMute";
    pub const GET_ITEM: &str = "getItem";
    pub const SET_VOLUME: &str = "setVolume";
    pub const SET_MUTE: &str = "setMute";
}

/// A notification handler
pub type Handler = fn(&Value) -> Projection;

/// A secondary call whose result completes a projection
#[derive(Debug, Clone)]
pub struct FollowUp {
    pub method: &'static str,
    pub params: Value,
    /// Turns the call's result into updates
    pub complete: fn(Value) -> Vec<StateUpdate>,
}

/// What a handler wants done
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub updates: Vec<StateUpdate>,
    pub follow_up: Option<FollowUp>,
}

impl Projection {
    fn updates(updates: Vec<StateUpdate>) -> Self {
        Self {
            updates,
            follow_up: None,
        }
    }

    /// Whether this projection moves the player to a different item
    pub fn changes_item(&self) -> bool {
        self.follow_up.is_some()
            || self
                .updates
                .iter()
                .any(|update| matches!(update, StateUpdate::NowPlaying(_)))
    }
}

const HANDLERS: [(&str, Handler); 6] = [
    (methods::VOLUME_CHANGED, volume_changed),
    (methods::MUTE_CHANGED, mute_changed),
    (methods::PLAY_STARTED, play_started),
    (methods::PLAY_PAUSED, play_paused),
    (methods::PLAY_RESUMED, play_resumed),
    (methods::PLAY_STOPPED, play_stopped),
];

/// Method name to handler lookup
#[derive(Debug, Clone)]
pub struct HandlerTable {
    handlers: HashMap<&'static str, Handler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self {
            handlers: HANDLERS.into_iter().collect(),
        }
    }

    pub fn get(&self, method: &str) -> Option<Handler> {
        self.handlers.get(method).copied()
    }

    /// Run the handler for `method`, if there is one
    pub fn project(&self, method: &str, data: &Value) -> Option<Projection> {
        self.get(method).map(|handler| handler(data))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

fn volume_from(value: &Value) -> Option<Volume> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|v| v.round() as i64))
        .map(Volume::from_wire)
}

fn volume_changed(data: &Value) -> Projection {
    let mut updates = Vec::with_capacity(2);
    if let Some(volume) = data.get("volume").and_then(volume_from) {
        updates.push(StateUpdate::Volume(volume));
    }
    if let Some(muted) = data.get("muted").and_then(Value::as_bool) {
        updates.push(StateUpdate::Mute(Mute(muted)));
    }
    Projection::updates(updates)
}

fn mute_changed(data: &Value) -> Projection {
    let updates = data
        .get("muted")
        .and_then(Value::as_bool)
        .map(|muted| vec![StateUpdate::Mute(Mute(muted))])
        .unwrap_or_default();
    Projection::updates(updates)
}

fn play_started(data: &Value) -> Projection {
    let mut projection = Projection::updates(vec![StateUpdate::Playback(PlaybackStatus::Playing)]);

    let Some(item) = data.get("item") else {
        return projection;
    };

    match item.get("id").filter(|id| id.is_string() || id.is_number()) {
        Some(id) => {
            projection.follow_up = Some(FollowUp {
                method: methods::GET_ITEM,
                params: json!({ "id": id }),
                complete: item_metadata,
            });
        }
        // Without an id, whatever metadata came inline is all there is
        None => projection.updates.extend(item_metadata(item.clone())),
    }
    projection
}

fn play_paused(_data: &Value) -> Projection {
    Projection::updates(vec![StateUpdate::Playback(PlaybackStatus::Paused)])
}

fn play_resumed(_data: &Value) -> Projection {
    Projection::updates(vec![StateUpdate::Playback(PlaybackStatus::Playing)])
}

fn play_stopped(_data: &Value) -> Projection {
    Projection::updates(vec![
        StateUpdate::Playback(PlaybackStatus::Stopped),
        StateUpdate::NowPlaying(NowPlaying::default()),
    ])
}

/// Result of `getItem`, or an inline item
fn item_metadata(result: Value) -> Vec<StateUpdate> {
    match serde_json::from_value::<NowPlaying>(result) {
        Ok(item) => vec![StateUpdate::NowPlaying(item)],
        Err(e) => {
            tracing::warn!("Ignoring item metadata that failed to decode: {}", e);
            Vec::new()
        }
    }
}

// ============================================================================
// Confirmations
// ============================================================================

/// A call whose successful result confirms a derived-state field
#[derive(Debug, Clone, Copy)]
pub struct Confirmation {
    pub method: &'static str,
    /// Decodes `(params, result)` into the confirmed value
    pub decode: fn(&Value, &Value) -> Option<StateUpdate>,
}

const CONFIRMATIONS: [Confirmation; 4] = [
    Confirmation {
        method: methods::GET_VOLUME,
        decode: decode_volume,
    },
    Confirmation {
        method: methods::GET_MUTE,
        decode: decode_mute,
    },
    Confirmation {
        method: methods::SET_VOLUME,
        decode: confirm_volume,
    },
    Confirmation {
        method: methods::SET_MUTE,
        decode: confirm_mute,
    },
];

/// Calls made right after connecting to seed derived state
pub const HANDSHAKE: [&str; 2] = [methods::GET_VOLUME, methods::GET_MUTE];

/// The confirmation for `method`, if its result feeds derived state
pub fn confirmation(method: &str) -> Option<Confirmation> {
    CONFIRMATIONS
        .into_iter()
        .find(|confirmation| confirmation.method == method)
}

fn decode_volume(_params: &Value, result: &Value) -> Option<StateUpdate> {
    volume_from(result).map(StateUpdate::Volume)
}

fn decode_mute(_params: &Value, result: &Value) -> Option<StateUpdate> {
    result.as_bool().map(|muted| StateUpdate::Mute(Mute(muted)))
}

/// The hub may echo the applied level; otherwise the requested one stands
fn confirm_volume(params: &Value, result: &Value) -> Option<StateUpdate> {
    decode_volume(params, result).or_else(|| {
        params
            .get("volume")
            .and_then(volume_from)
            .map(StateUpdate::Volume)
    })
}

fn confirm_mute(params: &Value, result: &Value) -> Option<StateUpdate> {
    decode_mute(params, result).or_else(|| {
        params
            .get("muted")
            .and_then(Value::as_bool)
            .map(|muted| StateUpdate::Mute(Mute(muted)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(method: &str, data: Value) -> Projection {
        HandlerTable::new()
            .project(method, &data)
            .unwrap_or_else(|| panic!("No handler for {}", method))
    }

    #[test]
    fn test_table_covers_every_method_once() {
        let table = HandlerTable::new();
        assert_eq!(table.len(), HANDLERS.len());
        for (method, _) in HANDLERS {
            assert!(table.get(method).is_some());
        }
        assert!(table.project("libraryUpdated", &Value::Null).is_none());
    }

    #[test]
    fn test_volume_changed() {
        assert_eq!(
            project("volumeChanged", json!({"volume": 55})).updates,
            vec![StateUpdate::Volume(Volume(55))]
        );
        assert_eq!(
            project("volumeChanged", json!({"volume": 140, "muted": true})).updates,
            vec![StateUpdate::Volume(Volume(100)), StateUpdate::Mute(Mute(true))]
        );
        assert_eq!(
            project("volumeChanged", json!({"volume": 12.6})).updates,
            vec![StateUpdate::Volume(Volume(13))]
        );
        assert!(project("volumeChanged", json!({"volume": "loud"})).updates.is_empty());
    }

    #[test]
    fn test_mute_changed() {
        assert_eq!(
            project("muteChanged", json!({"muted": false})).updates,
            vec![StateUpdate::Mute(Mute(false))]
        );
        assert!(project("muteChanged", Value::Null).updates.is_empty());
    }

    #[test]
    fn test_play_started_requests_metadata() {
        let projection = project("playStarted", json!({"item": {"id": "track-9"}}));
        assert_eq!(
            projection.updates,
            vec![StateUpdate::Playback(PlaybackStatus::Playing)]
        );
        assert!(projection.changes_item());

        let follow_up = projection.follow_up.unwrap();
        assert_eq!(follow_up.method, "getItem");
        assert_eq!(follow_up.params, json!({"id": "track-9"}));

        let updates = (follow_up.complete)(json!({
            "title": "So What",
            "description": "Kind of Blue",
            "artwork": "http://hub/art/9.jpg"
        }));
        assert_eq!(
            updates,
            vec![StateUpdate::NowPlaying(NowPlaying {
                title: Some("So What".to_string()),
                description: Some("Kind of Blue".to_string()),
                artwork: Some("http://hub/art/9.jpg".to_string()),
            })]
        );
        assert!((follow_up.complete)(json!("not an item")).is_empty());
    }

    #[test]
    fn test_play_started_without_id_uses_inline_metadata() {
        let projection = project("playStarted", json!({"item": {"title": "Radio"}}));
        assert!(projection.follow_up.is_none());
        assert_eq!(projection.updates.len(), 2);
        assert!(projection.changes_item());

        let bare = project("playStarted", Value::Null);
        assert!(!bare.changes_item());
    }

    #[test]
    fn test_transport_transitions() {
        assert_eq!(
            project("playPaused", Value::Null).updates,
            vec![StateUpdate::Playback(PlaybackStatus::Paused)]
        );
        assert_eq!(
            project("playResumed", json!({})).updates,
            vec![StateUpdate::Playback(PlaybackStatus::Playing)]
        );

        let stopped = project("playStopped", Value::Null);
        assert!(stopped.changes_item());
        assert!(!project("playPaused", Value::Null).changes_item());
    }

    #[test]
    fn test_confirmation_decoders() {
        assert_eq!(HANDSHAKE, ["getVolume", "getMute"]);
        for method in HANDSHAKE {
            assert!(confirmation(method).is_some());
        }
        assert!(confirmation("getItem").is_none());

        let get_volume = confirmation("getVolume").unwrap();
        assert_eq!((get_volume.decode)(&Value::Null, &json!(42)), Some(StateUpdate::Volume(Volume(42))));
        assert_eq!((get_volume.decode)(&Value::Null, &Value::Null), None);

        let get_mute = confirmation("getMute").unwrap();
        assert_eq!((get_mute.decode)(&Value::Null, &json!(true)), Some(StateUpdate::Mute(Mute(true))));
        assert_eq!((get_mute.decode)(&Value::Null, &json!(1)), None);
    }

    #[test]
    fn test_set_confirmations_fall_back_to_params() {
        let set_volume = confirmation("setVolume").unwrap();
        assert_eq!(
            (set_volume.decode)(&json!({"volume": 20}), &Value::Null),
            Some(StateUpdate::Volume(Volume(20)))
        );
        // An echoed level wins over the requested one
        assert_eq!(
            (set_volume.decode)(&json!({"volume": 120}), &json!(100)),
            Some(StateUpdate::Volume(Volume(100)))
        );
        assert_eq!((set_volume.decode)(&Value::Null, &json!("ok")), None);

        let set_mute = confirmation("setMute").unwrap();
        assert_eq!(
            (set_mute.decode)(&json!({"muted": true}), &json!("ok")),
            Some(StateUpdate::Mute(Mute(true)))
        );
    }
}
