//! Derived device state
//!
//! Values here are never set by callers. They are projected from hub
//! notifications and handshake results by the connection's read loop, reset
//! to defaults when the connection drops, and observable through typed
//! subscriptions.

use serde::{Deserialize, Serialize};
use state_store::{ChangeReceiver, Property, PropertyReceiver, StateStore};

// ============================================================================
// Properties
// ============================================================================

/// Output volume (0-100)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume(pub u8);

impl Property for Volume {
    const KEY: &'static str = "volume";
}

impl Volume {
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    /// Clamp a wire integer into range
    pub fn from_wire(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Mute state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mute(pub bool);

impl Property for Mute {
    const KEY: &'static str = "mute";
}

impl Mute {
    pub fn is_muted(&self) -> bool {
        self.0
    }
}

/// Transport state of the player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl Property for PlaybackStatus {
    const KEY: &'static str = "playback_status";
}

impl PlaybackStatus {
    const WIRE_NAMES: [(PlaybackStatus, &'static str); 3] = [
        (PlaybackStatus::Stopped, "stopped"),
        (PlaybackStatus::Playing, "playing"),
        (PlaybackStatus::Paused, "paused"),
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            PlaybackStatus::Stopped => "stopped",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
        }
    }

    pub fn from_wire(text: &str) -> Option<Self> {
        Self::WIRE_NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(text))
            .map(|(status, _)| *status)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackStatus::Playing)
    }
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of the item being played
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NowPlaying {
    pub title: Option<String>,
    pub description: Option<String>,
    pub artwork: Option<String>,
}

impl Property for NowPlaying {
    const KEY: &'static str = "now_playing";
}

impl NowPlaying {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.artwork.is_none()
    }
}

// ============================================================================
// Updates
// ============================================================================

/// One field update produced by a projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Volume(Volume),
    Mute(Mute),
    Playback(PlaybackStatus),
    NowPlaying(NowPlaying),
}

// ============================================================================
// DeviceState
// ============================================================================

/// Read handle on the derived state of the connected hub
///
/// Cheap to clone; every clone observes the same values.
#[derive(Debug, Clone)]
pub struct DeviceState {
    store: StateStore,
}

impl DeviceState {
    pub(crate) fn new(capacity: usize) -> Self {
        let store = StateStore::with_capacity(capacity);
        // Create every slot up front so a reset covers all fields
        store.set(Volume::default());
        store.set(Mute::default());
        store.set(PlaybackStatus::default());
        store.set(NowPlaying::default());
        Self { store }
    }

    pub fn volume(&self) -> u8 {
        self.store.get::<Volume>().value()
    }

    pub fn is_muted(&self) -> bool {
        self.store.get::<Mute>().is_muted()
    }

    pub fn playback(&self) -> PlaybackStatus {
        self.store.get::<PlaybackStatus>()
    }

    pub fn now_playing(&self) -> NowPlaying {
        self.store.get::<NowPlaying>()
    }

    pub fn title(&self) -> Option<String> {
        self.now_playing().title
    }

    pub fn description(&self) -> Option<String> {
        self.now_playing().description
    }

    pub fn artwork(&self) -> Option<String> {
        self.now_playing().artwork
    }

    /// Typed old/new transitions of one field
    ///
    /// ```rust,ignore
    /// let mut volume = client.state().subscribe::<Volume>();
    /// while let Some(change) = volume.recv().await {
    ///     println!("volume {} -> {}", change.old.0, change.new.0);
    /// }
    /// ```
    pub fn subscribe<P: Property>(&self) -> PropertyReceiver<P> {
        self.store.subscribe::<P>()
    }

    /// Key-level events for every field
    pub fn changes(&self) -> ChangeReceiver {
        self.store.changes()
    }

    /// Apply one update; returns whether the field changed
    pub(crate) fn apply(&self, update: StateUpdate) -> bool {
        match update {
            StateUpdate::Volume(volume) => self.store.set(volume),
            StateUpdate::Mute(mute) => self.store.set(mute),
            StateUpdate::Playback(status) => self.store.set(status),
            StateUpdate::NowPlaying(item) => self.store.set(item),
        }
    }

    /// Return every field to its default
    pub(crate) fn reset(&self) -> usize {
        self.store.reset_all()
    }
}
