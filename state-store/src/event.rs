//! Change events for property updates
//!
//! Two shapes are published for every change:
//!
//! - [`Change<P>`] on the property's own channel, carrying the value before
//!   and after the write
//! - [`ChangeEvent`] on the store-wide channel, carrying only the key, for
//!   consumers that watch everything and read values back on demand

use std::time::Instant;

/// A typed property transition
#[derive(Debug, Clone, PartialEq)]
pub struct Change<P> {
    /// Value before the write
    pub old: P,
    /// Value after the write
    pub new: P,
}

/// A store-wide notification that some property changed
///
/// Use [`StateStore::get`](crate::StateStore::get) to read the new value.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// The property key that changed (matches `Property::KEY`)
    pub property_key: &'static str,

    /// When the change was applied
    pub timestamp: Instant,
}

impl ChangeEvent {
    pub fn new(property_key: &'static str) -> Self {
        Self {
            property_key,
            timestamp: Instant::now(),
        }
    }
}

impl PartialEq for ChangeEvent {
    fn eq(&self, other: &Self) -> bool {
        // Timestamp not included in equality
        self.property_key == other.property_key
    }
}
