//! Property trait for typed, watchable state values
//!
//! # Example
//!
//! ```rust
//! use state_store::Property;
//!
//! #[derive(Clone, Default, PartialEq, Debug)]
//! pub struct Brightness(pub u8);
//!
//! impl Property for Brightness {
//!     const KEY: &'static str = "brightness";
//! }
//! ```

use std::fmt::Debug;

/// Marker trait for values held in a [`StateStore`](crate::StateStore)
///
/// - `Default`: the value a property has before it is first set and after a reset
/// - `PartialEq`: change detection, so writing an equal value is a no-op
/// - `Clone + Send + Sync + 'static`: values are handed to subscribers on other tasks
pub trait Property: Clone + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Unique key identifying this property type
    ///
    /// Appears in key-level change events and in logs.
    const KEY: &'static str;
}
