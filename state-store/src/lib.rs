//! Typed State Store
//!
//! A small, type-safe property store with change detection and async change
//! subscriptions.
//!
//! # Features
//!
//! - **Type-safe Storage**: each property is its own type, keyed by `TypeId`
//! - **Defaults**: every property reads as `P::default()` until written, and can be reset
//! - **Change Detection**: writes of an equal value publish nothing
//! - **Typed Subscriptions**: [`Change<P>`] carries the value before and after
//! - **Key Stream**: [`ChangeEvent`] announces every change store-wide
//!
//! # Quick Start
//!
//! ```rust
//! use state_store::{Property, StateStore};
//!
//! #[derive(Clone, Default, PartialEq, Debug)]
//! struct Muted(bool);
//!
//! impl Property for Muted {
//!     const KEY: &'static str = "muted";
//! }
//!
//! let store = StateStore::new();
//! let mut events = store.changes();
//!
//! store.set(Muted(true));
//! assert_eq!(store.get::<Muted>(), Muted(true));
//! assert_eq!(events.try_recv().unwrap().property_key, Muted::KEY);
//!
//! store.reset_all();
//! assert_eq!(store.get::<Muted>(), Muted(false));
//! ```

pub mod event;
pub mod property;
pub mod store;
pub mod subscription;

pub use event::{Change, ChangeEvent};
pub use property::Property;
pub use store::{PropertyBag, StateStore, DEFAULT_CAPACITY};
pub use subscription::{ChangeReceiver, PropertyReceiver, Subscription};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::event::{Change, ChangeEvent};
    pub use crate::property::Property;
    pub use crate::store::StateStore;
    pub use crate::subscription::{ChangeReceiver, PropertyReceiver};
}
