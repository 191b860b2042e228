//! Type-erased property storage and the shared state store
//!
//! ```text
//! StateStore (Clone, shared)
//!     │
//!     ├── bag: RwLock<PropertyBag>
//!     │       │
//!     │       └── HashMap<TypeId, Slot<P>>
//!     │               ├── value: P
//!     │               └── changes: broadcast::Sender<Change<P>>
//!     │
//!     └── events: broadcast::Sender<ChangeEvent>
//! ```
//!
//! Every property starts at `P::default()`. Writes compare against the current
//! value and publish only when it actually changed. Notifications are sent
//! while the write lock is held, so subscribers observe transitions in the
//! order they were applied.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::event::{Change, ChangeEvent};
use crate::property::Property;
use crate::subscription::{ChangeReceiver, PropertyReceiver};

/// Default broadcast buffer for every channel the store creates
pub const DEFAULT_CAPACITY: usize = 64;

// ============================================================================
// Slots - one typed value plus its change channel
// ============================================================================

struct Slot<P: Property> {
    value: P,
    changes: broadcast::Sender<Change<P>>,
}

impl<P: Property> Slot<P> {
    fn new(capacity: usize) -> Self {
        let (changes, _rx) = broadcast::channel(capacity);
        Self {
            value: P::default(),
            changes,
        }
    }

    fn replace(&mut self, value: P) -> bool {
        if self.value == value {
            return false;
        }

        let old = std::mem::replace(&mut self.value, value);
        // No subscribers is not an error
        let _ = self.changes.send(Change {
            old,
            new: self.value.clone(),
        });
        true
    }
}

/// Operations the bag needs without knowing the concrete property type
trait ErasedSlot: Send + Sync {
    fn key(&self) -> &'static str;
    fn reset(&mut self) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<P: Property> ErasedSlot for Slot<P> {
    fn key(&self) -> &'static str {
        P::KEY
    }

    fn reset(&mut self) -> bool {
        self.replace(P::default())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// PropertyBag - type-erased storage keyed by TypeId
// ============================================================================

/// Type-erased storage for a set of properties
///
/// Uses `TypeId` to store and retrieve strongly-typed values.
pub struct PropertyBag {
    slots: HashMap<TypeId, Box<dyn ErasedSlot>>,
    capacity: usize,
}

impl PropertyBag {
    /// Create an empty bag whose change channels buffer `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn slot<P: Property>(&self) -> Option<&Slot<P>> {
        self.slots
            .get(&TypeId::of::<P>())
            .and_then(|slot| slot.as_any().downcast_ref::<Slot<P>>())
    }

    fn slot_mut<P: Property>(&mut self) -> Option<&mut Slot<P>> {
        let capacity = self.capacity;
        self.slots
            .entry(TypeId::of::<P>())
            .or_insert_with(|| Box::new(Slot::<P>::new(capacity)))
            .as_any_mut()
            .downcast_mut::<Slot<P>>()
    }

    /// Current value, or the default if never set
    pub fn get<P: Property>(&self) -> P {
        self.slot::<P>()
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    /// Set a value, returning whether it changed
    pub fn set<P: Property>(&mut self, value: P) -> bool {
        self.slot_mut::<P>()
            .map(|slot| slot.replace(value))
            .unwrap_or(false)
    }

    /// Whether a slot exists for this property
    pub fn contains<P: Property>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<P>())
    }

    /// Return every property to its default, yielding the keys that changed
    fn reset_all(&mut self) -> Vec<&'static str> {
        self.slots
            .values_mut()
            .filter_map(|slot| slot.reset().then(|| slot.key()))
            .collect()
    }

    /// Number of properties with a slot
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for PropertyBag {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.slots.values().map(|slot| slot.key()).collect();
        keys.sort_unstable();
        f.debug_struct("PropertyBag").field("properties", &keys).finish()
    }
}

// ============================================================================
// StateStore - shared, observable property bag
// ============================================================================

/// Shared typed state with change detection
///
/// Cloning the store yields another handle to the same state.
///
/// # Example
///
/// ```rust
/// use state_store::{Property, StateStore};
///
/// #[derive(Clone, Default, PartialEq, Debug)]
/// struct Volume(u8);
///
/// impl Property for Volume {
///     const KEY: &'static str = "volume";
/// }
///
/// let store = StateStore::new();
/// let mut changes = store.subscribe::<Volume>();
///
/// assert_eq!(store.get::<Volume>(), Volume(0));
/// assert!(store.set(Volume(42)));
/// assert!(!store.set(Volume(42)));
///
/// let change = changes.try_recv().unwrap();
/// assert_eq!((change.old, change.new), (Volume(0), Volume(42)));
/// assert!(changes.try_recv().is_none());
/// ```
#[derive(Clone)]
pub struct StateStore {
    bag: Arc<RwLock<PropertyBag>>,
    events: broadcast::Sender<ChangeEvent>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a store whose channels buffer `capacity` events per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (events, _rx) = broadcast::channel(capacity);
        Self {
            bag: Arc::new(RwLock::new(PropertyBag::new(capacity))),
            events,
        }
    }

    /// Current value of a property (its default if never set)
    pub fn get<P: Property>(&self) -> P {
        self.bag.read().get::<P>()
    }

    /// Write a property, publishing a change if the value differs
    ///
    /// Returns whether the value changed.
    pub fn set<P: Property>(&self, value: P) -> bool {
        let mut bag = self.bag.write();
        let changed = bag.set(value);
        if changed {
            self.emit(P::KEY);
        }
        changed
    }

    /// Update a property in place
    ///
    /// The closure works on a copy; the result is written back through
    /// [`set`](Self::set), so an edit that leaves the value equal is silent.
    pub fn modify<P, F>(&self, f: F) -> bool
    where
        P: Property,
        F: FnOnce(&mut P),
    {
        let mut bag = self.bag.write();
        let mut value = bag.get::<P>();
        f(&mut value);
        let changed = bag.set(value);
        if changed {
            self.emit(P::KEY);
        }
        changed
    }

    /// Return one property to its default
    pub fn reset<P: Property>(&self) -> bool {
        self.set(P::default())
    }

    /// Return every known property to its default
    ///
    /// Returns the number of properties that actually changed.
    pub fn reset_all(&self) -> usize {
        let mut bag = self.bag.write();
        let changed = bag.reset_all();
        for key in changed.iter().copied() {
            self.emit(key);
        }
        if !changed.is_empty() {
            tracing::debug!("Reset {} properties to defaults: {:?}", changed.len(), changed);
        }
        changed.len()
    }

    /// Subscribe to one property's transitions
    ///
    /// Only changes applied after this call are delivered.
    pub fn subscribe<P: Property>(&self) -> PropertyReceiver<P> {
        let mut bag = self.bag.write();
        let capacity = bag.capacity;
        let receiver = match bag.slot_mut::<P>() {
            Some(slot) => slot.changes.subscribe(),
            // Unreachable in practice; a detached channel simply never fires
            None => broadcast::channel(capacity).1,
        };
        PropertyReceiver::new(receiver)
    }

    /// Subscribe to key-level events for every property
    pub fn changes(&self) -> ChangeReceiver {
        ChangeReceiver::new(self.events.subscribe())
    }

    /// Whether this property has been written or subscribed to
    pub fn contains<P: Property>(&self) -> bool {
        self.bag.read().contains::<P>()
    }

    /// Number of properties the store knows about
    pub fn len(&self) -> usize {
        self.bag.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bag.read().is_empty()
    }

    fn emit(&self, key: &'static str) {
        let _ = self.events.send(ChangeEvent::new(key));
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("bag", &*self.bag.read())
            .finish()
    }
}
