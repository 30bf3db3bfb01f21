//! Thing registry - the source of things and of their lifecycle events
//!
//! The shadow engine only consumes the registry through the [`ThingRegistry`]
//! trait. [`InMemoryRegistry`] is the implementation used by the binary and
//! the tests.

use crate::config::ThingConfig;
use crate::shadow::{ShadowError, StateFlags, ThingEvent, ThingRef};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Callback invoked for every lifecycle event
///
/// Called synchronously by the registry; must be Send + Sync for cross-thread usage.
pub type ThingListener = Arc<dyn Fn(&ThingEvent) + Send + Sync>;

/// Registry trait - what the shadow engine needs from the owner of things
///
/// Note: all methods take &self so a registry can be shared as `Arc<dyn ThingRegistry>`.
/// Implementations use interior mutability for their state.
pub trait ThingRegistry: Send + Sync {
    /// Enumerate every known thing, private ones included
    fn things(&self) -> Vec<ThingRef>;

    /// Look a thing up by domain and id
    fn find(&self, domain: Option<&str>, id: &str) -> Option<ThingRef>;

    /// Current raw state of a thing
    fn raw_state(&self, thing: &ThingRef) -> Option<Value>;

    /// Push an externally supplied value into a thing as its new state
    fn set_state(&self, thing: &ThingRef, state: &Value) -> Result<(), ShadowError>;

    /// Register a lifecycle listener
    fn subscribe(&self, listener: ThingListener) -> Result<(), ShadowError>;
}

type ThingKey = (Option<String>, String);

struct ThingSlot {
    thing: ThingRef,
    state: Value,
    writable: bool,
}

#[derive(Default)]
struct RegistryInner {
    things: HashMap<ThingKey, ThingSlot>,
    listeners: Vec<ThingListener>,
    closed: bool,
}

/// Registry keeping things and their states in memory
#[derive(Default)]
pub struct InMemoryRegistry {
    inner: RwLock<RegistryInner>,
}

fn key_of(domain: Option<&str>, id: &str) -> ThingKey {
    (domain.map(str::to_string), id.to_string())
}

fn uid_of(domain: Option<&str>, id: &str) -> String {
    match domain {
        Some(domain) => format!("{}.{}", domain, id),
        None => id.to_string(),
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry seeded with the things declared in the configuration
    pub fn from_config(things: &[ThingConfig]) -> Result<Self, ShadowError> {
        let registry = Self::new();
        for seed in things {
            let mut thing = ThingRef::new(seed.domain.as_deref(), &seed.id);
            thing.private = seed.private;
            registry.create(thing, seed.state.clone(), seed.writable)?;
        }
        Ok(registry)
    }

    /// Create a thing and announce it
    pub fn create(&self, thing: ThingRef, state: Value, writable: bool) -> Result<ThingRef, ShadowError> {
        {
            let mut inner = self.inner.write();
            if inner.closed {
                return Err(ShadowError::RegistryClosed);
            }
            let key = key_of(thing.domain(), &thing.id);
            if inner.things.contains_key(&key) {
                return Err(ShadowError::DuplicateThing(thing.uid()));
            }
            inner.things.insert(
                key,
                ThingSlot {
                    thing: thing.clone(),
                    state: state.clone(),
                    writable,
                },
            );
        }

        debug!(uid = %thing, "Thing created");
        self.emit(&ThingEvent::Created {
            thing: thing.clone(),
            state,
        });
        Ok(thing)
    }

    /// Remove a thing and announce it
    pub fn remove(&self, domain: Option<&str>, id: &str) -> Result<ThingRef, ShadowError> {
        let slot = self
            .inner
            .write()
            .things
            .remove(&key_of(domain, id))
            .ok_or_else(|| ShadowError::UnknownThing(uid_of(domain, id)))?;

        debug!(uid = %slot.thing, "Thing removed");
        self.emit(&ThingEvent::Removed {
            thing: slot.thing.clone(),
        });
        Ok(slot.thing)
    }

    /// Flag a thing as private and announce it
    pub fn make_private(&self, domain: Option<&str>, id: &str) -> Result<ThingRef, ShadowError> {
        let thing = {
            let mut inner = self.inner.write();
            let slot = inner
                .things
                .get_mut(&key_of(domain, id))
                .ok_or_else(|| ShadowError::UnknownThing(uid_of(domain, id)))?;
            if slot.thing.private {
                return Ok(slot.thing.clone());
            }
            slot.thing.private = true;
            slot.thing.clone()
        };

        debug!(uid = %thing, "Thing made private");
        self.emit(&ThingEvent::MadePrivate {
            thing: thing.clone(),
        });
        Ok(thing)
    }

    /// Update the state of a thing
    ///
    /// A different value is announced with `StateChanging` followed by
    /// `StateChanged`. An identical value is only announced, as
    /// `StatePublishing`, when `flags` carries the forced marker.
    ///
    /// # Returns
    ///
    /// `true` if the value changed
    pub fn update_state(
        &self,
        domain: Option<&str>,
        id: &str,
        state: Value,
        flags: StateFlags,
    ) -> Result<bool, ShadowError> {
        let key = key_of(domain, id);
        let thing = {
            let inner = self.inner.read();
            if inner.closed {
                return Err(ShadowError::RegistryClosed);
            }
            let slot = inner
                .things
                .get(&key)
                .ok_or_else(|| ShadowError::UnknownThing(uid_of(domain, id)))?;
            if slot.state == state {
                let thing = slot.thing.clone();
                drop(inner);
                if flags.contains(StateFlags::FORCED) {
                    self.emit(&ThingEvent::StatePublishing { thing, state, flags });
                }
                return Ok(false);
            }
            slot.thing.clone()
        };

        self.emit(&ThingEvent::StateChanging {
            thing: thing.clone(),
        });

        if let Some(slot) = self.inner.write().things.get_mut(&key) {
            slot.state = state.clone();
        }
        trace!(uid = %thing, ?state, "Thing state updated");

        self.emit(&ThingEvent::StateChanged { thing, state, flags });
        Ok(true)
    }

    /// Ask for the current state of a thing to be published
    pub fn publish(&self, domain: Option<&str>, id: &str, flags: StateFlags) -> Result<(), ShadowError> {
        let (thing, state) = {
            let inner = self.inner.read();
            let slot = inner
                .things
                .get(&key_of(domain, id))
                .ok_or_else(|| ShadowError::UnknownThing(uid_of(domain, id)))?;
            (slot.thing.clone(), slot.state.clone())
        };
        self.emit(&ThingEvent::StatePublishing { thing, state, flags });
        Ok(())
    }

    /// Stop accepting listeners and updates
    pub fn close(&self) {
        let mut inner = self.inner.write();
        inner.closed = true;
        inner.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().things.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().things.is_empty()
    }

    /// Deliver an event to every listener, outside of the lock
    fn emit(&self, event: &ThingEvent) {
        let listeners = self.inner.read().listeners.clone();
        for listener in &listeners {
            listener(event);
        }
    }
}

impl ThingRegistry for InMemoryRegistry {
    fn things(&self) -> Vec<ThingRef> {
        self.inner
            .read()
            .things
            .values()
            .map(|slot| slot.thing.clone())
            .collect()
    }

    fn find(&self, domain: Option<&str>, id: &str) -> Option<ThingRef> {
        self.inner
            .read()
            .things
            .get(&key_of(domain, id))
            .map(|slot| slot.thing.clone())
    }

    fn raw_state(&self, thing: &ThingRef) -> Option<Value> {
        self.inner
            .read()
            .things
            .get(&key_of(thing.domain(), &thing.id))
            .map(|slot| slot.state.clone())
    }

    fn set_state(&self, thing: &ThingRef, state: &Value) -> Result<(), ShadowError> {
        let writable = self
            .inner
            .read()
            .things
            .get(&key_of(thing.domain(), &thing.id))
            .map(|slot| slot.writable)
            .ok_or_else(|| ShadowError::UnknownThing(thing.uid()))?;
        if !writable {
            return Err(ShadowError::NotWritable(thing.uid()));
        }
        self.update_state(thing.domain(), &thing.id, state.clone(), StateFlags::empty())
            .map(|_| ())
    }

    fn subscribe(&self, listener: ThingListener) -> Result<(), ShadowError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(ShadowError::RegistryClosed);
        }
        inner.listeners.push(listener);
        Ok(())
    }
}
