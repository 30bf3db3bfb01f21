//! Shadow type definitions
//!
//! Defines the thing reference, the aggregate state flags, the lifecycle
//! events consumed by the engine and the notifications it produces.

use bitflags::bitflags;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::store::StateStore;

/// Reference to a thing owned by the registry
///
/// The engine only reads these attributes, it never creates things.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThingRef {
    /// Identifier, unique within its domain
    pub id: String,
    /// Optional grouping key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Private things are never shadowed
    #[serde(default)]
    pub private: bool,
}

impl ThingRef {
    /// Create a public thing reference
    pub fn new(domain: Option<&str>, id: &str) -> Self {
        Self {
            id: id.to_string(),
            domain: domain.map(str::to_string),
            private: false,
        }
    }

    /// Same reference with the private flag set
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Domain as a borrowed str
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Unique identifier across domains (`domain.id` or `id`)
    pub fn uid(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{}.{}", domain, self.id),
            None => self.id.clone(),
        }
    }
}

impl std::fmt::Display for ThingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{}.{}", domain, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Split a uid (`domain.id` or `id`) into its domain and id parts
pub fn split_uid(uid: &str) -> (Option<&str>, &str) {
    match uid.split_once('.') {
        Some((domain, id)) if !domain.is_empty() && !id.is_empty() => (Some(domain), id),
        _ => (None, uid),
    }
}

bitflags! {
    /// Bitset of state flags
    ///
    /// Used both as the per-event marker set delivered with lifecycle events and
    /// as the aggregate flags accumulated since the last flush.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct StateFlags: u8 {
        /// At least one value differs from its previous value
        const CHANGED = 0b001;
        /// At least one thing asked to be published
        const PUBLISHING = 0b010;
        /// Immediate delivery requested, bypassing the quiet period
        const FORCED = 0b100;
    }
}

impl Serialize for StateFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("StateFlags", 3)?;
        s.serialize_field("changed", &self.contains(StateFlags::CHANGED))?;
        s.serialize_field("publishing", &self.contains(StateFlags::PUBLISHING))?;
        s.serialize_field("forced", &self.contains(StateFlags::FORCED))?;
        s.end()
    }
}

/// Kind of a state event delivered to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEventKind {
    /// The value differs from the previous one
    Changed,
    /// Publishing requested without a value change
    Publishing,
}

/// Lifecycle events emitted by the registry
#[derive(Debug, Clone, PartialEq)]
pub enum ThingEvent {
    Created {
        thing: ThingRef,
        state: Value,
    },
    Removed {
        thing: ThingRef,
    },
    MadePrivate {
        thing: ThingRef,
    },
    /// A new value is about to land
    StateChanging {
        thing: ThingRef,
    },
    StateChanged {
        thing: ThingRef,
        state: Value,
        flags: StateFlags,
    },
    StatePublishing {
        thing: ThingRef,
        state: Value,
        flags: StateFlags,
    },
}

/// Kind of notification produced by a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowEventKind {
    /// At least one shadowed value changed
    ShadowChanged,
    /// At least one thing asked to be published
    ShadowPublishing,
}

impl std::fmt::Display for ShadowEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShadowEventKind::ShadowChanged => write!(f, "shadow_changed"),
            ShadowEventKind::ShadowPublishing => write!(f, "shadow_publishing"),
        }
    }
}

/// Snapshot handed to subscribers on every flush
///
/// Subscribers get it by reference: the delta and the flags are reset right
/// after the notification returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShadowState {
    pub full_shadow: StateStore,
    pub delta_shadow: StateStore,
    pub flags: StateFlags,
}

/// Owned copy of the engine state, for queries outside a notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShadowSnapshot {
    pub full_shadow: Value,
    pub delta_shadow: Value,
    pub flags: StateFlags,
    pub window_active: bool,
    pub flush_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid() {
        assert_eq!(ThingRef::new(Some("light"), "kitchen").uid(), "light.kitchen");
        assert_eq!(ThingRef::new(None, "door").uid(), "door");
        assert_eq!(ThingRef::new(Some("light"), "kitchen").to_string(), "light.kitchen");
    }

    #[test]
    fn test_split_uid() {
        assert_eq!(split_uid("light.kitchen"), (Some("light"), "kitchen"));
        assert_eq!(split_uid("door"), (None, "door"));
        assert_eq!(split_uid(".door"), (None, ".door"));
    }

    #[test]
    fn test_flags() {
        let mut flags = StateFlags::empty();
        assert!(flags.is_empty());

        flags |= StateFlags::CHANGED;
        flags.insert(StateFlags::PUBLISHING);
        assert!(flags.contains(StateFlags::CHANGED));
        assert!(flags.contains(StateFlags::CHANGED | StateFlags::PUBLISHING));
        assert!(!flags.contains(StateFlags::FORCED));

        flags.remove(StateFlags::CHANGED | StateFlags::PUBLISHING);
        assert_eq!(flags, StateFlags::empty());
    }

    #[test]
    fn test_flags_serialize() {
        let flags = StateFlags::CHANGED | StateFlags::FORCED;
        let json = serde_json::to_value(flags).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "changed": true, "publishing": false, "forced": true })
        );
    }
}
