//! StateStore - two-level mapping of thing states
//!
//! Stores thing states keyed by domain then id, or directly by id for things
//! without a domain. Every top-level entry is tagged as a leaf state or a
//! domain group, so clearing and applying never have to guess the shape of a
//! key. Used for both the full shadow and the delta shadow.

use super::error::ShadowError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// States of the things sharing one domain, keyed by id
type GroupMap = HashMap<String, Value>;

/// Top-level store entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoreEntry {
    /// State of a thing without a domain
    Leaf(Value),
    /// States of every thing in one domain
    Group(GroupMap),
}

/// Two-level mapping (domain?, id) -> state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StateStore {
    entries: HashMap<String, StoreEntry>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the state of a thing
    ///
    /// Creates the domain group on first use. Fails with
    /// [`ShadowError::KeyConflict`] when the key path is already taken by an
    /// entry of the other shape; nothing is created in that case.
    pub fn put(&mut self, domain: Option<&str>, id: &str, value: Value) -> Result<(), ShadowError> {
        match domain {
            None => match self.entries.get_mut(id) {
                Some(StoreEntry::Group(_)) => Err(ShadowError::KeyConflict { key: id.to_string() }),
                Some(StoreEntry::Leaf(current)) => {
                    *current = value;
                    Ok(())
                }
                None => {
                    self.entries.insert(id.to_string(), StoreEntry::Leaf(value));
                    Ok(())
                }
            },
            Some(domain) => match self.entries.entry(domain.to_string()) {
                Entry::Occupied(occupied) => match occupied.into_mut() {
                    StoreEntry::Group(group) => {
                        group.insert(id.to_string(), value);
                        Ok(())
                    }
                    StoreEntry::Leaf(_) => Err(ShadowError::KeyConflict {
                        key: domain.to_string(),
                    }),
                },
                Entry::Vacant(vacant) => {
                    let mut group = GroupMap::new();
                    group.insert(id.to_string(), value);
                    vacant.insert(StoreEntry::Group(group));
                    Ok(())
                }
            },
        }
    }

    /// Get the state of a thing
    pub fn get(&self, domain: Option<&str>, id: &str) -> Option<&Value> {
        match (domain, self.entries.get(domain.unwrap_or(id))?) {
            (None, StoreEntry::Leaf(value)) => Some(value),
            (Some(_), StoreEntry::Group(group)) => group.get(id),
            _ => None,
        }
    }

    pub fn has(&self, domain: Option<&str>, id: &str) -> bool {
        self.get(domain, id).is_some()
    }

    /// Remove the state of a thing, dropping its domain group once empty
    ///
    /// Removing an absent entry is a no-op. A key path that resolves to an
    /// entry of the other shape is reported as a conflict and nothing is
    /// removed.
    pub fn remove(&mut self, domain: Option<&str>, id: &str) -> Result<Option<Value>, ShadowError> {
        match domain {
            None => {
                if self.is_group(id) {
                    return Err(ShadowError::KeyConflict { key: id.to_string() });
                }
                match self.entries.remove(id) {
                    Some(StoreEntry::Leaf(value)) => Ok(Some(value)),
                    _ => Ok(None),
                }
            }
            Some(domain) => {
                let group = match self.entries.get_mut(domain) {
                    None => return Ok(None),
                    Some(StoreEntry::Leaf(_)) => {
                        return Err(ShadowError::KeyConflict {
                            key: domain.to_string(),
                        })
                    }
                    Some(StoreEntry::Group(group)) => group,
                };
                let removed = group.remove(id);
                if group.is_empty() {
                    self.entries.remove(domain);
                }
                Ok(removed)
            }
        }
    }

    /// Whether `key` names a domain group
    pub fn is_group(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(StoreEntry::Group(_)))
    }

    /// Remove every group and every leaf
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of thing states stored
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                StoreEntry::Leaf(_) => 1,
                StoreEntry::Group(group) => group.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(domain, id, state)` triples
    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &str, &Value)> + '_ {
        self.entries.iter().flat_map(|(key, entry)| {
            let items: Box<dyn Iterator<Item = (Option<&str>, &str, &Value)> + '_> = match entry {
                StoreEntry::Leaf(value) => Box::new(std::iter::once((None, key.as_str(), value))),
                StoreEntry::Group(group) => Box::new(
                    group
                        .iter()
                        .map(move |(id, value)| (Some(key.as_str()), id.as_str(), value)),
                ),
            };
            items
        })
    }

    /// Render the store as a JSON object, groups as nested objects
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (key, entry) in &self.entries {
            let value = match entry {
                StoreEntry::Leaf(value) => value.clone(),
                StoreEntry::Group(group) => Value::Object(
                    group
                        .iter()
                        .map(|(id, value)| (id.clone(), value.clone()))
                        .collect(),
                ),
            };
            root.insert(key.clone(), value);
        }
        Value::Object(root)
    }
}
