//! ApplyGateway - actuation path from a state document to the things
//!
//! Accepts a full or partial shadow document and pushes every entry into the
//! matching shadowed thing through the registry. Only things present in the
//! full shadow are touched; everything else in the document is skipped.

use super::error::ShadowError;
use super::store::StateStore;
use crate::registry::ThingRegistry;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

/// Read-only view over the full shadow used to route applied states
pub struct ApplyGateway<'a> {
    full_shadow: &'a StateStore,
    registry: &'a dyn ThingRegistry,
}

impl<'a> ApplyGateway<'a> {
    pub fn new(full_shadow: &'a StateStore, registry: &'a dyn ThingRegistry) -> Self {
        Self {
            full_shadow,
            registry,
        }
    }

    /// Apply a state document
    ///
    /// Keys naming a shadowed domain are followed one level down; any other
    /// key is taken as the id of a thing without a domain.
    ///
    /// # Returns
    ///
    /// Number of things whose state was set. Success only means the document
    /// was an object, not that any thing was updated.
    ///
    /// # Errors
    ///
    /// [`ShadowError::InvalidDocument`] if the document is not an object.
    pub fn apply(&self, document: &Value) -> Result<usize, ShadowError> {
        let Some(entries) = document.as_object() else {
            let found = ShadowError::json_kind(document);
            error!(found, "Invalid shadow, an object is expected");
            return Err(ShadowError::InvalidDocument { found });
        };

        let mut applied = 0;
        for (key, value) in entries {
            if self.full_shadow.is_group(key) {
                match value.as_object() {
                    Some(group) => {
                        for (id, state) in group {
                            applied += self.apply_one(Some(key.as_str()), id, state);
                        }
                    }
                    None => warn!(domain = %key, "Domain entry is not an object, skipping"),
                }
            } else {
                applied += self.apply_one(None, key, value);
            }
        }

        debug!(applied, "Shadow document applied");
        Ok(applied)
    }

    /// Decode a JSON document and apply it
    ///
    /// # Errors
    ///
    /// [`ShadowError::Decode`] if the text is not valid JSON, otherwise the
    /// errors of [`apply`](Self::apply).
    pub fn apply_json(&self, text: &str) -> Result<usize, ShadowError> {
        let document: Value = serde_json::from_str(text).map_err(|e| {
            error!("Invalid json shadow format: {}", e);
            ShadowError::Decode(e)
        })?;
        self.apply(&document)
    }

    fn apply_one(&self, domain: Option<&str>, id: &str, state: &Value) -> usize {
        if !self.full_shadow.has(domain, id) {
            trace!(?domain, id, "Not a shadowed thing, skipping");
            return 0;
        }
        let Some(thing) = self.registry.find(domain, id) else {
            warn!(?domain, id, "Shadowed thing missing from the registry");
            return 0;
        };
        match self.registry.set_state(&thing, state) {
            Ok(()) => {
                trace!(uid = %thing, ?state, "State applied");
                1
            }
            Err(e) => {
                warn!(uid = %thing, "Failed to apply state: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ThingListener;
    use crate::shadow::ThingRef;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Registry recording every state-set call
    #[derive(Default)]
    struct RecordingRegistry {
        things: Vec<ThingRef>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingRegistry {
        fn with(things: &[ThingRef]) -> Self {
            Self {
                things: things.to_vec(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Value)> {
            let mut calls = self.calls.lock().clone();
            calls.sort_by(|a, b| a.0.cmp(&b.0));
            calls
        }
    }

    impl ThingRegistry for RecordingRegistry {
        fn things(&self) -> Vec<ThingRef> {
            self.things.clone()
        }

        fn find(&self, domain: Option<&str>, id: &str) -> Option<ThingRef> {
            self.things
                .iter()
                .find(|t| t.domain() == domain && t.id == id)
                .cloned()
        }

        fn raw_state(&self, _thing: &ThingRef) -> Option<Value> {
            None
        }

        fn set_state(&self, thing: &ThingRef, state: &Value) -> Result<(), ShadowError> {
            self.calls.lock().push((thing.uid(), state.clone()));
            Ok(())
        }

        fn subscribe(&self, _listener: ThingListener) -> Result<(), ShadowError> {
            Ok(())
        }
    }

    fn shadow_ab() -> StateStore {
        let mut shadow = StateStore::new();
        shadow.put(None, "A", json!(1)).unwrap();
        shadow.put(None, "B", json!(2)).unwrap();
        shadow
    }

    #[test]
    fn test_apply_sets_only_listed_things() {
        let registry = RecordingRegistry::with(&[ThingRef::new(None, "A"), ThingRef::new(None, "B")]);
        let shadow = shadow_ab();
        let gateway = ApplyGateway::new(&shadow, &registry);

        assert_eq!(gateway.apply(&json!({ "A": 10 })).unwrap(), 1);
        assert_eq!(registry.calls(), vec![("A".to_string(), json!(10))]);
    }

    #[test]
    fn test_apply_unknown_thing_is_skipped() {
        let registry = RecordingRegistry::with(&[ThingRef::new(None, "A"), ThingRef::new(None, "B")]);
        let shadow = shadow_ab();
        let gateway = ApplyGateway::new(&shadow, &registry);

        assert_eq!(gateway.apply(&json!({ "C": 5 })).unwrap(), 0);
        assert!(registry.calls().is_empty());
    }

    #[test]
    fn test_apply_rejects_non_object() {
        let registry = RecordingRegistry::with(&[ThingRef::new(None, "A")]);
        let shadow = shadow_ab();
        let gateway = ApplyGateway::new(&shadow, &registry);

        let err = gateway.apply(&json!(42)).unwrap_err();
        assert!(matches!(err, ShadowError::InvalidDocument { found: "number" }));
        assert!(gateway.apply(&json!([1, 2])).is_err());
        assert!(registry.calls().is_empty());
    }

    #[test]
    fn test_apply_follows_domains() {
        let registry = RecordingRegistry::with(&[
            ThingRef::new(Some("light"), "kitchen"),
            ThingRef::new(Some("light"), "hall"),
            ThingRef::new(None, "door"),
        ]);
        let mut shadow = StateStore::new();
        shadow.put(Some("light"), "kitchen", json!(false)).unwrap();
        shadow.put(Some("light"), "hall", json!(false)).unwrap();
        shadow.put(None, "door", json!("closed")).unwrap();
        let gateway = ApplyGateway::new(&shadow, &registry);

        let applied = gateway
            .apply(&json!({
                "light": { "kitchen": true, "garage": true },
                "door": "open",
                "kitchen": 1
            }))
            .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(
            registry.calls(),
            vec![
                ("door".to_string(), json!("open")),
                ("light.kitchen".to_string(), json!(true)),
            ]
        );
    }

    #[test]
    fn test_apply_skips_private_things() {
        // Private things never reach the full shadow
        let registry = RecordingRegistry::with(&[ThingRef::new(None, "secret").private()]);
        let shadow = StateStore::new();
        let gateway = ApplyGateway::new(&shadow, &registry);

        assert_eq!(gateway.apply(&json!({ "secret": 1 })).unwrap(), 0);
        assert!(registry.calls().is_empty());
    }

    #[test]
    fn test_apply_json() {
        let registry = RecordingRegistry::with(&[ThingRef::new(None, "A"), ThingRef::new(None, "B")]);
        let shadow = shadow_ab();
        let gateway = ApplyGateway::new(&shadow, &registry);

        assert_eq!(gateway.apply_json(r#"{"B": {"level": 3}}"#).unwrap(), 1);
        assert_eq!(registry.calls(), vec![("B".to_string(), json!({ "level": 3 }))]);

        let err = gateway.apply_json("{not json").unwrap_err();
        assert!(matches!(err, ShadowError::Decode(_)));
        assert!(gateway.apply_json("42").is_err());
        assert_eq!(registry.calls().len(), 1);
    }
}
