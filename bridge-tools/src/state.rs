//! Key/value state shared by the sandbox bridge and the tool-call server.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use bridge_primitives::{
    CapabilityDescriptor, CapabilityDescriptorBuilder, CapabilityName, ParamKind, ParamSpec,
};
use serde_json::Value;

use crate::registry::{CapabilityError, CapabilityRegistry, CapabilityResult};

/// Registered name of the read capability.
pub const GET: &str = "state_get";

/// Registered name of the write capability.
pub const SET: &str = "state_set";

/// Lock-guarded string map. Last writer wins; readers never observe a partial
/// write.
#[derive(Debug, Default)]
pub struct StateStore {
    entries: RwLock<HashMap<String, String>>,
}

impl StateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into())
    }

    /// Returns a sorted copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Describes `state_get`.
    ///
    /// # Errors
    ///
    /// Propagates descriptor validation failures.
    pub fn get_descriptor() -> bridge_primitives::Result<CapabilityDescriptor> {
        CapabilityDescriptor::builder(CapabilityName::new(GET)?)
            .description("Read the string stored under a key; null when absent")?
            .param(ParamSpec::required("key", ParamKind::String)?)
            .and_then(CapabilityDescriptorBuilder::build)
    }

    /// Describes `state_set`.
    ///
    /// # Errors
    ///
    /// Propagates descriptor validation failures.
    pub fn set_descriptor() -> bridge_primitives::Result<CapabilityDescriptor> {
        CapabilityDescriptor::builder(CapabilityName::new(SET)?)
            .description("Store a string under a key, replacing any previous value")?
            .param(ParamSpec::required("key", ParamKind::String)?)?
            .param(ParamSpec::required("value", ParamKind::String)?)
            .and_then(CapabilityDescriptorBuilder::build)
    }

    /// Registers `state_get` and `state_set`, both backed by `store`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Duplicate`] if either name is taken.
    pub fn register(store: &Arc<Self>, registry: &CapabilityRegistry) -> CapabilityResult<()> {
        let reader = Arc::clone(store);
        registry.register(
            Self::get_descriptor()?,
            move |arguments: Value| -> CapabilityResult<Value> {
                let key = key_argument(&arguments)?;
                Ok(reader.get(key).map_or(Value::Null, Value::String))
            },
        )?;

        let writer = Arc::clone(store);
        registry.register(
            Self::set_descriptor()?,
            move |arguments: Value| -> CapabilityResult<Value> {
                let key = key_argument(&arguments)?;
                let value = arguments
                    .get("value")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CapabilityError::invalid_arguments("`value` must be a string"))?;
                writer.set(key, value);
                Ok(Value::Null)
            },
        )
    }
}

fn key_argument(arguments: &Value) -> CapabilityResult<&str> {
    match arguments.get("key").and_then(Value::as_str) {
        Some("") => Err(CapabilityError::invalid_arguments("`key` cannot be empty")),
        Some(key) => Ok(key),
        None => Err(CapabilityError::invalid_arguments("`key` must be a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn registry() -> (Arc<StateStore>, CapabilityRegistry) {
        let store = Arc::new(StateStore::new());
        let registry = CapabilityRegistry::new();
        StateStore::register(&store, &registry).unwrap();
        (store, registry)
    }

    #[test]
    fn set_then_get_round_trips() {
        let (store, registry) = registry();
        registry
            .call(SET, json!({ "key": "x", "value": "42" }))
            .unwrap();

        assert_eq!(registry.call(GET, json!({ "key": "x" })).unwrap(), json!("42"));
        assert_eq!(store.get("x").as_deref(), Some("42"));
    }

    #[test]
    fn missing_key_reads_as_null() {
        let (_, registry) = registry();
        assert_eq!(
            registry.call(GET, json!({ "key": "nope" })).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn empty_key_is_rejected() {
        let (store, registry) = registry();
        let err = registry
            .call(SET, json!({ "key": "", "value": "v" }))
            .expect_err("empty key");
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn last_writer_wins() {
        let store = StateStore::new();
        assert_eq!(store.set("k", "a"), None);
        assert_eq!(store.set("k", "b").as_deref(), Some("a"));
        assert_eq!(store.get("k").as_deref(), Some("b"));
    }

    #[test]
    fn concurrent_writers_leave_a_whole_value() {
        let store = Arc::new(StateStore::new());
        let values: Vec<String> = (0..8)
            .map(|i| format!("value-{i}-{}", "x".repeat(64)))
            .collect();

        let handles: Vec<_> = values
            .iter()
            .cloned()
            .map(|value| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..100 {
                        store.set("shared", value.clone());
                        let seen = store.get("shared").unwrap();
                        assert!(seen.starts_with("value-") && seen.ends_with(&"x".repeat(64)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let last = store.get("shared").unwrap();
        assert!(values.contains(&last));
        assert_eq!(store.snapshot().len(), 1);
    }
}
