//! Per-load in-memory key/value store exposed to scripts
//!
//! Each load gets a fresh store; a reload starts from whatever the module's
//! top-level code seeds it with.

use parking_lot::RwLock;
use rhai::{Array, Dynamic, Engine, INT, Map};
use std::sync::Arc;

#[derive(Debug, Default)]
struct StoreInner {
    values: Map,
    last_id: INT,
}

/// Shared handle to one module's store.
#[derive(Debug, Clone, Default)]
pub struct ModuleStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl ModuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Dynamic {
        self.inner
            .read()
            .values
            .get(key)
            .cloned()
            .unwrap_or(Dynamic::UNIT)
    }

    pub fn set(&self, key: &str, value: Dynamic) {
        self.inner.write().values.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Dynamic {
        self.inner
            .write()
            .values
            .remove(key)
            .unwrap_or(Dynamic::UNIT)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().values.contains_key(key)
    }

    pub fn keys(&self) -> Array {
        self.inner
            .read()
            .values
            .keys()
            .map(|k| Dynamic::from(k.to_string()))
            .collect()
    }

    pub fn values(&self) -> Array {
        self.inner.read().values.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next value of a monotonically increasing id counter, starting at 1.
    pub fn next_id(&self) -> INT {
        let mut inner = self.inner.write();
        inner.last_id += 1;
        inner.last_id
    }

    /// Register `store_*` and `next_id` host functions bound to this store.
    pub(crate) fn register(&self, engine: &mut Engine) {
        let s = self.clone();
        engine.register_fn("store_get", move |key: &str| s.get(key));
        let s = self.clone();
        engine.register_fn("store_get", move |key: INT| s.get(&key.to_string()));

        let s = self.clone();
        engine.register_fn("store_set", move |key: &str, value: Dynamic| s.set(key, value));
        let s = self.clone();
        engine.register_fn("store_set", move |key: INT, value: Dynamic| {
            s.set(&key.to_string(), value)
        });

        let s = self.clone();
        engine.register_fn("store_remove", move |key: &str| s.remove(key));
        let s = self.clone();
        engine.register_fn("store_remove", move |key: INT| s.remove(&key.to_string()));

        let s = self.clone();
        engine.register_fn("store_has", move |key: &str| s.contains(key));
        let s = self.clone();
        engine.register_fn("store_has", move |key: INT| s.contains(&key.to_string()));

        let s = self.clone();
        engine.register_fn("store_keys", move || s.keys());
        let s = self.clone();
        engine.register_fn("store_values", move || s.values());
        let s = self.clone();
        engine.register_fn("store_len", move || s.len() as INT);
        let s = self.clone();
        engine.register_fn("next_id", move || s.next_id());
    }
}
