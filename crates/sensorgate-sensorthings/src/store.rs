//! Stores for synthetic entities
//!
//! Sensors, ObservedProperties and FeaturesOfInterest created over REST
//! have no durable twin backing until they are linked to a datastream; in
//! the meantime they live in an injected store. The in-memory
//! implementation is a concurrent map with last-writer-wins semantics on
//! concurrent updates to the same key.

use std::collections::HashMap;
use std::sync::RwLock;

/// Keyed storage for one synthetic entity type.
pub trait DtoStore<T>: Send + Sync {
    /// Insert or replace the entity under the given id.
    fn insert(&self, id: &str, dto: T);

    /// Fetch a copy of the entity, if present.
    fn get(&self, id: &str) -> Option<T>;

    /// Remove and return the entity, if present.
    fn remove(&self, id: &str) -> Option<T>;

    /// Copies of all stored entities, ordered by id.
    fn values(&self) -> Vec<T>;
}

/// Concurrent-map store.
#[derive(Debug)]
pub struct MemoryDtoStore<T> {
    inner: RwLock<HashMap<String, T>>,
}

impl<T> Default for MemoryDtoStore<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> MemoryDtoStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Clone + Send + Sync> DtoStore<T> for MemoryDtoStore<T> {
    fn insert(&self, id: &str, dto: T) {
        self.inner
            .write()
            .expect("store lock poisoned")
            .insert(id.to_string(), dto);
    }

    fn get(&self, id: &str) -> Option<T> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .get(id)
            .cloned()
    }

    fn remove(&self, id: &str) -> Option<T> {
        self.inner.write().expect("store lock poisoned").remove(id)
    }

    fn values(&self) -> Vec<T> {
        let guard = self.inner.read().expect("store lock poisoned");
        let mut entries: Vec<(&String, &T)> = guard.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, v)| v.clone()).collect()
    }
}
