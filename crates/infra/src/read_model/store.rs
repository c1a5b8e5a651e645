use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadModelError {
    #[error("read model lock poisoned")]
    Poisoned,
}

/// Key/value store for read models that can be thrown away and rebuilt.
pub trait ReadModelStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError>;
    fn upsert(&self, key: K, value: V) -> Result<(), ReadModelError>;
    fn list(&self) -> Result<Vec<V>, ReadModelError>;
    /// Drop every record (rebuild support).
    fn clear(&self) -> Result<(), ReadModelError>;
}

impl<K, V, S> ReadModelStore<K, V> for Arc<S>
where
    S: ReadModelStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) -> Result<(), ReadModelError> {
        (**self).upsert(key, value)
    }

    fn list(&self) -> Result<Vec<V>, ReadModelError> {
        (**self).list()
    }

    fn clear(&self) -> Result<(), ReadModelError> {
        (**self).clear()
    }
}

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryReadModelStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryReadModelStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryReadModelStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadModelStore<K, V> for InMemoryReadModelStore<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError> {
        let map = self.inner.read().map_err(|_| ReadModelError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn upsert(&self, key: K, value: V) -> Result<(), ReadModelError> {
        let mut map = self.inner.write().map_err(|_| ReadModelError::Poisoned)?;
        map.insert(key, value);
        Ok(())
    }

    fn list(&self) -> Result<Vec<V>, ReadModelError> {
        let map = self.inner.read().map_err(|_| ReadModelError::Poisoned)?;
        Ok(map.values().cloned().collect())
    }

    fn clear(&self) -> Result<(), ReadModelError> {
        let mut map = self.inner.write().map_err(|_| ReadModelError::Poisoned)?;
        map.clear();
        Ok(())
    }
}
