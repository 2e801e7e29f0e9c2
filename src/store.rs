//! Hierarchical key-value store the simulator publishes into.
//!
//! Paths are slash-separated (`system/commands`). `set` replaces the value
//! at a path, `update` merges the given keys into the object at a path, and
//! writing `null` deletes. Last writer wins.

use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store path: {0:?}")]
    InvalidPath(String),
    #[error("value at {0:?} is not an object")]
    NotAnObject(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal store contract used by the agent.
pub trait Store {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;
    fn set(&mut self, path: &str, value: Value) -> Result<(), StoreError>;
    fn update(&mut self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;
}

fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

/// In-process JSON tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    root: Value,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    fn lookup(&self, parts: &[&str]) -> Option<&Value> {
        parts.iter().try_fold(&self.root, |node, key| node.get(*key))
    }

    /// Walk to `parts`, creating intermediate objects (and replacing scalars
    /// in the way) as needed.
    fn lookup_or_create(&mut self, parts: &[&str]) -> &mut Value {
        let mut node = &mut self.root;
        for key in parts {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = &mut node[*key];
        }
        node
    }

    fn delete(&mut self, parts: &[&str]) {
        let Some((last, parents)) = parts.split_last() else {
            self.root = Value::Object(Map::new());
            return;
        };
        let parent = parents
            .iter()
            .try_fold(&mut self.root, |node, key| node.get_mut(*key));
        if let Some(Value::Object(map)) = parent {
            map.remove(*last);
        }
    }
}

impl Store for MemoryStore {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let parts = segments(path)?;
        Ok(self.lookup(&parts).filter(|v| !v.is_null()).cloned())
    }

    fn set(&mut self, path: &str, value: Value) -> Result<(), StoreError> {
        let parts = segments(path)?;
        if value.is_null() {
            self.delete(&parts);
        } else {
            *self.lookup_or_create(&parts) = value;
        }
        Ok(())
    }

    fn update(&mut self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let parts = segments(path)?;
        let node = self.lookup_or_create(&parts);
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return Err(StoreError::NotAnObject(path.to_string()));
        };
        for (key, value) in fields {
            if value.is_null() {
                map.remove(&key);
            } else {
                map.insert(key, value);
            }
        }
        Ok(())
    }
}

/// Cloneable handle to a [`MemoryStore`] shared between the simulation loop
/// and network clients.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<MemoryStore>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStore::new())),
        }
    }

    pub fn snapshot(&self) -> Result<Value, StoreError> {
        let guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.root().clone())
    }
}

impl Store for SharedStore {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)?.get(path)
    }

    fn set(&mut self, path: &str, value: Value) -> Result<(), StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)?.set(path, value)
    }

    fn update(&mut self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .update(path, fields)
    }
}
