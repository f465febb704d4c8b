//! Durable key -> JSON value persistence.
//!
//! Writers are serialized by the component that owns a key (the pool lock for
//! pool state, the name lock for the name cache), so stores only need to make
//! single writes atomic.

use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Mutex,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::{errors::Error, Result};

pub trait DurableStore: Send + Sync {
    /// `Ok(None)` when nothing was ever saved under `key`.
    fn load_value(&self, key: &str) -> Result<Option<serde_json::Value>>;

    fn save_value(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

impl<'a> dyn DurableStore + 'a {
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.load_value(key)? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.save_value(key, serde_json::to_value(value)?)
    }
}

/// One JSON file per key under a root directory.
///
/// `a/b` is stored as `<root>/a/b.json`; writes go through a temp file and a
/// rename so a crash never leaves a half-written state file.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in key.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(Error::Config(format!("invalid store key: {key:?}")));
            }
            path.push(part);
        }
        path.set_extension("json");
        Ok(path)
    }
}

impl DurableStore for JsonFileStore {
    fn load_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let txt = fs::read_to_string(&path)?;
        if txt.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&txt)?))
    }

    fn save_value(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(&value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: serde_json::Value) -> Self {
        let store = Self::default();
        store.insert(key, value);
        store
    }

    fn insert(&self, key: &str, value: serde_json::Value) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }
}

impl DurableStore for MemoryStore {
    fn load_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.get(key))
    }

    fn save_value(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.insert(key, value);
        Ok(())
    }
}
