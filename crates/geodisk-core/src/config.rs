// SPDX-License-Identifier: Apache-2.0
//! Configuration port: a storage-agnostic `ConfigStore` plus a typed
//! `ConfigService` built on top of it.
//!
//! Mirrors the split between a raw key/value storage port and a typed
//! service layer: callers ask `ConfigService` for a deserialized value, and
//! only the `ConfigStore` implementation knows whether that value lives on
//! disk, in memory, or somewhere else.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CoreError;

/// Storage port for raw configuration blobs, keyed by logical name.
pub trait ConfigStore {
    /// Loads a raw blob. Returns [`CoreError::NotFound`] when the key is
    /// absent.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, CoreError>;

    /// Persists a raw blob, creating or overwriting the entry for `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), CoreError>;
}

/// Thin service that (de)serializes typed config values and delegates
/// storage to a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Creates a new service backed by `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Consumes the service, returning the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Loads and deserializes the value for `key`. Returns `Ok(None)` when
    /// the key is absent — applying a config twice must be idempotent, so
    /// callers treat an absent key as "use the default" rather than an
    /// error.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, CoreError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    CoreError::Internal(format!("config deserialize {key}: {e}"))
                })?;
                Ok(Some(value))
            }
            Err(CoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serializes and persists `value` for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), CoreError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)
            .map_err(|e| CoreError::Internal(format!("config serialize {key}: {e}")))?;
        self.store.save_raw(key, &data)
    }
}

/// In-memory [`ConfigStore`], used by tests and as the default for
/// short-lived processes that have no durable config directory.
#[derive(Default)]
pub struct MemoryConfigStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, CoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CoreError::Internal("config store lock poisoned".into()))?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("config key {key}")))
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), CoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CoreError::Internal("config store lock poisoned".into()))?;
        entries.insert(key.to_string(), data.to_vec());
        Ok(())
    }
}

/// Filesystem-backed [`ConfigStore`], one JSON file per key under a root
/// directory. The production adapter for durable config (changes
/// to scheduler parameters are written to a durable config store).
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Creates a store rooted at `base`, creating the directory if needed.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let base = base.into();
        fs::create_dir_all(&base).map_err(|e| CoreError::io(base.display().to_string(), e))?;
        Ok(Self { base })
    }

    /// Creates a store rooted at the platform config directory (e.g.
    /// `~/.config/geodisk` on Linux), the production entry point daemons
    /// use to persist `setParameter` changes across restarts.
    pub fn platform_default() -> Result<Self, CoreError> {
        let proj = directories::ProjectDirs::from("dev", "geodisk", "geodisk")
            .ok_or_else(|| CoreError::Internal("could not resolve platform config directory".into()))?;
        Self::new(proj.config_dir())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are namespaced tuples joined with '.', e.g. "geosched.fillRatioLimit".
        let filename = format!("{}.json", key.replace([';', ':', '/'], "_"));
        self.base.join(filename)
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, CoreError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::NotFound(format!("config key {key}")))
            }
            Err(e) => Err(CoreError::io(path.display().to_string(), e)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), CoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent.display().to_string(), e))?;
        }
        fs::write(&path, data).map_err(|e| CoreError::io(path.display().to_string(), e))
    }
}
