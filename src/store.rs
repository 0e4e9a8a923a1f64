//! Host-side collaborators: secret storage, a short-term cache and a
//! persistent key/value state store.
//!
//! Hosts inject their own implementations; the in-memory ones here back the
//! tests and single-process embedders.
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::ProviderError;

/// Secret values (API keys, OAuth client secrets and tokens) addressed by key id.
pub trait SecretStore: Send + Sync {
    fn get_value(&self, key_id: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns [`ProviderError::Storage`] when the value cannot be persisted.
    fn set_value(&self, key_id: &str, value: &str) -> Result<(), ProviderError>;
}

/// Short-term cache with per-entry time to live.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value, ttl: Duration);
    fn invalidate(&self, key: &str);
}

/// Persistent key/value state without expiry.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// # Errors
    ///
    /// Returns [`ProviderError::Storage`] when the value cannot be persisted.
    fn set(&self, key: &str, value: Value) -> Result<(), ProviderError>;

    /// # Errors
    ///
    /// Returns [`ProviderError::Storage`] when the key cannot be removed.
    fn delete(&self, key: &str) -> Result<(), ProviderError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySecretStore {
    values: RwLock<FxHashMap<String, String>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for tests and static setups.
    #[must_use]
    pub fn with_value(self, key_id: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.write().insert(key_id.into(), value.into());
        self
    }
}

impl SecretStore for MemorySecretStore {
    fn get_value(&self, key_id: &str) -> Option<String> {
        self.values.read().get(key_id).cloned()
    }

    fn set_value(&self, key_id: &str, value: &str) -> Result<(), ProviderError> {
        self.values
            .write()
            .insert(key_id.to_string(), value.to_string());
        Ok(())
    }
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<FxHashMap<String, CacheEntry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if now < entry.expires_at => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it unless someone refreshed it in between.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| now >= entry.expires_at) {
            entries.remove(key);
        }
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .insert(key.to_string(), CacheEntry { value, expires_at });
    }

    fn invalidate(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    values: RwLock<FxHashMap<String, Value>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ProviderError> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), ProviderError> {
        self.values.write().remove(key);
        Ok(())
    }
}
