//! Persisted key-value storage boundary.
//!
//! The host's extension storage is asynchronous and may be unavailable while
//! the service is being torn down. Every read and write goes through
//! [`KvStore`] so the service logic can run against [`MemoryStore`] in tests
//! and the CLI.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Storage keys of the persisted layout.
pub mod keys {
    pub const CONFIG: &str = "config";
    pub const SECRET: &str = "secret";
    pub const THREATS_COUNTERED: &str = "threats_countered";
    pub const THREAT_LOGS: &str = "threat_logs";
    pub const RECENT_EVENTS: &str = "recent_events";
    pub const TAB_THREATS: &str = "tab_threats";
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Load and deserialize a value. A value of the wrong shape is an error,
/// a missing one is `None`.
pub async fn load<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>, StoreError> {
    let Some(value) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })
}

pub async fn save<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value).await
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store. `set_available(false)` makes every call fail, which
/// is how tests exercise the fail-safe paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Raw view of one key, bypassing availability.
    pub async fn peek(&self, key: &str) -> Option<Value> {
        self.data.lock().await.get(key).cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store switched off".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.check()?;
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.check()?;
        self.data.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.data.lock().await.remove(key);
        Ok(())
    }
}

/// [`MemoryStore`] that yields to the scheduler before every call, so
/// concurrent read-modify-write sequences interleave in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct YieldingStore {
    inner: MemoryStore,
}

#[cfg(test)]
impl YieldingStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl KvStore for YieldingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_save_roundtrip() {
        let store = MemoryStore::new();
        save(&store, keys::THREATS_COUNTERED, &7u64).await.unwrap();
        let n: Option<u64> = load(&store, keys::THREATS_COUNTERED).await.unwrap();
        assert_eq!(n, Some(7));
        let missing: Option<u64> = load(&store, keys::TAB_THREATS).await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_load_wrong_shape_is_malformed() {
        let store = MemoryStore::new();
        store.set(keys::THREATS_COUNTERED, json!("many")).await.unwrap();
        let err = load::<u64>(&store, keys::THREATS_COUNTERED).await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();
        store.set_available(false);
        assert!(store.get("a").await.is_err());
        assert!(store.set("a", json!(2)).await.is_err());
        assert!(store.remove("a").await.is_err());
        assert_eq!(store.peek("a").await, Some(json!(1)));
    }
}
