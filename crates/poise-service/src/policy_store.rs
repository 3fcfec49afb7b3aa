//! Persisted policy configuration.
//!
//! The whole policy lives under one storage key and is always written back
//! as a single object. Writers are serialized through one async lock so two
//! settings surfaces saving at once merge instead of clobbering each other.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use poise_core::policy::{ConfigPatch, Dimension, PolicyConfig};

use crate::error::{Result, StoreError};
use crate::store::{keys, save, KvStore};

pub struct PolicyStore {
    kv: Arc<dyn KvStore>,
    write: Mutex<()>,
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore").finish_non_exhaustive()
    }
}

impl PolicyStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write: Mutex::new(()),
        }
    }

    /// Current policy. Never fails: an unreadable store yields the strict
    /// fail-safe config rather than no protection.
    pub async fn load(&self) -> PolicyConfig {
        let loaded = match self.read().await {
            Ok((cfg, false)) => Ok(cfg),
            Ok((_, true)) => self.write_back_normalized().await,
            Err(e) => Err(e),
        };
        match loaded {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("policy store unavailable, applying fail-safe policy: {e}");
                PolicyConfig::fail_safe()
            }
        }
    }

    /// Read and normalize. The flag is set when the stored value differs
    /// from its normalized form.
    async fn read(&self) -> std::result::Result<(PolicyConfig, bool), StoreError> {
        let Some(stored) = self.kv.get(keys::CONFIG).await? else {
            return Ok((PolicyConfig::default(), false));
        };
        let cfg = PolicyConfig::from_value_lossy(stored.clone());
        let stale = serde_json::to_value(&cfg).ok().as_ref() != Some(&stored);
        Ok((cfg, stale))
    }

    /// Re-read under the writer lock and persist the normalized copy, so a
    /// concurrent [`update`](Self::update) is never overwritten.
    async fn write_back_normalized(&self) -> std::result::Result<PolicyConfig, StoreError> {
        let _guard = self.write.lock().await;
        let (cfg, stale) = self.read().await?;
        if stale {
            log::debug!("normalizing stored policy");
            if let Err(e) = save(self.kv.as_ref(), keys::CONFIG, &cfg).await {
                log::warn!("could not persist normalized policy: {e}");
            }
        }
        Ok(cfg)
    }

    /// Read-modify-write under the writer lock.
    ///
    /// Unlike [`load`](Self::load) a read failure aborts: writing the
    /// fail-safe config back would erase the user's lists.
    pub async fn update<F, R>(&self, f: F) -> Result<(PolicyConfig, R)>
    where
        F: FnOnce(&mut PolicyConfig) -> R + Send,
        R: Send,
    {
        let _guard = self.write.lock().await;
        let (mut cfg, _) = self.read().await?;
        let out = f(&mut cfg);
        save(self.kv.as_ref(), keys::CONFIG, &cfg).await?;
        Ok((cfg, out))
    }

    /// `SET_CONFIG`: merge a partial update.
    pub async fn merge(&self, patch: ConfigPatch) -> Result<PolicyConfig> {
        let (cfg, ()) = self.update(|cfg| cfg.merge(patch)).await?;
        Ok(cfg)
    }

    /// Add one entry; returns the updated list.
    pub async fn add_entry(&self, dim: Dimension, input: &str) -> Result<BTreeSet<String>> {
        let input = input.to_string();
        let (cfg, added) = self.update(move |cfg| cfg.add_entry(dim, &input)).await?;
        let entry = added?;
        log::info!("added {dim} entry {entry:?}");
        Ok(cfg.entries(dim).clone())
    }

    /// Remove one entry; returns the updated list.
    pub async fn remove_entry(&self, dim: Dimension, input: &str) -> Result<BTreeSet<String>> {
        let input = input.to_string();
        let (cfg, removed) = self.update(move |cfg| cfg.remove_entry(dim, &input)).await?;
        if removed {
            log::info!("removed {dim} entry");
        }
        Ok(cfg.entries(dim).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, YieldingStore};
    use poise_core::Mode;
    use serde_json::json;

    fn store() -> (Arc<MemoryStore>, PolicyStore) {
        let kv = Arc::new(MemoryStore::new());
        (kv.clone(), PolicyStore::new(kv))
    }

    #[tokio::test]
    async fn test_missing_config_is_default() {
        let (_, ps) = store();
        let cfg = ps.load().await;
        assert_eq!(cfg, PolicyConfig::default());
    }

    #[tokio::test]
    async fn test_unavailable_store_is_fail_safe() {
        let (kv, ps) = store();
        kv.set_available(false);
        let cfg = ps.load().await;
        assert_eq!(cfg.mode, Mode::Strict);
        assert!(cfg.enabled);
        assert!(ps.merge(ConfigPatch::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_load_normalizes_and_writes_back() {
        let (kv, ps) = store();
        kv.set(keys::CONFIG, json!({"mode": "warfare", "whitelist": ["https://Shop.Example.com/x"]}))
            .await
            .unwrap();
        let cfg = ps.load().await;
        assert_eq!(cfg.mode, Mode::Strict);
        assert!(cfg.whitelist.contains("example.com"));
        let stored = kv.peek(keys::CONFIG).await.unwrap();
        assert_eq!(stored["mode"], "strict");
        assert!(stored["modules"]["canvasNoise"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn test_merge_preserves_unmentioned_lists() {
        let (_, ps) = store();
        ps.add_entry(Dimension::WhitelistOrigin, "bank.test").await.unwrap();
        let patch: ConfigPatch = serde_json::from_value(json!({
            "mode": "baseline",
            "modules": {"canvasNoise": false}
        }))
        .unwrap();
        let cfg = ps.merge(patch).await.unwrap();
        assert_eq!(cfg.mode, Mode::Baseline);
        assert!(!cfg.modules.canvas_noise);
        assert!(cfg.modules.audio_noise);
        assert!(cfg.whitelist.contains("bank.test"));
    }

    #[tokio::test]
    async fn test_add_remove_entry_returns_list() {
        let (_, ps) = store();
        let list = ps.add_entry(Dimension::WhitelistPath, "https://docs.test/api/v1/").await.unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["docs.test/api/v1"]);
        let list = ps.remove_entry(Dimension::WhitelistPath, "docs.test/api/v1").await.unwrap();
        assert!(list.is_empty());
        assert!(ps.add_entry(Dimension::BlacklistPattern, "  ").await.is_err());
    }

    #[tokio::test]
    async fn test_normalizing_load_does_not_undo_concurrent_update() {
        let kv = Arc::new(YieldingStore::new());
        kv.set(keys::CONFIG, json!({"mode": "warfare"})).await.unwrap();
        let ps = PolicyStore::new(kv.clone());

        let (added, _) = tokio::join!(ps.add_entry(Dimension::WhitelistOrigin, "bank.test"), ps.load());
        added.unwrap();

        let stored = kv.get(keys::CONFIG).await.unwrap().unwrap();
        assert_eq!(stored["whitelist"], json!(["bank.test"]));
        assert_eq!(stored["mode"], "strict");
    }
}
