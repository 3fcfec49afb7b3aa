//! DOM bridge payload for the page world.
//!
//! The isolated-world content script writes a hidden element carrying the
//! policy subset the page world needs (`data-cfg`) and the per-origin key
//! (`data-key`). On config change the payload is rebuilt and re-announced
//! with a custom DOM event; no inline script is involved.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use poise_core::policy::{Modules, PathHostMatch, PolicyConfig};
use poise_core::Mode;

/// Id of the hidden bridge element.
pub const BRIDGE_ELEMENT_ID: &str = "__poise_bridge";

/// Custom event re-announcing an updated payload.
pub const CONFIG_EVENT: &str = "poise:config";

pub const ATTR_CFG: &str = "data-cfg";
pub const ATTR_KEY: &str = "data-key";

/// Policy fields visible to page-world code. Stats scoping stays behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    pub mode: Mode,
    pub enabled: bool,
    pub audit_mode: bool,
    pub modules: Modules,
    pub whitelist: BTreeSet<String>,
    pub whitelist_paths: BTreeSet<String>,
    pub whitelist_patterns: BTreeSet<String>,
    pub blacklist: BTreeSet<String>,
    pub blacklist_paths: BTreeSet<String>,
    pub blacklist_patterns: BTreeSet<String>,
    pub deny_hosts: BTreeSet<String>,
    pub path_host_match: PathHostMatch,
}

impl From<&PolicyConfig> for BridgeConfig {
    fn from(cfg: &PolicyConfig) -> Self {
        Self {
            mode: cfg.mode,
            enabled: cfg.enabled,
            audit_mode: cfg.audit_mode,
            modules: cfg.modules.clone(),
            whitelist: cfg.whitelist.clone(),
            whitelist_paths: cfg.whitelist_paths.clone(),
            whitelist_patterns: cfg.whitelist_patterns.clone(),
            blacklist: cfg.blacklist.clone(),
            blacklist_paths: cfg.blacklist_paths.clone(),
            blacklist_patterns: cfg.blacklist_patterns.clone(),
            deny_hosts: cfg.deny_hosts.clone(),
            path_host_match: cfg.path_host_match,
        }
    }
}

impl BridgeConfig {
    /// Rebuild a full policy on the page side. Page-world code never sees
    /// stats scoping, so that stays at its default.
    pub fn to_policy(&self) -> PolicyConfig {
        PolicyConfig {
            mode: self.mode,
            enabled: self.enabled,
            audit_mode: self.audit_mode,
            modules: self.modules.clone(),
            whitelist: self.whitelist.clone(),
            whitelist_paths: self.whitelist_paths.clone(),
            whitelist_patterns: self.whitelist_patterns.clone(),
            blacklist: self.blacklist.clone(),
            blacklist_paths: self.blacklist_paths.clone(),
            blacklist_patterns: self.blacklist_patterns.clone(),
            deny_hosts: self.deny_hosts.clone(),
            path_host_match: self.path_host_match,
            ..PolicyConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgePayload {
    pub cfg: BridgeConfig,
    pub key: String,
}

impl BridgePayload {
    pub fn new(cfg: &PolicyConfig, key: String) -> Self {
        Self {
            cfg: cfg.into(),
            key,
        }
    }

    /// `(attribute, value)` pairs to set on the bridge element.
    pub fn attributes(&self) -> Result<[(&'static str, String); 2], serde_json::Error> {
        Ok([
            (ATTR_CFG, serde_json::to_string(&self.cfg)?),
            (ATTR_KEY, self.key.clone()),
        ])
    }

    /// Parse the attributes back on the page side. An unreadable `data-cfg`
    /// falls back to the default policy.
    pub fn from_attributes(cfg_json: &str, key: &str) -> Self {
        let cfg = match serde_json::from_str::<serde_json::Value>(cfg_json) {
            Ok(value) => PolicyConfig::from_value_lossy(value),
            Err(e) => {
                log::warn!("bridge config unreadable: {e}");
                PolicyConfig::default()
            }
        };
        Self::new(&cfg, key.to_string())
    }
}
