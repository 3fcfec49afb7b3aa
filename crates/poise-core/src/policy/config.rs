//! Persisted policy configuration.
//!
//! The stored object is camelCase JSON. Reads are lenient: missing fields take
//! their defaults, legacy mode names are mapped, and list fields that are not
//! arrays are treated as empty. Writes go through [`ConfigPatch`], where lists
//! are replaced only when the patch carries an actual array.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::{Mode, Module, ModuleSet};

use super::entries::{normalize_entry, EntryKind};

/// Analytics and ad endpoints treated as trackers without any user entry.
pub const DEFAULT_DENY_HOSTS: &[&str] = &[
    "www.google-analytics.com",
    "analytics.google.com",
    "stats.g.doubleclick.net",
    "ssl.google-analytics.com",
    "region1.google-analytics.com",
    "api.segment.io",
    "cdn.segment.com",
    "segment.io",
    "api.amplitude.com",
    "amplitude.com",
    "api2.amplitude.com",
    "api.mixpanel.com",
    "decide.mixpanel.com",
    "facebook.com",
    "www.facebook.com",
    "connect.facebook.net",
    "graph.facebook.com",
    "snapads.com",
    "sc-analytics.appspot.com",
    "log.byteoversea.com",
    "business-api.tiktok.com",
    "analytics.tiktok.com",
    "px.ads.linkedin.com",
    "api.linkedin.com",
    "bat.bing.com",
    "app.link",
    "cdn.branch.io",
    "action.metaffiliation.com",
    "click.linksynergy.com",
    "track.adform.net",
    "ib.adnxs.com",
    "idsync.rlcdn.com",
    "collector.github.com",
];

/// Companies whose names are used as decoy employer values in fake PII.
pub const DEFAULT_DEFUNCT_NAMES: &[&str] = &[
    "Nortel",
    "Melvin Capital",
    "Blockbuster",
    "MySpace",
    "Lehman Brothers",
    "AltaVista",
    "Compaq",
    "Palm",
    "Kodak",
    "Napster",
];

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("empty {0} entry")]
    EmptyEntry(Dimension),

    #[error("invalid {dimension} entry: {input:?}")]
    InvalidEntry { dimension: Dimension, input: String },

    #[error("malformed config: {0}")]
    Malformed(#[from] serde_json::Error),
}

// =============================================================================
// Sub-configs
// =============================================================================

/// How path entries compare hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathHostMatch {
    /// Any host sharing the entry's base domain
    #[default]
    BaseDomain,
    /// Only the exact host of the entry
    ExactHost,
}

/// Shape of generated poison payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoisonConfig {
    #[serde(rename = "poisonIncludeRid")]
    pub include_rid: bool,
    #[serde(rename = "poisonIncludeJitter")]
    pub include_jitter: bool,
    #[serde(rename = "poisonIncludeFakePII")]
    pub include_fake_pii: bool,
    #[serde(rename = "defunctNames")]
    pub defunct_names: Vec<String>,
}

impl Default for PoisonConfig {
    fn default() -> Self {
        Self {
            include_rid: true,
            include_jitter: true,
            include_fake_pii: false,
            defunct_names: DEFAULT_DEFUNCT_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Per-module toggles. Missing keys default to enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Modules {
    pub canvas_noise: bool,
    pub audio_noise: bool,
    pub webgl_noise: bool,
    pub perf_quantize: bool,
    pub navigator_clamp: bool,
    pub storage_hygiene: bool,
    pub block_beacons: bool,
    pub strip_headers_limited: bool,
    pub poison_config: PoisonConfig,
}

impl Default for Modules {
    fn default() -> Self {
        Self {
            canvas_noise: true,
            audio_noise: true,
            webgl_noise: true,
            perf_quantize: true,
            navigator_clamp: true,
            storage_hygiene: true,
            block_beacons: true,
            strip_headers_limited: true,
            poison_config: PoisonConfig::default(),
        }
    }
}

impl Modules {
    fn slot(&mut self, module: Module) -> &mut bool {
        match module {
            Module::CanvasNoise => &mut self.canvas_noise,
            Module::AudioNoise => &mut self.audio_noise,
            Module::WebglNoise => &mut self.webgl_noise,
            Module::PerfQuantize => &mut self.perf_quantize,
            Module::NavigatorClamp => &mut self.navigator_clamp,
            Module::StorageHygiene => &mut self.storage_hygiene,
            Module::BlockBeacons => &mut self.block_beacons,
            Module::StripHeadersLimited => &mut self.strip_headers_limited,
        }
    }

    pub fn get(&self, module: Module) -> bool {
        self.to_set().has(module)
    }

    pub fn set(&mut self, module: Module, on: bool) {
        *self.slot(module) = on;
    }

    pub fn to_set(&self) -> ModuleSet {
        let pairs = [
            (self.canvas_noise, ModuleSet::CANVAS_NOISE),
            (self.audio_noise, ModuleSet::AUDIO_NOISE),
            (self.webgl_noise, ModuleSet::WEBGL_NOISE),
            (self.perf_quantize, ModuleSet::PERF_QUANTIZE),
            (self.navigator_clamp, ModuleSet::NAVIGATOR_CLAMP),
            (self.storage_hygiene, ModuleSet::STORAGE_HYGIENE),
            (self.block_beacons, ModuleSet::BLOCK_BEACONS),
            (self.strip_headers_limited, ModuleSet::STRIP_HEADERS_LIMITED),
        ];
        pairs
            .into_iter()
            .filter(|(on, _)| *on)
            .fold(ModuleSet::empty(), |acc, (_, flag)| acc | flag)
    }
}

// =============================================================================
// Policy Config
// =============================================================================

/// The whole persisted policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    pub mode: Mode,
    #[serde(deserialize_with = "flag_default_true")]
    pub enabled: bool,
    #[serde(deserialize_with = "flag_default_false")]
    pub audit_mode: bool,
    pub modules: Modules,
    #[serde(deserialize_with = "lenient_set")]
    pub whitelist: BTreeSet<String>,
    #[serde(deserialize_with = "lenient_set")]
    pub whitelist_paths: BTreeSet<String>,
    #[serde(deserialize_with = "lenient_set")]
    pub whitelist_patterns: BTreeSet<String>,
    #[serde(deserialize_with = "lenient_set")]
    pub blacklist: BTreeSet<String>,
    #[serde(deserialize_with = "lenient_set")]
    pub blacklist_paths: BTreeSet<String>,
    #[serde(deserialize_with = "lenient_set")]
    pub blacklist_patterns: BTreeSet<String>,
    #[serde(deserialize_with = "lenient_set")]
    pub deny_hosts: BTreeSet<String>,
    pub stats_per_tab: bool,
    pub path_host_match: PathHostMatch,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Moderate,
            enabled: true,
            audit_mode: false,
            modules: Modules::default(),
            whitelist: BTreeSet::new(),
            whitelist_paths: BTreeSet::new(),
            whitelist_patterns: BTreeSet::new(),
            blacklist: BTreeSet::new(),
            blacklist_paths: BTreeSet::new(),
            blacklist_patterns: BTreeSet::new(),
            deny_hosts: DEFAULT_DENY_HOSTS.iter().map(|s| s.to_string()).collect(),
            stats_per_tab: false,
            path_host_match: PathHostMatch::BaseDomain,
        }
    }
}

impl PolicyConfig {
    /// Configuration used when the stored one cannot be read.
    pub fn fail_safe() -> Self {
        Self {
            mode: Mode::Strict,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let mut cfg: Self = serde_json::from_str(json)?;
        cfg.normalize();
        Ok(cfg)
    }

    /// Parse a stored value, falling back to defaults on any error.
    pub fn from_value_lossy(value: Value) -> Self {
        match serde_json::from_value::<Self>(value) {
            Ok(mut cfg) => {
                cfg.normalize();
                cfg
            }
            Err(e) => {
                log::warn!("stored config unreadable, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn module_set(&self) -> ModuleSet {
        self.modules.to_set()
    }

    /// Re-normalize every entry list. Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        for dim in Dimension::ALL {
            let kind = dim.kind();
            let list = dim.list_mut(self);
            let normalized: BTreeSet<String> =
                list.iter().filter_map(|e| normalize_entry(kind, e)).collect();
            if normalized != *list {
                *list = normalized;
                changed = true;
            }
        }
        let hosts: BTreeSet<String> = self
            .deny_hosts
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        if hosts != self.deny_hosts {
            self.deny_hosts = hosts;
            changed = true;
        }
        changed
    }

    /// Add a normalized entry. Returns the stored form.
    pub fn add_entry(&mut self, dim: Dimension, input: &str) -> Result<String, PolicyError> {
        if input.trim().is_empty() {
            return Err(PolicyError::EmptyEntry(dim));
        }
        let entry = normalize_entry(dim.kind(), input).ok_or_else(|| PolicyError::InvalidEntry {
            dimension: dim,
            input: input.to_string(),
        })?;
        dim.list_mut(self).insert(entry.clone());
        Ok(entry)
    }

    /// Remove an entry given in raw or normalized form. Returns true if removed.
    pub fn remove_entry(&mut self, dim: Dimension, input: &str) -> bool {
        let kind = dim.kind();
        let list = dim.list_mut(self);
        let raw = list.remove(input.trim());
        let norm = normalize_entry(kind, input)
            .map(|e| list.remove(&e))
            .unwrap_or(false);
        raw || norm
    }

    pub fn entries(&self, dim: Dimension) -> &BTreeSet<String> {
        dim.list(self)
    }

    /// Apply a partial update. Unset fields are preserved.
    pub fn merge(&mut self, patch: ConfigPatch) {
        if let Some(mode) = patch.mode {
            self.mode = mode;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(audit) = patch.audit_mode {
            self.audit_mode = audit;
        }
        if let Some(per_tab) = patch.stats_per_tab {
            self.stats_per_tab = per_tab;
        }
        if let Some(host_match) = patch.path_host_match {
            self.path_host_match = host_match;
        }
        if let Some(modules) = patch.modules {
            modules.apply(&mut self.modules);
        }

        let lists = [
            (Dimension::WhitelistOrigin, patch.whitelist),
            (Dimension::WhitelistPath, patch.whitelist_paths),
            (Dimension::WhitelistPattern, patch.whitelist_patterns),
            (Dimension::BlacklistOrigin, patch.blacklist),
            (Dimension::BlacklistPath, patch.blacklist_paths),
            (Dimension::BlacklistPattern, patch.blacklist_patterns),
        ];
        for (dim, list) in lists {
            if let Some(list) = list {
                *dim.list_mut(self) = list;
            }
        }
        if let Some(hosts) = patch.deny_hosts {
            self.deny_hosts = hosts;
        }
        self.normalize();
    }
}

// =============================================================================
// Patch
// =============================================================================

/// Partial config update. Only fields present in the JSON are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub mode: Option<Mode>,
    #[serde(deserialize_with = "opt_flag")]
    pub enabled: Option<bool>,
    #[serde(deserialize_with = "opt_flag")]
    pub audit_mode: Option<bool>,
    pub modules: Option<ModulesPatch>,
    #[serde(deserialize_with = "opt_set")]
    pub whitelist: Option<BTreeSet<String>>,
    #[serde(deserialize_with = "opt_set")]
    pub whitelist_paths: Option<BTreeSet<String>>,
    #[serde(deserialize_with = "opt_set")]
    pub whitelist_patterns: Option<BTreeSet<String>>,
    #[serde(deserialize_with = "opt_set")]
    pub blacklist: Option<BTreeSet<String>>,
    #[serde(deserialize_with = "opt_set")]
    pub blacklist_paths: Option<BTreeSet<String>>,
    #[serde(deserialize_with = "opt_set")]
    pub blacklist_patterns: Option<BTreeSet<String>>,
    #[serde(deserialize_with = "opt_set")]
    pub deny_hosts: Option<BTreeSet<String>>,
    #[serde(deserialize_with = "opt_flag")]
    pub stats_per_tab: Option<bool>,
    pub path_host_match: Option<PathHostMatch>,
}

/// Partial module update, merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModulesPatch {
    pub canvas_noise: Option<bool>,
    pub audio_noise: Option<bool>,
    pub webgl_noise: Option<bool>,
    pub perf_quantize: Option<bool>,
    pub navigator_clamp: Option<bool>,
    pub storage_hygiene: Option<bool>,
    pub block_beacons: Option<bool>,
    pub strip_headers_limited: Option<bool>,
    pub poison_config: Option<PoisonConfig>,
}

impl ModulesPatch {
    fn apply(self, modules: &mut Modules) {
        let toggles = [
            (Module::CanvasNoise, self.canvas_noise),
            (Module::AudioNoise, self.audio_noise),
            (Module::WebglNoise, self.webgl_noise),
            (Module::PerfQuantize, self.perf_quantize),
            (Module::NavigatorClamp, self.navigator_clamp),
            (Module::StorageHygiene, self.storage_hygiene),
            (Module::BlockBeacons, self.block_beacons),
            (Module::StripHeadersLimited, self.strip_headers_limited),
        ];
        for (module, on) in toggles {
            if let Some(on) = on {
                modules.set(module, on);
            }
        }
        if let Some(poison) = self.poison_config {
            modules.poison_config = poison;
        }
    }
}

// =============================================================================
// Dimensions
// =============================================================================

/// One of the six user-managed entry lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    WhitelistOrigin,
    WhitelistPath,
    WhitelistPattern,
    BlacklistOrigin,
    BlacklistPath,
    BlacklistPattern,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Self::WhitelistOrigin,
        Self::WhitelistPath,
        Self::WhitelistPattern,
        Self::BlacklistOrigin,
        Self::BlacklistPath,
        Self::BlacklistPattern,
    ];

    pub fn kind(self) -> EntryKind {
        match self {
            Self::WhitelistOrigin | Self::BlacklistOrigin => EntryKind::Origin,
            Self::WhitelistPath | Self::BlacklistPath => EntryKind::Path,
            Self::WhitelistPattern | Self::BlacklistPattern => EntryKind::Pattern,
        }
    }

    /// Config field holding this list.
    pub fn field(self) -> &'static str {
        match self {
            Self::WhitelistOrigin => "whitelist",
            Self::WhitelistPath => "whitelistPaths",
            Self::WhitelistPattern => "whitelistPatterns",
            Self::BlacklistOrigin => "blacklist",
            Self::BlacklistPath => "blacklistPaths",
            Self::BlacklistPattern => "blacklistPatterns",
        }
    }

    pub fn list(self, cfg: &PolicyConfig) -> &BTreeSet<String> {
        match self {
            Self::WhitelistOrigin => &cfg.whitelist,
            Self::WhitelistPath => &cfg.whitelist_paths,
            Self::WhitelistPattern => &cfg.whitelist_patterns,
            Self::BlacklistOrigin => &cfg.blacklist,
            Self::BlacklistPath => &cfg.blacklist_paths,
            Self::BlacklistPattern => &cfg.blacklist_patterns,
        }
    }

    pub fn list_mut(self, cfg: &mut PolicyConfig) -> &mut BTreeSet<String> {
        match self {
            Self::WhitelistOrigin => &mut cfg.whitelist,
            Self::WhitelistPath => &mut cfg.whitelist_paths,
            Self::WhitelistPattern => &mut cfg.whitelist_patterns,
            Self::BlacklistOrigin => &mut cfg.blacklist,
            Self::BlacklistPath => &mut cfg.blacklist_paths,
            Self::BlacklistPattern => &mut cfg.blacklist_patterns,
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field())
    }
}

// =============================================================================
// Lenient field readers
// =============================================================================

fn strings_of(value: Value) -> Option<BTreeSet<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

fn lenient_set<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<String>, D::Error> {
    Ok(strings_of(Value::deserialize(d)?).unwrap_or_default())
}

fn opt_set<'de, D: Deserializer<'de>>(d: D) -> Result<Option<BTreeSet<String>>, D::Error> {
    Ok(strings_of(Value::deserialize(d)?))
}

fn flag_default_true<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Value::deserialize(d)?.as_bool().unwrap_or(true))
}

fn flag_default_false<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Value::deserialize(d)?.as_bool().unwrap_or(false))
}

fn opt_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(Value::deserialize(d)?.as_bool())
}
