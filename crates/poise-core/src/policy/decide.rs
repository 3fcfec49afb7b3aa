//! Decision engine.
//!
//! [`PolicyMatcher`] is compiled once per config change and answers
//! per-request questions without allocating beyond host lowercasing.

use std::collections::HashSet;

use serde::Serialize;

use crate::url::{extract_host, extract_path, query_keys};

use super::config::{PathHostMatch, PolicyConfig};
use super::entries::{origin_matches, PathKey};

/// Path fragments that mark an analytics collection endpoint.
const TRACKING_PATH_HINTS: &[&str] = &["collect", "analytics", "beacon", "track", "pixel", "measure"];

/// Query key prefixes that mark a campaign/click-id carrying request.
const TRACKING_QUERY_PREFIXES: &[&str] = &["utm_", "gclid", "fbclid", "msclkid", "mc_eid"];

/// Which rule produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchSource {
    WhitelistPattern,
    WhitelistOrigin,
    WhitelistPath,
    BlacklistPattern,
    BlacklistOrigin,
    BlacklistPath,
    DenyHost,
    Heuristic,
}

/// Outcome of a policy decision for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "source", rename_all = "camelCase")]
pub enum Verdict {
    /// Explicitly allowed: no suppression or poisoning
    Allow(MatchSource),
    /// Explicitly blocked
    Block(MatchSource),
    /// Looks like tracking: eligible for suppression or poisoning
    Poison(MatchSource),
    /// No rule applies
    Neutral,
}

impl Verdict {
    pub fn is_allow(self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn is_block(self) -> bool {
        matches!(self, Self::Block(_))
    }

    pub fn source(self) -> Option<MatchSource> {
        match self {
            Self::Allow(s) | Self::Block(s) | Self::Poison(s) => Some(s),
            Self::Neutral => None,
        }
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// Precompiled form of a [`PolicyConfig`].
#[derive(Debug, Clone)]
pub struct PolicyMatcher {
    enabled: bool,
    host_match: PathHostMatch,
    allow_patterns: Vec<String>,
    allow_origins: Vec<String>,
    allow_paths: Vec<PathKey>,
    block_patterns: Vec<String>,
    block_origins: Vec<String>,
    block_paths: Vec<PathKey>,
    deny_hosts: HashSet<String>,
}

impl PolicyMatcher {
    pub fn new(cfg: &PolicyConfig) -> Self {
        let paths = |set: &std::collections::BTreeSet<String>| -> Vec<PathKey> {
            set.iter().filter_map(|e| PathKey::parse(e)).collect()
        };
        let lower = |set: &std::collections::BTreeSet<String>| -> Vec<String> {
            set.iter().map(|e| e.to_ascii_lowercase()).collect()
        };
        Self {
            enabled: cfg.enabled,
            host_match: cfg.path_host_match,
            allow_patterns: cfg.whitelist_patterns.iter().cloned().collect(),
            allow_origins: lower(&cfg.whitelist),
            allow_paths: paths(&cfg.whitelist_paths),
            block_patterns: cfg.blacklist_patterns.iter().cloned().collect(),
            block_origins: lower(&cfg.blacklist),
            block_paths: paths(&cfg.blacklist_paths),
            deny_hosts: cfg.deny_hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    /// Full decision with precedence applied.
    pub fn decide(&self, url: &str) -> Verdict {
        if !self.enabled {
            return Verdict::Neutral;
        }
        if let Some(src) = self.whitelist_match(url) {
            return Verdict::Allow(src);
        }
        if let Some(src) = self.blacklist_match(url) {
            return Verdict::Block(src);
        }
        if let Some(host) = extract_host(url) {
            if self.deny_hosts.contains(&host.to_ascii_lowercase()) {
                return Verdict::Block(MatchSource::DenyHost);
            }
        }
        if looks_like_tracking(url) {
            return Verdict::Poison(MatchSource::Heuristic);
        }
        Verdict::Neutral
    }

    /// Whitelist membership alone, ignoring the kill switch.
    pub fn whitelist_match(&self, url: &str) -> Option<MatchSource> {
        if self.allow_patterns.iter().any(|p| url.contains(p.as_str())) {
            return Some(MatchSource::WhitelistPattern);
        }
        let host = extract_host(url)?.to_ascii_lowercase();
        if self.allow_origins.iter().any(|o| origin_matches(o, &host)) {
            return Some(MatchSource::WhitelistOrigin);
        }
        let path = extract_path(url);
        if self.allow_paths.iter().any(|k| k.matches(&host, path, self.host_match)) {
            return Some(MatchSource::WhitelistPath);
        }
        None
    }

    pub fn blacklist_match(&self, url: &str) -> Option<MatchSource> {
        if self.block_patterns.iter().any(|p| url.contains(p.as_str())) {
            return Some(MatchSource::BlacklistPattern);
        }
        let host = extract_host(url)?.to_ascii_lowercase();
        if self.block_origins.iter().any(|o| origin_matches(o, &host)) {
            return Some(MatchSource::BlacklistOrigin);
        }
        let path = extract_path(url);
        if self.block_paths.iter().any(|k| k.matches(&host, path, self.host_match)) {
            return Some(MatchSource::BlacklistPath);
        }
        None
    }

    pub fn is_whitelisted(&self, url: &str) -> bool {
        self.whitelist_match(url).is_some()
    }

    pub fn is_deny_host(&self, host: &str) -> bool {
        self.deny_hosts.contains(&host.to_ascii_lowercase())
    }
}

/// Path-shape heuristic for analytics endpoints.
pub fn looks_like_tracking(url: &str) -> bool {
    let path = extract_path(url).to_ascii_lowercase();
    if TRACKING_PATH_HINTS.iter().any(|h| path.contains(h)) {
        return true;
    }
    query_keys(url).any(|k| {
        let k = k.to_ascii_lowercase();
        TRACKING_QUERY_PREFIXES.iter().any(|p| k.starts_with(p))
    })
}

impl PolicyConfig {
    pub fn matcher(&self) -> PolicyMatcher {
        PolicyMatcher::new(self)
    }

    /// One-off decision. Prefer [`PolicyMatcher`] on hot paths.
    pub fn decide(&self, url: &str) -> Verdict {
        self.matcher().decide(url)
    }
}
