//! Policy entries to regex rule candidates.
//!
//! Entries are re-normalized on the way in so a hand-edited or legacy config
//! cannot smuggle an unusable entry into the rule engine. Anything that fails
//! normalization is skipped with a debug log; one bad entry never stops the
//! rest of its category from compiling.

use poise_core::policy::{normalize_entry, Dimension, EntryKind, PathKey, PolicyConfig};

use crate::category::RuleCategory;
use crate::regex::{origin_regex, path_regex, pattern_regex};

/// One policy entry translated to a regex filter, before ID assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub category: RuleCategory,
    /// Normalized entry the rule came from
    pub entry: String,
    pub regex: String,
}

/// Compile every user list in priority order (pattern-allow first).
pub fn compile_entries(cfg: &PolicyConfig) -> Vec<CompiledRule> {
    let mut rules = Vec::new();
    for dim in dimensions_by_priority() {
        for raw in dim.list(cfg) {
            match compile_entry(dim, raw, cfg) {
                Some(rule) => rules.push(rule),
                None => log::debug!("skipping unusable {dim} entry {raw:?}"),
            }
        }
    }
    rules
}

fn compile_entry(dim: Dimension, raw: &str, cfg: &PolicyConfig) -> Option<CompiledRule> {
    let entry = normalize_entry(dim.kind(), raw)?;
    let regex = match dim.kind() {
        EntryKind::Pattern => pattern_regex(&entry),
        EntryKind::Origin => origin_regex(&entry),
        EntryKind::Path => path_regex(&PathKey::parse(&entry)?, cfg.path_host_match),
    };
    Some(CompiledRule {
        category: RuleCategory::for_dimension(dim),
        entry,
        regex,
    })
}

fn dimensions_by_priority() -> [Dimension; 6] {
    [
        Dimension::WhitelistPattern,
        Dimension::WhitelistOrigin,
        Dimension::WhitelistPath,
        Dimension::BlacklistPattern,
        Dimension::BlacklistOrigin,
        Dimension::BlacklistPath,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PolicyConfig {
        let mut cfg = PolicyConfig::default();
        cfg.whitelist_patterns.insert("example.com/checkout".into());
        cfg.whitelist.insert("good.test".into());
        cfg.blacklist.insert("tracker.test".into());
        cfg.blacklist_paths.insert("cdn.test/pixel".into());
        cfg
    }

    #[test]
    fn test_compile_orders_by_priority() {
        let rules = compile_entries(&config());
        let cats: Vec<_> = rules.iter().map(|r| r.category).collect();
        assert_eq!(
            cats,
            vec![
                RuleCategory::PatternAllow,
                RuleCategory::OriginAllow,
                RuleCategory::OriginBlock,
                RuleCategory::PathBlock,
            ]
        );
    }

    #[test]
    fn test_compile_skips_unusable_entries() {
        let mut cfg = PolicyConfig::default();
        cfg.whitelist.insert("   ".into());
        cfg.whitelist.insert("bad host.com".into());
        cfg.whitelist.insert("ok.com".into());
        let rules = compile_entries(&cfg);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].entry, "ok.com");
    }

    #[test]
    fn test_compile_renormalizes_legacy_entries() {
        let mut cfg = PolicyConfig::default();
        cfg.blacklist.insert("https://www.Tracker.test/x".into());
        let rules = compile_entries(&cfg);
        assert_eq!(rules[0].entry, "tracker.test");
        assert!(rules[0].regex.contains(r"tracker\.test"));
    }
}
