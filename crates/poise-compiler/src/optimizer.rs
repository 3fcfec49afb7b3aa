use std::collections::HashSet;

use poise_core::domain::{base_domain, host_covers};
use poise_core::policy::{PathHostMatch, PathKey};

use crate::category::RuleCategory;
use crate::compile::CompiledRule;

/// Host-side ceiling on regex rules (`MAX_NUMBER_OF_REGEX_RULES`).
pub const MAX_REGEX_RULES: usize = 1_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    /// Path entries already covered by an origin entry of the same polarity
    pub subsumed: usize,
    /// Rules dropped to stay under the regex budget
    pub capped: usize,
}

/// Dedupe, drop redundant path rules and cap to `budget`.
///
/// Input must be in priority order; capping keeps the head so the lowest
/// priority categories are the ones that lose rules.
pub fn optimize_rules(
    rules: &mut Vec<CompiledRule>,
    host_match: PathHostMatch,
    budget: usize,
) -> OptimizeStats {
    let before = rules.len();

    let mut seen: HashSet<(RuleCategory, String)> = HashSet::new();
    let mut deduped = 0usize;
    rules.retain(|rule| {
        if seen.insert((rule.category, rule.regex.clone())) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    let allow_origins = origins_of(rules, RuleCategory::OriginAllow);
    let block_origins = origins_of(rules, RuleCategory::OriginBlock);
    let mut subsumed = 0usize;
    rules.retain(|rule| {
        let origins = match rule.category {
            RuleCategory::PathAllow => &allow_origins,
            RuleCategory::PathBlock => &block_origins,
            _ => return true,
        };
        if path_is_covered(&rule.entry, origins, host_match) {
            subsumed += 1;
            false
        } else {
            true
        }
    });

    let mut capped = 0usize;
    if rules.len() > budget {
        capped = rules.len() - budget;
        log::warn!("regex rule budget exceeded, dropping {capped} lowest priority rules");
        rules.truncate(budget);
    }

    OptimizeStats {
        before,
        after: rules.len(),
        deduped,
        subsumed,
        capped,
    }
}

fn origins_of(rules: &[CompiledRule], category: RuleCategory) -> Vec<String> {
    rules
        .iter()
        .filter(|r| r.category == category)
        .map(|r| r.entry.clone())
        .collect()
}

fn path_is_covered(entry: &str, origins: &[String], host_match: PathHostMatch) -> bool {
    let Some(key) = PathKey::parse(entry) else {
        return false;
    };
    // In base-domain mode the path rule spans the whole registrable domain,
    // so only an origin covering that domain makes it redundant.
    let span = match host_match {
        PathHostMatch::BaseDomain => base_domain(&key.host),
        PathHostMatch::ExactHost => key.host,
    };
    origins.iter().any(|origin| host_covers(origin, &span))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(category: RuleCategory, entry: &str, regex: &str) -> CompiledRule {
        CompiledRule {
            category,
            entry: entry.into(),
            regex: regex.into(),
        }
    }

    #[test]
    fn test_dedupe_same_regex_within_category() {
        let mut rules = vec![
            rule(RuleCategory::PathAllow, "a.example.com/x", "R"),
            rule(RuleCategory::PathAllow, "b.example.com/x", "R"),
            rule(RuleCategory::PathBlock, "a.example.com/x", "R"),
        ];
        let stats = optimize_rules(&mut rules, PathHostMatch::BaseDomain, MAX_REGEX_RULES);
        assert_eq!(stats.deduped, 1);
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_path_subsumed_by_origin() {
        let mut rules = vec![
            rule(RuleCategory::OriginAllow, "example.com", "O"),
            rule(RuleCategory::PathAllow, "shop.example.com/cart", "P1"),
            rule(RuleCategory::PathAllow, "other.test/cart", "P2"),
            rule(RuleCategory::PathBlock, "shop.example.com/cart", "P3"),
        ];
        let stats = optimize_rules(&mut rules, PathHostMatch::BaseDomain, MAX_REGEX_RULES);
        assert_eq!(stats.subsumed, 1);
        let entries: Vec<_> = rules.iter().map(|r| r.regex.as_str()).collect();
        assert_eq!(entries, vec!["O", "P2", "P3"]);
    }

    #[test]
    fn test_narrow_origin_does_not_subsume_base_domain_path() {
        let mut rules = vec![
            rule(RuleCategory::OriginAllow, "api.example.com", "O"),
            rule(RuleCategory::PathAllow, "api.example.com/v1", "P"),
        ];
        let stats = optimize_rules(&mut rules, PathHostMatch::BaseDomain, MAX_REGEX_RULES);
        assert_eq!(stats.subsumed, 0);

        let mut rules = vec![
            rule(RuleCategory::OriginAllow, "api.example.com", "O"),
            rule(RuleCategory::PathAllow, "api.example.com/v1", "P"),
        ];
        let stats = optimize_rules(&mut rules, PathHostMatch::ExactHost, MAX_REGEX_RULES);
        assert_eq!(stats.subsumed, 1);
    }

    #[test]
    fn test_cap_keeps_highest_priority() {
        let mut rules = vec![
            rule(RuleCategory::PatternAllow, "a", "A"),
            rule(RuleCategory::OriginAllow, "b.com", "B"),
            rule(RuleCategory::OriginBlock, "c.com", "C"),
        ];
        let stats = optimize_rules(&mut rules, PathHostMatch::BaseDomain, 2);
        assert_eq!(stats.capped, 1);
        assert_eq!(stats.before, 3);
        assert_eq!(stats.after, 2);
        assert_eq!(rules.last().unwrap().category, RuleCategory::OriginAllow);
    }
}
