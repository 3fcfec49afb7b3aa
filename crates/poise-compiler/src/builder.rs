//! Rule set assembly: IDs, priorities and actions.

use std::collections::BTreeMap;

use poise_core::policy::PolicyConfig;
use poise_core::TabId;

use crate::category::{CompileError, RuleCategory, SESSION_BYPASS_PRIORITY};
use crate::compile::compile_entries;
use crate::optimizer::{optimize_rules, OptimizeStats, MAX_REGEX_RULES};
use crate::rules::{ActionType, DnrRule, DomainType, RuleCondition, FRAME_TYPES, TELEMETRY_TYPES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Regex rules allowed across all categories
    pub regex_budget: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            regex_budget: MAX_REGEX_RULES,
        }
    }
}

/// The full desired dynamic rule set, grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    categories: BTreeMap<RuleCategory, Vec<DnrRule>>,
    pub stats: OptimizeStats,
}

impl RuleSet {
    pub fn category(&self, category: RuleCategory) -> &[DnrRule] {
        self.categories.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rules in priority order, highest first.
    pub fn iter(&self) -> impl Iterator<Item = &DnrRule> {
        self.categories.values().flatten()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.iter().map(|r| r.id).collect()
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<DnrRule> {
        self.iter().cloned().collect()
    }

    fn push(&mut self, category: RuleCategory, rule: DnrRule) {
        self.categories.entry(category).or_default().push(rule);
    }
}

/// Compile the policy with default options.
pub fn build_rule_set(cfg: &PolicyConfig) -> Result<RuleSet, CompileError> {
    build_rule_set_with(cfg, CompileOptions::default())
}

/// Compile the policy into dynamic rules.
///
/// A disabled policy compiles to nothing. In audit mode every block becomes
/// an allow so matches are still reported by the host without being enforced.
pub fn build_rule_set_with(cfg: &PolicyConfig, opts: CompileOptions) -> Result<RuleSet, CompileError> {
    let mut set = RuleSet::default();
    if !cfg.enabled {
        return Ok(set);
    }

    let mut compiled = compile_entries(cfg);
    set.stats = optimize_rules(&mut compiled, cfg.path_host_match, opts.regex_budget);

    let mut next_index: BTreeMap<RuleCategory, usize> = BTreeMap::new();
    for rule in compiled {
        let index = next_index.entry(rule.category).or_insert(0);
        let id = rule.category.rule_id(*index)?;
        *index += 1;
        let kind = action_for(rule.category, cfg.audit_mode);
        set.push(rule.category, DnrRule::regex(id, rule.category.priority(), kind, rule.regex));
    }

    if !cfg.deny_hosts.is_empty() {
        set.push(RuleCategory::Deny, deny_rule(cfg)?);
    }

    log::debug!(
        "compiled {} rules ({} entries, {} deduped, {} subsumed, {} capped)",
        set.len(),
        set.stats.before,
        set.stats.deduped,
        set.stats.subsumed,
        set.stats.capped
    );
    Ok(set)
}

fn action_for(category: RuleCategory, audit: bool) -> ActionType {
    match category {
        RuleCategory::PatternAllow => ActionType::Allow,
        RuleCategory::OriginAllow | RuleCategory::PathAllow => ActionType::AllowAllRequests,
        _ if audit => ActionType::Allow,
        _ => ActionType::Block,
    }
}

fn deny_rule(cfg: &PolicyConfig) -> Result<DnrRule, CompileError> {
    let category = RuleCategory::Deny;
    Ok(DnrRule::new(
        category.rule_id(0)?,
        category.priority(),
        action_for(category, cfg.audit_mode),
        RuleCondition {
            request_domains: Some(cfg.deny_hosts.iter().cloned().collect()),
            resource_types: Some(TELEMETRY_TYPES.to_vec()),
            domain_type: Some(DomainType::ThirdParty),
            ..RuleCondition::default()
        },
    ))
}

/// Session rule letting every frame in `tab` through.
///
/// Session rules live in their own ID space, so the tab ID is the rule ID.
pub fn session_bypass_rule(tab: TabId) -> Result<DnrRule, CompileError> {
    let id = u32::try_from(tab)
        .ok()
        .filter(|id| *id > 0)
        .ok_or(CompileError::InvalidTabId(tab))?;
    Ok(DnrRule::new(
        id,
        SESSION_BYPASS_PRIORITY,
        ActionType::AllowAllRequests,
        RuleCondition {
            tab_ids: Some(vec![tab]),
            resource_types: Some(FRAME_TYPES.to_vec()),
            ..RuleCondition::default()
        },
    ))
}
