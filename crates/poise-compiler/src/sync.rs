//! Sync planning against the host rule engine.
//!
//! Sync is never incremental. For every category the plan removes every
//! installed ID inside the category's range and re-adds the full desired
//! generation. Between the two calls a category briefly has no rules; for
//! allow categories the per-tab session bypass covers that window, for block
//! categories it fails open until the add lands.

use serde::{Deserialize, Serialize};

use poise_core::TabId;

use crate::builder::{session_bypass_rule, RuleSet};
use crate::category::{CompileError, RuleCategory};
use crate::rules::DnrRule;

/// One `update{Dynamic,Session}Rules` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub remove_rule_ids: Vec<u32>,
    pub add_rules: Vec<DnrRule>,
}

impl RuleUpdate {
    pub fn is_empty(&self) -> bool {
        self.remove_rule_ids.is_empty() && self.add_rules.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPlan {
    pub category: RuleCategory,
    pub update: RuleUpdate,
}

/// Plan a full resync given the IDs the host currently has installed.
///
/// IDs outside every category range are not ours and are left alone.
/// Categories with nothing to remove and nothing to add are omitted.
pub fn plan_sync(installed: &[u32], desired: &RuleSet) -> Vec<CategoryPlan> {
    RuleCategory::ALL
        .into_iter()
        .filter_map(|category| {
            let mut remove_rule_ids: Vec<u32> = installed
                .iter()
                .copied()
                .filter(|id| category.contains(*id))
                .collect();
            remove_rule_ids.sort_unstable();
            remove_rule_ids.dedup();

            let update = RuleUpdate {
                remove_rule_ids,
                add_rules: desired.category(category).to_vec(),
            };
            (!update.is_empty()).then_some(CategoryPlan { category, update })
        })
        .collect()
}

/// Session update entering or leaving bypass for `tab`.
///
/// Entering removes any previous rule with the same ID first so repeated
/// navigations within a whitelisted site stay idempotent.
pub fn plan_session_bypass(tab: TabId, bypassed: bool) -> Result<RuleUpdate, CompileError> {
    let rule = session_bypass_rule(tab)?;
    Ok(RuleUpdate {
        remove_rule_ids: vec![rule.id],
        add_rules: if bypassed { vec![rule] } else { Vec::new() },
    })
}
