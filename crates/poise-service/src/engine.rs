//! Host declarative rule engine boundary.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use poise_compiler::{DnrRule, RuleCategory, RuleUpdate};

use crate::error::RuleEngineError;

#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// IDs of the currently installed dynamic rules.
    async fn dynamic_rule_ids(&self) -> Result<Vec<u32>, RuleEngineError>;

    async fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<(), RuleEngineError>;

    /// IDs of the session rules that survived a service restart.
    async fn session_rule_ids(&self) -> Result<Vec<u32>, RuleEngineError>;

    async fn update_session_rules(&self, update: RuleUpdate) -> Result<(), RuleEngineError>;
}

/// In-memory engine with the host's update semantics: removals first, then
/// additions, and an update that adds an already-installed ID is rejected as
/// a whole.
#[derive(Debug, Default)]
pub struct MemoryRuleEngine {
    dynamic: Mutex<Vec<DnrRule>>,
    session: Mutex<Vec<DnrRule>>,
    rejected: Mutex<HashSet<RuleCategory>>,
}

impl MemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any dynamic update adding rules of `category`.
    pub async fn reject_category(&self, category: RuleCategory) {
        self.rejected.lock().await.insert(category);
    }

    pub async fn dynamic_rules(&self) -> Vec<DnrRule> {
        self.dynamic.lock().await.clone()
    }

    pub async fn session_rules(&self) -> Vec<DnrRule> {
        self.session.lock().await.clone()
    }
}

fn apply(installed: &mut Vec<DnrRule>, update: RuleUpdate) -> Result<(), RuleEngineError> {
    let mut next: Vec<DnrRule> = installed
        .iter()
        .filter(|r| !update.remove_rule_ids.contains(&r.id))
        .cloned()
        .collect();
    for rule in update.add_rules {
        if next.iter().any(|r| r.id == rule.id) {
            return Err(RuleEngineError::DuplicateId(rule.id));
        }
        next.push(rule);
    }
    *installed = next;
    Ok(())
}

#[async_trait]
impl RuleEngine for MemoryRuleEngine {
    async fn dynamic_rule_ids(&self) -> Result<Vec<u32>, RuleEngineError> {
        Ok(self.dynamic.lock().await.iter().map(|r| r.id).collect())
    }

    async fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<(), RuleEngineError> {
        {
            let rejected = self.rejected.lock().await;
            if let Some(rule) = update
                .add_rules
                .iter()
                .find(|r| RuleCategory::from_rule_id(r.id).is_some_and(|c| rejected.contains(&c)))
            {
                return Err(RuleEngineError::Rejected {
                    id: rule.id,
                    reason: "quota exceeded".into(),
                });
            }
        }
        apply(&mut *self.dynamic.lock().await, update)
    }

    async fn session_rule_ids(&self) -> Result<Vec<u32>, RuleEngineError> {
        Ok(self.session.lock().await.iter().map(|r| r.id).collect())
    }

    async fn update_session_rules(&self, update: RuleUpdate) -> Result<(), RuleEngineError> {
        apply(&mut *self.session.lock().await, update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise_compiler::{session_bypass_rule, ActionType};

    fn rule(id: u32) -> DnrRule {
        DnrRule::regex(id, 1, ActionType::Block, ".*x.*".into())
    }

    #[tokio::test]
    async fn test_duplicate_add_rejected_atomically() {
        let engine = MemoryRuleEngine::new();
        engine
            .update_dynamic_rules(RuleUpdate {
                remove_rule_ids: vec![],
                add_rules: vec![rule(40_000)],
            })
            .await
            .unwrap();
        let err = engine
            .update_dynamic_rules(RuleUpdate {
                remove_rule_ids: vec![],
                add_rules: vec![rule(40_001), rule(40_000)],
            })
            .await
            .unwrap_err();
        assert_eq!(err, RuleEngineError::DuplicateId(40_000));
        assert_eq!(engine.dynamic_rule_ids().await.unwrap(), vec![40_000]);
    }

    #[tokio::test]
    async fn test_remove_then_add_same_id() {
        let engine = MemoryRuleEngine::new();
        for _ in 0..2 {
            engine
                .update_session_rules(RuleUpdate {
                    remove_rule_ids: vec![5],
                    add_rules: vec![session_bypass_rule(5).unwrap()],
                })
                .await
                .unwrap();
        }
        assert_eq!(engine.session_rules().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_category() {
        let engine = MemoryRuleEngine::new();
        engine.reject_category(RuleCategory::PatternBlock).await;
        let err = engine
            .update_dynamic_rules(RuleUpdate {
                remove_rule_ids: vec![],
                add_rules: vec![rule(30_000)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RuleEngineError::Rejected { id: 30_000, .. }));
    }
}
