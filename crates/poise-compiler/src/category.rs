//! Rule categories, ID ranges and priority tiers
//!
//! Every category owns a disjoint block of dynamic rule IDs so a category
//! can be replaced wholesale without touching its neighbours, and the host
//! can report a matched rule ID back to us for classification.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use poise_core::policy::Dimension;
use poise_core::TabId;

/// Width of each category's ID block.
pub const CATEGORY_CAPACITY: u32 = 5_000;

/// Priority of the per-tab session bypass. Nothing outranks it.
pub const SESSION_BYPASS_PRIORITY: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("{category} holds at most {capacity} rules, got {count}")]
    RangeOverflow {
        category: RuleCategory,
        count: usize,
        capacity: u32,
    },

    #[error("tab id {0} cannot carry a session rule")]
    InvalidTabId(TabId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleCategory {
    PatternAllow,
    OriginAllow,
    PathAllow,
    PatternBlock,
    OriginBlock,
    PathBlock,
    Deny,
}

impl RuleCategory {
    /// Categories in sync order, highest priority first.
    pub const ALL: [RuleCategory; 7] = [
        Self::PatternAllow,
        Self::OriginAllow,
        Self::PathAllow,
        Self::PatternBlock,
        Self::OriginBlock,
        Self::PathBlock,
        Self::Deny,
    ];

    /// First ID of the category's block.
    pub fn base_id(self) -> u32 {
        match self {
            Self::PatternAllow => 10_000,
            Self::OriginAllow => 20_000,
            Self::PathAllow => 25_000,
            Self::PatternBlock => 30_000,
            Self::OriginBlock => 40_000,
            Self::PathBlock => 45_000,
            Self::Deny => 50_000,
        }
    }

    pub fn priority(self) -> u32 {
        match self {
            Self::PatternAllow => 90,
            Self::OriginAllow | Self::PathAllow => 80,
            Self::PatternBlock => 60,
            Self::OriginBlock | Self::PathBlock => 50,
            Self::Deny => 10,
        }
    }

    pub fn is_allow(self) -> bool {
        matches!(self, Self::PatternAllow | Self::OriginAllow | Self::PathAllow)
    }

    pub fn is_pattern(self) -> bool {
        matches!(self, Self::PatternAllow | Self::PatternBlock)
    }

    pub fn contains(self, id: u32) -> bool {
        id >= self.base_id() && id < self.base_id() + CATEGORY_CAPACITY
    }

    /// ID of the `index`-th rule in this category.
    pub fn rule_id(self, index: usize) -> Result<u32, CompileError> {
        match u32::try_from(index) {
            Ok(i) if i < CATEGORY_CAPACITY => Ok(self.base_id() + i),
            _ => Err(CompileError::RangeOverflow {
                category: self,
                count: index + 1,
                capacity: CATEGORY_CAPACITY,
            }),
        }
    }

    /// Classify a rule ID reported by the host.
    pub fn from_rule_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.contains(id))
    }

    pub fn for_dimension(dim: Dimension) -> Self {
        match dim {
            Dimension::WhitelistPattern => Self::PatternAllow,
            Dimension::WhitelistOrigin => Self::OriginAllow,
            Dimension::WhitelistPath => Self::PathAllow,
            Dimension::BlacklistPattern => Self::PatternBlock,
            Dimension::BlacklistOrigin => Self::OriginBlock,
            Dimension::BlacklistPath => Self::PathBlock,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PatternAllow => "pattern-allow",
            Self::OriginAllow => "origin-allow",
            Self::PathAllow => "path-allow",
            Self::PatternBlock => "pattern-block",
            Self::OriginBlock => "origin-block",
            Self::PathBlock => "path-block",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_disjoint() {
        for (i, a) in RuleCategory::ALL.iter().enumerate() {
            for b in &RuleCategory::ALL[i + 1..] {
                let a_end = a.base_id() + CATEGORY_CAPACITY;
                let b_end = b.base_id() + CATEGORY_CAPACITY;
                assert!(a_end <= b.base_id() || b_end <= a.base_id(), "{a} overlaps {b}");
            }
        }
    }

    #[test]
    fn test_priority_tiers() {
        use RuleCategory::*;
        assert!(SESSION_BYPASS_PRIORITY > PatternAllow.priority());
        assert!(PatternAllow.priority() > OriginAllow.priority());
        assert_eq!(OriginAllow.priority(), PathAllow.priority());
        assert!(PathAllow.priority() > PatternBlock.priority());
        assert!(PatternBlock.priority() > OriginBlock.priority());
        assert!(PathBlock.priority() > Deny.priority());
    }

    #[test]
    fn test_rule_id_and_classification() {
        let id = RuleCategory::PatternBlock.rule_id(3).unwrap();
        assert_eq!(id, 30_003);
        assert_eq!(RuleCategory::from_rule_id(id), Some(RuleCategory::PatternBlock));
        assert_eq!(RuleCategory::from_rule_id(25_000), Some(RuleCategory::PathAllow));
        assert_eq!(RuleCategory::from_rule_id(9_999), None);
        assert_eq!(RuleCategory::from_rule_id(7), None);
    }

    #[test]
    fn test_rule_id_overflow() {
        let err = RuleCategory::OriginAllow.rule_id(5_000).unwrap_err();
        assert_eq!(
            err,
            CompileError::RangeOverflow {
                category: RuleCategory::OriginAllow,
                count: 5_001,
                capacity: CATEGORY_CAPACITY,
            }
        );
        assert!(RuleCategory::OriginAllow.rule_id(4_999).is_ok());
    }
}
