//! Declarative network rule model
//!
//! Serde shapes mirror the host's `declarativeNetRequest` rule JSON so a
//! compiled rule set can be handed to `updateDynamicRules` /
//! `updateSessionRules` without translation.

use serde::{Deserialize, Serialize};

use poise_core::TabId;

// =============================================================================
// Actions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Allow,
    Block,
    /// Allow the frame and every request it initiates.
    AllowAllRequests,
}

impl ActionType {
    pub fn is_allow(self) -> bool {
        matches!(self, Self::Allow | Self::AllowAllRequests)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
}

// =============================================================================
// Conditions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Xmlhttprequest,
    Ping,
    CspReport,
    Media,
    Websocket,
    Other,
}

/// Resource types an `allowAllRequests` rule may target.
pub const FRAME_TYPES: &[ResourceType] = &[ResourceType::MainFrame, ResourceType::SubFrame];

/// Resource types the denylist blocks. Beacons surface as `ping`.
pub const TELEMETRY_TYPES: &[ResourceType] = &[ResourceType::Ping, ResourceType::Xmlhttprequest];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DomainType {
    FirstParty,
    ThirdParty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_domains: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_types: Option<Vec<ResourceType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_ids: Option<Vec<TabId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_type: Option<DomainType>,
}

// =============================================================================
// Rule
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnrRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl DnrRule {
    pub fn new(id: u32, priority: u32, kind: ActionType, condition: RuleCondition) -> Self {
        Self {
            id,
            priority,
            action: RuleAction { kind },
            condition,
        }
    }

    pub fn regex(id: u32, priority: u32, kind: ActionType, regex: String) -> Self {
        let resource_types = match kind {
            ActionType::AllowAllRequests => Some(FRAME_TYPES.to_vec()),
            ActionType::Allow | ActionType::Block => None,
        };
        Self::new(
            id,
            priority,
            kind,
            RuleCondition {
                regex_filter: Some(regex),
                resource_types,
                ..RuleCondition::default()
            },
        )
    }

    pub fn is_regex(&self) -> bool {
        self.condition.regex_filter.is_some()
    }
}
