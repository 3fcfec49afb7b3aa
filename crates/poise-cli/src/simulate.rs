//! Scripted simulation against the in-memory host.
//!
//! A script is a JSON array of steps:
//!
//! ```json
//! [
//!   {"step": "message", "message": {"type": "ADD_TO_WHITELIST_PATTERNS", "pattern": "example.com/checkout"}},
//!   {"step": "navigate", "tabId": 7, "url": "https://shop.example.com/checkout?x=1"},
//!   {"step": "message", "tabId": 7, "url": "https://shop.example.com/", "message": {"type": "IS_TAB_BYPASSED", "tabId": 7}},
//!   {"step": "ruleMatched", "ruleId": 40000, "url": "https://t.test/collect", "tabId": 3},
//!   {"step": "closeTab", "tabId": 7}
//! ]
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use poise_core::TabId;
use poise_service::{Background, MemoryRuleEngine, MemoryStore, RequestInfo, RuleMatch, Sender};

use crate::print_json;

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum Step {
    Message {
        message: Value,
        #[serde(default)]
        tab_id: Option<TabId>,
        #[serde(default)]
        url: Option<String>,
    },
    Navigate {
        tab_id: TabId,
        url: String,
    },
    RuleMatched {
        rule_id: u32,
        #[serde(default)]
        action: String,
        url: String,
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    CloseTab {
        tab_id: TabId,
    },
    Sync,
}

pub fn run(script: &Path) -> Result<(), String> {
    let text = fs::read_to_string(script).map_err(|e| format!("Failed to read '{}': {}", script.display(), e))?;
    let steps: Vec<Step> =
        serde_json::from_str(&text).map_err(|e| format!("Invalid script '{}': {}", script.display(), e))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| format!("Failed to start runtime: {e}"))?;
    let transcript = runtime.block_on(replay(steps));
    print_json(&transcript)
}

async fn replay(steps: Vec<Step>) -> Value {
    let engine = Arc::new(MemoryRuleEngine::new());
    let bg = Background::new(Arc::new(MemoryStore::new()), engine.clone());
    let startup = bg.start().await;

    let mut results = Vec::with_capacity(steps.len());
    for (index, step) in steps.into_iter().enumerate() {
        log::debug!("step {index}: {step:?}");
        let result = match step {
            Step::Message { message, tab_id, url } => bg.handle_json(message, &Sender { tab_id, url }).await,
            Step::Navigate { tab_id, url } => json!({"state": bg.on_navigation(tab_id, &url).await}),
            Step::RuleMatched {
                rule_id,
                action,
                url,
                tab_id,
            } => {
                bg.on_rule_matched(RuleMatch {
                    rule_id,
                    action,
                    request: RequestInfo {
                        url,
                        ..RequestInfo::default()
                    },
                    tab_id,
                })
                .await;
                Value::Null
            }
            Step::CloseTab { tab_id } => {
                bg.on_tab_removed(tab_id).await;
                Value::Null
            }
            Step::Sync => json!(bg.sync_rules().await),
        };
        results.push(json!({"step": index, "result": result}));
    }

    json!({
        "startup": startup,
        "steps": results,
        "dynamicRules": engine.dynamic_rules().await.len(),
        "sessionRules": engine.session_rules().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay_script(script: Value) -> Value {
        let steps: Vec<Step> = serde_json::from_value(script).unwrap();
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(replay(steps))
    }

    #[test]
    fn test_checkout_script() {
        let out = replay_script(json!([
            {"step": "message", "message": {"type": "ADD_TO_WHITELIST_PATTERNS", "pattern": "example.com/checkout"}},
            {"step": "navigate", "tabId": 7, "url": "https://shop.example.com/checkout?x=1"},
            {"step": "message", "message": {"type": "IS_TAB_BYPASSED", "tabId": 7}},
            {"step": "closeTab", "tabId": 7}
        ]));
        assert_eq!(out["steps"][1]["result"]["state"], "bypassed");
        assert_eq!(out["steps"][2]["result"]["bypassed"], true);
        assert_eq!(out["sessionRules"], json!([]));
        assert_eq!(out["dynamicRules"], 2);
    }

    #[test]
    fn test_unknown_step_rejected() {
        assert!(serde_json::from_value::<Vec<Step>>(json!([{"step": "reboot"}])).is_err());
    }
}
