//! WebAssembly bindings for Poise
//!
//! Two consumers load this module. The background worker uses the rule
//! compiler exports to turn the stored policy into declarative rules, and
//! the page-world shell builds a [`PageShield`] from the DOM bridge and asks
//! it what every wrapped API call should return.
//!
//! Structured values cross the boundary as JSON: configs come in as JSON
//! text, results go out as plain JS objects.

mod page;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use poise_compiler::{build_rule_set, plan_session_bypass, plan_sync};
use poise_core::params;
use poise_core::{Persona, PolicyConfig};

pub use page::PageShield;

#[wasm_bindgen]
pub fn init_logging(level: Option<String>) {
    let level = match level.as_deref() {
        Some("error") => log::Level::Error,
        Some("info") => log::Level::Info,
        Some("debug") => log::Level::Debug,
        Some("trace") => log::Level::Trace,
        _ => log::Level::Warn,
    };
    // A second init only fails because a logger is already installed.
    let _ = console_log::init_with_level(level);
}

pub(crate) fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(js_err)?;
    js_sys::JSON::parse(&json)
}

/// Parse a stored or bridged config. Unreadable input yields the default
/// policy, the same as a missing stored config.
pub(crate) fn parse_config(cfg_json: &str) -> PolicyConfig {
    match serde_json::from_str::<serde_json::Value>(cfg_json) {
        Ok(value) => PolicyConfig::from_value_lossy(value),
        Err(e) => {
            log::warn!("config is not JSON, using defaults: {e}");
            PolicyConfig::default()
        }
    }
}

/// Normalize a config object as the background would before storing it.
#[wasm_bindgen]
pub fn normalize_config(cfg_json: &str) -> Result<JsValue, JsValue> {
    to_js(&parse_config(cfg_json))
}

#[wasm_bindgen]
pub fn decide(cfg_json: &str, url: &str) -> Result<JsValue, JsValue> {
    to_js(&parse_config(cfg_json).decide(url))
}

/// Compile a config into the dynamic rule set plus optimizer stats.
#[wasm_bindgen]
pub fn compile_rules(cfg_json: &str) -> Result<JsValue, JsValue> {
    let cfg = parse_config(cfg_json);
    let set = build_rule_set(&cfg).map_err(js_err)?;

    let js_result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&js_result, &"rules".into(), &to_js(&set.to_vec())?);
    let _ = js_sys::Reflect::set(&js_result, &"rulesBefore".into(), &JsValue::from(set.stats.before as u32));
    let _ = js_sys::Reflect::set(&js_result, &"rulesAfter".into(), &JsValue::from(set.stats.after as u32));
    let _ = js_sys::Reflect::set(&js_result, &"rulesDeduped".into(), &JsValue::from(set.stats.deduped as u32));
    let _ = js_sys::Reflect::set(&js_result, &"rulesSubsumed".into(), &JsValue::from(set.stats.subsumed as u32));
    let _ = js_sys::Reflect::set(&js_result, &"rulesCapped".into(), &JsValue::from(set.stats.capped as u32));
    Ok(js_result.into())
}

/// Per-category `updateDynamicRules` calls bringing `installed` to the
/// rule set of `cfg_json`. Each call is applied and reported on its own.
#[wasm_bindgen]
pub fn plan_rule_sync(installed: &[u32], cfg_json: &str) -> Result<JsValue, JsValue> {
    let desired = build_rule_set(&parse_config(cfg_json)).map_err(js_err)?;

    let plans = js_sys::Array::new();
    for plan in plan_sync(installed, &desired) {
        let entry = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&entry, &"category".into(), &JsValue::from_str(plan.category.as_str()));
        let _ = js_sys::Reflect::set(&entry, &"update".into(), &to_js(&plan.update)?);
        plans.push(&entry);
    }
    Ok(plans.into())
}

/// `updateSessionRules` call entering or leaving bypass for a tab.
#[wasm_bindgen]
pub fn session_bypass_update(tab_id: i32, bypassed: bool) -> Result<JsValue, JsValue> {
    to_js(&plan_session_bypass(tab_id, bypassed).map_err(js_err)?)
}

#[wasm_bindgen]
pub fn persona_for_origin(origin: &str) -> Result<JsValue, JsValue> {
    to_js(&Persona::for_origin(origin))
}

/// Poison tracking parameters of a link or navigation target.
#[wasm_bindgen]
pub fn sanitize_url(url: &str, base: Option<String>) -> Result<JsValue, JsValue> {
    to_js(&params::sanitize_url(url, base.as_deref()))
}

#[wasm_bindgen]
pub fn is_tracking_param(key: &str) -> bool {
    params::is_tracking_param(key)
}
