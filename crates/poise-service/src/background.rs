//! The background service: single logical owner of policy, rules and logs.
//!
//! Every operation is request/response and converts failures into a
//! best-effort value. Nothing here retries; a host call that fails is logged
//! and the caller sees an `ok: false` response or a partial [`SyncReport`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};

use poise_compiler::{build_rule_set, plan_session_bypass, plan_sync, OptimizeStats, RuleCategory};
use poise_core::policy::PolicyConfig;
use poise_core::url::extract_origin;
use poise_core::TabId;

use crate::bridge::BridgePayload;
use crate::bypass::{BypassState, BypassTracker, Transition};
use crate::engine::RuleEngine;
use crate::error::Result;
use crate::events::{EventLog, LogEntry, PoisonedEvent, RequestInfo, RECENT_LIMIT};
use crate::live::{LiveMessage, SubscribeRequest};
use crate::messages::{EntryOp, Request, Response, ResponseBody, Sender};
use crate::policy_store::PolicyStore;
use crate::secret::{get_or_create_secret, per_origin_key};
use crate::stats;
use crate::store::{keys, load, save, KvStore};

/// Origin used for keys when the sender has none.
const BLANK_ORIGIN: &str = "about:blank";

/// Host rule-match notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule_id: u32,
    pub action: String,
    pub request: RequestInfo,
    pub tab_id: Option<TabId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFailure {
    pub category: RuleCategory,
    pub error: String,
}

/// Outcome of one full rule sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub rules: usize,
    pub applied: Vec<RuleCategory>,
    pub failed: Vec<CategoryFailure>,
    #[serde(skip)]
    pub stats: OptimizeStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.compile_error.is_none()
    }
}

pub struct Background {
    kv: Arc<dyn KvStore>,
    engine: Arc<dyn RuleEngine>,
    policy: PolicyStore,
    bypass: Mutex<BypassTracker>,
    log: Mutex<EventLog>,
    /// Serializes the read-modify-write of persisted counters and history.
    stats_write: Mutex<()>,
    config_tx: watch::Sender<PolicyConfig>,
    clock: fn() -> u64,
}

impl std::fmt::Debug for Background {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Background").finish_non_exhaustive()
    }
}

impl Background {
    pub fn new(kv: Arc<dyn KvStore>, engine: Arc<dyn RuleEngine>) -> Self {
        let (config_tx, _) = watch::channel(PolicyConfig::default());
        Self {
            policy: PolicyStore::new(kv.clone()),
            kv,
            engine,
            bypass: Mutex::new(BypassTracker::new()),
            log: Mutex::new(EventLog::default()),
            stats_write: Mutex::new(()),
            config_tx,
            clock: poise_core::intercept::epoch_millis,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Wake-up: create the install secret, restore the recent-events tail and
    /// bypassed tabs, then install the current rule generation.
    pub async fn start(&self) -> SyncReport {
        if let Err(e) = get_or_create_secret(self.kv.as_ref()).await {
            log::warn!("install secret unavailable: {e}");
        }
        match load::<Vec<LogEntry>>(self.kv.as_ref(), keys::RECENT_EVENTS).await {
            Ok(Some(recent)) => self.log.lock().await.restore(recent),
            Ok(None) => {}
            Err(e) => log::debug!("recent events not restored: {e}"),
        }
        match self.engine.session_rule_ids().await {
            Ok(ids) => {
                // Session bypass rules are keyed by tab ID.
                let tabs = ids.into_iter().filter_map(|id| TabId::try_from(id).ok());
                self.bypass.lock().await.restore(tabs);
            }
            Err(e) => log::warn!("bypassed tabs not restored: {e}"),
        }
        let cfg = self.policy.load().await;
        self.config_tx.send_replace(cfg);
        self.sync_rules().await
    }

    pub async fn config(&self) -> PolicyConfig {
        self.policy.load().await
    }

    /// Config snapshots published after every policy change.
    pub fn watch_config(&self) -> watch::Receiver<PolicyConfig> {
        self.config_tx.subscribe()
    }

    // =========================================================================
    // Messages
    // =========================================================================

    pub async fn handle(&self, req: Request, sender: &Sender) -> Response {
        let mutates = req.mutates_policy();
        let response = match self.dispatch(req, sender).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("request failed: {e}");
                Response::error(e)
            }
        };
        if mutates && response.ok {
            self.policy_changed().await;
        }
        response
    }

    /// Parse and handle a raw JSON message.
    pub async fn handle_json(&self, message: serde_json::Value, sender: &Sender) -> serde_json::Value {
        match serde_json::from_value::<Request>(message) {
            Ok(req) => self.handle(req, sender).await.to_json(),
            Err(e) => {
                log::debug!("unrecognized message: {e}");
                Response::error("unknown_message").to_json()
            }
        }
    }

    async fn dispatch(&self, req: Request, sender: &Sender) -> Result<Response> {
        if let Some(op) = req.entry_op() {
            return self.entry_request(op).await;
        }
        let response = match req {
            Request::GetConfig => Response::ok(ResponseBody::Config {
                config: self.policy.load().await,
            }),
            Request::SetConfig { config } => Response::ok(ResponseBody::Config {
                config: self.policy.merge(config).await?,
            }),
            Request::GetPerOriginKey { origin } => {
                let origin = origin
                    .filter(|o| !o.is_empty())
                    .or_else(|| sender.url.as_deref().and_then(extract_origin))
                    .unwrap_or_else(|| BLANK_ORIGIN.to_string());
                Response::ok(ResponseBody::Key {
                    key: self.origin_key(&origin).await?,
                })
            }
            Request::IsTabBypassed { tab_id } => {
                let state = self.bypass.lock().await.state(tab_id);
                Response::ok(ResponseBody::Bypass {
                    bypassed: state == BypassState::Bypassed,
                    state,
                })
            }
            Request::PageNavStart { tab_id, url } => {
                let state = self.on_navigation(tab_id, &url).await;
                Response::ok(ResponseBody::Bypass {
                    bypassed: state == BypassState::Bypassed,
                    state,
                })
            }
            Request::GetStats { tab_id } => {
                let cfg = self.policy.load().await;
                let stats = if cfg.enabled {
                    stats::read_stats(self.kv.as_ref(), tab_id.or(sender.tab_id), cfg.stats_per_tab).await?
                } else {
                    stats::Stats::default()
                };
                Response::ok(ResponseBody::Stats(stats))
            }
            Request::ResetStats => {
                let logs = {
                    let _guard = self.stats_write.lock().await;
                    stats::reset(self.kv.as_ref()).await?
                };
                self.log.lock().await.clear();
                Response::ok(ResponseBody::Logs { logs })
            }
            Request::GetLogs => {
                let cfg = self.policy.load().await;
                let logs = if cfg.audit_mode {
                    stats::audit_history(self.kv.as_ref()).await?
                } else {
                    Vec::new()
                };
                Response::ok(ResponseBody::Logs { logs })
            }
            Request::GetRecent => Response::ok(ResponseBody::Logs {
                logs: self.log.lock().await.recent(RECENT_LIMIT),
            }),
            Request::PoisonedEvent { event } => {
                self.record_poison(event, sender.tab_id).await;
                Response::empty()
            }
            other => {
                log::debug!("no handler for {other:?}");
                Response::error("unknown_message")
            }
        };
        Ok(response)
    }

    async fn entry_request(&self, op: EntryOp<'_>) -> Result<Response> {
        let response = match op {
            EntryOp::List(dim) => {
                let cfg = self.policy.load().await;
                Response::entries(dim, cfg.entries(dim).clone())
            }
            EntryOp::Add(dim, input) => Response::entries(dim, self.policy.add_entry(dim, input).await?),
            EntryOp::Remove(dim, input) => Response::entries(dim, self.policy.remove_entry(dim, input).await?),
        };
        Ok(response)
    }

    async fn origin_key(&self, origin: &str) -> Result<String> {
        let secret = get_or_create_secret(self.kv.as_ref()).await?;
        Ok(per_origin_key(&secret, origin))
    }

    /// Resync rules, re-check bypassed tabs and republish config after a
    /// successful policy change.
    async fn policy_changed(&self) {
        let cfg = self.policy.load().await;
        let matcher = cfg.enabled.then(|| cfg.matcher());
        self.config_tx.send_replace(cfg);
        let report = self.sync_rules().await;
        if !report.is_complete() {
            log::warn!("rule sync incomplete: {report:?}");
        }

        let left = self.bypass.lock().await.recheck(matcher.as_ref());
        for tab in left {
            log::info!("tab {tab} back to normal after policy change");
            self.update_session_bypass(tab, false).await;
        }
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Recompile and install the full rule set, one category at a time.
    ///
    /// A failing category is reported and skipped; the others still sync.
    pub async fn sync_rules(&self) -> SyncReport {
        let cfg = self.policy.load().await;
        let mut report = SyncReport::default();

        let desired = match build_rule_set(&cfg) {
            Ok(set) => set,
            Err(e) => {
                log::warn!("rule compilation failed: {e}");
                report.compile_error = Some(e.to_string());
                return report;
            }
        };
        report.rules = desired.len();
        report.stats = desired.stats.clone();

        let installed = match self.engine.dynamic_rule_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                // Without the installed list, remove exactly what we are about
                // to add so the adds cannot collide.
                log::warn!("could not list installed rules: {e}");
                desired.ids()
            }
        };

        for plan in plan_sync(&installed, &desired) {
            match self.engine.update_dynamic_rules(plan.update).await {
                Ok(()) => report.applied.push(plan.category),
                Err(e) => {
                    log::warn!("{} rules rejected: {e}", plan.category);
                    report.failed.push(CategoryFailure {
                        category: plan.category,
                        error: e.to_string(),
                    });
                }
            }
        }
        log::debug!("rule sync: {} rules, {} categories applied", report.rules, report.applied.len());
        report
    }

    // =========================================================================
    // Tabs
    // =========================================================================

    /// Navigation start, tab activation or update: re-evaluate bypass and
    /// mirror it as a session rule.
    pub async fn on_navigation(&self, tab: TabId, url: &str) -> BypassState {
        let cfg = self.policy.load().await;
        let matcher = cfg.enabled.then(|| cfg.matcher());
        let transition = self.bypass.lock().await.evaluate(tab, url, matcher.as_ref());

        let bypassed = match transition {
            Transition::Entered(src) => {
                log::info!("tab {tab} bypassed ({src:?})");
                Some(true)
            }
            Transition::Left => {
                log::info!("tab {tab} back to normal");
                Some(false)
            }
            Transition::Stayed(_) | Transition::Unchanged => None,
        };
        if let Some(bypassed) = bypassed {
            self.update_session_bypass(tab, bypassed).await;
        }
        transition.state()
    }

    async fn update_session_bypass(&self, tab: TabId, bypassed: bool) {
        let update = match plan_session_bypass(tab, bypassed) {
            Ok(update) => update,
            Err(e) => {
                log::debug!("no session rule for tab {tab}: {e}");
                return;
            }
        };
        if let Err(e) = self.engine.update_session_rules(update).await {
            log::warn!("session bypass update for tab {tab} failed: {e}");
        }
    }

    pub async fn on_tab_removed(&self, tab: TabId) {
        let was_bypassed = self.bypass.lock().await.remove(tab);
        if was_bypassed {
            self.update_session_bypass(tab, false).await;
        }
        let _guard = self.stats_write.lock().await;
        if let Err(e) = stats::forget_tab(self.kv.as_ref(), tab).await {
            log::debug!("tab {tab} counters not cleared: {e}");
        }
    }

    pub async fn is_tab_bypassed(&self, tab: TabId) -> bool {
        self.bypass.lock().await.is_bypassed(tab)
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub async fn on_rule_matched(&self, info: RuleMatch) {
        let entry = LogEntry::rule_match((self.clock)(), info.rule_id, &info.action, info.request, info.tab_id);
        self.record(entry).await;
    }

    async fn record_poison(&self, event: PoisonedEvent, tab: Option<TabId>) {
        let entry = LogEntry::poison((self.clock)(), event, tab);
        self.record(entry).await;
    }

    /// Count and log one event. No-op under the kill switch or for a
    /// bypassed tab.
    async fn record(&self, entry: LogEntry) {
        let cfg = self.policy.load().await;
        if !cfg.enabled {
            return;
        }
        if let Some(tab) = entry.tab_id {
            if self.bypass.lock().await.is_bypassed(tab) {
                log::debug!("suppressing event for bypassed tab {tab}");
                return;
            }
        }

        {
            let _guard = self.stats_write.lock().await;
            if let Err(e) = stats::record_threat(self.kv.as_ref(), entry.tab_id).await {
                log::warn!("threat counter not updated: {e}");
            }
            if cfg.audit_mode {
                if let Err(e) = stats::append_audit(self.kv.as_ref(), entry.clone()).await {
                    log::warn!("audit entry not persisted: {e}");
                }
            }
        }

        let tail = {
            let mut log = self.log.lock().await;
            log.push(entry);
            log.recent(RECENT_LIMIT)
        };
        if let Err(e) = save(self.kv.as_ref(), keys::RECENT_EVENTS, &tail).await {
            log::debug!("recent events not mirrored: {e}");
        }
    }

    pub async fn subscribe(&self, req: SubscribeRequest) -> mpsc::UnboundedReceiver<LiveMessage> {
        self.log.lock().await.subscribe(&req)
    }

    // =========================================================================
    // Bridge
    // =========================================================================

    /// Payload for the DOM bridge of a page on `origin`.
    pub async fn bridge_payload(&self, origin: &str) -> Result<BridgePayload> {
        let cfg = self.policy.load().await;
        let key = self.origin_key(origin).await?;
        Ok(BridgePayload::new(&cfg, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryRuleEngine;
    use crate::store::{MemoryStore, YieldingStore};
    use serde_json::json;

    fn service() -> (Arc<MemoryStore>, Arc<MemoryRuleEngine>, Background) {
        let kv = Arc::new(MemoryStore::new());
        let engine = Arc::new(MemoryRuleEngine::new());
        let bg = Background::new(kv.clone(), engine.clone()).with_clock(|| 1_700_000_000_000);
        (kv, engine, bg)
    }

    async fn send(bg: &Background, msg: serde_json::Value) -> serde_json::Value {
        bg.handle_json(msg, &Sender::tab(1, "https://news.test/a")).await
    }

    #[tokio::test]
    async fn test_get_per_origin_key_uses_sender_origin() {
        let (_, _, bg) = service();
        let a = send(&bg, json!({"type": "GET_PER_ORIGIN_KEY"})).await;
        let b = send(&bg, json!({"type": "GET_PER_ORIGIN_KEY", "origin": "https://news.test"})).await;
        assert_eq!(a["ok"], true);
        assert_eq!(a["key"].as_str().unwrap().len(), 64);
        assert_eq!(a["key"], b["key"]);
    }

    #[tokio::test]
    async fn test_entry_mutation_resyncs_rules() {
        let (_, engine, bg) = service();
        bg.start().await;
        let before = engine.dynamic_rules().await.len();

        let res = send(&bg, json!({"type": "ADD_TO_BLACKLIST", "origin": "tracker.test"})).await;
        assert_eq!(res, json!({"ok": true, "blacklist": ["tracker.test"]}));
        let rules = engine.dynamic_rules().await;
        assert_eq!(rules.len(), before + 1);
        assert!(rules.iter().any(|r| RuleCategory::OriginBlock.contains(r.id)));
    }

    #[tokio::test]
    async fn test_bad_entry_is_error_response() {
        let (_, _, bg) = service();
        let res = send(&bg, json!({"type": "ADD_TO_WHITELIST_PATTERNS", "pattern": "   "})).await;
        assert_eq!(res["ok"], false);
        assert!(res["error"].as_str().unwrap().contains("whitelistPatterns"));
    }

    #[tokio::test]
    async fn test_unknown_message() {
        let (_, _, bg) = service();
        let res = send(&bg, json!({"type": "NOPE"})).await;
        assert_eq!(res, json!({"ok": false, "error": "unknown_message"}));
    }

    #[tokio::test]
    async fn test_rejected_category_does_not_block_others() {
        let (_, engine, bg) = service();
        engine.reject_category(RuleCategory::OriginBlock).await;
        send(&bg, json!({"type": "ADD_TO_BLACKLIST", "origin": "tracker.test"})).await;
        send(&bg, json!({"type": "ADD_TO_WHITELIST_PATTERNS", "pattern": "good.test/x"})).await;

        let report = bg.sync_rules().await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].category, RuleCategory::OriginBlock);
        assert!(report.applied.contains(&RuleCategory::PatternAllow));
        assert!(engine
            .dynamic_rules()
            .await
            .iter()
            .any(|r| RuleCategory::PatternAllow.contains(r.id)));
    }

    #[tokio::test]
    async fn test_rule_match_counts_and_logs() {
        let (_, _, bg) = service();
        bg.on_rule_matched(RuleMatch {
            rule_id: 30_000,
            action: "block".into(),
            request: RequestInfo {
                url: "https://t.test/collect".into(),
                ..RequestInfo::default()
            },
            tab_id: Some(1),
        })
        .await;
        let stats = send(&bg, json!({"type": "GET_STATS"})).await;
        assert_eq!(stats["threats"], 1);
        let recent = send(&bg, json!({"type": "GET_RECENT"})).await;
        assert_eq!(recent["logs"][0]["type"], "pattern");
        assert_eq!(recent["logs"][0]["ts"], 1_700_000_000_000u64);
        let logs = send(&bg, json!({"type": "GET_LOGS"})).await;
        assert_eq!(logs["logs"], json!([]));
    }

    #[tokio::test]
    async fn test_audit_mode_keeps_history_and_reset_returns_it() {
        let (_, _, bg) = service();
        send(&bg, json!({"type": "SET_CONFIG", "config": {"auditMode": true}})).await;
        send(&bg, json!({"type": "POISONED_EVENT", "event": {"url": "https://t.test/p"}})).await;

        let logs = send(&bg, json!({"type": "GET_LOGS"})).await;
        assert_eq!(logs["logs"].as_array().unwrap().len(), 1);

        let reset = send(&bg, json!({"type": "RESET_STATS"})).await;
        assert_eq!(reset["logs"][0]["request"]["url"], "https://t.test/p");
        let stats = send(&bg, json!({"type": "GET_STATS"})).await;
        assert_eq!(stats["threats"], 0);
        let recent = send(&bg, json!({"type": "GET_RECENT"})).await;
        assert_eq!(recent["logs"], json!([]));
    }

    #[tokio::test]
    async fn test_per_tab_stats() {
        let (_, _, bg) = service();
        send(&bg, json!({"type": "SET_CONFIG", "config": {"statsPerTab": true}})).await;
        send(&bg, json!({"type": "POISONED_EVENT", "event": {"url": "https://t.test/p"}})).await;
        let other = bg
            .handle_json(
                json!({"type": "POISONED_EVENT", "event": {}}),
                &Sender::tab(2, "https://b.test/"),
            )
            .await;
        assert_eq!(other["ok"], true);

        let stats = send(&bg, json!({"type": "GET_STATS", "tabId": 2})).await;
        assert_eq!(stats, json!({"ok": true, "threats": 2, "perTab": 1}));

        bg.on_tab_removed(2).await;
        let stats = send(&bg, json!({"type": "GET_STATS", "tabId": 2})).await;
        assert_eq!(stats["perTab"], 0);
    }

    #[tokio::test]
    async fn test_start_restores_recent_tail() {
        let (kv, engine, bg) = service();
        send(&bg, json!({"type": "POISONED_EVENT", "event": {"url": "https://t.test/1"}})).await;
        drop(bg);

        let bg = Background::new(kv, engine);
        bg.start().await;
        let recent = send(&bg, json!({"type": "GET_RECENT"})).await;
        assert_eq!(recent["logs"][0]["request"]["url"], "https://t.test/1");
    }

    #[tokio::test]
    async fn test_config_watch_sees_changes() {
        let (_, _, bg) = service();
        let mut rx = bg.watch_config();
        send(&bg, json!({"type": "SET_CONFIG", "config": {"mode": "strict"}})).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().mode, poise_core::Mode::Strict);
    }

    #[tokio::test]
    async fn test_bridge_payload() {
        let (_, _, bg) = service();
        let payload = bg.bridge_payload("https://news.test").await.unwrap();
        let key = send(&bg, json!({"type": "GET_PER_ORIGIN_KEY", "origin": "https://news.test"})).await;
        assert_eq!(key["key"], payload.key.as_str());
        assert!(payload.cfg.enabled);
    }

    #[tokio::test]
    async fn test_concurrent_events_all_counted() {
        let kv = Arc::new(YieldingStore::new());
        let engine = Arc::new(MemoryRuleEngine::new());
        let bg = Background::new(kv, engine);
        send(&bg, json!({"type": "SET_CONFIG", "config": {"auditMode": true}})).await;

        let bg = &bg;
        let event = move || send(bg, json!({"type": "POISONED_EVENT", "event": {"url": "https://t.test/p"}}));
        tokio::join!(event(), event(), event(), event());

        let stats = send(bg, json!({"type": "GET_STATS"})).await;
        assert_eq!(stats["threats"], 4);
        let logs = send(bg, json!({"type": "GET_LOGS"})).await;
        assert_eq!(logs["logs"].as_array().unwrap().len(), 4);
    }
}
