//! Event log entries and the in-memory recent ring.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use poise_compiler::RuleCategory;
use poise_core::intercept::PoisonNotice;
use poise_core::TabId;

use crate::live::{LiveMessage, SubscribeRequest, Subscriber};

/// Entries kept for the live log.
pub const LIVE_RING_CAPACITY: usize = 100;

/// Entries returned by `GET_RECENT` and mirrored to storage.
pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A dynamic rule matched
    Dnr,
    /// A pattern-category rule matched
    Pattern,
    /// Page world poisoned a payload
    Poison,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
    pub initiator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub ts: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<u32>,
    pub request: RequestInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
}

impl LogEntry {
    /// Entry for a host rule-match notification.
    pub fn rule_match(ts: u64, rule_id: u32, action: &str, request: RequestInfo, tab_id: Option<TabId>) -> Self {
        let kind = match RuleCategory::from_rule_id(rule_id) {
            Some(c) if c.is_pattern() => EventKind::Pattern,
            _ => EventKind::Dnr,
        };
        Self {
            ts,
            kind,
            action: if action.is_empty() { "block".into() } else { action.to_string() },
            rule_id: Some(rule_id),
            request,
            tab_id,
        }
    }

    pub fn poison(ts: u64, event: PoisonedEvent, tab_id: Option<TabId>) -> Self {
        Self {
            ts,
            kind: EventKind::Poison,
            action: event.action,
            rule_id: None,
            request: RequestInfo {
                url: event.url,
                method: event.method,
                initiator: event.initiator,
            },
            tab_id,
        }
    }
}

/// Body of a `POISONED_EVENT` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoisonedEvent {
    pub url: String,
    pub method: String,
    pub initiator: String,
    pub action: String,
}

impl Default for PoisonedEvent {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "beacon".into(),
            initiator: String::new(),
            action: "modify".into(),
        }
    }
}

impl From<PoisonNotice> for PoisonedEvent {
    fn from(n: PoisonNotice) -> Self {
        Self {
            url: n.url,
            method: n.method,
            initiator: n.initiator,
            ..Self::default()
        }
    }
}

// =============================================================================
// Recent ring
// =============================================================================

/// Bounded most-recent-N ring plus live subscribers. Lossy across
/// suspension apart from the `RECENT_LIMIT` tail the caller mirrors.
#[derive(Debug)]
pub struct EventLog {
    ring: VecDeque<LogEntry>,
    capacity: usize,
    subscribers: Vec<Subscriber>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(LIVE_RING_CAPACITY)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            subscribers: Vec::new(),
        }
    }

    /// Append and fan out to subscribers, pruning closed ones.
    pub fn push(&mut self, entry: LogEntry) {
        self.subscribers.retain(|s| s.deliver(&entry));
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(entry);
    }

    /// Last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.ring.len().saturating_sub(n);
        self.ring.iter().skip(skip).cloned().collect()
    }

    /// Last `n` entries visible to `tab` (all when `None`), oldest first.
    pub fn recent_for(&self, tab: Option<TabId>, n: usize) -> Vec<LogEntry> {
        let mut out: Vec<LogEntry> = self
            .ring
            .iter()
            .rev()
            .filter(|e| tab.is_none() || e.tab_id == tab)
            .take(n)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Seed the ring after a restart, keeping whatever is newer.
    pub fn restore(&mut self, entries: Vec<LogEntry>) {
        let live: Vec<LogEntry> = self.ring.drain(..).collect();
        for entry in entries.into_iter().chain(live) {
            if self.ring.len() == self.capacity {
                self.ring.pop_front();
            }
            self.ring.push_back(entry);
        }
    }

    pub fn subscribe(&mut self, req: &SubscribeRequest) -> mpsc::UnboundedReceiver<LiveMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = Subscriber::new(req, tx);
        let logs = self.recent_for(req.tab_filter(), req.buffer_size());
        if sub.send(LiveMessage::Snapshot { logs }) {
            self.subscribers.push(sub);
        }
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: u64, tab: Option<TabId>) -> LogEntry {
        LogEntry::poison(
            ts,
            PoisonedEvent {
                url: format!("https://t.test/{ts}"),
                ..PoisonedEvent::default()
            },
            tab,
        )
    }

    #[test]
    fn test_ring_is_bounded() {
        let mut log = EventLog::new(3);
        for ts in 0..5 {
            log.push(entry(ts, None));
        }
        let ts: Vec<u64> = log.recent(10).iter().map(|e| e.ts).collect();
        assert_eq!(ts, vec![2, 3, 4]);
        let ts: Vec<u64> = log.recent(2).iter().map(|e| e.ts).collect();
        assert_eq!(ts, vec![3, 4]);
    }

    #[test]
    fn test_rule_match_classification() {
        let pattern = LogEntry::rule_match(1, 30_002, "block", RequestInfo::default(), Some(4));
        assert_eq!(pattern.kind, EventKind::Pattern);
        let dnr = LogEntry::rule_match(1, 40_000, "", RequestInfo::default(), None);
        assert_eq!(dnr.kind, EventKind::Dnr);
        assert_eq!(dnr.action, "block");
    }

    #[test]
    fn test_entry_json_shape() {
        let e = LogEntry::rule_match(
            9,
            40_001,
            "block",
            RequestInfo {
                url: "https://tracker.test/p".into(),
                method: "get".into(),
                initiator: "https://news.test".into(),
            },
            Some(3),
        );
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "dnr");
        assert_eq!(json["ruleId"], 40_001);
        assert_eq!(json["tabId"], 3);
        assert_eq!(json["request"]["initiator"], "https://news.test");
    }

    #[test]
    fn test_poisoned_event_defaults() {
        let ev: PoisonedEvent = serde_json::from_str(r#"{"url":"https://x.test/collect"}"#).unwrap();
        assert_eq!(ev.method, "beacon");
        assert_eq!(ev.action, "modify");
    }

    #[tokio::test]
    async fn test_subscribe_snapshot_then_scoped_events() {
        let mut log = EventLog::default();
        log.push(entry(1, Some(1)));
        log.push(entry(2, Some(2)));

        let mut rx = log.subscribe(&SubscribeRequest::tab(2, 25));
        match rx.recv().await.unwrap() {
            LiveMessage::Snapshot { logs } => {
                assert_eq!(logs.len(), 1);
                assert_eq!(logs[0].ts, 2);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }

        log.push(entry(3, Some(1)));
        log.push(entry(4, Some(2)));
        match rx.recv().await.unwrap() {
            LiveMessage::Event { entry } => assert_eq!(entry.ts, 4),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut log = EventLog::default();
        let rx = log.subscribe(&SubscribeRequest::global(25));
        assert_eq!(log.subscriber_count(), 1);
        drop(rx);
        log.push(entry(1, None));
        assert_eq!(log.subscriber_count(), 0);
    }

    #[test]
    fn test_restore_keeps_newest() {
        let mut log = EventLog::new(3);
        log.push(entry(10, None));
        log.restore(vec![entry(1, None), entry(2, None), entry(3, None)]);
        let ts: Vec<u64> = log.recent(5).iter().map(|e| e.ts).collect();
        assert_eq!(ts, vec![2, 3, 10]);
    }
}
