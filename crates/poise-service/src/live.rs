//! Live-log subscriptions.
//!
//! A viewer subscribes with a scope and a buffer size, immediately receives
//! a `snapshot` of the matching recent events and then one `event` message
//! per new entry. Subscriber lists are in-memory only and are lost when the
//! service is suspended; viewers reconnect and resubscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use poise_core::TabId;

use crate::events::LogEntry;

/// Buffer sizes a viewer may ask for.
pub const LIVE_SIZES: [usize; 3] = [25, 50, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Global,
    Tab,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscribeRequest {
    pub scope: Scope,
    pub tab_id: Option<TabId>,
    pub size: Option<usize>,
}

impl SubscribeRequest {
    pub fn global(size: usize) -> Self {
        Self {
            scope: Scope::Global,
            tab_id: None,
            size: Some(size),
        }
    }

    pub fn tab(tab: TabId, size: usize) -> Self {
        Self {
            scope: Scope::Tab,
            tab_id: Some(tab),
            size: Some(size),
        }
    }

    /// Requested size rounded up to an allowed one.
    pub fn buffer_size(&self) -> usize {
        let want = self.size.unwrap_or(LIVE_SIZES[0]);
        LIVE_SIZES
            .into_iter()
            .find(|s| *s >= want)
            .unwrap_or(LIVE_SIZES[LIVE_SIZES.len() - 1])
    }

    /// Tab filter, if any. A tab scope without a tab ID behaves as global.
    pub fn tab_filter(&self) -> Option<TabId> {
        match self.scope {
            Scope::Tab => self.tab_id,
            Scope::Global => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveMessage {
    Snapshot { logs: Vec<LogEntry> },
    Event { entry: LogEntry },
}

#[derive(Debug)]
pub(crate) struct Subscriber {
    tab: Option<TabId>,
    tx: mpsc::UnboundedSender<LiveMessage>,
}

impl Subscriber {
    pub(crate) fn new(req: &SubscribeRequest, tx: mpsc::UnboundedSender<LiveMessage>) -> Self {
        Self {
            tab: req.tab_filter(),
            tx,
        }
    }

    pub(crate) fn wants(&self, entry: &LogEntry) -> bool {
        self.tab.is_none() || self.tab == entry.tab_id
    }

    /// Deliver if in scope. Returns false once the receiver is gone.
    pub(crate) fn deliver(&self, entry: &LogEntry) -> bool {
        if !self.wants(entry) {
            return !self.tx.is_closed();
        }
        self.tx.send(LiveMessage::Event { entry: entry.clone() }).is_ok()
    }

    pub(crate) fn send(&self, msg: LiveMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}
