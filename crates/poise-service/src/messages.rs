//! Message envelope between the UI, content scripts and the service.
//!
//! Requests are one tagged union discriminated by `type`. Every request gets
//! exactly one response shape: `{ok: true, ...body}` or
//! `{ok: false, error}`.

use std::collections::BTreeSet;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use poise_core::policy::{ConfigPatch, Dimension, PolicyConfig};
use poise_core::TabId;

use crate::bypass::BypassState;
use crate::events::{LogEntry, PoisonedEvent};
use crate::stats::Stats;

/// Who sent a message, as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub tab_id: Option<TabId>,
    pub url: Option<String>,
}

impl Sender {
    pub fn tab(tab_id: TabId, url: &str) -> Self {
        Self {
            tab_id: Some(tab_id),
            url: Some(url.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Request {
    GetConfig,
    SetConfig {
        #[serde(default)]
        config: ConfigPatch,
    },
    GetPerOriginKey {
        #[serde(default)]
        origin: Option<String>,
    },
    IsTabBypassed {
        tab_id: TabId,
    },
    PageNavStart {
        tab_id: TabId,
        url: String,
    },

    GetWhitelist,
    AddToWhitelist(EntryArg),
    RemoveFromWhitelist(EntryArg),
    GetWhitelistPaths,
    AddToWhitelistPaths(EntryArg),
    RemoveFromWhitelistPaths(EntryArg),
    GetWhitelistPatterns,
    AddToWhitelistPatterns(EntryArg),
    RemoveFromWhitelistPatterns(EntryArg),
    GetBlacklist,
    AddToBlacklist(EntryArg),
    RemoveFromBlacklist(EntryArg),
    GetBlacklistPaths,
    AddToBlacklistPaths(EntryArg),
    RemoveFromBlacklistPaths(EntryArg),
    GetBlacklistPatterns,
    AddToBlacklistPatterns(EntryArg),
    RemoveFromBlacklistPatterns(EntryArg),

    GetStats {
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    ResetStats,
    GetLogs,
    GetRecent,
    PoisonedEvent {
        #[serde(default)]
        event: PoisonedEvent,
    },
}

/// Entry argument of the list mutation messages. UI surfaces send it as
/// `origin`, `path` or `pattern` depending on the list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EntryArg {
    #[serde(alias = "origin", alias = "path", alias = "pattern", alias = "entry")]
    pub value: String,
}

/// List operation carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOp<'a> {
    List(Dimension),
    Add(Dimension, &'a str),
    Remove(Dimension, &'a str),
}

impl Request {
    pub fn entry_op(&self) -> Option<EntryOp<'_>> {
        use Dimension::*;
        use EntryOp::*;
        let op = match self {
            Self::GetWhitelist => List(WhitelistOrigin),
            Self::AddToWhitelist(a) => Add(WhitelistOrigin, &a.value),
            Self::RemoveFromWhitelist(a) => Remove(WhitelistOrigin, &a.value),
            Self::GetWhitelistPaths => List(WhitelistPath),
            Self::AddToWhitelistPaths(a) => Add(WhitelistPath, &a.value),
            Self::RemoveFromWhitelistPaths(a) => Remove(WhitelistPath, &a.value),
            Self::GetWhitelistPatterns => List(WhitelistPattern),
            Self::AddToWhitelistPatterns(a) => Add(WhitelistPattern, &a.value),
            Self::RemoveFromWhitelistPatterns(a) => Remove(WhitelistPattern, &a.value),
            Self::GetBlacklist => List(BlacklistOrigin),
            Self::AddToBlacklist(a) => Add(BlacklistOrigin, &a.value),
            Self::RemoveFromBlacklist(a) => Remove(BlacklistOrigin, &a.value),
            Self::GetBlacklistPaths => List(BlacklistPath),
            Self::AddToBlacklistPaths(a) => Add(BlacklistPath, &a.value),
            Self::RemoveFromBlacklistPaths(a) => Remove(BlacklistPath, &a.value),
            Self::GetBlacklistPatterns => List(BlacklistPattern),
            Self::AddToBlacklistPatterns(a) => Add(BlacklistPattern, &a.value),
            Self::RemoveFromBlacklistPatterns(a) => Remove(BlacklistPattern, &a.value),
            _ => return None,
        };
        Some(op)
    }

    /// Whether handling this request may change the compiled rule set.
    pub fn mutates_policy(&self) -> bool {
        matches!(self, Self::SetConfig { .. })
            || matches!(self.entry_op(), Some(EntryOp::Add(..) | EntryOp::Remove(..)))
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Config { config: PolicyConfig },
    Key { key: String },
    Bypass { bypassed: bool, state: BypassState },
    Entries(EntryList),
    Stats(Stats),
    Logs { logs: Vec<LogEntry> },
    Error { error: String },
    Empty {},
}

/// One list keyed by its config field name, e.g. `{"whitelistPatterns": [..]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryList {
    pub dimension: Dimension,
    pub entries: BTreeSet<String>,
}

impl Serialize for EntryList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.dimension.field(), &self.entries)?;
        map.end()
    }
}

impl Response {
    pub fn ok(body: ResponseBody) -> Self {
        Self { ok: true, body }
    }

    pub fn empty() -> Self {
        Self::ok(ResponseBody::Empty {})
    }

    pub fn error(error: impl ToString) -> Self {
        Self {
            ok: false,
            body: ResponseBody::Error {
                error: error.to_string(),
            },
        }
    }

    pub fn entries(dimension: Dimension, entries: BTreeSet<String>) -> Self {
        Self::ok(ResponseBody::Entries(EntryList { dimension, entries }))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({"ok": false, "error": e.to_string()})
        })
    }
}
