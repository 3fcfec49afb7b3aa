//! Persisted threat counters and audit history.

use std::collections::BTreeMap;

use serde::Serialize;

use poise_core::TabId;

use crate::error::StoreError;
use crate::events::LogEntry;
use crate::store::{keys, load, save, KvStore};

/// Audit history entries kept in storage.
pub const AUDIT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub threats: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_tab: Option<u64>,
}

/// Count one countered threat globally and, when known, for its tab.
pub async fn record_threat(store: &dyn KvStore, tab: Option<TabId>) -> Result<u64, StoreError> {
    let total = load::<u64>(store, keys::THREATS_COUNTERED).await?.unwrap_or(0) + 1;
    save(store, keys::THREATS_COUNTERED, &total).await?;
    if let Some(tab) = tab {
        let mut per_tab = tab_threats(store).await?;
        *per_tab.entry(tab).or_insert(0) += 1;
        save(store, keys::TAB_THREATS, &per_tab).await?;
    }
    Ok(total)
}

pub async fn append_audit(store: &dyn KvStore, entry: LogEntry) -> Result<(), StoreError> {
    let mut logs = audit_history(store).await?;
    logs.push(entry);
    if logs.len() > AUDIT_HISTORY_LIMIT {
        let excess = logs.len() - AUDIT_HISTORY_LIMIT;
        logs.drain(..excess);
    }
    save(store, keys::THREAT_LOGS, &logs).await
}

pub async fn audit_history(store: &dyn KvStore) -> Result<Vec<LogEntry>, StoreError> {
    Ok(load(store, keys::THREAT_LOGS).await?.unwrap_or_default())
}

pub async fn tab_threats(store: &dyn KvStore) -> Result<BTreeMap<TabId, u64>, StoreError> {
    Ok(load(store, keys::TAB_THREATS).await?.unwrap_or_default())
}

/// Current counters; `per_tab` only when per-tab scoping is on and a tab
/// was asked for.
pub async fn read_stats(store: &dyn KvStore, tab: Option<TabId>, per_tab: bool) -> Result<Stats, StoreError> {
    let threats = load::<u64>(store, keys::THREATS_COUNTERED).await?.unwrap_or(0);
    let per_tab = match (per_tab, tab) {
        (true, Some(tab)) => Some(tab_threats(store).await?.get(&tab).copied().unwrap_or(0)),
        _ => None,
    };
    Ok(Stats { threats, per_tab })
}

/// Zero every counter and clear the audit history, returning what it held.
pub async fn reset(store: &dyn KvStore) -> Result<Vec<LogEntry>, StoreError> {
    let logs = audit_history(store).await?;
    save(store, keys::THREATS_COUNTERED, &0u64).await?;
    save(store, keys::THREAT_LOGS, &Vec::<LogEntry>::new()).await?;
    store.remove(keys::TAB_THREATS).await?;
    store.remove(keys::RECENT_EVENTS).await?;
    Ok(logs)
}

pub async fn forget_tab(store: &dyn KvStore, tab: TabId) -> Result<(), StoreError> {
    let mut per_tab = tab_threats(store).await?;
    if per_tab.remove(&tab).is_some() {
        save(store, keys::TAB_THREATS, &per_tab).await?;
    }
    Ok(())
}
