//! Per-tab bypass state machine.
//!
//! A tab is `Bypassed` while its top-level document matches a whitelist
//! pattern, origin or path entry. The state is decided in-process on
//! navigation start, before the host has caught up with any dynamic rule
//! change, and is mirrored by a session rule installed by the caller.
//! After a policy change every bypassed tab is re-checked against the new
//! whitelist using the URL that put it there.

use std::collections::HashMap;

use serde::Serialize;

use poise_core::policy::{MatchSource, PolicyMatcher};
use poise_core::TabId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BypassState {
    Normal,
    Bypassed,
}

/// Outcome of evaluating one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Entered(MatchSource),
    /// Already bypassed and still matching
    Stayed(MatchSource),
    Left,
    /// Normal before and after
    Unchanged,
}

impl Transition {
    pub fn state(self) -> BypassState {
        match self {
            Self::Entered(_) | Self::Stayed(_) => BypassState::Bypassed,
            Self::Left | Self::Unchanged => BypassState::Normal,
        }
    }
}

#[derive(Debug, Default)]
pub struct BypassTracker {
    /// Bypassed tabs and their last document URL. Tabs restored after a
    /// restart have no URL until their next navigation.
    tabs: HashMap<TabId, Option<String>>,
}

impl BypassTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluate `tab` for a navigation to `url`.
    ///
    /// `matcher` is `None` when protection is switched off; every tab then
    /// falls back to `Normal` since there is nothing to bypass.
    pub fn evaluate(&mut self, tab: TabId, url: &str, matcher: Option<&PolicyMatcher>) -> Transition {
        let hit = matcher.and_then(|m| m.whitelist_match(url));
        let was = self.tabs.contains_key(&tab);
        match (hit, was) {
            (Some(src), false) => {
                self.tabs.insert(tab, Some(url.to_string()));
                Transition::Entered(src)
            }
            (Some(src), true) => {
                self.tabs.insert(tab, Some(url.to_string()));
                Transition::Stayed(src)
            }
            (None, true) => {
                self.tabs.remove(&tab);
                Transition::Left
            }
            (None, false) => Transition::Unchanged,
        }
    }

    /// Re-check every bypassed tab after a policy change and return the
    /// tabs that left bypass, sorted.
    ///
    /// A tab stays only if its last URL still matches the whitelist. With
    /// protection off, or for a restored tab with no known URL, it leaves.
    pub fn recheck(&mut self, matcher: Option<&PolicyMatcher>) -> Vec<TabId> {
        let mut left = Vec::new();
        self.tabs.retain(|&tab, url| {
            let keep = match (matcher, url.as_deref()) {
                (Some(m), Some(url)) => m.whitelist_match(url).is_some(),
                _ => false,
            };
            if !keep {
                left.push(tab);
            }
            keep
        });
        left.sort_unstable();
        left
    }

    pub fn is_bypassed(&self, tab: TabId) -> bool {
        self.tabs.contains_key(&tab)
    }

    pub fn state(&self, tab: TabId) -> BypassState {
        if self.is_bypassed(tab) {
            BypassState::Bypassed
        } else {
            BypassState::Normal
        }
    }

    /// Rebuild after a restart from the tabs that still hold a session
    /// bypass rule.
    pub fn restore(&mut self, tabs: impl IntoIterator<Item = TabId>) {
        for tab in tabs {
            self.tabs.entry(tab).or_insert(None);
        }
    }

    /// Forget a closed tab. Returns whether it was bypassed.
    pub fn remove(&mut self, tab: TabId) -> bool {
        self.tabs.remove(&tab).is_some()
    }

    pub fn bypassed_tabs(&self) -> impl Iterator<Item = TabId> + '_ {
        self.tabs.keys().copied()
    }
}
