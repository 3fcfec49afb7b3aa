//! Storage hygiene for well-known tracker identifiers.

use std::collections::HashMap;

const TRACKER_KEY_PREFIXES: &[&str] = &["_ga", "_gid", "ajs_", "amplitude_", "optimizely"];
const TRACKER_KEYS: &[&str] = &["fbp", "fbc"];

pub fn is_tracker_key(key: &str) -> bool {
    TRACKER_KEYS.contains(&key) || TRACKER_KEY_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Minimal `Storage` surface.
pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str);
    fn remove_item(&mut self, key: &str);
}

impl KeyValueStorage for HashMap<String, String> {
    fn get_item(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) {
        self.insert(key.to_string(), value.to_string());
    }

    fn remove_item(&mut self, key: &str) {
        self.remove(key);
    }
}

/// Storage wrapper that drops writes and hides reads of tracker keys.
#[derive(Debug, Clone)]
pub struct HygienicStorage<S> {
    inner: S,
    active: bool,
}

impl<S: KeyValueStorage> HygienicStorage<S> {
    pub fn new(inner: S, active: bool) -> Self {
        Self { inner, active }
    }

    #[inline]
    fn blocked(&self, key: &str) -> bool {
        self.active && is_tracker_key(key)
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: KeyValueStorage> KeyValueStorage for HygienicStorage<S> {
    fn get_item(&self, key: &str) -> Option<String> {
        if self.blocked(key) {
            return None;
        }
        self.inner.get_item(key)
    }

    fn set_item(&mut self, key: &str, value: &str) {
        if !self.blocked(key) {
            self.inner.set_item(key, value);
        }
    }

    fn remove_item(&mut self, key: &str) {
        if !self.blocked(key) {
            self.inner.remove_item(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_keys() {
        for k in ["_ga", "_ga_XYZ", "_gid", "ajs_user_id", "amplitude_id_abc", "optimizelyEndUserId", "fbp", "fbc"] {
            assert!(is_tracker_key(k), "{k}");
        }
        for k in ["fbpx", "theme", "ga", "cart_ajs_"] {
            assert!(!is_tracker_key(k), "{k}");
        }
    }

    #[test]
    fn test_hygienic_storage() {
        let mut inner = HashMap::new();
        inner.insert("_ga".to_string(), "GA1.2.3".to_string());
        let mut store = HygienicStorage::new(inner, true);

        store.set_item("ajs_anonymous_id", "x");
        store.set_item("theme", "dark");
        assert_eq!(store.get_item("ajs_anonymous_id"), None);
        assert_eq!(store.get_item("theme").as_deref(), Some("dark"));
        // pre-existing tracker values are hidden and survive removal attempts
        assert_eq!(store.get_item("_ga"), None);
        store.remove_item("_ga");

        let inner = store.into_inner();
        assert!(inner.contains_key("_ga"));
        assert!(!inner.contains_key("ajs_anonymous_id"));
    }

    #[test]
    fn test_inactive_passthrough() {
        let mut store = HygienicStorage::new(HashMap::new(), false);
        store.set_item("fbp", "fb.1.2");
        assert_eq!(store.get_item("fbp").as_deref(), Some("fb.1.2"));
    }
}
