//! Entry normalization and per-kind matching.
//!
//! Entries arrive from several UI surfaces in slightly different shapes
//! (`https://a.example.com/x`, `a.example.com/x`, `//a.example.com`). Everything
//! is reduced to one canonical form per kind before it is stored, and matching
//! only ever sees canonical entries. Anything that does not normalize is
//! skipped rather than reported at match time.

use crate::domain::{base_domain, host_covers, is_same_base};
use crate::url::{extract_host, extract_path, get_scheme_end};

use super::config::PathHostMatch;

/// Kind of a policy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Base domain (or host) covering all subdomains
    Origin,
    /// `{host}{pathname}` prefix
    Path,
    /// Raw substring of the full URL
    Pattern,
}

/// Normalize an entry of the given kind, or `None` if it is unusable.
pub fn normalize_entry(kind: EntryKind, input: &str) -> Option<String> {
    match kind {
        EntryKind::Origin => normalize_origin_entry(input),
        EntryKind::Path => normalize_path_entry(input),
        EntryKind::Pattern => normalize_pattern(input),
    }
}

/// Extract a lowercased hostname from an origin, URL or bare host.
pub fn host_from_origin_like(input: &str) -> Option<String> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    let host = if get_scheme_end(s).is_some() {
        extract_host(s)?
    } else {
        let t = s.trim_start_matches('/');
        let end = t.find(['/', '?', '#']).unwrap_or(t.len());
        strip_port(&t[..end])
    };

    let host = host.trim_start_matches("*.").trim_matches('.').to_ascii_lowercase();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    Some(host)
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(idx) => &host[..=idx],
            None => host,
        };
    }
    match host.rfind(':') {
        Some(idx) => &host[..idx],
        None => host,
    }
}

/// Origin entries are stored without protocol.
///
/// A full URL (the "this site" quick action) is reduced to its base domain; a
/// bare host is kept as typed, so `api.example.com` stays narrower than the
/// whole `example.com` family.
pub fn normalize_origin_entry(input: &str) -> Option<String> {
    let host = host_from_origin_like(input)?;
    if get_scheme_end(input.trim()).is_some() {
        Some(base_domain(&host))
    } else {
        Some(host)
    }
}

/// Path entries are stored as `{host}{pathname}` without trailing slash.
pub fn normalize_path_entry(input: &str) -> Option<String> {
    let s = input.trim();
    let host = host_from_origin_like(s)?;

    let path = if get_scheme_end(s).is_some() {
        extract_path(s)
    } else {
        let t = s.trim_start_matches('/');
        match t.find('/') {
            Some(idx) => {
                let rest = &t[idx..];
                let end = rest.find(['?', '#']).unwrap_or(rest.len());
                &rest[..end]
            }
            None => "/",
        }
    };

    let path = path.trim_end_matches('/');
    Some(format!("{}{}", host, if path.is_empty() { "/" } else { path }))
}

/// Patterns are raw substrings; only surrounding whitespace is dropped.
pub fn normalize_pattern(input: &str) -> Option<String> {
    let s = input.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// =============================================================================
// Path Keys
// =============================================================================

/// Parsed path entry ready for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathKey {
    pub host: String,
    /// Path with a guaranteed trailing slash
    pub dir: String,
}

impl PathKey {
    pub fn parse(entry: &str) -> Option<Self> {
        let norm = normalize_path_entry(entry)?;
        let (host, path) = match norm.find('/') {
            Some(idx) => (&norm[..idx], &norm[idx..]),
            None => (norm.as_str(), "/"),
        };
        Some(Self {
            host: host.to_string(),
            dir: with_trailing_slash(path),
        })
    }

    /// Prefix match on whole path segments. `/api/v1` covers `/api/v1`,
    /// `/api/v1/` and `/api/v1/x`, never `/api/v10`.
    pub fn matches(&self, req_host: &str, req_path: &str, host_match: PathHostMatch) -> bool {
        let host_ok = match host_match {
            PathHostMatch::BaseDomain => is_same_base(req_host, &self.host),
            PathHostMatch::ExactHost => req_host.eq_ignore_ascii_case(&self.host),
        };
        if !host_ok {
            return false;
        }
        with_trailing_slash(req_path).starts_with(&self.dir)
    }
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Origin entry match: the entry host itself or any subdomain of it.
#[inline]
pub fn origin_matches(entry: &str, req_host: &str) -> bool {
    host_covers(entry, req_host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_from_origin_like() {
        assert_eq!(host_from_origin_like("https://Shop.Example.com/x"), Some("shop.example.com".into()));
        assert_eq!(host_from_origin_like("example.com/path"), Some("example.com".into()));
        assert_eq!(host_from_origin_like("//example.com:8080"), Some("example.com".into()));
        assert_eq!(host_from_origin_like("*.example.com"), Some("example.com".into()));
        assert_eq!(host_from_origin_like("   "), None);
        assert_eq!(host_from_origin_like("exa mple.com"), None);
    }

    #[test]
    fn test_origin_entry_from_url_is_base_domain() {
        assert_eq!(normalize_origin_entry("https://a.b.example.co.uk/page"), Some("example.co.uk".into()));
        assert_eq!(normalize_origin_entry("api.example.com"), Some("api.example.com".into()));
    }

    #[test]
    fn test_path_entry_normalization() {
        assert_eq!(normalize_path_entry("https://example.com/api/v1/?x=1"), Some("example.com/api/v1".into()));
        assert_eq!(normalize_path_entry("example.com/api/v1/"), Some("example.com/api/v1".into()));
        assert_eq!(normalize_path_entry("example.com"), Some("example.com/".into()));
        assert_eq!(normalize_path_entry("/example.com/a#frag"), Some("example.com/a".into()));
        assert_eq!(normalize_path_entry(""), None);
    }

    #[test]
    fn test_pattern_normalization() {
        assert_eq!(normalize_pattern("  example.com/checkout "), Some("example.com/checkout".into()));
        assert_eq!(normalize_pattern("\t"), None);
    }

    #[test]
    fn test_path_key_containment() {
        let key = PathKey::parse("example.com/api/v1").unwrap();
        let m = |p: &str| key.matches("example.com", p, PathHostMatch::BaseDomain);
        assert!(m("/api/v1"));
        assert!(m("/api/v1/"));
        assert!(m("/api/v1/sub/resource"));
        assert!(!m("/api/v10"));
        assert!(!m("/api/v1x"));
        assert!(!m("/api"));
    }

    #[test]
    fn test_path_key_host_modes() {
        let key = PathKey::parse("api.example.com/v1").unwrap();
        assert!(key.matches("www.example.com", "/v1/x", PathHostMatch::BaseDomain));
        assert!(!key.matches("www.example.com", "/v1/x", PathHostMatch::ExactHost));
        assert!(key.matches("API.example.com", "/v1/x", PathHostMatch::ExactHost));
        assert!(!key.matches("example.org", "/v1/x", PathHostMatch::BaseDomain));
    }

    #[test]
    fn test_root_path_key_covers_everything() {
        let key = PathKey::parse("example.com").unwrap();
        assert!(key.matches("example.com", "/", PathHostMatch::BaseDomain));
        assert!(key.matches("example.com", "/any/thing", PathHostMatch::BaseDomain));
    }
}
