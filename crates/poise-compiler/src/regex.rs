//! RE2 `regexFilter` builders for policy entries.

use poise_core::domain::base_domain;
use poise_core::policy::{PathHostMatch, PathKey};

/// Escape RE2 metacharacters.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Substring anywhere in the full URL.
pub fn pattern_regex(pattern: &str) -> String {
    format!(".*{}.*", escape(pattern))
}

/// The domain itself or any subdomain, any scheme, any path.
pub fn origin_regex(domain: &str) -> String {
    format!(r"^https?://([^/]+\.)*{}(?:[:/].*)?$", escape(domain))
}

/// Host part of a path entry plus a segment-aligned path prefix.
///
/// The prefix is trailing-slash tolerant: `/api/v1` matches `/api/v1`,
/// `/api/v1/...`, `/api/v1?q` but not `/api/v10`.
pub fn path_regex(key: &PathKey, host_match: PathHostMatch) -> String {
    let host = match host_match {
        PathHostMatch::BaseDomain => format!("([^/]+\\.)*{}", escape(&base_domain(&key.host))),
        PathHostMatch::ExactHost => escape(&key.host),
    };
    let prefix = key.dir.trim_end_matches('/');
    format!(r"^https?://{}(?::\d+)?{}(?:[/?#].*)?$", host, escape(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_metacharacters() {
        assert_eq!(escape("a.b?c=1"), r"a\.b\?c=1");
        assert_eq!(escape("(x)|[y]"), r"\(x\)\|\[y\]");
        assert_eq!(escape("plain/path-1"), "plain/path-1");
    }

    #[test]
    fn test_pattern_regex() {
        assert_eq!(pattern_regex("example.com/checkout"), r".*example\.com/checkout.*");
    }

    #[test]
    fn test_origin_regex() {
        assert_eq!(
            origin_regex("example.com"),
            r"^https?://([^/]+\.)*example\.com(?:[:/].*)?$"
        );
    }

    #[test]
    fn test_path_regex_base_domain() {
        let key = PathKey::parse("shop.example.com/api/v1").unwrap();
        assert_eq!(
            path_regex(&key, PathHostMatch::BaseDomain),
            r"^https?://([^/]+\.)*example\.com(?::\d+)?/api/v1(?:[/?#].*)?$"
        );
    }

    #[test]
    fn test_path_regex_exact_host_root() {
        let key = PathKey::parse("shop.example.com").unwrap();
        assert_eq!(
            path_regex(&key, PathHostMatch::ExactHost),
            r"^https?://shop\.example\.com(?::\d+)?(?:[/?#].*)?$"
        );
    }
}
