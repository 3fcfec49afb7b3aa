//! Base-domain utilities
//!
//! The extension does not ship a Public Suffix List. Base domains are computed
//! with the same heuristic the content scripts use: the last two labels, or the
//! last three when the second-level label is a common ccTLD registry label
//! (`co.uk`, `com.au`, `ac.jp`, ...).
//!
//! # Examples
//!
//! ```
//! use poise_core::domain::base_domain;
//!
//! assert_eq!(base_domain("a.b.example.com"), "example.com");
//! assert_eq!(base_domain("shop.example.co.uk"), "example.co.uk");
//! ```

use std::net::IpAddr;

/// Second-level labels that act as registries under a two-letter ccTLD.
const COMMON_CC_SLDS: &[&str] = &["co", "com", "net", "org", "gov", "ac", "edu"];

/// Get the base (registrable) domain for a hostname.
///
/// Input is lowercased and a trailing dot is ignored. IP literals are returned
/// unchanged.
pub fn base_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    fallback_base(&labels)
}

fn fallback_base(labels: &[&str]) -> String {
    let n = labels.len();
    if n <= 2 {
        return labels.join(".");
    }

    let tld = labels[n - 1];
    let sld = labels[n - 2];
    if tld.len() == 2 && COMMON_CC_SLDS.contains(&sld) {
        return labels[n - 3..].join(".");
    }

    labels[n - 2..].join(".")
}

/// Check if two hosts share the same base domain.
pub fn is_same_base(host1: &str, host2: &str) -> bool {
    let a = base_domain(host1);
    !a.is_empty() && a == base_domain(host2)
}

/// Check whether `host` is `domain` itself or one of its subdomains.
///
/// Both sides are compared case-insensitively. An empty domain covers nothing.
pub fn host_covers(domain: &str, host: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    let host = host.trim_end_matches('.');
    if domain.is_empty() || host.len() < domain.len() {
        return false;
    }

    let split = host.len() - domain.len();
    if !host.is_char_boundary(split) || !host[split..].eq_ignore_ascii_case(domain) {
        return false;
    }
    split == 0 || host.as_bytes()[split - 1] == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_domain_simple() {
        assert_eq!(base_domain("example.com"), "example.com");
        assert_eq!(base_domain("sub.example.com"), "example.com");
        assert_eq!(base_domain("a.b.example.com"), "example.com");
    }

    #[test]
    fn test_base_domain_two_part() {
        assert_eq!(base_domain("sub.example.co.uk"), "example.co.uk");
        assert_eq!(base_domain("example.co.uk"), "example.co.uk");
        assert_eq!(base_domain("shop.example.com.au"), "example.com.au");
    }

    #[test]
    fn test_base_domain_long_tld_is_not_registry() {
        // "co" under a three-letter TLD is an ordinary label
        assert_eq!(base_domain("www.co.com"), "co.com");
    }

    #[test]
    fn test_base_domain_normalizes_case_and_dot() {
        assert_eq!(base_domain("WWW.Example.COM."), "example.com");
    }

    #[test]
    fn test_base_domain_ip_literal() {
        assert_eq!(base_domain("192.168.1.10"), "192.168.1.10");
        assert_eq!(base_domain("[::1]"), "[::1]");
    }

    #[test]
    fn test_is_same_base() {
        assert!(is_same_base("a.example.com", "b.example.com"));
        assert!(!is_same_base("example.com", "example.org"));
        assert!(!is_same_base("", ""));
    }

    #[test]
    fn test_host_covers() {
        assert!(host_covers("example.com", "example.com"));
        assert!(host_covers("example.com", "sub.example.com"));
        assert!(host_covers("example.com", "A.B.Example.com"));
        assert!(!host_covers("example.com", "notexample.com"));
        assert!(!host_covers("api.example.com", "other.example.com"));
        assert!(!host_covers("", "example.com"));
    }
}
