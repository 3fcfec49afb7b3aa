//! Tracking query-parameter poisoning.
//!
//! Known campaign and click-id parameters are replaced, never removed, with
//! values shaped like the real thing. This path is intentionally
//! non-deterministic: every navigation gets fresh values.

use ::url::Url;
use rand::Rng;
use serde::Serialize;

use crate::url::QueryParams;

/// Campaign and click-id parameters poisoned on links and the page URL.
/// Any other `utm_*` key is treated the same.
pub const TRACKING_PARAMS: &[&str] = &[
    "utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content", "utm_name", "utm_id", "utm_reader",
    "utm_brand", "fbclid", "gclid", "dclid", "msclkid", "wbraid", "gbraid", "yclid", "ttclid", "twclid",
    "vero_conv", "vero_id", "mc_eid", "mc_cid", "icid", "scid", "s_cid", "_hsenc", "_hsmi", "spm", "aff_id",
    "affid", "affiliate", "ref", "referrer", "sb_referer", "pk_campaign", "pk_kwd", "oly_anon_id", "oly_enc_id",
    "li_fat_id",
];

const SLUG_WORDS: &[&str] = &[
    "premium", "studio", "creator", "fans", "club", "private", "model", "scene", "lens", "media", "vault", "night",
    "velvet", "neon", "silk",
];

const REFERRAL_SOURCES: &[&str] = &["newsletter", "partner", "social", "direct"];

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BASE62: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Value format a tracking parameter is expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    /// `word-word`
    Slug,
    Base62(usize),
    Base36(usize),
    /// 8-4-4-4-12 hex
    Guid,
    /// base62 with `-`/`_` every 8 characters
    Braid(usize),
    /// Dotted base36 groups, one per original group
    Dotted,
    Digits(usize),
    /// One of a few referral source names
    Referral,
}

pub fn param_shape(key: &str) -> ParamShape {
    if key.starts_with("utm_") {
        return ParamShape::Slug;
    }
    match key {
        "fbclid" | "_hsenc" | "_hsmi" => ParamShape::Base62(32),
        "gclid" | "dclid" | "oly_anon_id" | "oly_enc_id" | "li_fat_id" => ParamShape::Base62(24),
        "ttclid" | "twclid" => ParamShape::Base62(28),
        "msclkid" => ParamShape::Guid,
        "wbraid" | "gbraid" => ParamShape::Braid(24),
        "yclid" => ParamShape::Base36(20),
        "vero_conv" | "vero_id" | "mc_eid" | "mc_cid" => ParamShape::Base36(16),
        "icid" | "scid" | "s_cid" => ParamShape::Base36(14),
        "spm" => ParamShape::Dotted,
        "aff_id" | "affid" | "affiliate" => ParamShape::Digits(6),
        "ref" | "referrer" | "sb_referer" => ParamShape::Referral,
        "pk_campaign" | "pk_kwd" => ParamShape::Slug,
        _ => ParamShape::Base36(12),
    }
}

// =============================================================================
// Generators
// =============================================================================

fn from_alphabet<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], n: usize) -> String {
    (0..n)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items[rng.gen_range(0..items.len())]
}

fn guid<R: Rng + ?Sized>(rng: &mut R) -> String {
    let h: String = (0..16).map(|_| format!("{:02x}", rng.gen::<u8>())).collect();
    format!("{}-{}-{}-{}-{}", &h[..8], &h[8..12], &h[12..16], &h[16..20], &h[20..32])
}

fn braid<R: Rng + ?Sized>(rng: &mut R, n: usize) -> String {
    let core = from_alphabet(rng, BASE62, n);
    let mut out = String::with_capacity(n + n / 8);
    for (i, c) in core.chars().enumerate() {
        out.push(c);
        if (i + 1) % 8 == 0 && i + 1 < n {
            out.push(if rng.gen_bool(0.5) { '-' } else { '_' });
        }
    }
    out
}

/// Produce a bogus value for `key`, shaped like `value` where that matters.
pub fn poison_param<R: Rng + ?Sized>(key: &str, value: &str, rng: &mut R) -> String {
    match param_shape(key) {
        ParamShape::Slug => format!("{}-{}", pick(rng, SLUG_WORDS), pick(rng, SLUG_WORDS)),
        ParamShape::Base62(n) => from_alphabet(rng, BASE62, n),
        ParamShape::Base36(n) => from_alphabet(rng, BASE36, n),
        ParamShape::Guid => guid(rng),
        ParamShape::Braid(n) => braid(rng, n),
        ParamShape::Dotted => {
            let groups = if value.is_empty() { 3 } else { value.split('.').count() };
            (0..groups)
                .map(|_| from_alphabet(rng, BASE36, 6))
                .collect::<Vec<_>>()
                .join(".")
        }
        ParamShape::Digits(n) => from_alphabet(rng, b"0123456789", n),
        ParamShape::Referral => pick(rng, REFERRAL_SOURCES).to_string(),
    }
}

/// Lowercase base36 rendering of an integer.
pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

// =============================================================================
// URL sanitization
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sanitized {
    pub url: String,
    pub changed: bool,
}

/// Poison tracking parameters in `url`, resolving relative links against `base`.
pub fn sanitize_url(url: &str, base: Option<&str>) -> Sanitized {
    sanitize_url_with(url, base, &mut rand::thread_rng())
}

pub fn sanitize_url_with<R: Rng + ?Sized>(url: &str, base: Option<&str>, rng: &mut R) -> Sanitized {
    let unchanged = || Sanitized {
        url: url.to_string(),
        changed: false,
    };

    let parsed = match (Url::parse(url), base) {
        (Ok(u), _) => Some(u),
        (Err(::url::ParseError::RelativeUrlWithoutBase), Some(b)) => Url::parse(b).and_then(|b| b.join(url)).ok(),
        _ => None,
    };
    let mut parsed = match parsed {
        Some(u) => u,
        None => return unchanged(),
    };

    let mut params = QueryParams::from_url(&parsed);
    let mut changed = false;
    for (key, value) in params.iter_mut() {
        if is_tracking_param(key) {
            *value = poison_param(key, value, rng);
            changed = true;
        }
    }
    if !changed {
        return unchanged();
    }

    params.apply_to(&mut parsed);
    Sanitized {
        url: parsed.into(),
        changed: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_dictionary_size() {
        assert_eq!(TRACKING_PARAMS.len(), 39);
        assert!(is_tracking_param("utm_whatever"));
        assert!(!is_tracking_param("id"));
    }

    #[test]
    fn test_utm_slug_and_untouched_id() {
        let out = sanitize_url_with("https://tracker.test/?utm_source=foo&id=5", None, &mut rng());
        assert!(out.changed);
        let q = QueryParams::parse(out.url.split_once('?').unwrap().1);
        assert_eq!(q.get("id"), Some("5"));
        let slug = q.get("utm_source").unwrap();
        let (a, b) = slug.split_once('-').unwrap();
        assert!(SLUG_WORDS.contains(&a) && SLUG_WORDS.contains(&b), "{slug}");
    }

    #[test]
    fn test_shapes() {
        let mut r = rng();
        let v = poison_param("fbclid", "x", &mut r);
        assert_eq!(v.len(), 32);
        assert!(v.bytes().all(|b| BASE62.contains(&b)));

        let v = poison_param("msclkid", "x", &mut r);
        let lens: Vec<usize> = v.split('-').map(str::len).collect();
        assert_eq!(lens, vec![8, 4, 4, 4, 12]);

        let v = poison_param("wbraid", "x", &mut r);
        assert_eq!(v.len(), 26);
        assert!(matches!(v.as_bytes()[8], b'-' | b'_'));

        let v = poison_param("spm", "a.b.c.d", &mut r);
        assert_eq!(v.split('.').count(), 4);
        assert!(v.split('.').all(|g| g.len() == 6));

        let v = poison_param("aff_id", "77", &mut r);
        assert!(v.len() == 6 && v.bytes().all(|b| b.is_ascii_digit()));

        assert!(REFERRAL_SOURCES.contains(&poison_param("ref", "x", &mut r).as_str()));
        assert_eq!(poison_param("yclid", "", &mut r).len(), 20);
        assert_eq!(poison_param("mc_eid", "", &mut r).len(), 16);
        assert_eq!(poison_param("s_cid", "", &mut r).len(), 14);
    }

    #[test]
    fn test_no_tracking_params_is_unchanged() {
        let url = "https://example.com/a?b=1&c=%20x";
        let out = sanitize_url_with(url, None, &mut rng());
        assert_eq!(out, Sanitized { url: url.to_string(), changed: false });
        let out = sanitize_url_with("not a url", None, &mut rng());
        assert!(!out.changed);
    }

    #[test]
    fn test_relative_link() {
        let out = sanitize_url_with("/p?gclid=abc", Some("https://shop.test/home"), &mut rng());
        assert!(out.changed);
        assert!(out.url.starts_with("https://shop.test/p?gclid="));
    }

    #[test]
    fn test_fresh_values_each_call() {
        let a = sanitize_url("https://t.test/?fbclid=1", None);
        let b = sanitize_url("https://t.test/?fbclid=1", None);
        assert_ne!(a.url, b.url);
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_000_000_000), "gjdgxs");
    }
}
