//! Payload schemas
//!
//! A schema recognizes one tracker vendor's collection endpoint and rewrites
//! the outgoing request so it describes the origin's persona instead of the
//! real device. Evaluation is first-match-wins over [`SchemaSet`]; a request
//! matching no schema is returned untouched.
//!
//! Persona values come from the origin-seeded generator, so every request from
//! one origin reports the same device. Per-request identifiers (experiment
//! buckets, anonymous IDs) come from a second stream keyed by the per-origin
//! key, which continues across calls.

mod analytics;
mod facebook;
pub mod poison;
mod tiktok;
mod youtube;

use std::collections::BTreeMap;

use ::url::Url;
use serde::{Deserialize, Serialize};

use crate::persona::{build_persona, Persona};
use crate::prng::{keyed_rng, rng_for_origin, Mulberry32};
use crate::url::QueryParams;

pub use analytics::GenericAnalytics;
pub use facebook::FacebookPixel;
pub use tiktok::TikTokPixel;
pub use youtube::{is_youtube_host, is_youtube_telemetry, YouTubeQoe};

/// Region and locale parameters removed from every rewritten URL.
const REGION_PARAMS: &[&str] = &["gl", "gr", "geo", "market", "country", "region"];

/// Client hints that reveal the real device.
const CLIENT_HINT_HEADERS: &[&str] = &[
    "sec-ch-ua-platform",
    "sec-ch-ua-platform-version",
    "sec-ch-ua-arch",
    "sec-ch-ua-model",
    "sec-ch-ua-full-version",
    "sec-ch-ua-full-version-list",
    "sec-ch-ua-wow64",
];

// =============================================================================
// Request model
// =============================================================================

/// Case-insensitive header map. Names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct Headers(BTreeMap<String, String>);

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect())
    }
}

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn delete(&mut self, name: &str) {
        self.0.remove(&name.to_ascii_lowercase());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn content_type(&self) -> &str {
        self.get("content-type").unwrap_or("")
    }
}

/// The mutable parts of a `fetch` init dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestInit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Values a schema may draw on while rewriting.
#[derive(Debug, Clone)]
pub struct MutationContext {
    /// `scheme://host[:port]` of the page issuing the request
    pub page_origin: String,
    pub persona: Persona,
    /// Per-request draws
    pub rng: Mulberry32,
}

impl MutationContext {
    pub fn new(page_origin: &str, key: &str) -> Self {
        let mut seeded = rng_for_origin(page_origin);
        Self {
            page_origin: page_origin.to_string(),
            persona: build_persona(&mut seeded),
            rng: keyed_rng(key, page_origin),
        }
    }

    /// Page URL as trackers expect it in `dl` / `referer`.
    pub fn page_root(&self) -> String {
        format!("{}/", self.page_origin)
    }
}

/// One vendor-specific rewriter.
pub trait PayloadSchema: Send + Sync {
    fn name(&self) -> &'static str;

    fn test(&self, url: &Url) -> bool;

    /// Rewrite `params` and `init` in place.
    fn mutate(&self, params: &mut QueryParams, init: &mut RequestInit, ctx: &mut MutationContext);
}

/// Result of a schema rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mutation {
    pub schema: &'static str,
    pub url: String,
    pub init: RequestInit,
}

// =============================================================================
// Schema set
// =============================================================================

/// Ordered schema list, first match wins.
pub struct SchemaSet {
    schemas: Vec<Box<dyn PayloadSchema>>,
}

impl Default for SchemaSet {
    fn default() -> Self {
        Self {
            schemas: vec![
                Box::new(YouTubeQoe),
                Box::new(FacebookPixel),
                Box::new(TikTokPixel),
                Box::new(GenericAnalytics),
            ],
        }
    }
}

impl std::fmt::Debug for SchemaSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.schemas.iter().map(|s| s.name())).finish()
    }
}

impl SchemaSet {
    pub fn new(schemas: Vec<Box<dyn PayloadSchema>>) -> Self {
        Self { schemas }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.schemas.iter().map(|s| s.name()).collect()
    }

    fn find_parsed(&self, url: &Url) -> Option<&dyn PayloadSchema> {
        self.schemas.iter().find(|s| s.test(url)).map(|s| s.as_ref())
    }

    /// Name of the schema that would handle `url`.
    pub fn find(&self, url: &str, page_origin: &str) -> Option<&'static str> {
        let parsed = resolve(url, page_origin)?;
        self.find_parsed(&parsed).map(|s| s.name())
    }

    /// Rewrite a request, or `None` if no schema applies.
    ///
    /// The caller is responsible for skipping whitelisted destinations.
    pub fn mutate(&self, url: &str, init: &RequestInit, page_origin: &str, key: &str) -> Option<Mutation> {
        let mut ctx = MutationContext::new(page_origin, key);
        self.mutate_with(url, init, &mut ctx)
    }

    /// Rewrite using an existing context, continuing its per-request stream.
    pub fn mutate_with(&self, url: &str, init: &RequestInit, ctx: &mut MutationContext) -> Option<Mutation> {
        let mut parsed = resolve(url, &ctx.page_origin)?;
        let schema = self.find_parsed(&parsed)?;

        let mut params = QueryParams::from_url(&parsed);
        normalize_region_params(&mut params);
        let mut init = init.clone();
        schema.mutate(&mut params, &mut init, ctx);
        apply_persona_headers(&mut init.headers, &ctx.persona);
        params.apply_to(&mut parsed);

        log::debug!("schema {} rewrote {}", schema.name(), parsed.host_str().unwrap_or(""));
        Some(Mutation {
            schema: schema.name(),
            url: parsed.into(),
            init,
        })
    }
}

/// Parse `url`, resolving it against the page origin when relative.
pub fn resolve(url: &str, page_origin: &str) -> Option<Url> {
    match Url::parse(url) {
        Ok(u) => Some(u),
        Err(::url::ParseError::RelativeUrlWithoutBase) => Url::parse(page_origin).ok()?.join(url).ok(),
        Err(_) => None,
    }
}

/// Drop region parameters and pin locale parameters to neutral values.
pub fn normalize_region_params(params: &mut QueryParams) {
    for key in REGION_PARAMS {
        params.delete(key);
    }
    params.replace("hl", "en");
    params.replace("language", "en-US");
    params.replace("timezone", "UTC");
}

/// Persona `Accept-Language` and no device client hints.
pub fn apply_persona_headers(headers: &mut Headers, persona: &Persona) {
    headers.set("accept-language", format!("{},en;q=0.8", persona.locale));
    for name in CLIENT_HINT_HEADERS {
        headers.delete(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://www.youtube.com";

    #[test]
    fn test_first_match_order() {
        let set = SchemaSet::default();
        assert_eq!(set.names(), vec!["youtube_qoe", "facebook_pixel", "tiktok_pixel", "generic_analytics"]);
        assert_eq!(set.find("https://www.youtube.com/api/stats/qoe?docid=x", PAGE), Some("youtube_qoe"));
        assert_eq!(set.find("https://www.facebook.com/tr/?id=1", PAGE), Some("facebook_pixel"));
        assert_eq!(set.find("https://analytics.tiktok.com/api/track/v2", PAGE), Some("tiktok_pixel"));
        assert_eq!(set.find("https://www.google-analytics.com/g/collect", PAGE), Some("generic_analytics"));
        assert_eq!(set.find("https://www.youtube.com/watch?v=1", PAGE), None);
        assert_eq!(set.find("https://example.com/collect", PAGE), None);
    }

    #[test]
    fn test_unmatched_passes_through() {
        let set = SchemaSet::default();
        let init = RequestInit::default();
        assert!(set.mutate("https://example.com/api", &init, PAGE, "k").is_none());
        assert!(set.mutate("::not a url::", &init, PAGE, "k").is_none());
    }

    #[test]
    fn test_relative_url_resolved() {
        let set = SchemaSet::default();
        let m = set.mutate("/api/stats/qoe?gl=DE", &RequestInit::default(), PAGE, "k").unwrap();
        assert!(m.url.starts_with("https://www.youtube.com/api/stats/qoe?"));
        assert!(!m.url.contains("gl="));
    }

    #[test]
    fn test_region_normalization() {
        let mut q = QueryParams::parse("gl=US&hl=de&country=FR&timezone=Europe%2FBerlin&x=1");
        normalize_region_params(&mut q);
        assert_eq!(q.encode(), "hl=en&timezone=UTC&x=1");
    }

    #[test]
    fn test_headers_scrubbed() {
        let mut init = RequestInit::default();
        init.headers.set("Sec-CH-UA-Platform", "\"macOS\"");
        init.headers.set("Sec-CH-UA-Model", "\"\"");
        init.headers.set("X-Keep", "1");
        let m = SchemaSet::default()
            .mutate("https://www.google-analytics.com/g/collect", &init, PAGE, "k")
            .unwrap();
        assert_eq!(m.init.headers.get("accept-language"), Some("en-US,en;q=0.8"));
        assert!(!m.init.headers.contains("sec-ch-ua-platform"));
        assert!(!m.init.headers.contains("sec-ch-ua-model"));
        assert_eq!(m.init.headers.get("x-keep"), Some("1"));
    }

    #[test]
    fn test_same_origin_same_rewrite() {
        let set = SchemaSet::default();
        let url = "https://rr1.googlevideo.com/api/stats/qoe?bwe=1";
        let a = set.mutate(url, &RequestInit::default(), PAGE, "key").unwrap();
        let b = set.mutate(url, &RequestInit::default(), PAGE, "key").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_headers_deserialize_lowercased() {
        let init: RequestInit =
            serde_json::from_str(r#"{"headers":{"Content-Type":"application/json"},"body":"{}"}"#).unwrap();
        assert_eq!(init.headers.content_type(), "application/json");
        assert_eq!(init.method, None);
    }
}
