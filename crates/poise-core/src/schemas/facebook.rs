//! Facebook / Instagram pixel.

use ::url::Url;

use super::{MutationContext, PayloadSchema, RequestInit};
use crate::domain::host_covers;
use crate::prng::NoiseSource;
use crate::url::QueryParams;

const HOSTS: &[&str] = &["facebook.com", "fbcdn.net", "instagram.com"];

#[derive(Debug, Clone, Copy, Default)]
pub struct FacebookPixel;

fn is_pixel_path(path: &str) -> bool {
    path == "/tr" || path.contains("/tr/") || path.contains("/pixel/") || path.contains("/events")
}

impl PayloadSchema for FacebookPixel {
    fn name(&self) -> &'static str {
        "facebook_pixel"
    }

    fn test(&self, url: &Url) -> bool {
        let host_ok = url
            .host_str()
            .is_some_and(|h| HOSTS.iter().any(|d| host_covers(d, h)));
        host_ok && is_pixel_path(url.path())
    }

    fn mutate(&self, params: &mut QueryParams, _init: &mut RequestInit, ctx: &mut MutationContext) {
        let anon = 1_000_000_000_000u64 + (ctx.rng.next_f64() * 8_999_999_999_999.0) as u64;
        params.set("dl", ctx.page_root());
        params.set("dr", "");
        params.set("ua", ctx.persona.ua);
        params.set("fbp", format!("fbp.{anon}"));
        params.set("fbc", "");
        params.set("it", "0");
        params.set("ev", "PageView");
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_pixel_rewrite() {
        let m = SchemaSet::default()
            .mutate(
                "https://www.facebook.com/tr/?id=123&ev=Purchase&dl=https%3A%2F%2Fshop.test%2Fcart&fbp=fb.1.real",
                &RequestInit::default(),
                "https://shop.test",
                "k",
            )
            .unwrap();
        let q = QueryParams::parse(m.url.split_once('?').unwrap().1);
        assert_eq!(q.get("id"), Some("123"));
        assert_eq!(q.get("ev"), Some("PageView"));
        assert_eq!(q.get("dl"), Some("https://shop.test/"));
        assert_eq!(q.get("dr"), Some(""));
        let fbp = q.get("fbp").unwrap();
        assert!(fbp.starts_with("fbp.") && fbp.len() == 4 + 13, "{fbp}");
    }

    #[test]
    fn test_paths() {
        let set = SchemaSet::default();
        let page = "https://a.test";
        assert_eq!(set.find("https://www.facebook.com/tr?id=1", page), Some("facebook_pixel"));
        assert_eq!(set.find("https://graph.instagram.com/events", page), Some("facebook_pixel"));
        assert_eq!(set.find("https://www.facebook.com/profile", page), None);
    }
}
