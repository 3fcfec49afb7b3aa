//! TikTok pixel.

use ::url::Url;

use super::{MutationContext, PayloadSchema, RequestInit};
use crate::domain::host_covers;
use crate::url::QueryParams;

#[derive(Debug, Clone, Copy, Default)]
pub struct TikTokPixel;

impl PayloadSchema for TikTokPixel {
    fn name(&self) -> &'static str {
        "tiktok_pixel"
    }

    fn test(&self, url: &Url) -> bool {
        let host_ok = url
            .host_str()
            .is_some_and(|h| host_covers("tiktok.com", h) || host_covers("ttwstatic.com", h));
        let path = url.path();
        host_ok && (path.contains("/i18n/pixel/") || path.contains("/api/track/"))
    }

    fn mutate(&self, params: &mut QueryParams, _init: &mut RequestInit, ctx: &mut MutationContext) {
        let p = &ctx.persona;
        params.set("referer", ctx.page_root());
        params.set("user_agent", p.ua);
        params.set("timezone", p.tz);
        params.set("screen_width", p.screen.width.to_string());
        params.set("screen_height", p.screen.height.to_string());
        params.set("language", p.locale);
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_pixel_rewrite() {
        let m = SchemaSet::default()
            .mutate(
                "https://analytics.tiktok.com/i18n/pixel/events.js?sdkid=X&timezone=Asia%2FTokyo&screen_width=3024",
                &RequestInit::default(),
                "https://store.test",
                "k",
            )
            .unwrap();
        let q = QueryParams::parse(m.url.split_once('?').unwrap().1);
        assert_eq!(q.get("sdkid"), Some("X"));
        assert_eq!(q.get("timezone"), Some("UTC"));
        assert_eq!(q.get("screen_width"), Some("1920"));
        assert_eq!(q.get("screen_height"), Some("1080"));
        assert_eq!(q.get("language"), Some("en-US"));
        assert_eq!(q.get("referer"), Some("https://store.test/"));
    }
}
