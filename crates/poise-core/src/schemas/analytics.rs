//! Generic analytics collectors sharing the Measurement Protocol vocabulary.

use ::url::Url;

use super::{MutationContext, PayloadSchema, RequestInit};
use crate::domain::host_covers;
use crate::url::QueryParams;

const HOSTS: &[&str] = &["google-analytics.com", "mixpanel.com", "segment.io", "hotjar.com", "fullstory.com"];

#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAnalytics;

impl PayloadSchema for GenericAnalytics {
    fn name(&self) -> &'static str {
        "generic_analytics"
    }

    fn test(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|h| HOSTS.iter().any(|d| host_covers(d, h)))
    }

    /// Only fields already present are overwritten.
    fn mutate(&self, params: &mut QueryParams, _init: &mut RequestInit, ctx: &mut MutationContext) {
        let p = &ctx.persona;
        params.replace("dl", ctx.page_root());
        params.replace("dr", "");
        params.replace("ul", p.locale);
        params.replace("sr", format!("{}x{}", p.screen.width, p.screen.height));
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_present_fields_only() {
        let m = SchemaSet::default()
            .mutate(
                "https://region1.google-analytics.com/g/collect?v=2&ul=de-de&sr=2560x1440&gl=DE",
                &RequestInit::default(),
                "https://blog.test",
                "k",
            )
            .unwrap();
        let q = QueryParams::parse(m.url.split_once('?').unwrap().1);
        assert_eq!(q.get("v"), Some("2"));
        assert_eq!(q.get("ul"), Some("en-US"));
        assert_eq!(q.get("sr"), Some("1920x1080"));
        assert!(!q.has("dl"));
        assert!(!q.has("dr"));
        assert!(!q.has("gl"));
    }
}
