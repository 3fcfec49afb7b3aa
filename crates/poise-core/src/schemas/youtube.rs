//! YouTube quality-of-experience stats.

use ::url::Url;

use super::{MutationContext, PayloadSchema, RequestInit};
use crate::domain::host_covers;
use crate::params::to_base36;
use crate::prng::NoiseSource;
use crate::url::{extract_host, extract_path, QueryParams};

const CLIENT_VERSIONS: &[&str] = &["117.0.0.0", "120.0.0.0", "124.0.0.0", "139.0.0.0"];
const AB_BUCKETS: &[&str] = &["A", "B", "C"];

/// Paths of YouTube's player telemetry beacons.
const TELEMETRY_PATHS: &[&str] = &["/youtubei/v1/log_event", "/api/stats", "/ptracking", "/generate_204", "/csi_204"];

pub fn is_youtube_host(host: &str) -> bool {
    host_covers("youtube.com", host) || host_covers("googlevideo.com", host)
}

fn is_youtube_telemetry_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    matches!(host.as_str(), "youtube.com" | "www.youtube.com" | "m.youtube.com" | "youtubei.googleapis.com")
        || host_covers("googlevideo.com", &host)
        || host_covers("ytimg.com", &host)
}

/// Player telemetry (stats, ptracking, log_event) on YouTube hosts.
pub fn is_youtube_telemetry(url: &str) -> bool {
    let Some(host) = extract_host(url) else {
        return false;
    };
    let path = extract_path(url);
    is_youtube_telemetry_host(host) && TELEMETRY_PATHS.iter().any(|p| path.contains(p))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YouTubeQoe;

impl PayloadSchema for YouTubeQoe {
    fn name(&self) -> &'static str {
        "youtube_qoe"
    }

    fn test(&self, url: &Url) -> bool {
        url.host_str().is_some_and(is_youtube_host) && url.path().contains("/api/stats/qoe")
    }

    fn mutate(&self, params: &mut QueryParams, _init: &mut RequestInit, ctx: &mut MutationContext) {
        let p = &ctx.persona;
        let cos = if p.is_windows() { "Win32" } else { "X11" };
        let bwe = format!("10.000:{}", p.bw_kbps as u64 * 1000);
        let bh = format!("10.000:{}.000", p.buf_health);
        let cmt = format!("10.000:{}.000", p.playhead);

        let rng = &mut ctx.rng;
        params.set("cbr", "Chrome");
        params.set("cbrver", *rng.pick(CLIENT_VERSIONS).unwrap_or(&"124.0.0.0"));
        params.set("cplatform", "DESKTOP");
        params.set("cos", cos);
        params.set("ab", *rng.pick(AB_BUCKETS).unwrap_or(&"A"));
        params.set("bwe", bwe);
        params.set("bh", bh);
        params.set("cmt", cmt);
        params.set("bat", "10.000:1:1");
        params.set("vis", "10.000:3");
        params.set("xpn", to_base36((rng.next_f64() * 1e9) as u64));
        params.set("prv", (rng.span(500, 9500)).to_string());
    }
}
