//! Page-boundary request interception.
//!
//! The host shell wraps `fetch`, `XMLHttpRequest`, `sendBeacon` and
//! `WebSocket.send` and hands every outgoing request to a
//! [`NetworkInterceptor`]. The interceptor answers with what should actually
//! go out. Nothing here knows how the wrapping is done.

use serde::{Deserialize, Serialize};

use crate::policy::{PolicyConfig, PolicyMatcher, Verdict};
use crate::prng::{keyed_rng, Mulberry32, NoiseSource};
use crate::schemas::poison::{build_poison, scrub_json_body};
use crate::schemas::{is_youtube_telemetry, MutationContext, RequestInit, SchemaSet};
use crate::types::{Mode, Module};
use crate::url::{extract_origin, QueryParams};

/// Longest body excerpt carried in a poison notice.
const PREVIEW_LEN: usize = 300;

/// Page API the request came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Fetch,
    Xhr,
    Beacon,
    WebSocket,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Xhr => "xhr",
            Self::Beacon => "beacon",
            Self::WebSocket => "websocket",
        }
    }
}

/// An outgoing request as seen at the page boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingRequest {
    pub transport: Transport,
    pub url: String,
    #[serde(default)]
    pub init: RequestInit,
}

impl OutgoingRequest {
    pub fn new(transport: Transport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            init: RequestInit::default(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.init.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.init.headers.set(name, value);
        self
    }
}

/// Why a request was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "schema", rename_all = "camelCase")]
pub enum RewriteReason {
    /// A payload schema matched
    Schema(&'static str),
    /// Body replaced by a heartbeat
    Poisoned,
    /// Body removed
    BodyDropped,
    /// Identifying JSON fields replaced
    FieldsScrubbed,
}

/// What to actually send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Interception {
    /// Send as-is
    Pass,
    /// Do not send; report success to the page
    Suppress,
    /// Send the rewritten request instead
    Rewrite {
        url: String,
        init: RequestInit,
        reason: RewriteReason,
    },
}

impl Interception {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Page-world notification that a request was poisoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoisonNotice {
    pub url: String,
    pub method: String,
    pub initiator: String,
    pub preview: String,
}

/// Decides the fate of outgoing page requests.
pub trait NetworkInterceptor {
    fn intercept(&mut self, req: OutgoingRequest) -> Interception;

    /// Notices produced since the last call.
    fn take_notices(&mut self) -> Vec<PoisonNotice>;
}

// =============================================================================
// Page interceptor
// =============================================================================

/// Interceptor for one page, built from a config snapshot.
#[derive(Debug)]
pub struct PageInterceptor {
    cfg: PolicyConfig,
    matcher: PolicyMatcher,
    schemas: SchemaSet,
    page_url: String,
    ctx: MutationContext,
    rng: Mulberry32,
    clock: fn() -> u64,
    notices: Vec<PoisonNotice>,
}

impl PageInterceptor {
    /// `page_url` is the document location; `key` the per-origin key.
    pub fn new(cfg: PolicyConfig, page_url: &str, key: &str) -> Self {
        let origin = extract_origin(page_url).unwrap_or_default();
        Self {
            matcher: cfg.matcher(),
            cfg,
            schemas: SchemaSet::default(),
            page_url: page_url.to_string(),
            ctx: MutationContext::new(&origin, key),
            rng: keyed_rng(key, &origin),
            clock: epoch_millis,
            notices: Vec::new(),
        }
    }

    /// Replace the timestamp source used in heartbeat bodies.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Swap the config after a live update from the extension.
    pub fn update_config(&mut self, cfg: PolicyConfig) {
        self.matcher = cfg.matcher();
        self.cfg = cfg;
    }

    fn mode(&self) -> Mode {
        self.cfg.mode
    }

    /// The page or the destination is whitelisted.
    fn exempt(&self, url: &str) -> bool {
        self.matcher.is_whitelisted(&self.page_url) || self.matcher.is_whitelisted(url)
    }

    /// Whether the page-world heuristic selects this request.
    pub fn should_poison(&self, url: &str) -> bool {
        if !self.cfg.enabled || self.exempt(url) {
            return false;
        }
        match self.matcher.decide(url) {
            Verdict::Block(_) | Verdict::Poison(_) => true,
            Verdict::Allow(_) => false,
            Verdict::Neutral => self.mode() == Mode::Strict && is_youtube_telemetry(url),
        }
    }

    fn notify(&mut self, transport: Transport, url: &str, body: Option<&str>) {
        let preview: String = body.unwrap_or("").chars().take(PREVIEW_LEN).collect();
        self.notices.push(PoisonNotice {
            url: url.to_string(),
            method: transport.as_str().to_string(),
            initiator: self.page_url.clone(),
            preview,
        });
    }

    fn poison_body(&mut self, req: &OutgoingRequest) -> RequestInit {
        let ct = req.init.headers.content_type().to_string();
        let ts = (self.clock)();
        let body = build_poison(
            req.init.body.as_deref(),
            &ct,
            ts,
            &self.cfg.modules.poison_config,
            &mut self.rng,
        );
        let mut init = req.init.clone();
        init.body = Some(body);
        let lower = ct.to_ascii_lowercase();
        if !ct.is_empty() && !lower.contains("json") && !lower.contains("x-www-form-urlencoded") {
            init.headers.set("content-type", "application/json");
        }
        init
    }

    /// Randomize YouTube experiment telemetry parameters.
    fn noise_telemetry_url(&mut self, url: &str) -> String {
        let Some(mut parsed) = crate::schemas::resolve(url, &self.ctx.page_origin) else {
            return url.to_string();
        };
        let mut params = QueryParams::from_url(&parsed);
        params.set("xpn", crate::params::to_base36((self.rng.next_f64() * 1e9) as u64));
        params.set("prv", self.rng.below(1_000_000).to_string());
        params.set("ab", *self.rng.pick(&["A", "B", "C", "D"]).unwrap_or(&"A"));
        params.apply_to(&mut parsed);
        parsed.into()
    }

    fn intercept_beacon(&mut self, req: OutgoingRequest) -> Interception {
        let host_denied = crate::url::extract_host(&req.url).is_some_and(|h| self.matcher.is_deny_host(h));
        if host_denied && self.cfg.modules.get(Module::BlockBeacons) {
            return Interception::Suppress;
        }
        if self.mode() == Mode::Strict {
            let init = self.poison_body(&req);
            self.notify(Transport::Beacon, &req.url, init.body.as_deref());
            return Interception::Rewrite {
                url: req.url,
                init,
                reason: RewriteReason::Poisoned,
            };
        }
        Interception::Suppress
    }

    fn intercept_http(&mut self, req: OutgoingRequest) -> Interception {
        if self.mode() == Mode::Strict {
            let init = self.poison_body(&req);
            let url = if is_youtube_telemetry(&req.url) {
                self.noise_telemetry_url(&req.url)
            } else {
                req.url.clone()
            };
            self.notify(req.transport, &url, init.body.as_deref());
            return Interception::Rewrite {
                url,
                init,
                reason: RewriteReason::Poisoned,
            };
        }
        let mut init = req.init;
        init.body = None;
        Interception::Rewrite {
            url: req.url,
            init,
            reason: RewriteReason::BodyDropped,
        }
    }

    fn intercept_socket(&mut self, req: OutgoingRequest) -> Interception {
        let frame = match req.init.body.as_deref() {
            Some(f) if f.trim_start().starts_with('{') => f,
            _ => return Interception::Pass,
        };
        match scrub_json_body(frame, &self.cfg.modules.poison_config, &mut self.rng) {
            Some(scrubbed) => {
                let mut init = req.init.clone();
                init.body = Some(scrubbed);
                Interception::Rewrite {
                    url: req.url,
                    init,
                    reason: RewriteReason::FieldsScrubbed,
                }
            }
            None => Interception::Pass,
        }
    }
}

impl NetworkInterceptor for PageInterceptor {
    fn intercept(&mut self, req: OutgoingRequest) -> Interception {
        if !self.cfg.enabled || self.exempt(&req.url) {
            return Interception::Pass;
        }
        if self.cfg.audit_mode {
            if self.should_poison(&req.url) {
                log::info!("audit: would intercept {} {}", req.transport.as_str(), req.url);
            }
            return Interception::Pass;
        }

        if req.transport != Transport::WebSocket && self.mode().rewrites_payloads() {
            if let Some(m) = self.schemas.mutate_with(&req.url, &req.init, &mut self.ctx) {
                self.notify(req.transport, &m.url, m.init.body.as_deref());
                return Interception::Rewrite {
                    url: m.url,
                    init: m.init,
                    reason: RewriteReason::Schema(m.schema),
                };
            }
        }

        if !self.should_poison(&req.url) {
            return Interception::Pass;
        }
        match req.transport {
            Transport::Beacon => self.intercept_beacon(req),
            Transport::Fetch | Transport::Xhr => self.intercept_http(req),
            Transport::WebSocket => self.intercept_socket(req),
        }
    }

    fn take_notices(&mut self) -> Vec<PoisonNotice> {
        std::mem::take(&mut self.notices)
    }
}

/// Wall-clock milliseconds since the Unix epoch. Hosts without a system
/// clock inject their own through `with_clock`.
#[cfg(not(target_arch = "wasm32"))]
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(target_arch = "wasm32")]
pub fn epoch_millis() -> u64 {
    0
}
