//! Page-world shield.
//!
//! One instance per document. The shell reads `data-cfg` and `data-key` from
//! the bridge element, constructs the shield, and rebuilds its config on every
//! `poise:config` event.

use wasm_bindgen::prelude::*;

use poise_core::intercept::{NetworkInterceptor, OutgoingRequest, PageInterceptor};
use poise_core::noise::{
    is_tracker_key, ClockSource, FingerprintShield, QuantizedClock, SkewedWallClock, SurfaceData,
};
use poise_core::url::extract_origin;
use poise_core::{Module, PolicyConfig, Surface};
use poise_service::{BridgePayload, PoisonedEvent};

use crate::{js_err, parse_config, to_js};

type Clock = fn() -> f64;

fn performance_now() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}

fn date_now() -> f64 {
    js_sys::Date::now()
}

fn epoch_millis() -> u64 {
    js_sys::Date::now() as u64
}

#[wasm_bindgen]
pub struct PageShield {
    key: String,
    origin: String,
    interceptor: PageInterceptor,
    shield: FingerprintShield,
    perf: Option<QuantizedClock<Clock>>,
    wall: Option<SkewedWallClock<Clock>>,
}

impl PageShield {
    fn with_config(cfg: PolicyConfig, key: String, page_url: &str) -> PageShield {
        let origin = extract_origin(page_url).unwrap_or_default();
        let mut shield = FingerprintShield::from_config(&cfg, &key, &origin);
        let perf = shield.perf_clock(performance_now as Clock);
        let wall = shield.wall_clock(date_now as Clock);
        let interceptor = PageInterceptor::new(cfg, page_url, &key).with_clock(epoch_millis);
        PageShield {
            key,
            origin,
            interceptor,
            shield,
            perf,
            wall,
        }
    }
}

#[wasm_bindgen]
impl PageShield {
    /// Build from the bridge element attributes of the current document.
    #[wasm_bindgen(constructor)]
    pub fn new(cfg_attr: &str, key_attr: &str, page_url: &str) -> PageShield {
        let payload = BridgePayload::from_attributes(cfg_attr, key_attr);
        Self::with_config(payload.cfg.to_policy(), payload.key, page_url)
    }

    /// Apply a re-announced config. Noise streams restart for the new mode.
    pub fn update_config(&mut self, cfg_json: &str) {
        let cfg = parse_config(cfg_json);
        let mut shield = FingerprintShield::from_config(&cfg, &self.key, &self.origin);
        self.perf = shield.perf_clock(performance_now as Clock);
        self.wall = shield.wall_clock(date_now as Clock);
        self.shield = shield;
        self.interceptor.update_config(cfg);
    }

    /// Decide an outgoing `fetch`/XHR/beacon/WebSocket request.
    ///
    /// Returns `{action: "pass" | "suppress" | "rewrite", ...}`.
    pub fn intercept(&mut self, request_json: &str) -> Result<JsValue, JsValue> {
        let req: OutgoingRequest = serde_json::from_str(request_json).map_err(js_err)?;
        to_js(&self.interceptor.intercept(req))
    }

    pub fn should_poison(&self, url: &str) -> bool {
        self.interceptor.should_poison(url)
    }

    /// Poisoning events since the last call, shaped as `POISONED_EVENT`
    /// message payloads.
    pub fn take_poisoned_events(&mut self) -> Result<JsValue, JsValue> {
        let events: Vec<PoisonedEvent> = self
            .interceptor
            .take_notices()
            .into_iter()
            .map(PoisonedEvent::from)
            .collect();
        to_js(&events)
    }

    pub fn noise_canvas(&mut self, rgba: &mut [u8]) -> bool {
        self.shield.mutate_isolated(Surface::Canvas, SurfaceData::Pixels(rgba))
    }

    pub fn noise_webgl_pixels(&mut self, rgba: &mut [u8]) -> bool {
        self.shield.mutate_isolated(Surface::WebGl, SurfaceData::Pixels(rgba))
    }

    pub fn noise_audio_samples(&mut self, samples: &mut [f32]) -> bool {
        self.shield.mutate_isolated(Surface::AudioSamples, SurfaceData::Samples(samples))
    }

    pub fn noise_analyser_bytes(&mut self, bytes: &mut [u8]) -> bool {
        self.shield.mutate_isolated(Surface::AnalyserBytes, SurfaceData::Bytes(bytes))
    }

    /// Spoofed `getParameter` value, or `undefined` to call through.
    pub fn webgl_parameter(&self, pname: u32) -> Option<String> {
        self.shield.webgl_parameter(pname).map(str::to_string)
    }

    /// Navigator overrides, or `null` when clamping is off.
    pub fn navigator(&self) -> Result<JsValue, JsValue> {
        match self.shield.navigator() {
            Some(profile) => to_js(&profile),
            None => Ok(JsValue::NULL),
        }
    }

    pub fn referrer(&self, real: &str) -> String {
        self.shield.referrer(real)
    }

    pub fn performance_now(&self) -> f64 {
        match &self.perf {
            Some(clock) => clock.now(),
            None => performance_now(),
        }
    }

    pub fn date_now(&self) -> f64 {
        match &self.wall {
            Some(clock) => clock.now(),
            None => date_now(),
        }
    }

    /// Value for `new Date(ts)`.
    pub fn adjust_date(&self, ts: f64) -> f64 {
        match &self.wall {
            Some(clock) => clock.adjust(ts),
            None => ts,
        }
    }

    /// Whether a storage key should be hidden from the page.
    pub fn hides_storage_key(&self, key: &str) -> bool {
        self.shield.is_active(Module::StorageHygiene) && is_tracker_key(key)
    }
}
