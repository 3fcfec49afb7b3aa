//! Stable fake device/network persona per origin.
//!
//! Every field is either a constant or a draw from the supplied generator in a
//! fixed order: platform, bandwidth, buffer health, playhead. Changing that
//! order changes every persona in the wild, so don't.

use serde::Serialize;

use crate::prng::{rng_for_origin, NoiseSource};

pub const PERSONA_LOCALE: &str = "en-US";
pub const PERSONA_TZ: &str = "UTC";
pub const PERSONA_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124 Safari/537.36";

const PLATFORMS: [&str; 2] = ["Win32", "X11"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// Fabricated device characteristics reported to tracker payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub locale: &'static str,
    pub tz: &'static str,
    pub platform: &'static str,
    pub ua: &'static str,
    pub screen: ScreenSize,
    /// Estimated bandwidth, kbit/s
    pub bw_kbps: u32,
    /// Buffer health, seconds
    pub buf_health: u32,
    /// Playhead position, seconds
    pub playhead: u32,
}

impl Persona {
    /// Persona for an origin, from a fresh generator.
    pub fn for_origin(origin: &str) -> Self {
        build_persona(&mut rng_for_origin(origin))
    }

    pub fn is_windows(&self) -> bool {
        self.platform == PLATFORMS[0]
    }
}

/// Derive a persona by consuming exactly four draws from `rng`.
pub fn build_persona<R: NoiseSource>(rng: &mut R) -> Persona {
    let platform = if rng.next_f64() > 0.5 { PLATFORMS[0] } else { PLATFORMS[1] };
    let bw_kbps = rng.span(3500, 5500);
    let buf_health = rng.span(45, 75);
    let playhead = rng.span(20, 600);

    Persona {
        locale: PERSONA_LOCALE,
        tz: PERSONA_TZ,
        platform,
        ua: PERSONA_UA,
        screen: ScreenSize { width: 1920, height: 1080 },
        bw_kbps,
        buf_health,
        playhead,
    }
}
