//! Fingerprint mutators
//!
//! Every mutator works on plain buffers or values handed over by the host
//! shell, so the noise logic runs the same in wasm and in native tests. The
//! host decides *where* to intercept; this module decides *what* the page gets
//! back.
//!
//! Noise magnitude is a function of mode and surface only. The generator is
//! keyed per origin, so two origins get the same amplitude but a different
//! pattern.

pub mod audio;
pub mod canvas;
pub mod navigator;
pub mod storage;
pub mod timing;
pub mod webgl;

use crate::policy::PolicyConfig;
use crate::prng::{keyed_rng, Mulberry32};
use crate::types::{Mode, Module, ModuleSet, Surface};

pub use audio::{noise_analyser_bytes, noise_channel_data};
pub use canvas::noise_pixels;
pub use navigator::{ConnectionInfo, HighEntropyValues, NavigatorProfile, ScreenMetrics};
pub use storage::{is_tracker_key, HygienicStorage, KeyValueStorage};
pub use timing::{perf_step, wall_step, ClockSource, QuantizedClock, SkewedWallClock};
pub use webgl::{spoof_parameter, UNMASKED_RENDERER_WEBGL, UNMASKED_VENDOR_WEBGL};

#[derive(Debug, thiserror::Error)]
pub enum MutatorError {
    #[error("pixel buffer length {0} is not a multiple of 4")]
    PixelBufferLength(usize),

    #[error("{0:?} buffer is empty")]
    EmptyBuffer(Surface),
}

/// Noise amplitude for a surface in a mode.
///
/// Pixel and analyser byte surfaces are fractions of the 0..=255 range; audio
/// samples are absolute float offsets. Ratios are roughly 1x / 4x / 12x.
pub fn amplitude(mode: Mode, surface: Surface) -> f64 {
    let table: [f64; 3] = match surface {
        Surface::Canvas | Surface::WebGl | Surface::AnalyserBytes => [0.008, 0.032, 0.096],
        Surface::AudioSamples => [0.0002, 0.0008, 0.0025],
    };
    match mode {
        Mode::Baseline => table[0],
        Mode::Moderate => table[1],
        Mode::Strict => table[2],
    }
}

/// Largest per-value change a byte surface can see in `mode`.
pub fn max_byte_delta(mode: Mode, surface: Surface) -> i32 {
    (0.5 * amplitude(mode, surface) * 255.0).round() as i32
}

/// A mutable read-back buffer from one surface.
#[derive(Debug)]
pub enum SurfaceData<'a> {
    /// RGBA bytes from a 2D canvas or `readPixels`
    Pixels(&'a mut [u8]),
    /// Float samples from `getChannelData`
    Samples(&'a mut [f32]),
    /// Byte data from an analyser node
    Bytes(&'a mut [u8]),
}

// =============================================================================
// Shield
// =============================================================================

/// Per-origin mutator state for one page.
///
/// Holds a single generator for the page lifetime, so successive reads draw
/// fresh noise from the same origin-keyed stream.
#[derive(Debug, Clone)]
pub struct FingerprintShield {
    mode: Mode,
    modules: ModuleSet,
    rng: Mulberry32,
}

impl FingerprintShield {
    /// `key` is the per-origin key handed to the page; empty is allowed.
    pub fn new(mode: Mode, modules: ModuleSet, key: &str, origin: &str) -> Self {
        Self {
            mode,
            modules,
            rng: keyed_rng(key, origin),
        }
    }

    /// Shield for a page under `cfg`. Disabled protection yields no active modules.
    pub fn from_config(cfg: &PolicyConfig, key: &str, origin: &str) -> Self {
        let modules = if cfg.enabled { cfg.module_set() } else { ModuleSet::empty() };
        Self::new(cfg.mode, modules, key, origin)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn is_active(&self, module: Module) -> bool {
        self.modules.has(module)
    }

    /// Mutate one surface buffer. Returns `Ok(false)` when the module is off.
    pub fn mutate(&mut self, surface: Surface, data: SurfaceData<'_>) -> Result<bool, MutatorError> {
        if !self.is_active(surface.module()) {
            return Ok(false);
        }
        let amp = amplitude(self.mode, surface);
        match data {
            SurfaceData::Pixels(buf) => canvas::noise_pixels(buf, amp, &mut self.rng)?,
            SurfaceData::Samples(buf) => audio::noise_channel_data(buf, amp, &mut self.rng)?,
            SurfaceData::Bytes(buf) => audio::noise_analyser_bytes(buf, amp, &mut self.rng)?,
        }
        Ok(true)
    }

    /// Like [`mutate`](Self::mutate) but failures only skip this surface.
    pub fn mutate_isolated(&mut self, surface: Surface, data: SurfaceData<'_>) -> bool {
        match self.mutate(surface, data) {
            Ok(applied) => applied,
            Err(e) => {
                log::warn!("{:?} mutator skipped: {}", surface, e);
                false
            }
        }
    }

    /// WebGL `getParameter` override, if any.
    pub fn webgl_parameter(&self, pname: u32) -> Option<&'static str> {
        if self.is_active(Module::WebglNoise) {
            spoof_parameter(pname)
        } else {
            None
        }
    }

    pub fn perf_clock<C: ClockSource>(&mut self, inner: C) -> Option<QuantizedClock<C>> {
        self.is_active(Module::PerfQuantize)
            .then(|| QuantizedClock::for_mode(inner, self.mode, &mut self.rng))
    }

    /// Wall clock skew is always on while protection is enabled.
    pub fn wall_clock<C: ClockSource>(&mut self, inner: C) -> Option<SkewedWallClock<C>> {
        (!self.modules.is_empty()).then(|| SkewedWallClock::for_mode(inner, self.mode, &mut self.rng))
    }

    pub fn navigator(&self) -> Option<NavigatorProfile> {
        self.is_active(Module::NavigatorClamp)
            .then(|| NavigatorProfile::for_mode(self.mode))
    }

    pub fn storage<S: KeyValueStorage>(&self, inner: S) -> HygienicStorage<S> {
        HygienicStorage::new(inner, self.is_active(Module::StorageHygiene))
    }

    /// Referrer exposed to the page.
    pub fn referrer(&self, real: &str) -> String {
        navigator::neutral_referrer(self.mode, real)
    }
}
