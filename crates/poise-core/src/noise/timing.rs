//! Clock quantization.
//!
//! `performance.now()` is floored to a mode-dependent step after a per-origin
//! offset, so differences below one step are unobservable. The wall clock is
//! skewed by a per-origin offset and floored to a coarser step. Only "now"-like
//! timestamps are touched; explicit historical dates pass through.

use crate::prng::NoiseSource;
use crate::types::Mode;

/// Timestamps within this distance of the real clock count as "now".
pub const NOW_WINDOW_MS: f64 = 1000.0;

/// A millisecond clock.
pub trait ClockSource {
    fn now(&self) -> f64;
}

impl<F: Fn() -> f64> ClockSource for F {
    fn now(&self) -> f64 {
        self()
    }
}

/// Milliseconds since the Unix epoch.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[cfg(not(target_arch = "wasm32"))]
impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

/// `performance.now()` step in ms.
pub fn perf_step(mode: Mode) -> f64 {
    match mode {
        Mode::Baseline => 4.0,
        Mode::Moderate => 8.0,
        Mode::Strict => 12.0,
    }
}

/// `Date.now()` step in ms.
pub fn wall_step(mode: Mode) -> f64 {
    match mode {
        Mode::Baseline => 6.0,
        Mode::Moderate => 12.0,
        Mode::Strict => 25.0,
    }
}

#[inline]
fn floor_to(v: f64, step: f64) -> f64 {
    (v / step).floor() * step
}

// =============================================================================
// Quantized monotonic clock
// =============================================================================

#[derive(Debug, Clone)]
pub struct QuantizedClock<C> {
    inner: C,
    step: f64,
    offset: f64,
}

impl<C: ClockSource> QuantizedClock<C> {
    pub fn for_mode<R: NoiseSource>(inner: C, mode: Mode, rng: &mut R) -> Self {
        let step = perf_step(mode);
        let offset = (rng.next_f64() * step).floor();
        Self { inner, step, offset }
    }

    pub fn step(&self) -> f64 {
        self.step
    }
}

impl<C: ClockSource> ClockSource for QuantizedClock<C> {
    fn now(&self) -> f64 {
        floor_to(self.inner.now() + self.offset, self.step)
    }
}

// =============================================================================
// Skewed wall clock
// =============================================================================

#[derive(Debug, Clone)]
pub struct SkewedWallClock<C> {
    inner: C,
    step: f64,
    skew: f64,
}

impl<C: ClockSource> SkewedWallClock<C> {
    /// Baseline skews by up to 30 ms, other modes by up to 250 ms.
    pub fn for_mode<R: NoiseSource>(inner: C, mode: Mode, rng: &mut R) -> Self {
        let r = rng.next_f64();
        let skew = match mode {
            Mode::Baseline => (r * 60.0).floor() - 30.0,
            _ => (r * 500.0).floor() - 250.0,
        };
        Self {
            inner,
            step: wall_step(mode),
            skew,
        }
    }

    pub fn skew(&self) -> f64 {
        self.skew
    }

    /// Value for `new Date(ts)`: skewed only if `ts` is close to now.
    pub fn adjust(&self, ts: f64) -> f64 {
        if (ts - self.inner.now()).abs() <= NOW_WINDOW_MS {
            floor_to(ts + self.skew, self.step)
        } else {
            ts
        }
    }
}

impl<C: ClockSource> ClockSource for SkewedWallClock<C> {
    fn now(&self) -> f64 {
        floor_to(self.inner.now() + self.skew, self.step)
    }
}
