//! Seeded deterministic generators.
//!
//! The seed is a pure function of the origin string, so re-creating a
//! generator for the same origin replays the same sequence from the start.
//! Determinism is the point here: nothing in this module uses OS randomness.

use crate::hash::{fnv1a_32, xmur3_32};
use crate::url::extract_host;

/// Salt distinguishing persona seeds from every other use of the origin hash.
pub const PERSONA_SALT: &str = "::privateness";

/// Seed used when the origin string yields nothing usable.
const DEFAULT_SEED_INPUT: &str = "default";

/// Replacement for an all-zero xorshift state, which would be a fixed point.
const ZERO_STATE_FALLBACK: u32 = 0x9e37_79b9;

const TWO_POW_32: f64 = 4_294_967_296.0;

/// A restartable stream of floats in `[0, 1)`.
pub trait NoiseSource {
    /// Next value in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Next value in `[-0.5, 0.5)`.
    #[inline]
    fn signed(&mut self) -> f64 {
        self.next_f64() - 0.5
    }

    /// `floor(next * n)`, an index in `0..n`. Returns 0 when `n == 0`.
    #[inline]
    fn below(&mut self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        ((self.next_f64() * n as f64) as u32).min(n - 1)
    }

    /// `floor(lo + next * span)`.
    #[inline]
    fn span(&mut self, lo: u32, span: u32) -> u32 {
        (lo as f64 + self.next_f64() * span as f64).floor() as u32
    }

    /// Pick one element of a non-empty slice.
    fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T>
    where
        Self: Sized,
    {
        if items.is_empty() {
            return None;
        }
        items.get(self.below(items.len() as u32) as usize)
    }
}

// =============================================================================
// xorshift32
// =============================================================================

/// Marsaglia xorshift32. Drives persona derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    pub fn new(seed: u32) -> Self {
        let state = if seed == 0 { ZERO_STATE_FALLBACK } else { seed };
        Self { state }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }
}

impl NoiseSource for Xorshift32 {
    #[inline]
    fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / TWO_POW_32
    }
}

// =============================================================================
// mulberry32
// =============================================================================

/// mulberry32. Drives page-world noise keyed by the per-origin key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6d2b_79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }
}

impl NoiseSource for Mulberry32 {
    #[inline]
    fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / TWO_POW_32
    }
}

// =============================================================================
// Seeding
// =============================================================================

/// Compute the persona seed for an origin-like string.
///
/// Full URLs and origins are reduced to their hostname; a bare string is used
/// as-is; an empty string falls back to `"default"`.
pub fn seed_for_origin(origin: &str) -> u32 {
    let trimmed = origin.trim();
    let base = match extract_host(trimmed) {
        Some(host) => host.to_ascii_lowercase(),
        None if !trimmed.is_empty() => trimmed.to_string(),
        None => DEFAULT_SEED_INPUT.to_string(),
    };
    fnv1a_32(&format!("{base}{PERSONA_SALT}"))
}

/// Fresh persona generator for an origin. Same origin, same sequence.
pub fn rng_for_origin(origin: &str) -> Xorshift32 {
    Xorshift32::new(seed_for_origin(origin))
}

/// Fresh page-world generator seeded from `key::origin`.
pub fn keyed_rng(key: &str, origin: &str) -> Mulberry32 {
    Mulberry32::new(xmur3_32(&format!("{key}::{origin}")))
}
