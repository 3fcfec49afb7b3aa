//! Canvas and `readPixels` read-back noise.

use crate::prng::NoiseSource;
use crate::types::Surface;

use super::MutatorError;

/// Perturb RGBA pixels in place. Alpha is never touched.
///
/// Each RGB channel moves by `round(signed * amp * 255)`, saturating at the
/// byte range.
pub fn noise_pixels<R: NoiseSource>(data: &mut [u8], amp: f64, rng: &mut R) -> Result<(), MutatorError> {
    if data.is_empty() {
        return Err(MutatorError::EmptyBuffer(Surface::Canvas));
    }
    if data.len() % 4 != 0 {
        return Err(MutatorError::PixelBufferLength(data.len()));
    }

    let scale = amp * 255.0;
    for px in data.chunks_exact_mut(4) {
        for channel in &mut px[..3] {
            let delta = (rng.signed() * scale).round() as i32;
            *channel = (*channel as i32 + delta).clamp(0, 255) as u8;
        }
    }
    Ok(())
}
