//! Audio sample and analyser byte noise.

use crate::prng::NoiseSource;
use crate::types::Surface;

use super::MutatorError;

/// Add `signed * amp` to every float sample.
pub fn noise_channel_data<R: NoiseSource>(samples: &mut [f32], amp: f64, rng: &mut R) -> Result<(), MutatorError> {
    if samples.is_empty() {
        return Err(MutatorError::EmptyBuffer(Surface::AudioSamples));
    }
    for s in samples.iter_mut() {
        *s += (rng.signed() * amp) as f32;
    }
    Ok(())
}

/// Perturb analyser bytes, clamped to `[0, 255]`.
pub fn noise_analyser_bytes<R: NoiseSource>(bytes: &mut [u8], amp: f64, rng: &mut R) -> Result<(), MutatorError> {
    if bytes.is_empty() {
        return Err(MutatorError::EmptyBuffer(Surface::AnalyserBytes));
    }
    let scale = amp * 255.0;
    for b in bytes.iter_mut() {
        let v = *b as f64 + rng.signed() * scale;
        *b = v.round().clamp(0.0, 255.0) as u8;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Mulberry32;

    #[test]
    fn test_samples_stay_within_amplitude() {
        let mut s = vec![0.25f32; 128];
        noise_channel_data(&mut s, 0.0025, &mut Mulberry32::new(11)).unwrap();
        assert!(s.iter().all(|v| (v - 0.25).abs() <= 0.00125 + f32::EPSILON));
        assert!(s.iter().any(|&v| v != 0.25));
    }

    #[test]
    fn test_bytes_clamped() {
        let mut b = vec![0u8, 255, 0, 255];
        noise_analyser_bytes(&mut b, 0.096, &mut Mulberry32::new(5)).unwrap();
        assert!(b[0] <= 13 && b[1] >= 242);
    }

    #[test]
    fn test_empty_buffers_rejected() {
        assert!(noise_channel_data(&mut [], 0.1, &mut Mulberry32::new(1)).is_err());
        assert!(noise_analyser_bytes(&mut [], 0.1, &mut Mulberry32::new(1)).is_err());
    }
}
