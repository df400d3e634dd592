//! Master soft limiter: chunk-peak tanh saturation
//!
//! First stage of the master chain:
//!   sum × master volume → **soft limiter** → hard clipper → output
//!
//! # Algorithm
//!
//! 1. Non-finite samples (NaN, ±inf) are replaced by silence.
//! 2. The chunk peak is measured across both channels.
//! 3. If the peak exceeds the ceiling (0.8), every sample is mapped through
//!    `y = ceiling · tanh(x / peak) / tanh(1)`, so the peak lands on exactly
//!    the ceiling and quieter material is compressed smoothly toward it.
//!
//! Below the ceiling the chunk passes through bit-identical. The limiter is
//! stateless and allocation-free.

use crate::types::{StereoBuffer, StereoSample};

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Peak level the soft stage maps the loudest sample to
pub const SOFT_LIMIT_CEILING: f32 = 0.8;

// ═══════════════════════════════════════════════════════════════════════════════
// Limiter
// ═══════════════════════════════════════════════════════════════════════════════

/// Stateless tanh soft limiter
pub struct MasterLimiter {
    ceiling: f32,
    /// `ceiling / tanh(1)`, the output scale applied after saturation
    scale: f32,
}

impl MasterLimiter {
    pub fn new() -> Self {
        Self::with_ceiling(SOFT_LIMIT_CEILING)
    }

    pub fn with_ceiling(ceiling: f32) -> Self {
        let ceiling = ceiling.clamp(0.01, 1.0);
        Self {
            ceiling,
            scale: ceiling / 1.0_f32.tanh(),
        }
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Process a chunk in place. Returns true when the tanh stage engaged.
    pub fn process(&mut self, buffer: &mut StereoBuffer) -> bool {
        let mut peak = 0.0_f32;
        for sample in buffer.iter_mut() {
            if !sample.left.is_finite() {
                sample.left = 0.0;
            }
            if !sample.right.is_finite() {
                sample.right = 0.0;
            }
            peak = peak.max(sample.peak());
        }

        if peak <= self.ceiling {
            return false;
        }

        let inv_peak = 1.0 / peak;
        for sample in buffer.iter_mut() {
            *sample = StereoSample::new(
                self.scale * (sample.left * inv_peak).tanh(),
                self.scale * (sample.right * inv_peak).tanh(),
            );
        }
        true
    }
}

impl Default for MasterLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn make_buffer(samples: &[(f32, f32)]) -> StereoBuffer {
        let mut buf = StereoBuffer::with_capacity(samples.len());
        buf.resize(samples.len());
        for (i, &(l, r)) in samples.iter().enumerate() {
            buf.as_mut_slice()[i] = StereoSample::new(l, r);
        }
        buf
    }

    #[test]
    fn test_below_ceiling_is_transparent() {
        let mut limiter = MasterLimiter::new();
        let mut buf = make_buffer(&[(0.5, -0.7), (0.1, 0.8)]);
        assert!(!limiter.process(&mut buf));
        assert_eq!(buf[0], StereoSample::new(0.5, -0.7));
        assert_eq!(buf[1], StereoSample::new(0.1, 0.8));
    }

    #[test]
    fn test_peak_maps_to_ceiling() {
        let mut limiter = MasterLimiter::new();
        let mut buf = make_buffer(&[(2.4, -1.2), (0.6, 0.0), (-2.4, 1.0)]);
        assert!(limiter.process(&mut buf));

        assert!((buf[0].left - SOFT_LIMIT_CEILING).abs() < 1e-5);
        assert!((buf[2].left + SOFT_LIMIT_CEILING).abs() < 1e-5);
        assert!(buf.peak() <= SOFT_LIMIT_CEILING + 1e-5);
    }

    #[test]
    fn test_preserves_sign_and_order() {
        let mut limiter = MasterLimiter::new();
        let mut buf = make_buffer(&[(1.5, -0.3), (0.9, 0.3)]);
        limiter.process(&mut buf);
        assert!(buf[0].left > buf[1].left);
        assert!(buf[0].right < 0.0 && buf[1].right > 0.0);
    }

    #[test]
    fn test_non_finite_zeroed() {
        let mut limiter = MasterLimiter::new();
        let mut buf = make_buffer(&[(f32::NAN, 0.2), (0.1, f32::NEG_INFINITY)]);
        limiter.process(&mut buf);
        assert!(buf.is_finite());
        assert_eq!(buf[0].left, 0.0);
        assert_eq!(buf[1].right, 0.0);
    }
}
