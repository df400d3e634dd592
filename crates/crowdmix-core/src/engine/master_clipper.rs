//! Master safety clipper: emergency hard clip
//!
//! Second stage of the master chain, after the soft limiter. The soft stage
//! already bounds the peak to 0.8, so this only fires if something upstream
//! misbehaves (a changed ceiling, a bug, denormal garbage). It guarantees the
//! device never receives a sample outside ±0.95.

use crate::types::StereoBuffer;

/// Absolute output ceiling
pub const HARD_CLIP_CEILING: f32 = 0.95;

/// Stateless hard clipper
pub struct MasterClipper {
    threshold: f32,
}

impl MasterClipper {
    pub fn new() -> Self {
        Self {
            threshold: HARD_CLIP_CEILING,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Clip a chunk in place. Returns true when any sample was clipped.
    pub fn process(&mut self, buffer: &mut StereoBuffer) -> bool {
        let t = self.threshold;
        let mut clipped = false;
        for sample in buffer.iter_mut() {
            // NaN fails every comparison; map it to silence first
            if !sample.left.is_finite() {
                sample.left = 0.0;
            }
            if !sample.right.is_finite() {
                sample.right = 0.0;
            }
            if sample.peak() > t {
                clipped = true;
                sample.left = sample.left.clamp(-t, t);
                sample.right = sample.right.clamp(-t, t);
            }
        }
        clipped
    }
}

impl Default for MasterClipper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn make_buffer(samples: &[(f32, f32)]) -> StereoBuffer {
        let mut buf = StereoBuffer::with_capacity(samples.len());
        buf.resize(samples.len());
        for (i, &(l, r)) in samples.iter().enumerate() {
            buf.as_mut_slice()[i] = StereoSample::new(l, r);
        }
        buf
    }

    #[test]
    fn test_below_threshold_bypass() {
        let mut clipper = MasterClipper::new();
        let mut buf = make_buffer(&[(0.9, -0.9), (0.95, -0.95)]);
        assert!(!clipper.process(&mut buf));
        assert_eq!(buf[0], StereoSample::new(0.9, -0.9));
        assert_eq!(buf[1], StereoSample::new(0.95, -0.95));
    }

    #[test]
    fn test_clipping_both_polarities() {
        let mut clipper = MasterClipper::new();
        let mut buf = make_buffer(&[(1.7, -3.0), (0.2, -0.96)]);
        assert!(clipper.process(&mut buf));
        assert_eq!(buf[0], StereoSample::new(HARD_CLIP_CEILING, -HARD_CLIP_CEILING));
        assert_eq!(buf[1], StereoSample::new(0.2, -HARD_CLIP_CEILING));
    }

    #[test]
    fn test_infinity_is_silenced() {
        let mut clipper = MasterClipper::new();
        let mut buf = make_buffer(&[(f32::INFINITY, f32::NAN)]);
        clipper.process(&mut buf);
        assert_eq!(buf[0], StereoSample::silence());
    }
}
