//! Common types for crowdmix
//!
//! Stem roles, stereo samples and the stereo buffer used by every stage of
//! the pipeline (decoding, tempo adaptation, mixing and output).

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Default engine sample rate (48kHz). The device rate negotiated at startup
/// takes precedence; stems are converted to it while loading.
pub const SAMPLE_RATE: u32 = 48000;

/// Number of mix bus slots (bass, drums, other, vocals)
pub const NUM_SLOTS: usize = 4;

/// Audio sample type
pub type Sample = f32;

/// Role of a stem inside a song
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemRole {
    Bass,
    Drums,
    Vocals,
    Piano,
    Other,
}

impl StemRole {
    /// Every role a song directory may contain
    pub const ALL: [StemRole; 5] = [
        StemRole::Bass,
        StemRole::Drums,
        StemRole::Vocals,
        StemRole::Piano,
        StemRole::Other,
    ];

    /// Roles forming the stable base layer
    pub const BASE: [StemRole; 3] = [StemRole::Bass, StemRole::Drums, StemRole::Other];

    /// Roles that own a slot on the mix bus, in slot order
    pub const MIXED: [StemRole; NUM_SLOTS] = [
        StemRole::Bass,
        StemRole::Drums,
        StemRole::Other,
        StemRole::Vocals,
    ];

    /// Lowercase name, also used as the stem file name (`<name>.wav`)
    pub fn name(&self) -> &'static str {
        match self {
            StemRole::Bass => "bass",
            StemRole::Drums => "drums",
            StemRole::Vocals => "vocals",
            StemRole::Piano => "piano",
            StemRole::Other => "other",
        }
    }

    /// Mix bus slot for this role, or None if the role is never mixed
    pub fn slot(&self) -> Option<usize> {
        Self::MIXED.iter().position(|r| r == self)
    }
}

impl fmt::Display for StemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single stereo frame
///
/// `#[repr(C)]` keeps the layout `[left, right]`, so a `&[StereoSample]` can be
/// viewed as interleaved `&[f32]` through bytemuck without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Max of abs(left), abs(right)
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

/// A buffer of stereo frames
///
/// Used both for whole decoded stems (owned off the audio thread) and for
/// pre-allocated per-callback work buffers (resized within capacity only).
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Empty buffer with room for `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Buffer of `len` silent frames
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Build from interleaved `[L, R, L, R, ...]` data. A trailing odd sample is ignored.
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        let samples = interleaved
            .chunks_exact(2)
            .map(|frame| StereoSample::new(frame[0], frame[1]))
            .collect();
        Self { samples }
    }

    /// Build from separate left and right channels (truncated to the shorter one)
    pub fn from_channels(left: &[Sample], right: &[Sample]) -> Self {
        let samples = left
            .iter()
            .zip(right.iter())
            .map(|(&l, &r)| StereoSample::new(l, r))
            .collect();
        Self { samples }
    }

    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    /// Split into planar `[left, right]` channel vectors
    pub fn to_channels(&self) -> [Vec<Sample>; 2] {
        let left = self.samples.iter().map(|s| s.left).collect();
        let right = self.samples.iter().map(|s| s.right).collect();
        [left, right]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Resize, filling with silence when growing (may allocate)
    pub fn resize(&mut self, new_len: usize) {
        self.samples.resize(new_len, StereoSample::silence());
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// `new_len` must not exceed the capacity. Newly exposed frames are silent.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        debug_assert!(
            new_len <= self.samples.capacity(),
            "set_len_from_capacity called with len > capacity"
        );
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy interleaved view `[L, R, L, R, ...]`
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Zero-copy mutable interleaved view, handed to signalsmith-stretch
    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.samples)
    }

    #[inline]
    pub fn push(&mut self, sample: StereoSample) {
        self.samples.push(sample);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Peak absolute amplitude across both channels
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }

    /// Whether every sample is finite (no NaN / infinity)
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(StereoSample::is_finite)
    }

    /// Duration in seconds at the given sample rate
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / sample_rate as f64
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_slots() {
        assert_eq!(StemRole::Bass.slot(), Some(0));
        assert_eq!(StemRole::Vocals.slot(), Some(3));
        assert_eq!(StemRole::Piano.slot(), None);
        assert_eq!(StemRole::Other.slot(), Some(2));
        assert!(StemRole::MIXED.iter().all(|r| r.slot().is_some_and(|s| s < NUM_SLOTS)));
    }

    #[test]
    fn test_stereo_buffer_from_interleaved() {
        let buffer = StereoBuffer::from_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer[1], StereoSample::new(3.0, 4.0));
    }

    #[test]
    fn test_channels_split() {
        let buffer = StereoBuffer::from_channels(&[0.1, 0.2], &[-0.1, -0.2]);
        let [left, right] = buffer.to_channels();
        assert_eq!(left, vec![0.1, 0.2]);
        assert_eq!(right, vec![-0.1, -0.2]);
        assert_eq!(buffer.as_interleaved(), &[0.1, -0.1, 0.2, -0.2]);
    }

    #[test]
    fn test_peak_and_finite() {
        let mut buffer = StereoBuffer::from_interleaved(&[0.2, -0.7, 0.5, 0.1]);
        assert!((buffer.peak() - 0.7).abs() < 1e-6);
        assert!(buffer.is_finite());
        buffer[0].left = f32::NAN;
        assert!(!buffer.is_finite());
    }

    #[test]
    fn test_set_len_from_capacity_keeps_allocation() {
        let mut buffer = StereoBuffer::silence(64);
        buffer.set_len_from_capacity(16);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.capacity() >= 64);
        buffer.set_len_from_capacity(64);
        assert_eq!(buffer.len(), 64);
    }
}
