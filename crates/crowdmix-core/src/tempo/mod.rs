//! Tempo adaptation
//!
//! Converts a decoded stem at its native BPM into audio at the performance
//! BPM. Adaptation always runs ahead of playback on the performer thread; the
//! mix bus only ever sees finished buffers.
//!
//! ═══════════════════════════════════════════════════════════════════════
//! STRATEGY SELECTION
//! ═══════════════════════════════════════════════════════════════════════
//!
//! ```text
//!   ratio = target_bpm / native_bpm
//!
//!   |ratio - 1| < threshold ──────────────────────► Passthrough
//!   stretching && pitch shifting ─────────────────► PitchCorrected
//!        resample by ratio, then transpose by -12·log2(ratio) (clamped)
//!   stretching ───────────────────────────────────► TimeStretch
//!        signalsmith at rate 1/ratio, pitch preserved
//!   otherwise ────────────────────────────────────► Resample
//!        rubato playback-rate change, tempo and pitch move together
//! ```

mod resample;

pub use resample::{resample, ResampleError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timestretch::{StretchQuality, TimeStretcher};
use crate::types::StereoBuffer;

/// Errors raised while adapting a stem
#[derive(Error, Debug)]
pub enum AdaptationError {
    #[error("Source audio is empty")]
    EmptyAudio,

    #[error("Source audio contains non-finite samples")]
    NonFiniteAudio,

    #[error("Invalid BPM (native {native}, target {target})")]
    InvalidBpm { native: f64, target: f64 },

    #[error("Resampling failed")]
    Resample(#[from] ResampleError),
}

/// How stems are brought to the performance tempo
///
/// Lives in the `tempo` section of the performer config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoPolicy {
    /// Use signalsmith time-stretching instead of a plain playback-rate change
    pub enable_time_stretching: bool,
    /// Combined with stretching: resample then transpose back toward the
    /// original pitch. The transpose is clamped to
    /// `max_pitch_shift_semitones`, so pitch is only preserved for tempo
    /// changes within that bound. Beyond it the stem stays off pitch by the
    /// remainder (120 -> 150 BPM with a 2 semitone bound leaves it about 1.86
    /// semitones sharp), where plain `TimeStretch` would keep the pitch.
    pub enable_pitch_shifting: bool,
    /// Deviations below this fraction of the native tempo are not processed
    pub time_stretch_threshold: f64,
    /// Bound on the corrective transposition
    pub max_pitch_shift_semitones: f64,
    /// `preset_default` when true, `preset_cheaper` otherwise
    pub high_quality_time_stretch: bool,
    /// Explicit stretcher hop in frames. Overrides the preset when set.
    pub hop_length: Option<usize>,
}

impl Default for TempoPolicy {
    fn default() -> Self {
        Self {
            enable_time_stretching: true,
            enable_pitch_shifting: false,
            time_stretch_threshold: 0.05,
            max_pitch_shift_semitones: 2.0,
            high_quality_time_stretch: true,
            hop_length: None,
        }
    }
}

impl TempoPolicy {
    /// Stretcher quality derived from the hop override and quality flag
    pub fn stretch_quality(&self) -> StretchQuality {
        match self.hop_length {
            Some(hop) => StretchQuality::Hop(hop),
            None if self.high_quality_time_stretch => StretchQuality::High,
            None => StretchQuality::Cheaper,
        }
    }

    /// Pick the strategy for a given tempo ratio
    pub fn strategy_for(&self, ratio: f64) -> Strategy {
        if (ratio - 1.0).abs() < self.time_stretch_threshold {
            Strategy::Passthrough
        } else if self.enable_time_stretching && self.enable_pitch_shifting {
            Strategy::PitchCorrected
        } else if self.enable_time_stretching {
            Strategy::TimeStretch
        } else {
            Strategy::Resample
        }
    }
}

/// Adaptation strategy applied to a stem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Passthrough,
    TimeStretch,
    Resample,
    PitchCorrected,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Passthrough => "passthrough",
            Strategy::TimeStretch => "time-stretch",
            Strategy::Resample => "resample",
            Strategy::PitchCorrected => "pitch-corrected",
        }
    }
}

/// Audio ready for the mix bus, with how it was produced
#[derive(Debug, Clone)]
pub struct AdaptedAudio {
    pub audio: StereoBuffer,
    pub strategy: Strategy,
    /// target_bpm / native_bpm
    pub ratio: f64,
    /// Transposition applied by the pitch-corrected path (0 otherwise)
    pub pitch_shift_semitones: f64,
}

/// Bring `source` from `native_bpm` to `target_bpm` under `policy`
pub fn adapt(
    source: &StereoBuffer,
    native_bpm: f64,
    target_bpm: f64,
    policy: &TempoPolicy,
    sample_rate: u32,
) -> Result<AdaptedAudio, AdaptationError> {
    if source.is_empty() {
        return Err(AdaptationError::EmptyAudio);
    }
    if !(native_bpm.is_finite() && native_bpm > 0.0 && target_bpm.is_finite() && target_bpm > 0.0)
    {
        return Err(AdaptationError::InvalidBpm {
            native: native_bpm,
            target: target_bpm,
        });
    }
    if !source.is_finite() {
        return Err(AdaptationError::NonFiniteAudio);
    }

    let ratio = TimeStretcher::ratio_from_bpm(native_bpm, target_bpm);
    let strategy = policy.strategy_for(ratio);
    let mut pitch_shift_semitones = 0.0;

    let audio = match strategy {
        Strategy::Passthrough => source.clone(),
        Strategy::Resample => resample(source, 1.0 / ratio)?,
        Strategy::TimeStretch => {
            let mut stretcher = TimeStretcher::new(sample_rate, policy.stretch_quality());
            stretcher.set_ratio(ratio);
            stretcher.stretch_buffer(source)
        }
        Strategy::PitchCorrected => {
            let rate_shifted = resample(source, 1.0 / ratio)?;
            let mut stretcher = TimeStretcher::new(sample_rate, policy.stretch_quality());
            stretcher.set_pitch_semitones(-12.0 * ratio.log2(), policy.max_pitch_shift_semitones);
            pitch_shift_semitones = stretcher.pitch_semitones();
            stretcher.stretch_buffer(&rate_shifted)
        }
    };

    Ok(AdaptedAudio {
        audio,
        strategy,
        ratio,
        pitch_shift_semitones,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StereoSample, SAMPLE_RATE};

    fn tone(len: usize) -> StereoBuffer {
        let mut buf = StereoBuffer::with_capacity(len);
        for i in 0..len {
            let v = (2.0 * std::f32::consts::PI * 330.0 * i as f32 / SAMPLE_RATE as f32).sin() * 0.4;
            buf.push(StereoSample::mono(v));
        }
        buf
    }

    fn policy(stretch: bool, pitch: bool) -> TempoPolicy {
        TempoPolicy {
            enable_time_stretching: stretch,
            enable_pitch_shifting: pitch,
            high_quality_time_stretch: false,
            ..TempoPolicy::default()
        }
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(policy(true, false).strategy_for(1.02), Strategy::Passthrough);
        assert_eq!(policy(true, true).strategy_for(1.2), Strategy::PitchCorrected);
        assert_eq!(policy(true, false).strategy_for(0.8), Strategy::TimeStretch);
        assert_eq!(policy(false, true).strategy_for(1.2), Strategy::Resample);
        assert_eq!(policy(false, false).strategy_for(1.2), Strategy::Resample);
    }

    #[test]
    fn test_stretch_quality_from_policy() {
        let mut p = TempoPolicy::default();
        assert_eq!(p.stretch_quality(), StretchQuality::High);
        p.high_quality_time_stretch = false;
        assert_eq!(p.stretch_quality(), StretchQuality::Cheaper);
        p.hop_length = Some(128);
        assert_eq!(p.stretch_quality(), StretchQuality::Hop(128));
    }

    #[test]
    fn test_passthrough_keeps_audio() {
        let source = tone(4800);
        let adapted = adapt(&source, 120.0, 122.0, &policy(true, false), SAMPLE_RATE).unwrap();
        assert_eq!(adapted.strategy, Strategy::Passthrough);
        assert_eq!(adapted.audio.as_slice(), source.as_slice());
    }

    #[test]
    fn test_time_stretch_changes_length() {
        let source = tone(48_000);
        let adapted = adapt(&source, 100.0, 125.0, &policy(true, false), SAMPLE_RATE).unwrap();
        assert_eq!(adapted.strategy, Strategy::TimeStretch);
        assert_eq!(adapted.audio.len(), 38_400);
        assert_eq!(adapted.pitch_shift_semitones, 0.0);
    }

    /// RMS of the first, middle and last 100 ms
    fn head_middle_tail_rms(buf: &StereoBuffer) -> [f32; 3] {
        let window = 4_800;
        let rms = |frames: &[StereoSample]| {
            let sum: f32 = frames.iter().map(|s| s.left * s.left + s.right * s.right).sum();
            (sum / (2 * frames.len()) as f32).sqrt()
        };
        let mid = buf.len() / 2 - window / 2;
        [
            rms(&buf.as_slice()[..window]),
            rms(&buf.as_slice()[mid..mid + window]),
            rms(&buf.as_slice()[buf.len() - window..]),
        ]
    }

    #[test]
    fn test_stretched_audio_spans_whole_stem() {
        let source = tone(96_000);
        for (p, strategy) in [
            (TempoPolicy { enable_pitch_shifting: false, ..TempoPolicy::default() }, Strategy::TimeStretch),
            (TempoPolicy { enable_pitch_shifting: true, ..TempoPolicy::default() }, Strategy::PitchCorrected),
        ] {
            let adapted = adapt(&source, 120.0, 150.0, &p, SAMPLE_RATE).unwrap();
            assert_eq!(adapted.strategy, strategy);
            assert_eq!(adapted.audio.len(), 76_800);

            let silent = adapted
                .audio
                .iter()
                .position(|s| s.peak() > 0.01)
                .unwrap_or(adapted.audio.len());
            assert!(silent < 960, "{}: {} silent leading frames", strategy.name(), silent);

            let [head, middle, tail] = head_middle_tail_rms(&adapted.audio);
            assert!(middle > 0.15, "{}: middle {}", strategy.name(), middle);
            assert!(head > 0.5 * middle, "{}: head {} middle {}", strategy.name(), head, middle);
            assert!(tail > 0.5 * middle, "{}: tail {} middle {}", strategy.name(), tail, middle);
        }
    }

    #[test]
    fn test_resample_changes_length() {
        let source = tone(48_000);
        let adapted = adapt(&source, 120.0, 96.0, &policy(false, false), SAMPLE_RATE).unwrap();
        assert_eq!(adapted.strategy, Strategy::Resample);
        assert_eq!(adapted.audio.len(), 60_000);
    }

    #[test]
    fn test_pitch_correction_is_clamped() {
        let source = tone(48_000);
        // 120 -> 150 would need about -3.86 semitones; the bound is 2
        let adapted = adapt(&source, 120.0, 150.0, &policy(true, true), SAMPLE_RATE).unwrap();
        assert_eq!(adapted.strategy, Strategy::PitchCorrected);
        assert_eq!(adapted.pitch_shift_semitones, -2.0);
        assert_eq!(adapted.audio.len(), 38_400);
        assert!(adapted.audio.is_finite());
    }

    #[test]
    fn test_malformed_input_rejected() {
        let p = TempoPolicy::default();
        assert!(matches!(
            adapt(&StereoBuffer::default(), 120.0, 120.0, &p, SAMPLE_RATE),
            Err(AdaptationError::EmptyAudio)
        ));
        assert!(matches!(
            adapt(&tone(64), 0.0, 120.0, &p, SAMPLE_RATE),
            Err(AdaptationError::InvalidBpm { .. })
        ));

        let mut bad = tone(64);
        bad[3].right = f32::INFINITY;
        assert!(matches!(
            adapt(&bad, 120.0, 120.0, &p, SAMPLE_RATE),
            Err(AdaptationError::NonFiniteAudio)
        ));
    }

    #[test]
    fn test_policy_yaml_partial() {
        let p: TempoPolicy = serde_yaml::from_str("hop_length: 256\nenable_pitch_shifting: true\n").unwrap();
        assert_eq!(p.hop_length, Some(256));
        assert!(p.enable_pitch_shifting);
        assert!(p.enable_time_stretching);
        assert_eq!(p.time_stretch_threshold, 0.05);
    }
}
