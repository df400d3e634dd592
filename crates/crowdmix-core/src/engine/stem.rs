//! Stems sounding on the mix bus

use basedrop::Shared;

use super::gc::gc_handle;
use crate::catalog::StemRecord;
use crate::tempo::{AdaptedAudio, Strategy};
use crate::types::{StereoBuffer, StemRole};

/// A stem adapted to the performance tempo, ready to play
///
/// Built entirely on the performer thread. Immutable once shared with the
/// audio thread.
#[derive(Debug)]
pub struct PreparedStem {
    pub record: StemRecord,
    pub audio: StereoBuffer,
    pub strategy: Strategy,
    pub stretch_ratio: f64,
    pub target_bpm: f64,
}

impl PreparedStem {
    pub fn new(record: StemRecord, adapted: AdaptedAudio, target_bpm: f64) -> Self {
        Self {
            record,
            audio: adapted.audio,
            strategy: adapted.strategy,
            stretch_ratio: adapted.ratio,
            target_bpm,
        }
    }

    pub fn role(&self) -> StemRole {
        self.record.role
    }
}

/// Playback state of one slot: shared audio, cursor and gain
///
/// The audio sits behind `basedrop::Shared`, so dropping an `ActiveStem` on
/// the audio thread only enqueues the buffer for the GC thread.
pub struct ActiveStem {
    prepared: Shared<PreparedStem>,
    cursor: usize,
    gain: f32,
}

impl ActiveStem {
    pub fn new(prepared: PreparedStem, gain: f32) -> Self {
        Self {
            prepared: Shared::new(&gc_handle(), prepared),
            cursor: 0,
            gain: gain.clamp(0.0, 1.0),
        }
    }

    /// Start playback at `cursor` (wrapped into the audio length)
    pub fn with_cursor(mut self, cursor: usize) -> Self {
        let len = self.prepared.audio.len();
        self.cursor = if len == 0 { 0 } else { cursor % len };
        self
    }

    pub fn prepared(&self) -> &PreparedStem {
        &self.prepared
    }

    pub fn record(&self) -> &StemRecord {
        &self.prepared.record
    }

    pub fn len(&self) -> usize {
        self.prepared.audio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prepared.audio.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn restart(&mut self) {
        self.cursor = 0;
    }

    /// Add the next `out.len()` frames, scaled by `gain * master`, into `out`
    ///
    /// Wraps to the first frame at the end of the audio. Real-time safe.
    pub fn mix_into(&mut self, out: &mut StereoBuffer, master: f32) {
        let audio = self.prepared.audio.as_slice();
        if audio.is_empty() {
            return;
        }
        let scale = self.gain * master;
        let mut cursor = self.cursor;
        let mut written = 0;
        let total = out.len();
        let dest = out.as_mut_slice();

        while written < total {
            let run = (audio.len() - cursor).min(total - written);
            for (d, s) in dest[written..written + run]
                .iter_mut()
                .zip(&audio[cursor..cursor + run])
            {
                *d += *s * scale;
            }
            written += run;
            cursor += run;
            if cursor >= audio.len() {
                cursor = 0;
            }
        }
        self.cursor = cursor;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::types::StereoSample;

    pub fn record(song: &str, role: StemRole, bpm: f64) -> StemRecord {
        StemRecord {
            song_id: song.to_owned(),
            role,
            native_bpm: bpm,
            sample_path: PathBuf::from(format!("{}/{}.wav", song, role)),
            duration: Duration::from_secs(1),
        }
    }

    /// Prepared stem holding `len` frames of a constant value
    pub fn constant_stem(song: &str, role: StemRole, value: f32, len: usize) -> PreparedStem {
        PreparedStem {
            record: record(song, role, 120.0),
            audio: StereoBuffer::from_vec(vec![StereoSample::mono(value); len]),
            strategy: Strategy::Passthrough,
            stretch_ratio: 1.0,
            target_bpm: 120.0,
        }
    }

    /// Prepared stem whose frame `i` holds the value `i`
    pub fn ramp_stem(song: &str, role: StemRole, len: usize) -> PreparedStem {
        PreparedStem {
            record: record(song, role, 120.0),
            audio: StereoBuffer::from_vec((0..len).map(|i| StereoSample::mono(i as f32)).collect()),
            strategy: Strategy::Passthrough,
            stretch_ratio: 1.0,
            target_bpm: 120.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_loops_at_end() {
        let mut stem = ActiveStem::new(ramp_stem("a", StemRole::Bass, 5), 1.0);
        let mut out = StereoBuffer::silence(7);
        stem.mix_into(&mut out, 1.0);

        let lefts: Vec<f32> = out.iter().map(|s| s.left).collect();
        assert_eq!(lefts, vec![0.0, 1.0, 2.0, 3.0, 4.0, 0.0, 1.0]);
        assert_eq!(stem.cursor(), 2);
    }

    #[test]
    fn test_gain_and_master_scale() {
        let mut stem = ActiveStem::new(constant_stem("a", StemRole::Drums, 1.0, 16), 0.5);
        let mut out = StereoBuffer::silence(4);
        stem.mix_into(&mut out, 0.5);
        assert!(out.iter().all(|s| (s.left - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_with_cursor_wraps_and_restart() {
        let mut stem = ActiveStem::new(ramp_stem("a", StemRole::Other, 10), 1.0).with_cursor(23);
        assert_eq!(stem.cursor(), 3);
        stem.restart();
        assert_eq!(stem.cursor(), 0);
    }

    #[test]
    fn test_gain_clamped() {
        let stem = ActiveStem::new(constant_stem("a", StemRole::Vocals, 0.1, 4), 3.0);
        assert_eq!(stem.gain(), 1.0);
        let stem = ActiveStem::new(constant_stem("a", StemRole::Vocals, 0.1, 4), -1.0);
        assert_eq!(stem.gain(), 0.0);
    }
}
