//! Time-stretching via signalsmith-stretch
//!
//! Wraps the signalsmith-stretch library for whole-stem tempo adaptation.
//! Stems are stretched ahead of playback (never on the audio thread), in
//! fixed 256-frame output chunks so memory stays bounded for long stems.
//! Whole-buffer stretches are latency compensated: the output starts on the
//! first source frame and ends on the last.

use signalsmith_stretch::Stretch;

use crate::types::{StereoBuffer, StereoSample};

/// Number of channels (stereo)
const CHANNELS: u32 = 2;

/// Output frames produced per `process` call while stretching a whole buffer
const OUTPUT_CHUNK_SIZE: usize = 256;

/// Block length as a multiple of the hop. Matches the 4:1 ratio of
/// signalsmith's default preset.
const BLOCK_TO_HOP: usize = 4;

/// Stretcher quality configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StretchQuality {
    /// signalsmith `preset_default`
    High,
    /// signalsmith `preset_cheaper` (30-50% faster, slightly lower quality)
    Cheaper,
    /// Explicit hop (interval) in frames; block length is `4 * hop`.
    /// Smaller hops sound better and cost more.
    Hop(usize),
}

/// Time stretcher for tempo adaptation and pitch correction
///
/// Input/output buffers are reinterpreted as interleaved f32 without copying.
pub struct TimeStretcher {
    stretcher: Stretch,
    /// Current stretch ratio (target_bpm / native_bpm)
    ratio: f64,
    /// Transposition in semitones (positive = up)
    pitch_semitones: f64,
}

impl TimeStretcher {
    /// Create a stretcher at `sample_rate` with the given quality
    pub fn new(sample_rate: u32, quality: StretchQuality) -> Self {
        let stretcher = match quality {
            StretchQuality::High => Stretch::preset_default(CHANNELS, sample_rate),
            StretchQuality::Cheaper => Stretch::preset_cheaper(CHANNELS, sample_rate),
            StretchQuality::Hop(hop) => {
                let hop = hop.max(16);
                Stretch::new(CHANNELS, hop * BLOCK_TO_HOP, hop)
            }
        };

        Self {
            stretcher,
            ratio: 1.0,
            pitch_semitones: 0.0,
        }
    }

    /// Set the stretch ratio (target_bpm / native_bpm)
    ///
    /// ratio > 1.0: speed up (fewer output frames per input)
    /// ratio < 1.0: slow down (more output frames per input)
    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.clamp(0.25, 4.0);
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Calculate stretch ratio from BPMs (1.0 when the native BPM is unknown)
    pub fn ratio_from_bpm(native_bpm: f64, target_bpm: f64) -> f64 {
        if native_bpm > 0.0 && target_bpm > 0.0 {
            target_bpm / native_bpm
        } else {
            1.0
        }
    }

    /// Set pitch shift in semitones, clamped to `±max_semitones`
    pub fn set_pitch_semitones(&mut self, semitones: f64, max_semitones: f64) {
        let bound = max_semitones.abs();
        self.pitch_semitones = semitones.clamp(-bound, bound);
        self.stretcher
            .set_transpose_factor_semitones(self.pitch_semitones as f32, None);
    }

    pub fn pitch_semitones(&self) -> f64 {
        self.pitch_semitones
    }

    /// Output frames between an input frame entering the stretcher and its
    /// stretched counterpart leaving it, at the current ratio
    pub fn output_delay(&self) -> usize {
        let input_delay = (self.stretcher.input_latency() as f64 / self.ratio).round() as usize;
        input_delay + self.stretcher.output_latency()
    }

    /// Process one block. The stretch is implied by the size difference:
    /// `input.len() / output.len()`. An empty input drains output only.
    pub fn process(&mut self, input: &StereoBuffer, output: &mut StereoBuffer) {
        let input_len = input.len();
        let output_len = output.len();
        let input_interleaved = input.as_interleaved();
        let output_interleaved = output.as_interleaved_mut();

        output_interleaved[..output_len * 2].fill(0.0);
        self.stretcher.process(
            &input_interleaved[..input_len * 2],
            &mut output_interleaved[..output_len * 2],
        );
    }

    /// Flush remaining audio out of the stretcher
    pub fn flush(&mut self, output: &mut StereoBuffer) {
        let output_len = output.len();
        let output_interleaved = output.as_interleaved_mut();

        output_interleaved[..output_len * 2].fill(0.0);
        self.stretcher.flush(&mut output_interleaved[..output_len * 2]);
    }

    /// Stretch a whole buffer by the current ratio
    ///
    /// Output length is `ceil(source.len() / ratio)`, aligned so output frame
    /// 0 is source frame 0. The stretcher's latency is discarded at the head
    /// and drained at the tail (silent input, then `flush`). Input is
    /// consumed in fractional steps so rounding never drifts over long stems.
    pub fn stretch_buffer(&mut self, source: &StereoBuffer) -> StereoBuffer {
        let ratio = self.ratio;
        if source.is_empty() {
            return StereoBuffer::default();
        }
        self.stretcher.reset();

        let total_output_len = ((source.len() as f64) / ratio).ceil() as usize;
        let output_latency = self.stretcher.output_latency();
        let delay = self.output_delay();
        // Stream frames produced from input: the source plus enough silence
        // to push its last frame past the input latency
        let fed_len = total_output_len + (delay - output_latency);

        let mut output = StereoBuffer::silence(total_output_len);
        let source_slice = source.as_slice();

        // Workspaces are allocated once; the loop only moves the working length.
        let max_input_chunk = ((OUTPUT_CHUNK_SIZE as f64) * ratio * 2.0).ceil() as usize + 1;
        let mut input_workspace = StereoBuffer::with_capacity(max_input_chunk);
        let mut output_workspace = StereoBuffer::with_capacity(OUTPUT_CHUNK_SIZE);

        let mut input_pos = 0usize;
        let mut stream_pos = 0usize;
        let mut fractional_input = 0.0f64;

        while stream_pos < fed_len {
            let chunk_len = OUTPUT_CHUNK_SIZE.min(fed_len - stream_pos);

            fractional_input += (chunk_len as f64) * ratio;
            let input_chunk_len = fractional_input.floor() as usize;
            fractional_input -= input_chunk_len as f64;

            let available = source.len().saturating_sub(input_pos).min(input_chunk_len);
            input_workspace.resize(input_chunk_len);
            let input = input_workspace.as_mut_slice();
            input[..available].copy_from_slice(&source_slice[input_pos..input_pos + available]);
            input[available..].fill(StereoSample::silence());
            input_pos += input_chunk_len;

            output_workspace.resize(chunk_len);
            self.process(&input_workspace, &mut output_workspace);
            place_delayed(&mut output, output_workspace.as_slice(), stream_pos, delay);
            stream_pos += chunk_len;
        }

        if output_latency > 0 {
            let mut tail = StereoBuffer::silence(output_latency);
            self.flush(&mut tail);
            place_delayed(&mut output, tail.as_slice(), stream_pos, delay);
        }

        output
    }
}

/// Copy `chunk`, which starts at `stream_pos` in the stretcher's output
/// stream, into `output` shifted back by `delay` frames
fn place_delayed(output: &mut StereoBuffer, chunk: &[StereoSample], stream_pos: usize, delay: usize) {
    let start = stream_pos.max(delay);
    let chunk_end = stream_pos + chunk.len();
    if start >= chunk_end || start - delay >= output.len() {
        return;
    }
    let dst = start - delay;
    let n = (chunk_end - start).min(output.len() - dst);
    let src = start - stream_pos;
    output.as_mut_slice()[dst..dst + n].copy_from_slice(&chunk[src..src + n]);
}
