//! Band-limited resampling via rubato
//!
//! Used for two things that are the same operation underneath:
//! - sample-rate conversion of decoded stems to the engine rate
//! - playback-rate resampling (tempo and pitch shift together)

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

use crate::types::StereoBuffer;

/// Input frames per rubato call
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Errors raised by the resampler
#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("Invalid resample factor: {0}")]
    InvalidFactor(f64),

    #[error("Failed to build resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("Resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

fn sinc_params() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Resample a whole buffer so that `output.len() == round(input.len() * factor)`
///
/// `factor` is output frames per input frame: `dst_rate / src_rate` for rate
/// conversion, `1 / tempo_ratio` for playback-rate changes.
pub fn resample(source: &StereoBuffer, factor: f64) -> Result<StereoBuffer, ResampleError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ResampleError::InvalidFactor(factor));
    }
    if source.is_empty() || (factor - 1.0).abs() < 1e-9 {
        return Ok(source.clone());
    }

    let expected_len = (source.len() as f64 * factor).round() as usize;
    let mut resampler =
        SincFixedIn::<f32>::new(factor, 1.1, sinc_params(), RESAMPLE_CHUNK_FRAMES, 2)?;

    let [left, right] = source.to_channels();
    let mut out_left: Vec<f32> = Vec::with_capacity(expected_len + RESAMPLE_CHUNK_FRAMES);
    let mut out_right: Vec<f32> = Vec::with_capacity(expected_len + RESAMPLE_CHUNK_FRAMES);

    let mut pos = 0usize;
    while pos < left.len() {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(left.len());
        let chunk = [&left[pos..end], &right[pos..end]];

        let out = if end - pos == needed {
            resampler.process(&chunk, None)?
        } else {
            resampler.process_partial(Some(&chunk), None)?
        };
        out_left.extend_from_slice(&out[0]);
        out_right.extend_from_slice(&out[1]);
        pos = end;
    }

    // Drain the filter tail until the expected length is covered.
    let mut flushes = 0;
    while out_left.len() < expected_len && flushes < 4 {
        let out = resampler.process_partial::<Vec<f32>>(None, None)?;
        if out[0].is_empty() {
            break;
        }
        out_left.extend_from_slice(&out[0]);
        out_right.extend_from_slice(&out[1]);
        flushes += 1;
    }

    out_left.resize(expected_len, 0.0);
    out_right.resize(expected_len, 0.0);

    Ok(StereoBuffer::from_channels(&out_left, &out_right))
}
