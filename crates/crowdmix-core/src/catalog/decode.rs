//! WAV stem decoding via hound

use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader};

use super::CatalogError;
use crate::tempo::resample;
use crate::types::{StereoBuffer, StereoSample};

/// Header facts read without decoding samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
}

fn wav_error(path: &Path, source: hound::Error) -> CatalogError {
    CatalogError::Wav {
        path: path.to_path_buf(),
        source,
    }
}

/// Read the WAV header of a stem
pub fn read_wav_info(path: &Path) -> Result<WavInfo, CatalogError> {
    let reader = WavReader::open(path).map_err(|e| wav_error(path, e))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(CatalogError::NoChannels {
            path: path.to_path_buf(),
        });
    }
    let frames = reader.duration() as f64;
    let duration = if spec.sample_rate > 0 {
        Duration::from_secs_f64(frames / spec.sample_rate as f64)
    } else {
        Duration::ZERO
    };
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration,
    })
}

/// Decode a stem to stereo f32 at `target_sample_rate`
///
/// Mono is duplicated to both channels, channels beyond the second are
/// dropped, and integer formats are scaled to [-1, 1).
pub fn load_stem_audio(path: &Path, target_sample_rate: u32) -> Result<StereoBuffer, CatalogError> {
    let mut reader = WavReader::open(path).map_err(|e| wav_error(path, e))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(CatalogError::NoChannels {
            path: path.to_path_buf(),
        });
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| wav_error(path, e))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| wav_error(path, e))?
        }
    };

    let mut buffer = StereoBuffer::with_capacity(interleaved.len() / channels);
    for frame in interleaved.chunks_exact(channels) {
        let sample = if channels == 1 {
            StereoSample::mono(frame[0])
        } else {
            StereoSample::new(frame[0], frame[1])
        };
        buffer.push(sample);
    }

    if spec.sample_rate != target_sample_rate && spec.sample_rate > 0 {
        log::debug!(
            "Catalog: resampling {} from {} Hz to {} Hz",
            path.display(),
            spec.sample_rate,
            target_sample_rate
        );
        let factor = target_sample_rate as f64 / spec.sample_rate as f64;
        buffer = resample(&buffer, factor).map_err(|source| CatalogError::Resample {
            path: path.to_path_buf(),
            source,
        })?;
    }

    Ok(buffer)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use hound::{SampleFormat, WavSpec, WavWriter};

    /// Write a short 16-bit WAV with a constant value per channel
    pub fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize, value: i16) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            for ch in 0..channels {
                let v = if ch == 1 { -value } else { value };
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::write_wav;
    use super::*;

    #[test]
    fn test_read_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bass.wav");
        write_wav(&path, 2, 48_000, 24_000, 1000);

        let info = read_wav_info(&path).unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 48_000);
        assert_eq!(info.duration, Duration::from_millis(500));
    }

    #[test]
    fn test_mono_is_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocals.wav");
        write_wav(&path, 1, 48_000, 100, 16384);

        let buf = load_stem_audio(&path, 48_000).unwrap();
        assert_eq!(buf.len(), 100);
        assert_eq!(buf[10], StereoSample::mono(0.5));
    }

    #[test]
    fn test_stereo_scaling_and_resample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drums.wav");
        write_wav(&path, 2, 44_100, 4410, 8192);

        let native = load_stem_audio(&path, 44_100).unwrap();
        assert_eq!(native[0], StereoSample::new(0.25, -0.25));

        let converted = load_stem_audio(&path, 48_000).unwrap();
        assert_eq!(converted.len(), 4800);
    }

    #[test]
    fn test_garbage_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();
        assert!(matches!(read_wav_info(&path), Err(CatalogError::Wav { .. })));
    }
}
