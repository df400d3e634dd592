//! CPAL output backend
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │ Performer Thread │───push()───────────►│   Command Queue     │
//! │   (~2s ticks)    │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         │                                           │
//!         │ Relaxed atomics                           │ pop()
//!         ▼                                           ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │    MixAtomics    │◄────────────────────│  CPAL Audio Thread  │
//! │   (lock-free)    │     sync writes     │   (owns MixBus)     │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The callback state is moved into the stream closure, so the audio thread
//! never takes a lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use crate::engine::{command_channel, MixAtomics, MixBus, MixCommand, MAX_BUFFER_SIZE};
use crate::types::StereoBuffer;

use super::backend::{AudioHandle, AudioSystemResult, CommandSender};
use super::config::AudioConfig;
use super::device::{find_device_by_id, get_cpal_default_device, get_output_devices};
use super::error::{AudioError, AudioResult};

/// Keeps the cpal stream alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    _stream: Stream,
    device_name: String,
}

impl CpalAudioHandle {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// Open the configured device and start rendering the mix bus into it
pub fn start_audio_system(config: &AudioConfig, master_volume: f32) -> AudioResult<AudioSystemResult> {
    let device = match &config.device {
        Some(id) => find_device_by_id(id).inspect_err(|_| log_available_devices())?,
        None => get_cpal_default_device()?,
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Audio: using device {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device, config)?;
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;
    log::info!(
        "Audio: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let mix_bus = MixBus::new(master_volume);
    let atomics = mix_bus.atomics();
    let (command_tx, command_rx) = command_channel();

    let state = AudioCallbackState::new(mix_bus, command_rx, sample_rate);
    let stream = build_output_stream(&device, &stream_config, state)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio: stream started");

    Ok(AudioSystemResult {
        handle: AudioHandle::Cpal(CpalAudioHandle {
            _stream: stream,
            device_name,
        }),
        command_sender: CommandSender::new(command_tx),
        atomics,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// State owned by the output callback
struct AudioCallbackState {
    mix_bus: MixBus,
    atomics: Arc<MixAtomics>,
    command_rx: rtrb::Consumer<MixCommand>,
    /// Pre-allocated to `MAX_BUFFER_SIZE`
    buffer: StereoBuffer,
    sample_rate: u32,
}

impl AudioCallbackState {
    fn new(mix_bus: MixBus, command_rx: rtrb::Consumer<MixCommand>, sample_rate: u32) -> Self {
        Self {
            atomics: mix_bus.atomics(),
            mix_bus,
            command_rx,
            buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
            sample_rate,
        }
    }

    /// Render one device period into an interleaved output slice
    fn render(&mut self, data: &mut [f32], channels: usize) {
        let started = Instant::now();
        let n_frames = (data.len() / channels).min(MAX_BUFFER_SIZE);

        // RT-safe: no allocation
        self.buffer.set_len_from_capacity(n_frames);
        self.mix_bus.process_commands(&mut self.command_rx);
        self.mix_bus.process(&mut self.buffer);

        let samples = self.buffer.as_slice();
        for (i, frame) in data.chunks_mut(channels).enumerate() {
            match samples.get(i) {
                Some(sample) => {
                    frame[0] = sample.left;
                    if channels > 1 {
                        frame[1] = sample.right;
                    }
                    for ch in frame.iter_mut().skip(2) {
                        *ch = 0.0;
                    }
                }
                None => frame.fill(0.0),
            }
        }

        let budget = Duration::from_secs_f64(n_frames as f64 / self.sample_rate as f64);
        if started.elapsed() > budget {
            self.atomics.record_underrun();
        }
    }
}

/// Pick the best output configuration for a device
///
/// Returns (SupportedStreamConfig, buffer_size_in_frames). Prefers f32 stereo
/// at the requested rate, falling back to the device's maximum rate.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.target_sample_rate();
    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        target_sample_rate >= c.min_sample_rate().0 && target_sample_rate <= c.max_sample_rate().0
    };

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(in_range)
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if in_range(&best_config) {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio: device doesn't support {}Hz, falling back to {}Hz (stems will be resampled)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let buffer_size = config.buffer_size.frames();
    log::debug!("Audio: selected buffer size {} frames", buffer_size);

    Ok((best_config.clone().with_sample_rate(sample_rate), buffer_size))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut state: AudioCallbackState,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                state.render(data, channels);
            },
            move |err| {
                log::error!("Audio: output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

fn log_available_devices() {
    match get_output_devices() {
        Ok(devices) => {
            for device in devices {
                log::info!("Audio: available device {}", device.id.display_label());
            }
        }
        Err(e) => log::warn!("Audio: failed to enumerate devices: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StemRole;

    #[test]
    fn test_render_interleaves_and_zero_fills_extra_channels() {
        let mix_bus = MixBus::new(1.0);
        let atomics = mix_bus.atomics();
        let (mut tx, rx) = command_channel();
        let mut state = AudioCallbackState::new(mix_bus, rx, 48_000);

        assert!(tx.push(MixCommand::RestartStem { role: StemRole::Bass }).is_ok());
        let mut data = vec![1.0f32; 4 * 32];
        state.render(&mut data, 4);

        assert!(data.iter().all(|&s| s == 0.0));
        assert_eq!(atomics.chunk_count(), 1);
        assert!(atomics.take_state_changed());
    }
}
