//! Output backends and the handles shared with the performer
//!
//! Two backends drive the same lock-free mix bus:
//! - **cpal**: the device callback owns the `MixBus`
//! - **null**: a timer thread owns it when no device could be opened, so the
//!   performance keeps its clocks and cursors without sound
//!
//! Either way the performer only sees a `CommandSender` and `MixAtomics`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::engine::{command_channel, MixAtomics, MixBus, MixCommand};
use crate::types::StereoBuffer;

use super::config::AudioConfig;
use super::error::AudioResult;

/// Result of starting an output backend
pub struct AudioSystemResult {
    /// Keeps the stream alive (drop to stop)
    pub handle: AudioHandle,
    /// Single-producer command queue into the mix bus
    pub command_sender: CommandSender,
    /// Playback state published by the audio thread
    pub atomics: Arc<MixAtomics>,
    pub sample_rate: u32,
    /// Negotiated period in frames
    pub buffer_size: u32,
    /// One-way output latency
    pub latency_ms: f32,
}

/// Handle to the active output. Drop this to stop audio.
pub enum AudioHandle {
    Cpal(super::cpal_backend::CpalAudioHandle),
    Null(NullOutputHandle),
}

impl AudioHandle {
    pub fn is_silent(&self) -> bool {
        matches!(self, AudioHandle::Null(_))
    }

    /// Name of the output device, `None` when running silent
    pub fn device_name(&self) -> Option<&str> {
        match self {
            AudioHandle::Cpal(handle) => Some(handle.device_name()),
            AudioHandle::Null(_) => None,
        }
    }
}

/// Command sender for the performer thread
///
/// Wraps the lock-free producer. All operations are non-blocking.
pub struct CommandSender {
    producer: rtrb::Producer<MixCommand>,
}

impl CommandSender {
    pub fn new(producer: rtrb::Producer<MixCommand>) -> Self {
        Self { producer }
    }

    /// Queue a command for the next chunk
    ///
    /// Returns the command back if the queue is full.
    pub fn send(&mut self, cmd: MixCommand) -> Result<(), MixCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }
}

/// Start the master output on the configured device
pub fn start_audio_system(config: &AudioConfig, master_volume: f32) -> AudioResult<AudioSystemResult> {
    super::cpal_backend::start_audio_system(config, master_volume)
}

/// Handle for the silent fallback output
pub struct NullOutputHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for NullOutputHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Render the mix bus into nothing at real-time cadence
///
/// Used when the device cannot be opened: the decision loop still sees
/// advancing cursors and applied commands, it just isn't audible.
pub fn start_null_output(config: &AudioConfig, master_volume: f32) -> AudioResult<AudioSystemResult> {
    let sample_rate = config.target_sample_rate();
    let buffer_size = config.buffer_size.frames();
    // A zero sample rate from a hand-edited config must not panic here
    let period = Duration::try_from_secs_f64(buffer_size as f64 / sample_rate as f64)
        .unwrap_or(Duration::from_millis(10));

    let mut mix_bus = MixBus::new(master_volume);
    let atomics = mix_bus.atomics();
    let (command_tx, mut command_rx) = command_channel();

    let running = Arc::new(AtomicBool::new(true));
    let thread_running = Arc::clone(&running);
    let thread = std::thread::Builder::new()
        .name("null-output".to_string())
        .spawn(move || {
            let mut buffer = StereoBuffer::silence(buffer_size as usize);
            let mut next = Instant::now();
            while thread_running.load(Ordering::Relaxed) {
                mix_bus.process_commands(&mut command_rx);
                mix_bus.process(&mut buffer);
                next += period;
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                } else {
                    next = now;
                }
            }
        })
        .map_err(|e| super::AudioError::StreamBuildError(e.to_string()))?;

    log::warn!(
        "Audio: running silent output at {}Hz, {} frames",
        sample_rate,
        buffer_size
    );

    Ok(AudioSystemResult {
        handle: AudioHandle::Null(NullOutputHandle {
            running,
            thread: Some(thread),
        }),
        command_sender: CommandSender::new(command_tx),
        atomics,
        sample_rate,
        buffer_size,
        latency_ms: config.buffer_size.latency_ms(sample_rate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StemRole;

    #[test]
    fn test_sender_returns_command_when_full() {
        let (tx, _rx) = rtrb::RingBuffer::new(1);
        let mut sender = CommandSender::new(tx);
        assert!(sender.send(MixCommand::SetMasterVolume { volume: 0.5 }).is_ok());

        let rejected = sender.send(MixCommand::RestartStem { role: StemRole::Vocals });
        assert!(matches!(rejected, Err(MixCommand::RestartStem { role: StemRole::Vocals })));
    }

    #[test]
    fn test_null_output_renders_and_applies_commands() {
        let config = AudioConfig::default().with_buffer_frames(64).with_sample_rate(48_000);
        let mut result = start_null_output(&config, 1.0).unwrap();
        assert!(result.handle.is_silent());
        assert_eq!(result.buffer_size, 64);

        assert!(result
            .command_sender
            .send(MixCommand::SetMasterVolume { volume: 0.3 })
            .is_ok());

        let deadline = Instant::now() + Duration::from_secs(2);
        while result.atomics.chunk_count() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(result.atomics.chunk_count() >= 3);
        assert!(result.atomics.take_state_changed());
        drop(result.handle);
    }
}
