//! Master audio output
//!
//! The output callback owns the `MixBus` exclusively:
//!
//! - **Performer thread**: sends `MixCommand`s via lock-free ringbuffer
//! - **Audio thread**: drains commands, renders, publishes `MixAtomics`
//! - **Atomics**: the performer reads cursors and counters without locks
//!
//! ```ignore
//! use crowdmix_core::audio::{AudioConfig, start_audio_system};
//!
//! let mut result = start_audio_system(&AudioConfig::default(), 0.8)?;
//! result.command_sender.send(MixCommand::SetMasterVolume { volume: 0.6 });
//! let underruns = result.atomics.underrun_count();
//! ```

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;

pub use backend::{
    start_audio_system, start_null_output, AudioHandle, AudioSystemResult, CommandSender,
    NullOutputHandle,
};
pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
    MIN_BUFFER_SIZE,
};
pub use cpal_backend::CpalAudioHandle;
pub use device::{get_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
