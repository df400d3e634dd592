//! Audio output for the performer
//!
//! Opens the configured CPAL device. When no device can be opened the mix
//! bus still runs on a silent real-time thread, so the decision loop and
//! the control surface keep working without sound.

use crowdmix_core::audio::{self, AudioResult, AudioSystemResult};

use crate::config::AudioSection;

/// Start the mix bus on the configured device, or silently if that fails
pub fn start_output(section: &AudioSection) -> AudioResult<AudioSystemResult> {
    let config = section.to_audio_config();

    match audio::start_audio_system(&config, section.master_volume) {
        Ok(result) => {
            log::info!(
                "Audio: {} Hz, {} frames ({:.1} ms)",
                result.sample_rate,
                result.buffer_size,
                result.latency_ms
            );
            Ok(result)
        }
        Err(e) => {
            log::error!("Audio: could not open output device: {}", e);
            log::warn!("Audio: continuing without sound output");
            audio::start_null_output(&config, section.master_volume)
        }
    }
}
