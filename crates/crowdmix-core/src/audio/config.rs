//! Output stream configuration

use serde::{Deserialize, Serialize};

pub use crate::engine::MAX_BUFFER_SIZE;

/// Smallest period we ask a device for (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Period used when nothing is requested (frames)
/// 512 frames @ 48kHz is ~10.7ms
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Stream rate requested when none is configured
pub const DEFAULT_SAMPLE_RATE: u32 = crate::types::SAMPLE_RATE;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// `DEFAULT_BUFFER_SIZE`
    #[default]
    Default,
    /// A specific period in frames, clamped to `MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE`
    Fixed(u32),
}

impl BufferSize {
    /// Frames actually requested from the device
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32),
        }
    }

    /// One-way output latency for a given rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate.max(1) as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// The host (ALSA, JACK, CoreAudio...) is optional; without it every host is
/// searched by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the master output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,
    pub buffer_size: BufferSize,
    /// Requested stream rate (None = `DEFAULT_SAMPLE_RATE`)
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_frames_clamped() {
        assert_eq!(BufferSize::Default.frames(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(16).frames(), MIN_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(1 << 20).frames(), MAX_BUFFER_SIZE as u32);
        assert_eq!(BufferSize::Fixed(256).frames(), 256);
    }

    #[test]
    fn test_latency() {
        let ms = BufferSize::Fixed(480).latency_ms(48_000);
        assert!((ms - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_builder() {
        let config = AudioConfig::default()
            .with_device(DeviceId::with_host("hw:0,0", "ALSA"))
            .with_buffer_frames(1024)
            .with_sample_rate(44_100);
        assert_eq!(config.buffer_size.frames(), 1024);
        assert_eq!(config.target_sample_rate(), 44_100);
        assert_eq!(config.device.map(|d| d.display_label()).as_deref(), Some("[ALSA] hw:0,0"));
        assert_eq!(AudioConfig::default().target_sample_rate(), DEFAULT_SAMPLE_RATE);
    }
}
