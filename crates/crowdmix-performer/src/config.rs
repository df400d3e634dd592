//! Performer configuration
//!
//! Stored as YAML. Default location: `~/.config/crowdmix/config.yaml`, or
//! the path given as the first command-line argument. Every section is
//! optional; missing keys take their defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crowdmix_control::{ControlLimits, OscConfig, DEFAULT_BPM_MAX, DEFAULT_BPM_MIN};
use crowdmix_core::audio::{AudioConfig, DeviceId};
use crowdmix_core::config::{default_config_path, default_stems_dir, default_structures_dir};
use crowdmix_core::decision::DecisionParams;
use crowdmix_core::tempo::TempoPolicy;
use crowdmix_core::types::{StemRole, SAMPLE_RATE};

/// Config file name inside the crowdmix config directory
pub const CONFIG_FILE_NAME: &str = "config.yaml";

pub fn default_performer_config_path() -> PathBuf {
    default_config_path(CONFIG_FILE_NAME)
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformerConfig {
    pub audio: AudioSection,
    pub mixing: MixingSection,
    pub tempo: TempoPolicy,
    pub performance: PerformanceSection,
    pub osc: OscConfig,
    pub library: LibrarySection,
}

/// Output stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub sample_rate: u32,
    /// Device period in frames
    pub chunk_size: u32,
    pub master_volume: f32,
    /// Output device (None = system default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            chunk_size: 512,
            master_volume: 0.8,
            device: None,
        }
    }
}

impl AudioSection {
    pub fn to_audio_config(&self) -> AudioConfig {
        let config = AudioConfig::default()
            .with_buffer_frames(self.chunk_size)
            .with_sample_rate(self.sample_rate);
        match &self.device {
            Some(device) => config.with_device(device.clone()),
            None => config,
        }
    }
}

/// Per-role default gains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemGains {
    pub bass: f32,
    pub drums: f32,
    pub other: f32,
    pub vocals: f32,
}

impl Default for StemGains {
    fn default() -> Self {
        Self {
            bass: 0.8,
            drums: 0.8,
            other: 0.8,
            vocals: 0.8,
        }
    }
}

impl StemGains {
    pub fn get(&self, role: StemRole) -> f32 {
        match role {
            StemRole::Bass => self.bass,
            StemRole::Drums => self.drums,
            StemRole::Other => self.other,
            StemRole::Vocals => self.vocals,
            StemRole::Piano => 0.0,
        }
    }
}

/// Tempo and layer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixingSection {
    pub stem_gains: StemGains,
    pub base_bpm: f64,
    /// Admissible deviation from the base BPM, in percent
    pub bpm_tolerance_pct: f64,
    /// Multiplier for the single widened vocal search
    pub tolerance_widen_factor: f64,
    pub bpm_min: f64,
    pub bpm_max: f64,
}

impl Default for MixingSection {
    fn default() -> Self {
        Self {
            stem_gains: StemGains::default(),
            base_bpm: 120.0,
            bpm_tolerance_pct: 15.0,
            tolerance_widen_factor: 2.0,
            bpm_min: DEFAULT_BPM_MIN,
            bpm_max: DEFAULT_BPM_MAX,
        }
    }
}

impl MixingSection {
    pub fn control_limits(&self) -> ControlLimits {
        ControlLimits::new(self.bpm_min, self.bpm_max)
    }
}

const DEFAULT_DECISION_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Decision engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSection {
    #[serde(flatten)]
    pub decision: DecisionParams,
    /// EMA factor per tick. The default 1.0 passes readings straight
    /// through; lower values trade reaction time for steadiness
    pub energy_smoothing: f64,
    /// Seconds between decision ticks
    pub decision_interval: f64,
    /// Seconds between status reports, 0 disables them
    pub status_interval: f64,
}

impl Default for PerformanceSection {
    fn default() -> Self {
        Self {
            decision: DecisionParams::default(),
            energy_smoothing: 1.0,
            decision_interval: DEFAULT_DECISION_INTERVAL.as_secs_f64(),
            status_interval: DEFAULT_STATUS_INTERVAL.as_secs_f64(),
        }
    }
}

impl PerformanceSection {
    pub fn decision_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.decision_interval.max(0.05))
            .unwrap_or(DEFAULT_DECISION_INTERVAL)
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval > 0.0)
            .then(|| Duration::try_from_secs_f64(self.status_interval).unwrap_or(DEFAULT_STATUS_INTERVAL))
    }
}

/// Where the stems live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    pub stems_dir: PathBuf,
    pub structures_dir: PathBuf,
}

impl Default for LibrarySection {
    fn default() -> Self {
        Self {
            stems_dir: default_stems_dir(),
            structures_dir: default_structures_dir(),
        }
    }
}
