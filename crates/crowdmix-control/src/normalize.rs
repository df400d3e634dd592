//! Range clamping for incoming control values
//!
//! Out-of-range values are clamped, never rejected. Every clamp is logged as
//! an invalid-control-value warning.

use serde::{Deserialize, Serialize};

use crate::messages::ControlMessage;

/// Default lowest accepted tempo
pub const DEFAULT_BPM_MIN: f64 = 60.0;

/// Default highest accepted tempo
pub const DEFAULT_BPM_MAX: f64 = 200.0;

/// Inclusive value range for one control
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlRange {
    /// 0.0 to 1.0 (energy, volume)
    Unit,
    Custom { min: f64, max: f64 },
}

impl ControlRange {
    pub fn min(&self) -> f64 {
        match self {
            Self::Unit => 0.0,
            Self::Custom { min, .. } => *min,
        }
    }

    pub fn max(&self) -> f64 {
        match self {
            Self::Unit => 1.0,
            Self::Custom { max, .. } => *max,
        }
    }

    /// Clamp `value` into the range, warning when it had to move
    ///
    /// NaN maps to the lower bound.
    pub fn clamp(&self, control: &str, value: f64) -> f64 {
        let (min, max) = (self.min(), self.max());
        let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
        if clamped != value {
            log::warn!(
                "Invalid control value: {} {} outside [{}, {}], using {}",
                control,
                value,
                min,
                max,
                clamped
            );
        }
        clamped
    }
}

/// Ranges applied to every message before it reaches the performer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLimits {
    pub bpm_min: f64,
    pub bpm_max: f64,
}

impl Default for ControlLimits {
    fn default() -> Self {
        Self {
            bpm_min: DEFAULT_BPM_MIN,
            bpm_max: DEFAULT_BPM_MAX,
        }
    }
}

impl ControlLimits {
    pub fn new(bpm_min: f64, bpm_max: f64) -> Self {
        let (lo, hi) = if bpm_min <= bpm_max {
            (bpm_min, bpm_max)
        } else {
            (bpm_max, bpm_min)
        };
        Self {
            bpm_min: lo.max(1.0),
            bpm_max: hi.max(1.0),
        }
    }

    pub fn bpm_range(&self) -> ControlRange {
        ControlRange::Custom {
            min: self.bpm_min,
            max: self.bpm_max,
        }
    }

    /// Clamp the payload of a message
    pub fn normalize(&self, message: ControlMessage) -> ControlMessage {
        match message {
            ControlMessage::SetEnergy(v) => {
                ControlMessage::SetEnergy(ControlRange::Unit.clamp("energy", v))
            }
            ControlMessage::SetBpm(v) => ControlMessage::SetBpm(self.bpm_range().clamp("bpm", v)),
            ControlMessage::SetMasterVolume(v) => ControlMessage::SetMasterVolume(
                ControlRange::Unit.clamp("master_volume", v as f64) as f32,
            ),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_clamp() {
        assert_eq!(ControlRange::Unit.clamp("energy", 0.4), 0.4);
        assert_eq!(ControlRange::Unit.clamp("energy", 1.7), 1.0);
        assert_eq!(ControlRange::Unit.clamp("energy", -0.2), 0.0);
        assert_eq!(ControlRange::Unit.clamp("energy", f64::NAN), 0.0);
    }

    #[test]
    fn test_normalize_messages() {
        let limits = ControlLimits::default();
        assert_eq!(limits.normalize(ControlMessage::SetBpm(250.0)), ControlMessage::SetBpm(200.0));
        assert_eq!(limits.normalize(ControlMessage::SetBpm(30.0)), ControlMessage::SetBpm(60.0));
        assert_eq!(limits.normalize(ControlMessage::SetBpm(128.0)), ControlMessage::SetBpm(128.0));
        assert_eq!(
            limits.normalize(ControlMessage::SetMasterVolume(2.0)),
            ControlMessage::SetMasterVolume(1.0)
        );
        assert_eq!(limits.normalize(ControlMessage::SetEnergy(1.5)), ControlMessage::SetEnergy(1.0));
        assert_eq!(limits.normalize(ControlMessage::NextVocal), ControlMessage::NextVocal);
    }

    #[test]
    fn test_custom_bpm_limits() {
        let limits = ControlLimits::new(140.0, 90.0);
        assert_eq!(limits.bpm_min, 90.0);
        assert_eq!(limits.bpm_max, 140.0);
        assert_eq!(limits.normalize(ControlMessage::SetBpm(60.0)), ControlMessage::SetBpm(90.0));
    }

    #[test]
    fn test_limits_partial_yaml() {
        let limits: ControlLimits = serde_yaml::from_str("bpm_max: 180\n").unwrap();
        assert_eq!(limits.bpm_min, DEFAULT_BPM_MIN);
        assert_eq!(limits.bpm_max, 180.0);
    }
}
