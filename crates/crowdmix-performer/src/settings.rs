//! Runtime mix settings
//!
//! Owned by the performer thread. Every mutation goes through a setter that
//! clamps, so a bad control value can never reach the mix bus.

use crowdmix_control::ControlLimits;
use crowdmix_core::types::{StemRole, NUM_SLOTS};

use crate::config::MixingSection;

#[derive(Debug, Clone, PartialEq)]
pub struct MixSettings {
    base_bpm: f64,
    master_volume: f32,
    gains: [f32; NUM_SLOTS],
    tolerance_pct: f64,
    widen_factor: f64,
    limits: ControlLimits,
}

impl MixSettings {
    pub fn new(mixing: &MixingSection, master_volume: f32) -> Self {
        let mut settings = Self {
            base_bpm: mixing.base_bpm,
            master_volume: 1.0,
            gains: [0.0; NUM_SLOTS],
            tolerance_pct: 0.0,
            widen_factor: 1.0,
            limits: mixing.control_limits(),
        };
        settings.set_base_bpm(mixing.base_bpm);
        settings.set_master_volume(master_volume);
        for role in StemRole::MIXED {
            settings.set_gain(role, mixing.stem_gains.get(role));
        }
        settings.set_tolerance_pct(mixing.bpm_tolerance_pct);
        settings.widen_factor = mixing.tolerance_widen_factor.max(1.0);
        settings
    }

    pub fn base_bpm(&self) -> f64 {
        self.base_bpm
    }

    /// Returns true if the tempo actually changed
    pub fn set_base_bpm(&mut self, bpm: f64) -> bool {
        let bpm = self.limits.bpm_range().clamp("bpm", bpm);
        let changed = (bpm - self.base_bpm).abs() > f64::EPSILON;
        self.base_bpm = bpm;
        changed
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Returns the clamped volume
    pub fn set_master_volume(&mut self, volume: f32) -> f32 {
        self.master_volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.master_volume
    }

    /// Gain for a mixed role, 0 for roles without a slot
    pub fn gain(&self, role: StemRole) -> f32 {
        role.slot().map_or(0.0, |slot| self.gains[slot])
    }

    pub fn set_gain(&mut self, role: StemRole, gain: f32) {
        if let Some(slot) = role.slot() {
            self.gains[slot] = if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) };
        }
    }

    pub fn tolerance_pct(&self) -> f64 {
        self.tolerance_pct
    }

    pub fn set_tolerance_pct(&mut self, pct: f64) {
        self.tolerance_pct = if pct.is_nan() { 0.0 } else { pct.max(0.0) };
    }

    pub fn widen_factor(&self) -> f64 {
        self.widen_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MixSettings {
        MixSettings::new(&MixingSection::default(), 0.8)
    }

    #[test]
    fn test_defaults_from_config() {
        let s = settings();
        assert_eq!(s.base_bpm(), 120.0);
        assert_eq!(s.master_volume(), 0.8);
        assert_eq!(s.gain(StemRole::Vocals), 0.8);
        assert_eq!(s.gain(StemRole::Piano), 0.0);
        assert_eq!(s.tolerance_pct(), 15.0);
        assert_eq!(s.widen_factor(), 2.0);
    }

    #[test]
    fn test_bpm_clamped_to_limits() {
        let mut s = settings();
        assert!(s.set_base_bpm(500.0));
        assert_eq!(s.base_bpm(), 200.0);
        assert!(!s.set_base_bpm(200.0));
        assert!(s.set_base_bpm(10.0));
        assert_eq!(s.base_bpm(), 60.0);
    }

    #[test]
    fn test_volume_and_gain_clamped() {
        let mut s = settings();
        assert_eq!(s.set_master_volume(1.5), 1.0);
        assert_eq!(s.set_master_volume(f32::NAN), 0.0);
        s.set_gain(StemRole::Bass, -1.0);
        assert_eq!(s.gain(StemRole::Bass), 0.0);
        s.set_gain(StemRole::Piano, 1.0);
        assert_eq!(s.gain(StemRole::Piano), 0.0);
    }

    #[test]
    fn test_tolerance_never_negative() {
        let mut s = settings();
        s.set_tolerance_pct(-5.0);
        assert_eq!(s.tolerance_pct(), 0.0);
    }

    #[test]
    fn test_out_of_range_config_is_clamped() {
        let mixing = MixingSection {
            base_bpm: 300.0,
            ..MixingSection::default()
        };
        let s = MixSettings::new(&mixing, 3.0);
        assert_eq!(s.base_bpm(), 200.0);
        assert_eq!(s.master_volume(), 1.0);
    }
}
