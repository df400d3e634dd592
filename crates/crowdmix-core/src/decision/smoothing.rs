//! Energy smoothing and classification

use std::fmt;

/// Energy assumed before the first reading arrives
pub const INITIAL_ENERGY: f64 = 0.5;

/// Exponential moving average over the energy readings
///
/// Applied once per decision tick. A factor of 1.0 passes readings through.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySmoother {
    factor: f64,
    value: f64,
}

impl EnergySmoother {
    pub fn new(factor: f64) -> Self {
        Self {
            factor: factor.clamp(0.01, 1.0),
            value: INITIAL_ENERGY,
        }
    }

    /// Fold a raw reading in and return the smoothed value
    pub fn update(&mut self, raw: f64) -> f64 {
        let raw = raw.clamp(0.0, 1.0);
        self.value = self.factor * raw + (1.0 - self.factor) * self.value;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

/// Coarse energy band used in logs and status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyLevel {
    Low,
    Mid,
    High,
}

impl EnergyLevel {
    pub fn classify(energy: f64, low: f64, high: f64) -> Self {
        if energy < low {
            EnergyLevel::Low
        } else if energy > high {
            EnergyLevel::High
        } else {
            EnergyLevel::Mid
        }
    }
}

impl fmt::Display for EnergyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnergyLevel::Low => "low",
            EnergyLevel::Mid => "mid",
            EnergyLevel::High => "high",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_one_passes_through() {
        let mut s = EnergySmoother::new(1.0);
        assert_eq!(s.update(0.2), 0.2);
        assert_eq!(s.update(0.9), 0.9);
    }

    #[test]
    fn test_ema_converges() {
        let mut s = EnergySmoother::new(0.5);
        assert!((s.update(0.1) - 0.3).abs() < 1e-12);
        for _ in 0..40 {
            s.update(0.1);
        }
        assert!((s.value() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_raw_clamped() {
        let mut s = EnergySmoother::new(1.0);
        assert_eq!(s.update(4.0), 1.0);
        assert_eq!(s.update(-1.0), 0.0);
    }

    #[test]
    fn test_classify() {
        assert_eq!(EnergyLevel::classify(0.2, 0.3, 0.7), EnergyLevel::Low);
        assert_eq!(EnergyLevel::classify(0.3, 0.3, 0.7), EnergyLevel::Mid);
        assert_eq!(EnergyLevel::classify(0.7, 0.3, 0.7), EnergyLevel::Mid);
        assert_eq!(EnergyLevel::classify(0.71, 0.3, 0.7), EnergyLevel::High);
    }
}
