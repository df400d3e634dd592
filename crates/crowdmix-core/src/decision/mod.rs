//! Energy decision engine
//!
//! Turns a noisy crowd-energy signal into stable vocal decisions.
//!
//! ═══════════════════════════════════════════════════════════════════════
//! STATE MACHINE
//! ═══════════════════════════════════════════════════════════════════════
//!
//! ```text
//!             mid-band / waiting out the low window
//!   STABLE ─────────────────────────────────────────► OBSERVING
//!     ▲  ▲                                                 │
//!     │  │ high, debounced, repeats left: RepeatVocal      │ low held for
//!     │  └─────────────────────────────────────────────────┤ stability time,
//!     │                                                    │ debounced
//!     │ commit(vocal)                                      ▼
//!     └──────────────────────────────────────────────── SWITCHING
//!                                                   (emits SwitchVocal)
//! ```
//!
//! Transitions are pure functions over `DecisionState`; the caller owns the
//! single state record and feeds it one smoothed reading per tick. A switch
//! is only finished once the caller has a new vocal and calls [`commit`]; if
//! no candidate exists it calls [`abort_switch`] and the same low condition
//! is re-evaluated on the next tick.

mod smoothing;

pub use smoothing::{EnergyLevel, EnergySmoother, INITIAL_ENERGY};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Decision phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Holding a freshly switched or repeated vocal
    #[default]
    Stable,
    /// Energy is mid-band or the low window is still running
    Observing,
    /// A switch was decided and awaits commit
    Switching,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Stable => "STABLE",
            Phase::Observing => "OBSERVING",
            Phase::Switching => "SWITCHING",
        })
    }
}

/// What the caller should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Pick a different vocal and `commit` it
    SwitchVocal,
    /// Restart the current vocal from its beginning
    RepeatVocal,
}

/// The single mutable decision record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionState {
    pub phase: Phase,
    pub current_vocal: Option<String>,
    pub repeat_count: u32,
    pub time_since_last_switch: Duration,
    /// How long energy has continuously been below the low threshold
    pub low_energy_held: Option<Duration>,
}

/// Thresholds and timings of the state machine
///
/// Durations are seconds so the YAML stays readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionParams {
    /// Debounce after any committed switch or repeat
    pub min_vocal_duration: f64,
    /// How long energy must stay low before a switch
    pub energy_stability_time: f64,
    pub max_vocal_repeats: u32,
    pub energy_threshold_low: f64,
    pub energy_threshold_high: f64,
}

const DEFAULT_MIN_VOCAL_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_ENERGY_STABILITY_TIME: Duration = Duration::from_secs(10);

impl Default for DecisionParams {
    fn default() -> Self {
        Self {
            min_vocal_duration: DEFAULT_MIN_VOCAL_DURATION.as_secs_f64(),
            energy_stability_time: DEFAULT_ENERGY_STABILITY_TIME.as_secs_f64(),
            max_vocal_repeats: 2,
            energy_threshold_low: 0.3,
            energy_threshold_high: 0.7,
        }
    }
}

impl DecisionParams {
    /// Values too large for a `Duration` fall back to the defaults
    pub fn min_vocal_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_vocal_duration.max(0.0))
            .unwrap_or(DEFAULT_MIN_VOCAL_DURATION)
    }

    pub fn energy_stability_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.energy_stability_time.max(0.0))
            .unwrap_or(DEFAULT_ENERGY_STABILITY_TIME)
    }

    pub fn level(&self, energy: f64) -> EnergyLevel {
        EnergyLevel::classify(energy, self.energy_threshold_low, self.energy_threshold_high)
    }
}

/// Evaluate one smoothed reading `energy` after `elapsed` time
pub fn step(
    state: &DecisionState,
    energy: f64,
    elapsed: Duration,
    params: &DecisionParams,
) -> (DecisionState, Option<Action>) {
    let mut next = state.clone();
    next.time_since_last_switch += elapsed;
    let debounced = next.time_since_last_switch >= params.min_vocal_duration();

    match params.level(energy) {
        EnergyLevel::Low => {
            let held = match next.low_energy_held {
                Some(held) => held + elapsed,
                None => Duration::ZERO,
            };
            next.low_energy_held = Some(held);

            if debounced && held >= params.energy_stability_time() {
                next.phase = Phase::Switching;
                return (next, Some(Action::SwitchVocal));
            }
            next.phase = Phase::Observing;
            (next, None)
        }
        EnergyLevel::High => {
            next.low_energy_held = None;
            if debounced
                && next.current_vocal.is_some()
                && next.repeat_count < params.max_vocal_repeats
            {
                next.repeat_count += 1;
                next.time_since_last_switch = Duration::ZERO;
                next.phase = Phase::Stable;
                return (next, Some(Action::RepeatVocal));
            }
            next.phase = Phase::Stable;
            (next, None)
        }
        EnergyLevel::Mid => {
            next.low_energy_held = None;
            next.phase = Phase::Observing;
            (next, None)
        }
    }
}

/// Finish a switch: `vocal` is now playing
pub fn commit(state: &DecisionState, vocal: impl Into<String>) -> DecisionState {
    let mut next = state.clone();
    next.phase = Phase::Stable;
    next.current_vocal = Some(vocal.into());
    next.repeat_count = 0;
    next.time_since_last_switch = Duration::ZERO;
    next.low_energy_held = None;
    next
}

/// Abandon a switch that found no candidate. Keeps the current vocal and
/// every counter, so the next tick retries.
pub fn abort_switch(state: &DecisionState) -> DecisionState {
    let mut next = state.clone();
    if next.phase == Phase::Switching {
        next.phase = Phase::Observing;
    }
    next
}

/// Operator override: switch now regardless of energy and debounce
pub fn force_switch(state: &DecisionState) -> (DecisionState, Action) {
    let mut next = state.clone();
    next.phase = Phase::Switching;
    (next, Action::SwitchVocal)
}

/// Owns the decision state, its parameters and the energy smoother
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    state: DecisionState,
    params: DecisionParams,
    smoother: EnergySmoother,
}

impl DecisionEngine {
    pub fn new(params: DecisionParams, smoothing: f64) -> Self {
        Self {
            state: DecisionState::default(),
            params,
            smoother: EnergySmoother::new(smoothing),
        }
    }

    pub fn state(&self) -> &DecisionState {
        &self.state
    }

    pub fn params(&self) -> &DecisionParams {
        &self.params
    }

    /// Last smoothed energy
    pub fn smoothed_energy(&self) -> f64 {
        self.smoother.value()
    }

    /// Smooth `raw_energy` and evaluate one tick
    pub fn tick(&mut self, raw_energy: f64, elapsed: Duration) -> Option<Action> {
        let energy = self.smoother.update(raw_energy);
        let (next, action) = step(&self.state, energy, elapsed, &self.params);
        if next.phase != self.state.phase {
            log::debug!("Decision: {} -> {} (energy {:.2})", self.state.phase, next.phase, energy);
        }
        self.state = next;
        action
    }

    /// Advance the clocks without evaluating energy
    pub fn advance(&mut self, elapsed: Duration) {
        self.state.time_since_last_switch += elapsed;
    }

    pub fn force_switch(&mut self) -> Action {
        let (next, action) = force_switch(&self.state);
        self.state = next;
        action
    }

    pub fn commit(&mut self, vocal: impl Into<String>) {
        self.state = commit(&self.state, vocal);
    }

    pub fn abort_switch(&mut self) {
        self.state = abort_switch(&self.state);
    }
}
