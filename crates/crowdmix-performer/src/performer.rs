//! Decision loop and stem preparation
//!
//! The performer thread is the single producer of the mix bus command queue.
//! Everything slow happens here, ahead of playback:
//!
//! ```text
//! ControlMessage ──► Performer ──► DecisionEngine::tick ──► Action
//!                        │                                    │
//!                        │   select → decode → adapt ◄────────┘
//!                        ▼
//!                  MixCommand (rtrb) ──► audio thread
//! ```
//!
//! Decoded sources of the sounding stems are cached so a tempo change can
//! re-adapt them without touching the disk.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError};
use rand::rngs::StdRng;
use rayon::prelude::*;

use crowdmix_control::ControlMessage;
use crowdmix_core::audio::CommandSender;
use crowdmix_core::catalog::{load_stem_audio, Catalog, CatalogError, StemRecord};
use crowdmix_core::decision::{Action, DecisionEngine, Phase, INITIAL_ENERGY};
use crowdmix_core::engine::{ActiveStem, MixAtomics, MixCommand, PreparedStem};
use crowdmix_core::selector::{
    pick_random_weighted, select_candidates, select_vocal_candidates, SelectionError,
};
use crowdmix_core::tempo::{adapt, AdaptationError, TempoPolicy};
use crowdmix_core::types::{StemRole, StereoBuffer};

use crate::config::PerformerConfig;
use crate::settings::MixSettings;

/// Energy moves smaller than this are not logged
const ENERGY_LOG_DELTA: f64 = 0.1;

/// Why a candidate stem could not be made playable
#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Tempo adaptation failed: {0}")]
    Adaptation(#[from] AdaptationError),
}

/// Whether the decision loop keeps running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Decoded source audio of a sounding stem
struct LayerSource {
    record: StemRecord,
    audio: Arc<StereoBuffer>,
}

/// Decode a stem and adapt it to `target_bpm`
///
/// Returns the prepared stem and its decoded source for the cache.
pub fn prepare_stem(
    record: &StemRecord,
    target_bpm: f64,
    policy: &TempoPolicy,
    sample_rate: u32,
) -> Result<(PreparedStem, StereoBuffer), PrepareError> {
    let start = Instant::now();
    let source = load_stem_audio(&record.sample_path, sample_rate)?;
    let decoded = start.elapsed();

    let prepared = adapt_source(record, &source, target_bpm, policy, sample_rate)?;
    log::info!(
        "[PERF] Prepare {}: decode {:?}, {} {:?} ({} frames)",
        record.label(),
        decoded,
        prepared.strategy.name(),
        start.elapsed() - decoded,
        prepared.audio.len()
    );
    Ok((prepared, source))
}

/// Adapt already-decoded audio to `target_bpm`
pub fn adapt_source(
    record: &StemRecord,
    source: &StereoBuffer,
    target_bpm: f64,
    policy: &TempoPolicy,
    sample_rate: u32,
) -> Result<PreparedStem, AdaptationError> {
    let adapted = adapt(source, record.native_bpm, target_bpm, policy, sample_rate)?;
    Ok(PreparedStem::new(record.clone(), adapted, target_bpm))
}

/// Snapshot printed by `status`
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub energy: f64,
    pub smoothed_energy: f64,
    pub base_bpm: f64,
    pub master_volume: f32,
    /// Label of the stem in each base role, None if the slot is empty
    pub base_stems: Vec<(StemRole, Option<String>)>,
    pub vocal: Option<String>,
    /// Structure segment the vocal is currently in
    pub vocal_segment: Option<String>,
    pub repeat_count: u32,
    pub max_repeats: u32,
    pub since_last_switch: Duration,
    pub threshold_low: f64,
    pub threshold_high: f64,
    pub phase: Phase,
    pub underruns: u64,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PERFORMANCE STATUS")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(
            f,
            "Energy: {:.2} (smoothed {:.2})",
            self.energy, self.smoothed_energy
        )?;
        writeln!(f, "Base BPM: {:.1}", self.base_bpm)?;
        writeln!(f, "Master Volume: {:.2}", self.master_volume)?;
        writeln!(f, "Phase: {}", self.phase)?;
        writeln!(f)?;
        writeln!(f, "Base stems:")?;
        for (role, label) in &self.base_stems {
            match label {
                Some(label) => writeln!(f, "  {:<6} {}", role.name(), label)?,
                None => writeln!(f, "  {:<6} (empty)", role.name())?,
            }
        }
        writeln!(f)?;
        writeln!(f, "Current vocal:")?;
        match &self.vocal {
            Some(vocal) => {
                match &self.vocal_segment {
                    Some(segment) => writeln!(f, "  {} [{}]", vocal, segment)?,
                    None => writeln!(f, "  {}", vocal)?,
                }
                writeln!(f, "  Repeat count: {}/{}", self.repeat_count, self.max_repeats)?;
            }
            None => writeln!(f, "  (No vocal loaded)")?,
        }
        writeln!(f)?;
        writeln!(
            f,
            "Time since vocal change: {:.1}s",
            self.since_last_switch.as_secs_f64()
        )?;
        writeln!(
            f,
            "Energy thresholds: Low < {:.2}, High > {:.2}",
            self.threshold_low, self.threshold_high
        )?;
        write!(f, "Audio under-runs: {}", self.underruns)
    }
}

/// Owns the decision engine, the mix settings and the producer end of the
/// mix bus queue
pub struct Performer {
    catalog: Arc<Catalog>,
    settings: MixSettings,
    tempo: TempoPolicy,
    engine: DecisionEngine,
    sender: CommandSender,
    atomics: Arc<MixAtomics>,
    sample_rate: u32,
    layers: BTreeMap<StemRole, LayerSource>,
    rng: StdRng,
    energy: f64,
    decision_interval: Duration,
    status_interval: Option<Duration>,
    last_underruns: u64,
}

impl Performer {
    pub fn new(
        catalog: Arc<Catalog>,
        config: &PerformerConfig,
        sender: CommandSender,
        atomics: Arc<MixAtomics>,
        sample_rate: u32,
        rng: StdRng,
    ) -> Self {
        Self {
            catalog,
            settings: MixSettings::new(&config.mixing, config.audio.master_volume),
            tempo: config.tempo.clone(),
            engine: DecisionEngine::new(
                config.performance.decision.clone(),
                config.performance.energy_smoothing,
            ),
            sender,
            atomics,
            sample_rate,
            layers: BTreeMap::new(),
            rng,
            energy: INITIAL_ENERGY,
            decision_interval: config.performance.decision_interval(),
            status_interval: config.performance.status_interval(),
            last_underruns: 0,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn settings(&self) -> &MixSettings {
        &self.settings
    }

    /// Latest raw energy reading
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Record of the stem sounding in `role`, as last sent to the mix bus
    pub fn layer(&self, role: StemRole) -> Option<&StemRecord> {
        self.layers.get(&role).map(|l| &l.record)
    }

    /// Build the base layer and the first vocal
    ///
    /// Fails only when a base role has no usable stem.
    pub fn start(&mut self) -> Result<(), SelectionError> {
        self.load_base_layer()?;
        log::info!("Vocal: loading initial vocal");
        self.engine.force_switch();
        self.switch_vocal();
        Ok(())
    }

    /// One stem per base role, closest BPM first, prepared in parallel
    pub fn load_base_layer(&mut self) -> Result<(), SelectionError> {
        let catalog = Arc::clone(&self.catalog);
        let target = self.settings.base_bpm();
        let tolerance = self.settings.tolerance_pct();

        let mut plan = Vec::with_capacity(StemRole::BASE.len());
        for role in StemRole::BASE {
            let candidates = select_candidates(catalog.records(), role, target, tolerance);
            if candidates.is_empty() {
                return Err(SelectionError::NoCompatibleStem {
                    role,
                    target_bpm: target,
                    tolerance_pct: tolerance,
                });
            }
            plan.push((role, candidates));
        }

        let policy = &self.tempo;
        let sample_rate = self.sample_rate;
        let prepared: Vec<_> = plan
            .par_iter()
            .map(|(role, candidates)| {
                let found = candidates.iter().find_map(|record| {
                    match prepare_stem(record, target, policy, sample_rate) {
                        Ok(prepared) => Some(prepared),
                        Err(e) => {
                            log::warn!("Base: skipping {}: {}", record.label(), e);
                            None
                        }
                    }
                });
                (*role, found)
            })
            .collect();

        for (role, found) in prepared {
            let Some((stem, source)) = found else {
                return Err(SelectionError::NoCompatibleStem {
                    role,
                    target_bpm: target,
                    tolerance_pct: tolerance,
                });
            };
            log::info!(
                "Base: {} = {} ({:.0} BPM, {})",
                role,
                stem.record.song_id,
                stem.record.native_bpm,
                stem.strategy.name()
            );
            self.install(stem, Arc::new(source), 0);
        }
        Ok(())
    }

    /// Apply one control message
    pub fn handle_message(&mut self, message: ControlMessage) -> Flow {
        match message {
            ControlMessage::SetEnergy(value) => self.set_energy(value),
            ControlMessage::SetBpm(bpm) => self.change_bpm(bpm),
            ControlMessage::SetMasterVolume(volume) => {
                let volume = self.settings.set_master_volume(volume);
                log::info!("Master volume: {:.2}", volume);
                self.send(MixCommand::SetMasterVolume { volume });
            }
            ControlMessage::NextVocal => {
                log::info!("Vocal: forcing vocal change");
                self.engine.force_switch();
                self.switch_vocal();
            }
            ControlMessage::Status => println!("\n{}\n", self.status()),
            ControlMessage::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    fn set_energy(&mut self, value: f64) {
        let value = value.clamp(0.0, 1.0);
        let old = self.energy;
        self.energy = value;
        if (value - old).abs() > ENERGY_LOG_DELTA {
            let level = self.engine.params().level(value);
            log::info!("Energy: {:.2} -> {:.2} ({})", old, value, level);
        }
    }

    /// Evaluate one decision tick and act on it
    pub fn tick(&mut self, elapsed: Duration) {
        match self.engine.tick(self.energy, elapsed) {
            Some(Action::SwitchVocal) => {
                log::info!(
                    "Vocal: LOW ENERGY ({:.2}), trying a new vocal",
                    self.engine.smoothed_energy()
                );
                self.switch_vocal();
            }
            Some(Action::RepeatVocal) => {
                let state = self.engine.state();
                log::info!(
                    "Vocal: HIGH ENERGY ({:.2}), repeating vocal ({}/{})",
                    self.engine.smoothed_energy(),
                    state.repeat_count,
                    self.engine.params().max_vocal_repeats
                );
                self.send(MixCommand::RestartStem {
                    role: StemRole::Vocals,
                });
            }
            None => {}
        }
        self.check_underruns();
    }

    /// Pick, prepare and install a new vocal, then commit or abort the switch
    fn switch_vocal(&mut self) {
        let catalog = Arc::clone(&self.catalog);
        let target = self.settings.base_bpm();
        let current = self.engine.state().current_vocal.clone();
        let vocals = catalog.records_for_role(StemRole::Vocals);

        let (mut pool, tolerance) = match select_vocal_candidates(
            vocals.iter().copied(),
            target,
            self.settings.tolerance_pct(),
            self.settings.widen_factor(),
            current.as_deref(),
        ) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Vocal: {}, holding current vocal", e);
                self.engine.abort_switch();
                return;
            }
        };

        loop {
            let Some(record) =
                pick_random_weighted(&pool, target, current.as_deref(), &mut self.rng)
            else {
                log::warn!(
                    "Vocal: no usable alternative to {} within {:.1}%, holding",
                    current.as_deref().unwrap_or("(none)"),
                    tolerance
                );
                self.engine.abort_switch();
                return;
            };

            match prepare_stem(record, target, &self.tempo, self.sample_rate) {
                Ok((stem, source)) => {
                    let song_id = record.song_id.clone();
                    if !self.install(stem, Arc::new(source), 0) {
                        self.engine.abort_switch();
                        return;
                    }
                    log::info!(
                        "Vocal: NEW VOCAL {} ({:.0} BPM)",
                        song_id,
                        record.native_bpm
                    );
                    self.engine.commit(song_id);
                    return;
                }
                Err(e) => {
                    log::warn!("Vocal: skipping {}: {}", record.label(), e);
                    pool.retain(|r| !std::ptr::eq(*r, record));
                }
            }
        }
    }

    /// Re-adapt every sounding stem to a new tempo, keeping positions
    fn change_bpm(&mut self, bpm: f64) {
        let old = self.settings.base_bpm();
        if !self.settings.set_base_bpm(bpm) {
            return;
        }
        let target = self.settings.base_bpm();
        log::info!("BPM: {:.1} -> {:.1}", old, target);

        let jobs: Vec<(StemRecord, Arc<StereoBuffer>, f64)> = self
            .layers
            .iter()
            .map(|(role, layer)| {
                let progress = self.atomics.progress(*role).unwrap_or(0.0);
                (layer.record.clone(), Arc::clone(&layer.audio), progress)
            })
            .collect();

        let policy = &self.tempo;
        let sample_rate = self.sample_rate;
        let start = Instant::now();
        let adapted: Vec<_> = jobs
            .into_par_iter()
            .map(|(record, source, progress)| {
                let result = adapt_source(&record, &source, target, policy, sample_rate);
                (record, source, progress, result)
            })
            .collect();
        log::info!(
            "[PERF] Re-adapted {} stems to {:.1} BPM in {:?}",
            adapted.len(),
            target,
            start.elapsed()
        );

        for (record, source, progress, result) in adapted {
            match result {
                Ok(stem) => {
                    let cursor = (progress * stem.audio.len() as f64) as usize;
                    self.install(stem, source, cursor);
                }
                Err(e) => log::warn!("BPM: keeping {} at its old tempo: {}", record.label(), e),
            }
        }
    }

    /// Send a prepared stem to the mix bus and remember its source
    fn install(&mut self, stem: PreparedStem, source: Arc<StereoBuffer>, cursor: usize) -> bool {
        let role = stem.role();
        let record = stem.record.clone();
        let active = ActiveStem::new(stem, self.settings.gain(role)).with_cursor(cursor);
        if !self.send(MixCommand::ReplaceStem { role, stem: active }) {
            return false;
        }
        self.layers.insert(role, LayerSource { record, audio: source });
        true
    }

    fn send(&mut self, cmd: MixCommand) -> bool {
        match self.sender.send(cmd) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("Mix: command queue full, dropping command");
                false
            }
        }
    }

    fn check_underruns(&mut self) {
        let total = self.atomics.underrun_count();
        if total > self.last_underruns {
            log::warn!(
                "Audio: {} under-run(s) since last tick ({} total)",
                total - self.last_underruns,
                total
            );
            self.last_underruns = total;
        }
    }

    /// Structure label at the vocal's current position
    fn vocal_segment(&self) -> Option<String> {
        let layer = self.layers.get(&StemRole::Vocals)?;
        let progress = self.atomics.progress(StemRole::Vocals)?;
        let position = progress * layer.record.duration.as_secs_f64();
        let song = self.catalog.song(&layer.record.song_id)?;
        let segment = song.structure.as_ref()?.segment_at(position)?;
        Some(segment.label.clone())
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.engine.state();
        let params = self.engine.params();
        StatusSnapshot {
            energy: self.energy,
            smoothed_energy: self.engine.smoothed_energy(),
            base_bpm: self.settings.base_bpm(),
            master_volume: self.settings.master_volume(),
            base_stems: StemRole::BASE
                .iter()
                .map(|role| (*role, self.layer(*role).map(StemRecord::label)))
                .collect(),
            vocal: state.current_vocal.clone(),
            vocal_segment: self.vocal_segment(),
            repeat_count: state.repeat_count,
            max_repeats: params.max_vocal_repeats,
            since_last_switch: state.time_since_last_switch,
            threshold_low: params.energy_threshold_low,
            threshold_high: params.energy_threshold_high,
            phase: state.phase,
            underruns: self.atomics.underrun_count(),
        }
    }

    /// Run until `Shutdown` arrives or every sender is gone
    pub fn run(&mut self, rx: Receiver<ControlMessage>) {
        log::info!(
            "Performer: decision loop started ({:?} ticks)",
            self.decision_interval
        );
        let mut last_tick = Instant::now();
        let mut last_status = Instant::now();

        loop {
            let deadline = last_tick + self.decision_interval;
            match rx.recv_deadline(deadline) {
                Ok(message) => {
                    if self.handle_message(message) == Flow::Stop {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            if now >= deadline {
                self.tick(now - last_tick);
                last_tick = now;
            }
            if let Some(interval) = self.status_interval {
                if now - last_status >= interval {
                    println!("\n{}\n", self.status());
                    last_status = now;
                }
            }
        }
        log::info!("Performer: decision loop stopped");
    }
}
