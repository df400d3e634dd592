//! Mix bus - sums active stems through the master limiter chain

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::{StereoBuffer, StemRole, NUM_SLOTS};

use super::{ActiveStem, MasterClipper, MasterLimiter, MixCommand};

/// Maximum buffer size to pre-allocate for real-time safety
/// Covers every common device period (64 .. 4096 frames)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default master volume
pub const DEFAULT_MASTER_VOLUME: f32 = 1.0;

/// Lock-free state published by the audio thread
///
/// The performer thread reads these without touching the mix bus. All
/// accesses are relaxed: values are informational and never used for
/// synchronisation.
#[derive(Debug, Default)]
pub struct MixAtomics {
    /// Playback cursor per slot, in frames
    cursors: [AtomicU64; NUM_SLOTS],
    /// Audio length per slot, 0 when the slot is empty
    lengths: [AtomicU64; NUM_SLOTS],
    /// Chunks rendered since start
    chunks: AtomicU64,
    /// Callbacks that overran their real-time budget
    underruns: AtomicU64,
    /// Chunks where the tanh stage engaged
    soft_limited: AtomicU64,
    /// Chunks where the emergency clipper engaged
    hard_clipped: AtomicU64,
    /// Set by the audio thread when a command was applied, cleared by readers
    state_changed: AtomicBool,
}

impl MixAtomics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor of the stem in `role`'s slot, None if the slot is empty
    #[inline]
    pub fn cursor(&self, role: StemRole) -> Option<u64> {
        let slot = role.slot()?;
        if self.lengths[slot].load(Ordering::Relaxed) == 0 {
            return None;
        }
        Some(self.cursors[slot].load(Ordering::Relaxed))
    }

    /// Cursor as a fraction of the stem length, for carrying position across
    /// a re-adaptation
    pub fn progress(&self, role: StemRole) -> Option<f64> {
        let slot = role.slot()?;
        let len = self.lengths[slot].load(Ordering::Relaxed);
        if len == 0 {
            return None;
        }
        Some(self.cursors[slot].load(Ordering::Relaxed) as f64 / len as f64)
    }

    #[inline]
    pub fn chunk_count(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Called by the output backend when a callback misses its deadline
    #[inline]
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn soft_limited_count(&self) -> u64 {
        self.soft_limited.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn hard_clipped_count(&self) -> u64 {
        self.hard_clipped.load(Ordering::Relaxed)
    }

    /// Whether a command was applied since the last call
    pub fn take_state_changed(&self) -> bool {
        self.state_changed.swap(false, Ordering::Relaxed)
    }
}

/// The real-time mix bus
///
/// Owned exclusively by the audio callback. One slot per mixed role
/// (`StemRole::MIXED`); every slot loops its own audio independently.
pub struct MixBus {
    slots: [Option<ActiveStem>; NUM_SLOTS],
    master_volume: f32,
    limiter: MasterLimiter,
    clipper: MasterClipper,
    atomics: Arc<MixAtomics>,
}

impl MixBus {
    pub fn new(master_volume: f32) -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            master_volume: master_volume.clamp(0.0, 1.0),
            limiter: MasterLimiter::new(),
            clipper: MasterClipper::new(),
            atomics: Arc::new(MixAtomics::new()),
        }
    }

    /// Lock-free state for other threads. Clone once at startup.
    pub fn atomics(&self) -> Arc<MixAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn stem(&self, role: StemRole) -> Option<&ActiveStem> {
        self.slots.get(role.slot()?)?.as_ref()
    }

    /// Number of occupied slots
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Drain pending commands. Called at the start of every chunk.
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<MixCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.apply(cmd);
        }
    }

    /// Apply one command
    pub fn apply(&mut self, cmd: MixCommand) {
        match cmd {
            MixCommand::ReplaceStem { role, stem } => {
                if let Some(slot) = role.slot() {
                    // Old stem drops here; its audio goes to the GC thread
                    self.slots[slot] = Some(stem);
                }
            }
            MixCommand::RestartStem { role } => {
                if let Some(stem) = role.slot().and_then(|s| self.slots[s].as_mut()) {
                    stem.restart();
                }
            }
            MixCommand::SetMasterVolume { volume } => {
                self.master_volume = volume.clamp(0.0, 1.0);
            }
        }
        self.atomics.state_changed.store(true, Ordering::Relaxed);
        self.publish_slots();
    }

    /// Render one chunk into `out`
    ///
    /// `out.len()` frames are produced; it must not exceed `MAX_BUFFER_SIZE`
    /// for the call to stay allocation-free.
    pub fn process(&mut self, out: &mut StereoBuffer) {
        out.fill_silence();

        for stem in self.slots.iter_mut().flatten() {
            stem.mix_into(out, self.master_volume);
        }

        if self.limiter.process(out) {
            self.atomics.soft_limited.fetch_add(1, Ordering::Relaxed);
        }
        if self.clipper.process(out) {
            self.atomics.hard_clipped.fetch_add(1, Ordering::Relaxed);
        }

        self.atomics.chunks.fetch_add(1, Ordering::Relaxed);
        self.publish_slots();
    }

    fn publish_slots(&self) {
        for (i, slot) in self.slots.iter().enumerate() {
            let (cursor, len) = slot
                .as_ref()
                .map_or((0, 0), |s| (s.cursor() as u64, s.len() as u64));
            self.atomics.cursors[i].store(cursor, Ordering::Relaxed);
            self.atomics.lengths[i].store(len, Ordering::Relaxed);
        }
    }
}

impl Default for MixBus {
    fn default() -> Self {
        Self::new(DEFAULT_MASTER_VOLUME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{command_channel, HARD_CLIP_CEILING};
    use crate::engine::stem::test_support::{constant_stem, ramp_stem};

    fn replace(role: StemRole, stem: ActiveStem) -> MixCommand {
        MixCommand::ReplaceStem { role, stem }
    }

    #[test]
    fn test_process_empty_bus() {
        let mut bus = MixBus::default();
        let mut out = StereoBuffer::silence(256);
        bus.process(&mut out);
        assert_eq!(out.len(), 256);
        assert_eq!(out.peak(), 0.0);
        assert_eq!(bus.atomics().chunk_count(), 1);
    }

    #[test]
    fn test_sums_stems_with_gain() {
        let mut bus = MixBus::new(1.0);
        bus.apply(replace(StemRole::Bass, ActiveStem::new(constant_stem("a", StemRole::Bass, 0.2, 64), 1.0)));
        bus.apply(replace(StemRole::Drums, ActiveStem::new(constant_stem("b", StemRole::Drums, 0.4, 64), 0.5)));

        let mut out = StereoBuffer::silence(32);
        bus.process(&mut out);
        // 0.2 + 0.4 * 0.5, below the soft ceiling
        assert!(out.iter().all(|s| (s.left - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_three_hot_stems_stay_bounded() {
        let mut bus = MixBus::new(1.0);
        for (role, v) in [(StemRole::Bass, 0.99), (StemRole::Drums, -0.98), (StemRole::Other, 0.97)] {
            let mut prepared = constant_stem("hot", role, v, 512);
            // Alternate polarity so the sum swings both ways
            for (i, s) in prepared.audio.iter_mut().enumerate() {
                if i % 3 == 0 {
                    s.left = -s.left;
                }
                s.right = v.signum() * 0.99;
            }
            bus.apply(replace(role, ActiveStem::new(prepared, 1.0)));
        }

        let atomics = bus.atomics();
        let mut out = StereoBuffer::silence(512);
        for _ in 0..4 {
            bus.process(&mut out);
            assert!(out.is_finite());
            assert!(out.peak() <= HARD_CLIP_CEILING, "peak {}", out.peak());
            assert!(out.iter().all(|s| s.left.abs() <= 1.0 && s.right.abs() <= 1.0));
        }
        assert!(atomics.soft_limited_count() > 0);
        assert_eq!(atomics.hard_clipped_count(), 0);
    }

    #[test]
    fn test_commands_through_queue() {
        let (mut tx, mut rx) = command_channel();
        let mut bus = MixBus::new(1.0);

        assert!(tx.push(replace(StemRole::Vocals, ActiveStem::new(ramp_stem("v", StemRole::Vocals, 100), 1.0))).is_ok());
        assert!(tx.push(MixCommand::SetMasterVolume { volume: 2.0 }).is_ok());
        bus.process_commands(&mut rx);

        assert_eq!(bus.active_count(), 1);
        assert_eq!(bus.master_volume(), 1.0);
        assert!(bus.atomics().take_state_changed());

        let mut out = StereoBuffer::silence(10);
        bus.process(&mut out);
        assert_eq!(bus.atomics().cursor(StemRole::Vocals), Some(10));
        assert_eq!(bus.atomics().progress(StemRole::Vocals), Some(0.1));
        assert_eq!(bus.atomics().cursor(StemRole::Bass), None);
    }

    #[test]
    fn test_restart_rewinds_cursor() {
        let mut bus = MixBus::new(1.0);
        bus.apply(replace(StemRole::Vocals, ActiveStem::new(ramp_stem("v", StemRole::Vocals, 50), 1.0)));

        let mut out = StereoBuffer::silence(20);
        bus.process(&mut out);
        assert_eq!(bus.stem(StemRole::Vocals).map(|s| s.cursor()), Some(20));

        bus.apply(MixCommand::RestartStem { role: StemRole::Vocals });
        assert_eq!(bus.stem(StemRole::Vocals).map(|s| s.cursor()), Some(0));

        // Restarting an empty slot is harmless
        bus.apply(MixCommand::RestartStem { role: StemRole::Bass });
        assert!(bus.stem(StemRole::Bass).is_none());
        assert_eq!(bus.active_count(), 1);
    }

    #[test]
    fn test_replace_is_atomic_per_chunk() {
        let mut bus = MixBus::new(1.0);
        bus.apply(replace(StemRole::Vocals, ActiveStem::new(constant_stem("old", StemRole::Vocals, 0.1, 64), 1.0)));
        let mut out = StereoBuffer::silence(16);
        bus.process(&mut out);

        bus.apply(replace(StemRole::Vocals, ActiveStem::new(constant_stem("new", StemRole::Vocals, 0.3, 64), 1.0)));
        bus.process(&mut out);
        assert!(out.iter().all(|s| (s.left - 0.3).abs() < 1e-6));
        assert_eq!(bus.stem(StemRole::Vocals).map(|s| s.record().song_id.as_str()), Some("new"));
    }

    #[test]
    fn test_piano_has_no_slot() {
        let mut bus = MixBus::new(1.0);
        bus.apply(replace(StemRole::Piano, ActiveStem::new(constant_stem("p", StemRole::Piano, 0.5, 8), 1.0)));
        assert_eq!(bus.active_count(), 0);
    }
}
