//! Lock-free command queue for the mix bus
//!
//! The performer thread prepares stems completely (decode, tempo adaptation)
//! and hands them to the audio thread through a wait-free `rtrb` ringbuffer.
//! The mix bus drains the queue at the start of every chunk, so each chunk
//! is rendered entirely with the old state or entirely with the new one.
//!
//! ```ignore
//! let (tx, rx) = command_channel();
//!
//! // Performer thread (single producer)
//! tx.push(MixCommand::SetMasterVolume { volume: 0.7 });
//!
//! // Audio thread
//! mix_bus.process_commands(&mut rx);
//! ```

use super::ActiveStem;
use crate::types::StemRole;

/// Commands sent from the performer thread to the audio thread
pub enum MixCommand {
    /// Swap the stem sounding in `role`'s slot. The outgoing stem is cut
    /// immediately and released through the GC thread.
    ReplaceStem { role: StemRole, stem: ActiveStem },
    /// Restart the stem in a slot from its first frame (vocal repeat)
    RestartStem { role: StemRole },
    /// Master output volume (0.0 - 1.0)
    SetMasterVolume { volume: f32 },
}

/// Capacity of the command queue
///
/// The busiest burst is a BPM change re-adapting all four slots. 64 leaves
/// plenty of headroom.
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Create the command channel `(Producer, Consumer)`
///
/// The producer belongs to the performer thread, the consumer to the audio
/// callback.
pub fn command_channel() -> (rtrb::Producer<MixCommand>, rtrb::Consumer<MixCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
