//! Control messages delivered to the performer
//!
//! Both ingress channels (OSC and the console) resolve to these. Values are
//! already clamped by the time a message reaches the channel.

/// Operation requested by an operator or an external controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMessage {
    /// Crowd energy reading (0.0 - 1.0)
    SetEnergy(f64),
    /// New base tempo for every layer
    SetBpm(f64),
    /// Master output volume (0.0 - 1.0)
    SetMasterVolume(f32),
    /// Swap the vocal now, ignoring thresholds and debounce
    NextVocal,
    /// Print a status snapshot
    Status,
    /// Stop the performance
    Shutdown,
}

impl ControlMessage {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ControlMessage::SetEnergy(_) => "energy",
            ControlMessage::SetBpm(_) => "bpm",
            ControlMessage::SetMasterVolume(_) => "master_volume",
            ControlMessage::NextVocal => "next_vocal",
            ControlMessage::Status => "status",
            ControlMessage::Shutdown => "shutdown",
        }
    }
}
