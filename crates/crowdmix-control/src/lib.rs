//! Control surface for crowdmix
//!
//! This crate provides:
//! - OSC over UDP, decoded with rosc
//! - Interactive console command parsing
//! - Range clamping for every incoming value
//! - A bounded flume channel bridging ingress threads to the performer
//!
//! # Architecture
//!
//! ```text
//! OSC datagram → osc-server thread ─┐
//!                                   ├─ clamp → flume (bounded) → performer loop
//! stdin line   → parse_command ─────┘
//! ```
//!
//! Ingress never blocks: when the channel is full the message is dropped
//! with a warning.

mod command;
mod messages;
mod normalize;
mod osc;

pub use command::{parse_command, CommandError, ConsoleCommand, HELP_TEXT};
pub use messages::ControlMessage;
pub use normalize::{ControlLimits, ControlRange, DEFAULT_BPM_MAX, DEFAULT_BPM_MIN};
pub use osc::{decode_datagram, message_from_osc, messages_from_packet, OscConfig, OscServer};

use flume::{Receiver, Sender, TrySendError};

/// Capacity of the control channel
pub const CONTROL_CHANNEL_CAPACITY: usize = 256;

/// Error type for control surface operations
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Failed to bind OSC socket {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn OSC thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Malformed OSC packet: {0:?}")]
    Decode(rosc::OscError),
}

/// Entry point for every ingress channel
///
/// Owns the sending half of the control channel and the OSC server, if any.
pub struct ControlSurface {
    tx: Sender<ControlMessage>,
    limits: ControlLimits,
    osc: Option<OscServer>,
}

impl ControlSurface {
    /// Create the surface and the receiver the performer drains
    pub fn new(limits: ControlLimits) -> (Self, Receiver<ControlMessage>) {
        Self::with_capacity(limits, CONTROL_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(limits: ControlLimits, capacity: usize) -> (Self, Receiver<ControlMessage>) {
        let (tx, rx) = flume::bounded(capacity.max(1));
        (
            Self {
                tx,
                limits,
                osc: None,
            },
            rx,
        )
    }

    pub fn limits(&self) -> ControlLimits {
        self.limits
    }

    /// Start the OSC listener if enabled in `config`
    ///
    /// A bind failure is returned; the console keeps working either way.
    pub fn start_osc(&mut self, config: &OscConfig) -> Result<(), ControlError> {
        if !config.enable_osc {
            log::info!("OSC: disabled");
            return Ok(());
        }
        let server = OscServer::start(&config.host, config.port, self.limits, self.tx.clone())?;
        self.osc = Some(server);
        Ok(())
    }

    pub fn osc_server(&self) -> Option<&OscServer> {
        self.osc.as_ref()
    }

    /// Clamp and forward a message
    ///
    /// Returns false if it was dropped (channel full or performer gone).
    pub fn submit(&self, message: ControlMessage) -> bool {
        let message = self.limits.normalize(message);
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("Control: channel full, dropping {}", message.name());
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Control: performer gone, dropping {}", message.name());
                false
            }
        }
    }

    /// Stop the OSC listener
    pub fn shutdown(&mut self) {
        if let Some(mut server) = self.osc.take() {
            server.stop();
        }
    }
}

impl Drop for ControlSurface {
    fn drop(&mut self) {
        self.shutdown();
    }
}
