//! OSC over UDP
//!
//! Decodes datagrams with rosc and maps addresses to control messages:
//!
//! | Address          | Payload      |
//! |------------------|--------------|
//! | `/energy`        | float 0..1   |
//! | `/movement`      | float 0..1   |
//! | `/bpm`           | float        |
//! | `/master_volume` | float 0..1   |
//! | `/status`        | none         |
//! | `/next_vocal`    | none         |
//!
//! Numeric args may be `f`, `d`, `i` or `h`. Bundles are unpacked
//! recursively; unknown addresses are ignored.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rosc::{OscMessage, OscPacket, OscType};
use serde::{Deserialize, Serialize};

use crate::messages::ControlMessage;
use crate::normalize::ControlLimits;
use crate::ControlError;

/// How often the server thread checks for shutdown
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Pause after a hard receive error so a broken socket cannot spin the thread
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// `osc` section of the performer config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    pub enable_osc: bool,
    pub host: String,
    pub port: u16,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            enable_osc: true,
            host: "127.0.0.1".to_string(),
            port: 5005,
        }
    }
}

/// Map one OSC message to a control message
///
/// Returns None for unknown addresses or missing/non-numeric payloads.
pub fn message_from_osc(msg: &OscMessage) -> Option<ControlMessage> {
    let message = match msg.addr.as_str() {
        "/energy" | "/movement" => ControlMessage::SetEnergy(first_number(msg)?),
        "/bpm" => ControlMessage::SetBpm(first_number(msg)?),
        "/master_volume" => ControlMessage::SetMasterVolume(first_number(msg)? as f32),
        "/status" => ControlMessage::Status,
        "/next_vocal" => ControlMessage::NextVocal,
        other => {
            log::debug!("OSC: ignoring unknown address {}", other);
            return None;
        }
    };
    Some(message)
}

fn first_number(msg: &OscMessage) -> Option<f64> {
    let value = match msg.args.first() {
        Some(OscType::Float(v)) => *v as f64,
        Some(OscType::Double(v)) => *v,
        Some(OscType::Int(v)) => *v as f64,
        Some(OscType::Long(v)) => *v as f64,
        other => {
            log::warn!("OSC: {} expects a number, got {:?}", msg.addr, other);
            return None;
        }
    };
    Some(value)
}

/// Flatten a packet into control messages, bundles included
pub fn messages_from_packet(packet: &OscPacket) -> Vec<ControlMessage> {
    let mut out = Vec::new();
    collect(packet, &mut out);
    out
}

fn collect(packet: &OscPacket, out: &mut Vec<ControlMessage>) {
    match packet {
        OscPacket::Message(msg) => out.extend(message_from_osc(msg)),
        OscPacket::Bundle(bundle) => {
            for inner in &bundle.content {
                collect(inner, out);
            }
        }
    }
}

/// Decode one datagram
pub fn decode_datagram(data: &[u8]) -> Result<Vec<ControlMessage>, ControlError> {
    let (_, packet) = rosc::decoder::decode_udp(data).map_err(ControlError::Decode)?;
    Ok(messages_from_packet(&packet))
}

/// Background UDP listener
///
/// Dropping the server stops the thread.
pub struct OscServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl OscServer {
    /// Bind `host:port` and start forwarding messages into `tx`
    pub fn start(
        host: &str,
        port: u16,
        limits: ControlLimits,
        tx: flume::Sender<ControlMessage>,
    ) -> Result<Self, ControlError> {
        let addr = format!("{}:{}", host, port);
        let socket = UdpSocket::bind(&addr).map_err(|source| ControlError::Bind {
            addr: addr.clone(),
            source,
        })?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|source| ControlError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = socket.local_addr().map_err(|source| ControlError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("osc-server".to_string())
            .spawn(move || serve(socket, limits, tx, thread_running))
            .map_err(ControlError::Spawn)?;

        log::info!("OSC: listening on {}", local_addr);
        Ok(Self {
            local_addr,
            running,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            log::info!("OSC: server stopped");
        }
    }
}

impl Drop for OscServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// How long to wait before the next receive, `None` for a plain timeout
fn receive_backoff(kind: std::io::ErrorKind) -> Option<Duration> {
    match kind {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => None,
        _ => Some(ERROR_BACKOFF),
    }
}

fn serve(
    socket: UdpSocket,
    limits: ControlLimits,
    tx: flume::Sender<ControlMessage>,
    running: Arc<AtomicBool>,
) {
    let mut buf = [0u8; rosc::decoder::MTU];
    while running.load(Ordering::Relaxed) {
        let (size, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) => {
                if let Some(pause) = receive_backoff(e.kind()) {
                    log::warn!("OSC: receive failed: {}", e);
                    std::thread::sleep(pause);
                }
                continue;
            }
        };

        let messages = match decode_datagram(&buf[..size]) {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("OSC: bad packet from {}: {}", from, e);
                continue;
            }
        };

        for message in messages {
            let message = limits.normalize(message);
            log::debug!("OSC: {} from {}", message.name(), from);
            match tx.try_send(message) {
                Ok(()) => {}
                Err(flume::TrySendError::Full(_)) => {
                    log::warn!("OSC: control channel full, dropping {}", message.name());
                }
                Err(flume::TrySendError::Disconnected(_)) => return,
            }
        }
    }
}
