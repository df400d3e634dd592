//! Real-time mix engine
//!
//! - Mix bus: one looping slot per mixed role, summed at per-stem gain
//! - Master chain: tanh soft limiter then emergency hard clipper
//! - Command queue: rtrb SPSC from the performer thread to the audio thread
//! - GC: basedrop collector so replaced stems are freed off the audio thread

mod command;
mod engine;
pub mod gc;
mod master_clipper;
mod master_limiter;
mod stem;

pub use command::*;
pub use engine::*;
pub use master_clipper::*;
pub use master_limiter::*;
pub use stem::{ActiveStem, PreparedStem};
