//! crowdmix core - stem catalog, tempo adaptation, mix bus and energy decisions

pub mod audio;
pub mod catalog;
pub mod config;
pub mod decision;
pub mod engine;
pub mod selector;
pub mod tempo;
pub mod timestretch;
pub mod types;

pub use types::*;
