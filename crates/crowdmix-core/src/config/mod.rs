//! Shared configuration utilities
//!
//! - Generic YAML config loading/saving
//! - Default locations for the config file and the stem library
//!
//! ```ignore
//! use crowdmix_core::config::{load_config, save_config, default_config_path};
//!
//! let path = default_config_path("config.yaml");
//! let config: PerformerConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, default_structures_dir, default_stems_dir};
