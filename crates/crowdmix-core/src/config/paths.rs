//! Default locations for configuration and the stem library

use std::path::PathBuf;

/// Application directory name under the platform config dir
const APP_DIR: &str = "crowdmix";

/// Platform config directory for crowdmix
///
/// Returns: `$XDG_CONFIG_HOME/crowdmix` on Linux, the platform equivalent
/// elsewhere, or `./crowdmix` when no config dir is known.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Default path of a config file
///
/// Returns: `<config dir>/crowdmix/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

/// Default stems directory, relative to the working directory
pub fn default_stems_dir() -> PathBuf {
    PathBuf::from("stems")
}

/// Default song structure directory, relative to the working directory
pub fn default_structures_dir() -> PathBuf {
    PathBuf::from("song-structures")
}
