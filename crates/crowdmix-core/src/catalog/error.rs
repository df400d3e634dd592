//! Catalog error types

use std::path::PathBuf;

use thiserror::Error;

use crate::tempo::ResampleError;

/// Errors raised while building the catalog or decoding stems
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Stems directory not found: {0}")]
    MissingStemsDir(PathBuf),

    #[error("Song structures directory not found: {0}")]
    MissingStructuresDir(PathBuf),

    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse song structure {path}")]
    Structure {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode WAV file {path}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("WAV file {path} has no channels")]
    NoChannels { path: PathBuf },

    #[error("Failed to convert sample rate of {path}")]
    Resample {
        path: PathBuf,
        #[source]
        source: ResampleError,
    },

    #[error("No usable songs found in {0}")]
    Empty(PathBuf),
}
