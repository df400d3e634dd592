//! Song structure metadata (`song-structures/*.json`)
//!
//! ```json
//! { "bpm": 124.0, "segments": [ { "start": 0.0, "end": 16.2, "label": "intro" } ] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::CatalogError;

/// BPM assumed when a song has no structure file or the file omits it
pub const DEFAULT_SONG_BPM: f64 = 120.0;

fn default_bpm() -> f64 {
    DEFAULT_SONG_BPM
}

/// A labelled section of a song, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub label: String,
}

/// Tempo and section layout of one song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongStructure {
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Default for SongStructure {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_SONG_BPM,
            segments: Vec::new(),
        }
    }
}

impl SongStructure {
    /// Parse a structure file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| CatalogError::Structure {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Segment containing `position_secs` (start inclusive, end exclusive)
    pub fn segment_at(&self, position_secs: f64) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|seg| position_secs >= seg.start && position_secs < seg.end)
    }
}
