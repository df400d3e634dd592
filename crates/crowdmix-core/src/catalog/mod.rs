//! Stem catalog
//!
//! Read-only index of the pre-separated stems on disk:
//!
//! ```text
//! stems/
//!   <song>/bass.wav, drums.wav, vocals.wav, piano.wav, other.wav
//! song-structures/
//!   <anything containing the song name>.json
//! ```
//!
//! A song needs at least two stems to be usable. Its native BPM comes from
//! the first structure file (sorted by name) whose file stem contains the
//! song directory name, or 120 when none matches. The catalog never changes
//! after `load_all` and is shared as `Arc<Catalog>`.

mod decode;
mod error;
mod structure;

pub use decode::{load_stem_audio, read_wav_info, WavInfo};
pub use error::CatalogError;
pub use structure::{Segment, SongStructure, DEFAULT_SONG_BPM};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::StemRole;

/// Fewest stems a song directory must contain
pub const MIN_STEMS_PER_SONG: usize = 2;

/// One stem file of one song
#[derive(Debug, Clone, PartialEq)]
pub struct StemRecord {
    pub song_id: String,
    pub role: StemRole,
    pub native_bpm: f64,
    pub sample_path: PathBuf,
    pub duration: Duration,
}

impl StemRecord {
    /// Identifier used in logs and status, e.g. `"Song A/bass"`
    pub fn label(&self) -> String {
        format!("{}/{}", self.song_id, self.role)
    }
}

/// A song and its available stems
#[derive(Debug, Clone)]
pub struct Song {
    pub id: String,
    pub bpm: f64,
    pub stems: BTreeMap<StemRole, StemRecord>,
    pub structure: Option<SongStructure>,
}

impl Song {
    pub fn stem(&self, role: StemRole) -> Option<&StemRecord> {
        self.stems.get(&role)
    }
}

/// All usable songs, keyed by song id (the directory name)
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    songs: BTreeMap<String, Song>,
}

impl Catalog {
    /// Scan `stems_dir` and `structures_dir`
    ///
    /// Missing directories, unparseable structure files and an empty result
    /// are errors. Individual songs that fall below two readable stems are
    /// skipped with a warning.
    pub fn load_all(stems_dir: &Path, structures_dir: &Path) -> Result<Self, CatalogError> {
        if !stems_dir.is_dir() {
            return Err(CatalogError::MissingStemsDir(stems_dir.to_path_buf()));
        }
        if !structures_dir.is_dir() {
            return Err(CatalogError::MissingStructuresDir(structures_dir.to_path_buf()));
        }

        let structures = load_structures(structures_dir)?;
        log::info!(
            "Catalog: {} structure files in {}",
            structures.len(),
            structures_dir.display()
        );

        let mut song_dirs: Vec<PathBuf> = list_dir(stems_dir)?
            .into_iter()
            .filter(|p| p.is_dir())
            .collect();
        song_dirs.sort();

        let mut songs = BTreeMap::new();
        for dir in song_dirs {
            let Some(song_id) = dir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                log::warn!("Catalog: skipping non UTF-8 directory {}", dir.display());
                continue;
            };

            let structure = structures
                .iter()
                .find(|(stem, _)| stem.contains(song_id.as_str()))
                .map(|(_, s)| s.clone());

            match scan_song(&dir, &song_id, structure) {
                Some(song) => {
                    log::debug!(
                        "Catalog: {} ({:.1} BPM, {} stems)",
                        song.id,
                        song.bpm,
                        song.stems.len()
                    );
                    songs.insert(song_id, song);
                }
                None => continue,
            }
        }

        if songs.is_empty() {
            return Err(CatalogError::Empty(stems_dir.to_path_buf()));
        }

        log::info!("Catalog: loaded {} songs from {}", songs.len(), stems_dir.display());
        Ok(Self { songs })
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn song(&self, id: &str) -> Option<&Song> {
        self.songs.get(id)
    }

    pub fn songs(&self) -> impl Iterator<Item = &Song> {
        self.songs.values()
    }

    /// Every stem record in the catalog
    pub fn records(&self) -> impl Iterator<Item = &StemRecord> {
        self.songs.values().flat_map(|s| s.stems.values())
    }

    /// Records of one role across all songs, in song id order
    pub fn records_for_role(&self, role: StemRole) -> Vec<&StemRecord> {
        self.songs.values().filter_map(|s| s.stem(role)).collect()
    }
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let io_err = |source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    Ok(paths)
}

/// Structure files keyed by file stem, sorted by file name
fn load_structures(dir: &Path) -> Result<Vec<(String, SongStructure)>, CatalogError> {
    let mut files: Vec<PathBuf> = list_dir(dir)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut structures = Vec::with_capacity(files.len());
    for path in files {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
            continue;
        };
        structures.push((stem, SongStructure::load(&path)?));
    }
    Ok(structures)
}

fn scan_song(dir: &Path, song_id: &str, structure: Option<SongStructure>) -> Option<Song> {
    let bpm = match &structure {
        Some(s) if s.bpm.is_finite() && s.bpm > 0.0 => s.bpm,
        Some(s) => {
            log::warn!(
                "Catalog: {} has invalid BPM {} in its structure, using {}",
                song_id,
                s.bpm,
                DEFAULT_SONG_BPM
            );
            DEFAULT_SONG_BPM
        }
        None => DEFAULT_SONG_BPM,
    };

    let mut stems = BTreeMap::new();
    for role in StemRole::ALL {
        let path = dir.join(format!("{}.wav", role.name()));
        if !path.is_file() {
            continue;
        }
        match read_wav_info(&path) {
            Ok(info) => {
                stems.insert(
                    role,
                    StemRecord {
                        song_id: song_id.to_owned(),
                        role,
                        native_bpm: bpm,
                        sample_path: path,
                        duration: info.duration,
                    },
                );
            }
            Err(e) => log::warn!("Catalog: skipping {}: {}", path.display(), e),
        }
    }

    if stems.len() < MIN_STEMS_PER_SONG {
        log::warn!(
            "Catalog: skipping {} ({} usable stems, need {})",
            song_id,
            stems.len(),
            MIN_STEMS_PER_SONG
        );
        return None;
    }

    Some(Song {
        id: song_id.to_owned(),
        bpm,
        stems,
        structure,
    })
}
