use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

/// File extensions recognised as playable tracks.
const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "wav", "ogg", "flac"];

/// Where a playlist's tracks come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    /// Explicit ordered track list, fixed at configuration load.
    Fixed(Vec<PathBuf>),
    /// Directory scanned fresh at every resolution, so tracks dropped into the
    /// folder show up without a restart.
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub name: String,
    pub source: TrackSource,
}

impl Playlist {
    pub fn from_tracks(name: impl Into<String>, tracks: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: TrackSource::Fixed(tracks),
        }
    }

    pub fn from_directory(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: TrackSource::Directory(directory.into()),
        }
    }

    /// Resolve to concrete track paths. Relative paths are anchored at
    /// `base_dir`. An empty result means no track is available right now.
    pub fn resolve_tracks(&self, base_dir: &Path) -> Vec<PathBuf> {
        match &self.source {
            TrackSource::Fixed(tracks) => tracks.iter().map(|t| anchor(base_dir, t)).collect(),
            TrackSource::Directory(dir) => list_audio_files(&anchor(base_dir, dir)),
        }
    }
}

fn anchor(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Audio files in `dir`, sorted by file name (lexicographic, case-sensitive).
fn list_audio_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("playlist directory {} unreadable: {err}", dir.display());
            return Vec::new();
        }
    };

    let mut tracks: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_audio_file(path))
        .collect();
    tracks.sort();
    tracks
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            AUDIO_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

/// Process-wide playback position: which playlist is being worked through and
/// which track comes next.
///
/// Handing out a track post-increments the index (wrapping), so a track cut
/// short by a presence gap is not replayed — the next request resumes one past
/// it. Switching to a different playlist starts that playlist from the top.
#[derive(Debug, Default)]
pub struct PlaybackCursor {
    playlist: Option<String>,
    index: usize,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next track of `playlist`, or `None` when the resolution came up empty.
    pub fn next_track(&mut self, playlist: &str, tracks: &[PathBuf]) -> Option<PathBuf> {
        if tracks.is_empty() {
            return None;
        }

        if self.playlist.as_deref() != Some(playlist) {
            self.playlist = Some(playlist.to_string());
            self.index = 0;
        }

        // The listing can shrink between resolutions; clamp by wrapping.
        let position = self.index % tracks.len();
        self.index = (position + 1) % tracks.len();
        Some(tracks[position].clone())
    }
}
