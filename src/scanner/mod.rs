//! Recursive audio file discovery.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::model::Track;

/// Supported audio extensions (case-insensitive).
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "m4a", "aac", "ogg", "opus", "wma", "aiff", "aif", "wav", "ape", "wv",
];

/// Check if a file has a supported audio extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Scan the given roots recursively for audio files.
///
/// Returns one [`Track`] per discovered file, in traversal order. The
/// walk is synchronous; the pipeline runs it on a blocking task.
pub fn scan_roots(roots: &[PathBuf]) -> Vec<Track> {
    let mut tracks = Vec::new();
    for root in roots {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !is_audio_file(path) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            tracks.push(Track::new(path.to_path_buf(), size));
        }
    }
    tracing::info!("Scanned {} audio files under {} root(s)", tracks.len(), roots.len());
    tracks
}
