//! Detection and matching for the DJ Screw "Diary of the Originator"
//! chapter series.
//!
//! The series is a 363-chapter catalog of mixtapes, completely indexed on
//! the Internet Archive under a naming convention of
//! `Chapter NNN - Title`. Tracks from these tapes are hopeless for
//! fingerprint lookup (screwed/chopped audio, compilation releases), but
//! the archive has authoritative per-chapter track lists, so a dedicated
//! matcher pays for itself.

use std::path::Path;

use crate::fuzzy;
use crate::model::{MatchCandidate, Track};

/// Album artist applied to every chapter tape.
pub const SERIES_ALBUM_ARTIST: &str = "DJ Screw";

/// Canonical album name for a chapter.
pub fn chapter_album_name(number: u32, title: Option<&str>) -> String {
    match title {
        Some(title) => format!("Chapter {:03} - {}", number, fuzzy::smart_title_case(title)),
        None => format!("Chapter {:03}", number),
    }
}

/// Album keywords that mark a tape from the series.
const SERIES_ALBUM_KEYWORDS: &[&str] = &[
    "diary of the originator",
    "screwed up click",
    "3 n the mornin",
    "screw tape",
    "gray tape",
    "grey tape",
    "chopped and screwed",
    "chopped & screwed",
    "screwed and chopped",
    "screwed & chopped",
];

/// Folder name fragments that mark the series.
const SERIES_FOLDER_VARIANTS: &[&str] = &[
    "dj screw",
    "djscrew",
    "screwed up click",
    "va dj screw",
];

/// Check whether a track looks like it belongs to the chapter series.
///
/// Indicators: album artist names the DJ, album matches a chapter
/// pattern or known series keyword, or a folder on the path carries a
/// series variant.
pub fn is_series_track(track: &Track) -> bool {
    let album_artist = track
        .tags
        .album_artist
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    if album_artist.contains("dj screw") || album_artist.contains("djscrew") {
        return true;
    }

    let album = track.tags.album.as_deref().unwrap_or("").to_lowercase();
    if parse_chapter_text(&album).is_some() {
        return true;
    }
    if SERIES_ALBUM_KEYWORDS.iter().any(|kw| album.contains(kw)) {
        return true;
    }

    path_has_series_folder(&track.source_path)
}

fn path_has_series_folder(path: &Path) -> bool {
    path.components().any(|part| {
        let part = part
            .as_os_str()
            .to_string_lossy()
            .to_lowercase()
            .replace(['_', '-'], " ");
        SERIES_FOLDER_VARIANTS
            .iter()
            .any(|variant| part.contains(variant))
    })
}

/// Extract `(chapter_number, chapter_title)` from a track's metadata.
///
/// Tries the album tag first (`Chapter 051 - 9 Fo Shit`, `Chapter 51`),
/// then folder names on the source path.
pub fn extract_chapter(track: &Track) -> Option<(u32, Option<String>)> {
    if let Some(album) = track.tags.album.as_deref() {
        if let Some(found) = parse_chapter_text(&album.to_lowercase()) {
            return Some(found);
        }
    }

    for part in track.source_path.components() {
        let part = part
            .as_os_str()
            .to_string_lossy()
            .to_lowercase()
            .replace(['_'], " ");
        if let Some(found) = parse_chapter_text(&part) {
            return Some(found);
        }
    }

    None
}

/// Parse "chapter NNN[ - title]" out of lowercased text.
fn parse_chapter_text(text: &str) -> Option<(u32, Option<String>)> {
    let idx = text.find("chapter")?;
    let after = text[idx + "chapter".len()..].trim_start();
    let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > 3 {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    if number == 0 {
        return None;
    }

    let rest = after[digits.len()..].trim_start_matches([' ', '-', ':', '.', '–', '—']);
    let title = fuzzy::clean_tag(rest).map(|t| {
        // Drop a trailing "(1994)"-style year
        let trimmed = t
            .trim_end()
            .trim_end_matches(|c: char| c.is_ascii_digit())
            .trim_end_matches('(')
            .trim_end();
        if trimmed.len() < t.len() && t.ends_with(')') {
            trimmed.to_string()
        } else {
            t
        }
    });
    Some((number, title.filter(|t| !t.is_empty())))
}

/// Pick the chapter candidate whose title best matches the track.
///
/// Compares the track's title (or filename stem) against each
/// candidate's title; only matches at or above the fuzzy threshold
/// count.
pub fn best_candidate_index(track: &Track, candidates: &[MatchCandidate]) -> Option<usize> {
    let track_title = track.display_title();
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            (
                i,
                fuzzy::similarity(Some(track_title.as_str()), c.title.as_deref()),
            )
        })
        .filter(|(_, score)| *score >= fuzzy::MATCH_THRESHOLD)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}
