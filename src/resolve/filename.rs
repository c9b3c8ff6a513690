//! Tag guessing from file names and folder structure.
//!
//! When a file carries no usable tags, the name itself is often the only
//! signal: "Artist - Title.mp3", "01 - Title.mp3", compilation-style
//! "01 Artist - Title.mp3", and disc-track prefixes like "1-04 Title".
//! Folder names fill in the artist when the file name doesn't.

use std::path::Path;

use crate::fuzzy;
use crate::model::TrackTags;

/// Folder names that never stand in for an artist.
const SKIP_FOLDER_NAMES: &[&str] = &["music", "downloads", "desktop", "_unmatched", "unknown", ""];

/// Guess tags from the file name and parent folder.
///
/// Only produces values; the caller decides which of them fill holes in
/// the real tags. Guessed text gets smart title casing since file names
/// are usually all-lowercase or ALL-CAPS messes.
pub fn guess_from_filename(path: &Path) -> TrackTags {
    let mut tags = TrackTags::default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    parse_stem(&stem, &mut tags);

    // Parent folder as artist when the name didn't give one
    if tags.artist.is_none() {
        if let Some(parent) = path.parent().and_then(|p| p.file_name()) {
            let parent = parent.to_string_lossy();
            let normalized = parent.to_lowercase().replace(['_', '-'], " ");
            if !SKIP_FOLDER_NAMES.contains(&normalized.trim()) {
                tags.artist = fuzzy::clean_tag(&parent);
            }
        }
    }

    tags.title = tags.title.as_deref().map(fuzzy::smart_title_case);
    tags.artist = tags.artist.as_deref().map(fuzzy::smart_title_case);
    tags
}

fn parse_stem(stem: &str, tags: &mut TrackTags) {
    if let Some((first, rest)) = stem.split_once(" - ") {
        let first = first.trim();
        let rest = rest.trim();

        if let Some(number) = parse_track_number(first) {
            // "01 - Title"
            tags.track_number = Some(number);
            tags.title = fuzzy::clean_tag(rest);
        } else if let Some((disc, track)) = parse_disc_track(first) {
            // "1-04 - Title"
            tags.disc_number = Some(disc);
            tags.track_number = Some(track);
            tags.title = fuzzy::clean_tag(rest);
        } else if let Some((prefix, artist)) = split_leading_number(first) {
            // "01 Artist - Title" or "1-04 Artist - Title"
            if let Some((disc, track)) = parse_disc_track(prefix) {
                tags.disc_number = Some(disc);
                tags.track_number = Some(track);
            } else if let Some(number) = parse_track_number(prefix) {
                tags.track_number = Some(number);
            }
            tags.artist = fuzzy::clean_tag(artist);
            tags.title = fuzzy::clean_tag(rest);
        } else {
            // "Artist - Title"
            tags.artist = fuzzy::clean_tag(first);
            tags.title = fuzzy::clean_tag(rest);
        }
        return;
    }

    // "01 Title" / "1-04 Title" (no dash separator)
    if let Some((prefix, content)) = split_leading_number(stem) {
        if let Some((disc, track)) = parse_disc_track(prefix) {
            tags.disc_number = Some(disc);
            tags.track_number = Some(track);
        } else if let Some(number) = parse_track_number(prefix) {
            tags.track_number = Some(number);
        }
        tags.title = fuzzy::clean_tag(content);
        return;
    }

    // Whole stem as title
    tags.title = fuzzy::clean_tag(stem.trim_end_matches('.'));
}

/// "01" -> 1 (up to three digits)
fn parse_track_number(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 3 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// "1-04" -> (1, 4)
fn parse_disc_track(s: &str) -> Option<(u32, u32)> {
    let (disc, track) = s.split_once('-')?;
    Some((parse_track_number(disc)?, parse_track_number(track)?))
}

/// "01 Artist Name" -> ("01", "Artist Name"); also "1-04 Artist Name".
fn split_leading_number(s: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = s.split_once(' ')?;
    if parse_track_number(prefix).is_some() || parse_disc_track(prefix).is_some() {
        let rest = rest.trim();
        if rest.is_empty() {
            return None;
        }
        Some((prefix, rest))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn guess(path: &str) -> TrackTags {
        guess_from_filename(&PathBuf::from(path))
    }

    #[test]
    fn test_artist_dash_title() {
        let tags = guess("/m/2pac - Hellraizer.mp3");
        assert_eq!(tags.artist.as_deref(), Some("2pac"));
        assert_eq!(tags.title.as_deref(), Some("Hellraizer"));
    }

    #[test]
    fn test_number_dash_title() {
        let tags = guess("/m/Some Artist/01 - Intro.mp3");
        assert_eq!(tags.track_number, Some(1));
        assert_eq!(tags.title.as_deref(), Some("Intro"));
        // Artist picked up from the folder
        assert_eq!(tags.artist.as_deref(), Some("Some Artist"));
    }

    #[test]
    fn test_compilation_number_artist_title() {
        let tags = guess("/m/03 Big Moe - Freestyle.mp3");
        assert_eq!(tags.track_number, Some(3));
        assert_eq!(tags.artist.as_deref(), Some("Big Moe"));
        assert_eq!(tags.title.as_deref(), Some("Freestyle"));
    }

    #[test]
    fn test_disc_track_prefix() {
        let tags = guess("/m/1-04 ambitionz az a ridah.mp3");
        assert_eq!(tags.disc_number, Some(1));
        assert_eq!(tags.track_number, Some(4));
        assert_eq!(tags.title.as_deref(), Some("Ambitionz Az a Ridah"));
    }

    #[test]
    fn test_disc_track_dash_title() {
        let tags = guess("/m/2-12 - Still Tippin.mp3");
        assert_eq!(tags.disc_number, Some(2));
        assert_eq!(tags.track_number, Some(12));
        assert_eq!(tags.title.as_deref(), Some("Still Tippin"));
    }

    #[test]
    fn test_number_title_without_dash() {
        let tags = guess("/m/05 Hellraizer.mp3");
        assert_eq!(tags.track_number, Some(5));
        assert_eq!(tags.title.as_deref(), Some("Hellraizer"));
    }

    #[test]
    fn test_plain_stem_becomes_title() {
        let tags = guess("/m/freebird.mp3");
        assert_eq!(tags.title.as_deref(), Some("Freebird"));
        assert_eq!(tags.track_number, None);
    }

    #[test]
    fn test_junk_folder_not_used_as_artist() {
        let tags = guess("/home/user/Downloads/mystery song.mp3");
        assert_eq!(tags.artist, None);
        assert_eq!(tags.title.as_deref(), Some("Mystery Song"));
    }

    #[test]
    fn test_title_case_applied() {
        let tags = guess("/m/the artist - here comes the sun.mp3");
        assert_eq!(tags.artist.as_deref(), Some("The Artist"));
        assert_eq!(tags.title.as_deref(), Some("Here Comes the Sun"));
    }
}
