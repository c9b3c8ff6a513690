//! Audio file tag reading and writing.
//!
//! Uses the lofty crate for format-independent metadata access.
//! Supports MP3 (ID3v2), FLAC, OGG, M4A, and WAV files.

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};
use std::path::Path;

use crate::error::{Error, Result};
use crate::fuzzy;
use crate::model::{MatchCandidate, TrackTags};

/// Tags plus decoded duration, as read from a file.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub tags: TrackTags,
    pub duration_secs: f64,
}

/// Read tags and audio properties from a file.
pub fn read(path: &Path) -> Result<FileMetadata> {
    let tagged_file = Probe::open(path)
        .map_err(|e| Error::tag(path, format!("probe failed: {}", e)))?
        .read()
        .map_err(|e| Error::tag(path, format!("read failed: {}", e)))?;

    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

    let tags = TrackTags {
        title: tag.and_then(|t| t.title().as_deref().and_then(fuzzy::clean_tag)),
        artist: tag.and_then(|t| t.artist().as_deref().and_then(fuzzy::clean_tag)),
        album: tag.and_then(|t| t.album().as_deref().and_then(fuzzy::clean_tag)),
        album_artist: tag.and_then(|t| {
            t.get_string(&ItemKey::AlbumArtist)
                .and_then(fuzzy::clean_tag)
        }),
        year: tag.and_then(|t| t.year()).map(|y| y as i32),
        track_number: tag.and_then(|t| t.track()),
        total_tracks: tag.and_then(|t| t.track_total()),
        disc_number: tag.and_then(|t| t.disk()),
        total_discs: tag.and_then(|t| t.disk_total()),
        genre: tag.and_then(|t| t.genre().as_deref().and_then(fuzzy::clean_tag)),
    };

    let duration_secs = tagged_file.properties().duration().as_secs_f64();

    Ok(FileMetadata {
        tags,
        duration_secs,
    })
}

/// Write a chosen candidate's identity into the file's embedded tags.
///
/// Returns the number of fields written. Fields the candidate does not
/// carry are left untouched.
pub fn write(path: &Path, candidate: &MatchCandidate) -> Result<usize> {
    let mut tagged_file = Probe::open(path)
        .map_err(|e| Error::tag(path, format!("probe failed: {}", e)))?
        .read()
        .map_err(|e| Error::tag(path, format!("read failed: {}", e)))?;

    let tag_type = tagged_file.primary_tag_type();
    let tag = match tagged_file.tag_mut(tag_type) {
        Some(tag) => tag,
        None => {
            tagged_file.insert_tag(Tag::new(tag_type));
            tagged_file
                .tag_mut(tag_type)
                .ok_or_else(|| Error::tag(path, "failed to create tag"))?
        }
    };

    let mut written = 0;

    if let Some(title) = &candidate.title {
        tag.set_title(title.clone());
        written += 1;
    }
    if let Some(artist) = &candidate.artist {
        tag.set_artist(artist.clone());
        written += 1;
    }
    if let Some(album) = &candidate.album {
        tag.set_album(album.clone());
        written += 1;
    }
    if let Some(album_artist) = &candidate.album_artist {
        tag.insert_text(ItemKey::AlbumArtist, album_artist.clone());
        written += 1;
    }
    if let Some(year) = candidate.year {
        tag.set_year(year as u32);
        written += 1;
    }
    if let Some(track) = candidate.track_number {
        tag.set_track(track);
        written += 1;
    }
    if let Some(total) = candidate.total_tracks {
        tag.set_track_total(total);
        written += 1;
    }
    if let Some(disc) = candidate.disc_number {
        tag.set_disk(disc);
        written += 1;
    }
    if let Some(total) = candidate.total_discs {
        tag.set_disk_total(total);
        written += 1;
    }
    if let Some(genre) = &candidate.genre {
        tag.set_genre(genre.clone());
        written += 1;
    }
    if let Some(recording_id) = &candidate.recording_id {
        tag.insert_text(ItemKey::MusicBrainzRecordingId, recording_id.clone());
        written += 1;
    }
    if let Some(release_id) = &candidate.release_id {
        tag.insert_text(ItemKey::MusicBrainzReleaseId, release_id.clone());
        written += 1;
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| Error::tag(path, format!("write failed: {}", e)))?;

    Ok(written)
}
