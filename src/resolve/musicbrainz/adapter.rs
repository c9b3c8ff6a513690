//! Adapter layer: Convert MusicBrainz DTOs to domain release info.

use super::dto;
use crate::resolve::traits::{ReleaseInfo, ReleaseTrack};

/// Convert a release response into domain release info.
pub fn to_release_info(response: dto::ReleaseResponse) -> ReleaseInfo {
    let year = response
        .date
        .as_deref()
        .and_then(|d| d.split('-').next())
        .and_then(|y| y.parse::<i32>().ok());

    let total_discs = if response.media.is_empty() {
        None
    } else {
        Some(response.media.len() as u32)
    };
    let total_tracks = response
        .media
        .iter()
        .filter_map(|m| m.track_count)
        .reduce(|a, b| a + b);

    let tracks = response
        .media
        .iter()
        .flat_map(|medium| {
            let disc = medium.position.unwrap_or(1);
            medium.tracks.iter().filter_map(move |t| {
                Some(ReleaseTrack {
                    position: t.position?,
                    disc,
                    title: t.title.clone()?,
                    duration_secs: t.length.map(|ms| ms as f64 / 1000.0),
                })
            })
        })
        .collect();

    ReleaseInfo {
        release_id: response.id,
        artist: response.artist_credit.first().map(|a| a.name.clone()),
        album: response.title,
        year,
        total_tracks,
        total_discs,
        tracks,
    }
}
