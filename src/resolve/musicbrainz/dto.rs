//! MusicBrainz API Data Transfer Objects
//!
//! These types match the release lookup response with
//! `inc=artist-credits+recordings+media`. Convert to domain types in the
//! adapter; never use these outside the musicbrainz module.

use serde::{Deserialize, Serialize};

/// Release lookup response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReleaseResponse {
    pub id: String,
    pub title: Option<String>,
    /// Release date, e.g. "1969-09-26" or just "1969"
    pub date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    pub media: Vec<Medium>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistCredit {
    pub name: String,
}

/// A medium (disc) within a release
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Medium {
    pub position: Option<u32>,
    #[serde(rename = "track-count")]
    pub track_count: Option<u32>,
    #[serde(default)]
    pub tracks: Vec<TrackEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackEntry {
    pub position: Option<u32>,
    pub title: Option<String>,
    /// Track length in milliseconds
    pub length: Option<u64>,
}

/// Error body returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub error: String,
}

#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    fn test_parse_release_response() {
        let json = r#"{
            "id": "rel-123",
            "title": "Abbey Road",
            "date": "1969-09-26",
            "artist-credit": [{"name": "The Beatles"}],
            "media": [{
                "position": 1,
                "track-count": 17,
                "tracks": [
                    {"position": 7, "title": "Here Comes The Sun", "length": 185000}
                ]
            }]
        }"#;

        let response: ReleaseResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.title.as_deref(), Some("Abbey Road"));
        assert_eq!(response.artist_credit[0].name, "The Beatles");
        assert_eq!(response.media[0].tracks[0].position, Some(7));
        assert_eq!(response.media[0].tracks[0].length, Some(185000));
    }

    #[test]
    fn test_parse_sparse_release() {
        let json = r#"{"id": "rel-1"}"#;
        let response: ReleaseResponse = serde_json::from_str(json).unwrap();
        assert!(response.title.is_none());
        assert!(response.media.is_empty());
        assert!(response.artist_credit.is_empty());
    }

    #[test]
    fn test_parse_error_body() {
        let json = r#"{"error": "Not Found"}"#;
        let error: ApiError = serde_json::from_str(json).unwrap();
        assert_eq!(error.error, "Not Found");
    }
}
