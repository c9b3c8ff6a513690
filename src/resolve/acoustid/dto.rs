//! AcoustID API Data Transfer Objects
//!
//! These types match EXACTLY what the AcoustID API returns.
//! DO NOT add fields that aren't in the API response.
//! DO NOT use these types outside the acoustid module - convert to
//! domain types in the adapter.
//!
//! API Reference: https://acoustid.org/webservice#lookup

use serde::{Deserialize, Serialize};

/// Top-level AcoustID lookup response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<LookupResult>,
    /// Error info if status != "ok"
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

/// A single fingerprint match result
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupResult {
    /// AcoustID identifier
    pub id: String,
    /// Match confidence (0.0 to 1.0)
    pub score: f64,
    /// Associated recordings (if meta=recordings requested)
    #[serde(default)]
    pub recordings: Vec<Recording>,
}

/// Recording info returned by AcoustID
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Recording {
    /// MusicBrainz recording ID
    pub id: String,
    pub title: Option<String>,
    /// Duration in seconds (API returns float, e.g. 353.0)
    pub duration: Option<f64>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    /// Releases (albums) this recording appears on
    #[serde(default)]
    pub releases: Vec<Release>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Release {
    /// MusicBrainz release ID
    pub id: String,
    pub title: Option<String>,
}
