//! Internet Archive HTTP client.
//!
//! Two endpoints: advanced search for item discovery, item metadata for
//! per-file details. No API key or authentication is required. The
//! primary use is the DJ Screw chapter series, with free-text search as
//! the last-resort fallback for anything else.

use async_trait::async_trait;

use super::{dto, mixtape};
use crate::fuzzy;
use crate::model::{MatchCandidate, Provenance};
use crate::resolve::traits::{ArchiveOracle, ArchiveQuery};
use crate::resolve::{http_status_error, OracleError, ORACLE_TIMEOUT};

/// Collection holding the chapter series.
const SERIES_COLLECTION: &str = "dj-screw-discography";

/// File formats that are the original uploaded audio (not derivatives).
const AUDIO_FORMATS: &[&str] = &[
    "VBR MP3",
    "128Kbps MP3",
    "64Kbps MP3",
    "256Kbps MP3",
    "320Kbps MP3",
    "Flac",
    "Ogg Vorbis",
    "24bit Flac",
];

/// Internet Archive client
pub struct ArchiveClient {
    http_client: reqwest::Client,
    search_url: String,
    metadata_url: String,
}

impl ArchiveClient {
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(ORACLE_TIMEOUT)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            search_url: "https://archive.org/advancedsearch.php".to_string(),
            metadata_url: "https://archive.org/metadata".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_urls(search_url: impl Into<String>, metadata_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            search_url: search_url.into(),
            metadata_url: metadata_url.into(),
        }
    }

    async fn search_docs(&self, query: &str) -> Result<Vec<dto::SearchDoc>, OracleError> {
        let url = format!(
            "{}?q={}&fl[]=identifier&fl[]=title&fl[]=creator&fl[]=year&rows=10&output=json",
            self.search_url,
            urlencoding::encode(query)
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(OracleError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(status.as_u16(), ""));
        }

        let parsed = response
            .json::<dto::SearchResponse>()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;
        Ok(parsed.response.docs)
    }

    async fn item_metadata(&self, identifier: &str) -> Result<dto::MetadataResponse, OracleError> {
        let url = format!("{}/{}", self.metadata_url, identifier);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(OracleError::from_reqwest)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(OracleError::NotFound);
        }
        if !status.is_success() {
            return Err(http_status_error(status.as_u16(), ""));
        }

        response
            .json::<dto::MetadataResponse>()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))
    }

    /// Per-track candidates for one chapter of the series.
    async fn chapter_candidates(
        &self,
        number: u32,
        title: Option<&str>,
    ) -> Result<Vec<MatchCandidate>, OracleError> {
        let query = format!(
            "collection:{} AND title:\"Chapter {:03}\"",
            SERIES_COLLECTION, number
        );
        let docs = self.search_docs(&query).await?;
        let Some(doc) = docs.first() else {
            return Ok(vec![]);
        };

        let album = mixtape::chapter_album_name(number, title);
        let year = doc.year.as_ref().and_then(dto::Year::as_i32);
        let meta = self.item_metadata(&doc.identifier).await?;

        Ok(item_to_candidates(&meta, &album, year, &doc.identifier))
    }

    /// Free-text fallback search.
    async fn text_candidates(
        &self,
        title: Option<&str>,
        artist: Option<&str>,
    ) -> Result<Vec<MatchCandidate>, OracleError> {
        let mut terms = vec!["mediatype:audio".to_string()];
        if let Some(title) = title {
            terms.push(format!("title:\"{}\"", title));
        }
        if let Some(artist) = artist {
            terms.push(format!("creator:\"{}\"", artist));
        }
        if terms.len() == 1 {
            return Ok(vec![]);
        }

        let docs = self.search_docs(&terms.join(" AND ")).await?;
        Ok(docs
            .into_iter()
            .map(|doc| MatchCandidate {
                title: title.map(String::from),
                artist: doc
                    .creator
                    .as_ref()
                    .and_then(|c| c.first())
                    .map(String::from),
                album: doc.title.clone(),
                year: doc.year.as_ref().and_then(dto::Year::as_i32),
                release_id: Some(doc.identifier),
                provenance: Some(Provenance::Archive),
                ..Default::default()
            })
            .collect())
    }
}

/// Expand an item's audio files into per-track candidates.
fn item_to_candidates(
    meta: &dto::MetadataResponse,
    album: &str,
    year: Option<i32>,
    identifier: &str,
) -> Vec<MatchCandidate> {
    let audio_files: Vec<&dto::FileEntry> = meta
        .files
        .iter()
        .filter(|f| {
            f.format
                .as_deref()
                .map(|fmt| AUDIO_FORMATS.contains(&fmt))
                .unwrap_or(false)
        })
        .collect();
    let total = audio_files.len() as u32;

    audio_files
        .into_iter()
        .enumerate()
        .map(|(i, file)| {
            let (artist, title) = file_identity(file);
            MatchCandidate {
                artist,
                title,
                album: Some(album.to_string()),
                album_artist: Some(mixtape::SERIES_ALBUM_ARTIST.to_string()),
                year,
                track_number: file
                    .track
                    .as_deref()
                    .and_then(|t| t.parse().ok())
                    .or(Some(i as u32 + 1)),
                total_tracks: Some(total),
                duration_secs: file.duration_secs(),
                release_id: Some(identifier.to_string()),
                provenance: Some(Provenance::Archive),
                is_compilation: true,
                ..Default::default()
            }
        })
        .collect()
}

/// Artist and title for one file, from its metadata or its name.
fn file_identity(file: &dto::FileEntry) -> (Option<String>, Option<String>) {
    let artist = file
        .artist
        .as_deref()
        .or(file.creator.as_deref())
        .and_then(fuzzy::clean_tag);

    if let Some(title) = file.title.as_deref().and_then(fuzzy::clean_tag) {
        return (artist, Some(title));
    }

    // Fall back to "NN Artist - Title.mp3" style file names
    let stem = std::path::Path::new(&file.name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.split_once(" - ") {
        Some((left, right)) => {
            let left = left.trim_start_matches(|c: char| c.is_ascii_digit()).trim();
            let parsed_artist = fuzzy::clean_tag(left);
            (
                artist.or(parsed_artist),
                fuzzy::clean_tag(right),
            )
        }
        None => (artist, fuzzy::clean_tag(&stem)),
    }
}

impl Default for ArchiveClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArchiveOracle for ArchiveClient {
    async fn search(&self, query: &ArchiveQuery) -> Result<Vec<MatchCandidate>, OracleError> {
        match query {
            ArchiveQuery::Chapter { number, title } => {
                self.chapter_candidates(*number, title.as_deref()).await
            }
            ArchiveQuery::Text { title, artist } => {
                self.text_candidates(title.as_deref(), artist.as_deref())
                    .await
            }
        }
    }
}
