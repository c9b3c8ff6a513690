//! Metadata resolution: oracle fan-out, caching, fallback chain.
//!
//! The resolver turns a track (and its fingerprint, when one exists)
//! into a candidate list:
//!
//! 1. Fingerprint oracle lookup, capped at the top five matches, each
//!    enriched from the release oracle and the cover-art oracle.
//! 2. Suspected mix-series tracks consult the archive oracle with a
//!    structured chapter query FIRST; for everything else the archive is
//!    the last-resort fallback.
//! 3. An existing-tags candidate competes against oracle results, so a
//!    well-tagged file is never blindly retagged to a worse identity.
//! 4. When every oracle comes up empty, a single low-score candidate is
//!    synthesized from existing tags plus the fuzzy-normalized filename.
//!
//! Every oracle call routes through the rate limiter and the response
//! cache; negative results (definitive empties, permanent 4xx) are
//! cached with a short TTL.

pub mod acoustid;
pub mod archive;
pub mod coverart;
pub mod filename;
pub mod musicbrainz;
pub mod traits;

pub use acoustid::AcoustIdClient;
pub use archive::ArchiveClient;
pub use coverart::CoverArtClient;
pub use musicbrainz::MusicBrainzClient;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{cache::cache_key, CacheKind, ResponseCache};
use crate::fuzzy;
use crate::model::{FingerprintOutcome, MatchCandidate, Provenance, Track};
use crate::ratelimit::RateLimiter;
use archive::mixtape;
use traits::{
    ArchiveOracle, ArchiveQuery, CoverArtOracle, FingerprintHit, FingerprintOracle, ReleaseInfo,
    ReleaseOracle,
};

/// Timeout applied to every single oracle call.
pub const ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum fingerprint-oracle matches considered per track.
const MAX_FINGERPRINT_MATCHES: usize = 5;

/// Retry attempts for transient failures.
const MAX_RETRIES: u32 = 3;
/// Base delay for the exponential retry backoff.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Fingerprint-score stand-in for an authoritative chapter-catalog match.
const CHAPTER_MATCH_SCORE: f64 = 1.0;
/// Stand-in when only the chapter album (not the track) could be matched.
const CHAPTER_ALBUM_ONLY_SCORE: f64 = 0.8;

/// Errors from external oracle calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited by service")]
    RateLimited,

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("no result")]
    NotFound,

    #[error("cancelled")]
    Cancelled,
}

impl OracleError {
    /// Transient failures are retried with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Map an HTTP status (plus body excerpt) onto an oracle error.
pub(crate) fn http_status_error(status: u16, body: &str) -> OracleError {
    match status {
        404 => OracleError::NotFound,
        429 => OracleError::RateLimited,
        _ => OracleError::Api {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

/// Oracle fan-out with caching, pacing, and retry policy.
pub struct Resolver {
    fingerprint_oracle: Arc<dyn FingerprintOracle>,
    release_oracle: Arc<dyn ReleaseOracle>,
    coverart_oracle: Arc<dyn CoverArtOracle>,
    archive_oracle: Arc<dyn ArchiveOracle>,
    cache: ResponseCache,
    limiter: Arc<RateLimiter>,
}

impl Resolver {
    pub fn new(
        fingerprint_oracle: Arc<dyn FingerprintOracle>,
        release_oracle: Arc<dyn ReleaseOracle>,
        coverart_oracle: Arc<dyn CoverArtOracle>,
        archive_oracle: Arc<dyn ArchiveOracle>,
        cache: ResponseCache,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            fingerprint_oracle,
            release_oracle,
            coverart_oracle,
            archive_oracle,
            cache,
            limiter,
        }
    }

    /// Resolve a track into candidates. `cancelled` is sampled inside
    /// rate-limiter waits and between oracle calls.
    pub async fn resolve(
        &self,
        track: &Track,
        outcome: &FingerprintOutcome,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Vec<MatchCandidate>, OracleError> {
        let mut candidates: Vec<MatchCandidate> = Vec::new();

        // Mix-series tracks have authoritative chapter data in the
        // archive; consult it before anything else.
        let mut archive_tried = false;
        if mixtape::is_series_track(track) {
            archive_tried = true;
            if let Some(candidate) = self.resolve_mix_series(track, cancelled).await? {
                candidates.push(candidate);
            }
        }

        // Standard path: fingerprint lookup enriched per release.
        if candidates.is_empty() {
            if let FingerprintOutcome::Ok(fp) = outcome {
                let hits = self
                    .lookup_fingerprint(&fp.fingerprint, fp.duration_secs, cancelled)
                    .await?;
                for hit in hits.into_iter().take(MAX_FINGERPRINT_MATCHES) {
                    if cancelled() {
                        return Err(OracleError::Cancelled);
                    }
                    candidates.push(self.enrich_hit(track, hit, cancelled).await?);
                }
            }
        }

        // Archive as last-resort fallback.
        if candidates.is_empty() && !archive_tried && track.tags.has_basics() {
            let query = ArchiveQuery::Text {
                title: track.tags.title.clone(),
                artist: track.tags.artist.clone(),
            };
            candidates.extend(self.search_archive(&query, cancelled).await?);
        }

        // Existing tags compete against oracle results.
        if track.tags.has_basics() {
            candidates.push(existing_tags_candidate(track));
        }

        // Last resort: synthesize one low-score candidate from tags plus
        // the fuzzy-normalized filename.
        if candidates.is_empty() {
            if let Some(candidate) = synthesized_candidate(track) {
                candidates.push(candidate);
            }
        }

        Ok(candidates)
    }

    /// Chapter-first resolution for mix-series tracks.
    async fn resolve_mix_series(
        &self,
        track: &Track,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Option<MatchCandidate>, OracleError> {
        let query = match mixtape::extract_chapter(track) {
            Some((number, title)) => ArchiveQuery::Chapter { number, title },
            None => ArchiveQuery::Text {
                title: track.tags.title.clone(),
                artist: track.tags.artist.clone(),
            },
        };

        let chapter_candidates = self.search_archive(&query, cancelled).await?;
        if chapter_candidates.is_empty() {
            return Ok(None);
        }

        if let Some(idx) = mixtape::best_candidate_index(track, &chapter_candidates) {
            let mut candidate = chapter_candidates[idx].clone();
            // A catalog title match within the right chapter stands in
            // for an acoustic match.
            candidate.fingerprint_score = CHAPTER_MATCH_SCORE;
            return Ok(Some(candidate));
        }

        // No track-level match: keep the track's own identity but adopt
        // the chapter's album metadata.
        let album_source = &chapter_candidates[0];
        Ok(Some(MatchCandidate {
            artist: track.tags.artist.clone(),
            title: track.tags.title.clone(),
            album: album_source.album.clone(),
            album_artist: album_source.album_artist.clone(),
            year: album_source.year,
            release_id: album_source.release_id.clone(),
            fingerprint_score: CHAPTER_ALBUM_ONLY_SCORE,
            provenance: Some(Provenance::Archive),
            is_compilation: true,
            ..Default::default()
        }))
    }

    async fn lookup_fingerprint(
        &self,
        fingerprint: &str,
        duration_secs: f64,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Vec<FingerprintHit>, OracleError> {
        let duration_arg = format!("{}", duration_secs.round() as u64);
        let oracle = Arc::clone(&self.fingerprint_oracle);
        let fp = fingerprint.to_string();
        let hits: Option<Vec<FingerprintHit>> = self
            .call_oracle(
                "acoustid",
                "lookup",
                &[fingerprint, &duration_arg],
                cancelled,
                |hits: &Vec<FingerprintHit>| hits.is_empty(),
                move || {
                    let oracle = Arc::clone(&oracle);
                    let fp = fp.clone();
                    async move { oracle.lookup(&fp, duration_secs).await }
                },
            )
            .await?;
        Ok(hits.unwrap_or_default())
    }

    /// Build a candidate from a fingerprint hit, enriched with release
    /// metadata and cover art.
    async fn enrich_hit(
        &self,
        track: &Track,
        hit: FingerprintHit,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<MatchCandidate, OracleError> {
        let mut candidate = MatchCandidate {
            artist: hit.artist.clone(),
            title: hit.title.clone(),
            duration_secs: hit.duration_secs,
            recording_id: Some(hit.recording_id.clone()),
            fingerprint_score: hit.score,
            provenance: Some(Provenance::Acoustid),
            ..Default::default()
        };

        let Some(release_id) = hit.release_ids.first() else {
            return Ok(candidate);
        };

        if let Some(release) = self.fetch_release(release_id, cancelled).await? {
            candidate.album = release.album.clone();
            candidate.year = release.year;
            candidate.total_tracks = release.total_tracks;
            candidate.total_discs = release.total_discs;
            candidate.release_id = Some(release.release_id.clone());
            if candidate.artist.is_none() {
                candidate.artist = release.artist.clone();
            }

            // Pin down the track position by title within the release
            let wanted = hit.title.clone().unwrap_or_else(|| track.display_title());
            if let Some(entry) = release
                .tracks
                .iter()
                .filter(|t| fuzzy::is_match(Some(&wanted), Some(&t.title)))
                .max_by(|a, b| {
                    let sa = fuzzy::similarity(Some(&wanted), Some(&a.title));
                    let sb = fuzzy::similarity(Some(&wanted), Some(&b.title));
                    sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
                })
            {
                candidate.track_number = Some(entry.position);
                candidate.disc_number = Some(entry.disc);
                if candidate.duration_secs.is_none() {
                    candidate.duration_secs = entry.duration_secs;
                }
                if candidate.title.is_none() {
                    candidate.title = Some(entry.title.clone());
                }
            }

            candidate.cover_art = self.fetch_cover_art(release_id, cancelled).await?;
        }

        Ok(candidate)
    }

    async fn fetch_release(
        &self,
        release_id: &str,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Option<ReleaseInfo>, OracleError> {
        let oracle = Arc::clone(&self.release_oracle);
        let handle = release_id.to_string();
        self.call_oracle(
            "musicbrainz",
            "release",
            &[release_id],
            cancelled,
            |_: &ReleaseInfo| false,
            move || {
                let oracle = Arc::clone(&oracle);
                let handle = handle.clone();
                async move { oracle.release(&handle).await }
            },
        )
        .await
    }

    async fn fetch_cover_art(
        &self,
        release_id: &str,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Option<String>, OracleError> {
        let oracle = Arc::clone(&self.coverart_oracle);
        let handle = release_id.to_string();
        let art: Option<Option<String>> = self
            .call_oracle(
                "coverart",
                "art",
                &[release_id],
                cancelled,
                |art: &Option<String>| art.is_none(),
                move || {
                    let oracle = Arc::clone(&oracle);
                    let handle = handle.clone();
                    async move { oracle.art(&handle).await }
                },
            )
            .await?;
        Ok(art.flatten())
    }

    async fn search_archive(
        &self,
        query: &ArchiveQuery,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Vec<MatchCandidate>, OracleError> {
        let args: Vec<String> = match query {
            ArchiveQuery::Chapter { number, title } => vec![
                "chapter".to_string(),
                number.to_string(),
                title.clone().unwrap_or_default(),
            ],
            ArchiveQuery::Text { title, artist } => vec![
                "text".to_string(),
                title.clone().unwrap_or_default(),
                artist.clone().unwrap_or_default(),
            ],
        };
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let oracle = Arc::clone(&self.archive_oracle);
        let query = query.clone();
        let found: Option<Vec<MatchCandidate>> = self
            .call_oracle(
                "archive",
                "search",
                &arg_refs,
                cancelled,
                |c: &Vec<MatchCandidate>| c.is_empty(),
                move || {
                    let oracle = Arc::clone(&oracle);
                    let query = query.clone();
                    async move { oracle.search(&query).await }
                },
            )
            .await?;
        Ok(found.unwrap_or_default())
    }

    /// Shared oracle-call policy: cache lookup, pacing, timeout, retry
    /// with backoff, negative caching.
    ///
    /// Returns `Ok(None)` for definitive empties (NotFound, permanent
    /// 4xx, parse failures) - those are cached as negatives. Transient
    /// failures surface as `Err` once retries are exhausted.
    async fn call_oracle<T, F, Fut>(
        &self,
        service: &str,
        method: &str,
        args: &[&str],
        cancelled: &(dyn Fn() -> bool + Sync),
        is_empty: impl Fn(&T) -> bool,
        fetch: F,
    ) -> Result<Option<T>, OracleError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, OracleError>>,
    {
        let key = cache_key(service, method, args);

        // Cache precedes network
        if let Ok(Some(entry)) = self.cache.get(&key).await {
            if let Ok(value) = serde_json::from_str::<Option<T>>(&entry.value) {
                tracing::debug!(key = %key, "cache hit");
                return Ok(value);
            }
        }

        let mut rate_limited_retry_done = false;
        let mut attempt: u32 = 1;
        loop {
            if !self.limiter.acquire(service, || cancelled()).await {
                return Err(OracleError::Cancelled);
            }

            let result = match tokio::time::timeout(ORACLE_TIMEOUT, fetch()).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout),
            };

            match result {
                Ok(value) => {
                    let kind = if is_empty(&value) {
                        CacheKind::Negative
                    } else {
                        CacheKind::Positive
                    };
                    if let Ok(json) = serde_json::to_string(&Some(&value)) {
                        // Cache write failure is non-fatal
                        let _ = self.cache.put(&key, &json, kind).await;
                    }
                    return Ok(Some(value));
                }
                Err(OracleError::NotFound) => {
                    let _ = self.cache.put(&key, "null", CacheKind::Negative).await;
                    return Ok(None);
                }
                Err(OracleError::RateLimited) if !rate_limited_retry_done => {
                    rate_limited_retry_done = true;
                    self.limiter.force_backoff(service).await;
                }
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    let wait = RETRY_BACKOFF * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        service,
                        attempt,
                        "transient oracle failure: {} - retrying in {:?}",
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() || matches!(e, OracleError::RateLimited) => {
                    tracing::error!(service, "oracle failed after {} attempts: {}", attempt, e);
                    return Err(e);
                }
                Err(OracleError::Cancelled) => return Err(OracleError::Cancelled),
                Err(e) => {
                    // Permanent failure: cache as negative, resolve empty
                    tracing::warn!(service, "permanent oracle failure: {}", e);
                    let _ = self.cache.put(&key, "null", CacheKind::Negative).await;
                    return Ok(None);
                }
            }
        }
    }
}

/// Candidate built from the track's own embedded tags.
///
/// Lets the scorer weigh API results against what the file already
/// claims; for well-tagged compilations the existing tags often beat
/// anything the oracles suggest.
fn existing_tags_candidate(track: &Track) -> MatchCandidate {
    MatchCandidate {
        artist: track.tags.artist.clone(),
        title: track.tags.title.clone(),
        album: track.tags.album.clone(),
        album_artist: track.tags.album_artist.clone(),
        year: track.tags.year,
        track_number: track.tags.track_number,
        total_tracks: track.tags.total_tracks,
        disc_number: track.tags.disc_number,
        total_discs: track.tags.total_discs,
        genre: track.tags.genre.clone(),
        duration_secs: track.duration_secs,
        provenance: Some(Provenance::ExistingTags),
        ..Default::default()
    }
}

/// Single low-score candidate from tags plus the parsed filename.
fn synthesized_candidate(track: &Track) -> Option<MatchCandidate> {
    let guessed = filename::guess_from_filename(&track.source_path);
    let title = track.tags.title.clone().or(guessed.title);
    let artist = track.tags.artist.clone().or(guessed.artist);
    if title.is_none() && artist.is_none() {
        return None;
    }
    Some(MatchCandidate {
        title,
        artist,
        album: track.tags.album.clone(),
        track_number: track.tags.track_number.or(guessed.track_number),
        disc_number: track.tags.disc_number.or(guessed.disc_number),
        duration_secs: track.duration_secs,
        provenance: Some(Provenance::Filename),
        ..Default::default()
    })
}
