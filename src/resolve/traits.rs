//! Oracle capability traits.
//!
//! The resolver depends on these, not on the concrete HTTP clients, so
//! tests can substitute scripted implementations and the pipeline can be
//! exercised without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::OracleError;
use crate::model::MatchCandidate;

/// One fingerprint-oracle hit: a recording plus the releases it appears on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintHit {
    /// Oracle-reported similarity, 0..1.
    pub score: f64,
    pub recording_id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub duration_secs: Option<f64>,
    pub release_ids: Vec<String>,
}

/// A track position within a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseTrack {
    pub position: u32,
    pub disc: u32,
    pub title: String,
    pub duration_secs: Option<f64>,
}

/// Full release metadata from the metadata oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub release_id: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub total_tracks: Option<u32>,
    pub total_discs: Option<u32>,
    pub tracks: Vec<ReleaseTrack>,
}

/// Structured query for the archive oracle.
#[derive(Debug, Clone)]
pub enum ArchiveQuery {
    /// A known mix-series chapter.
    Chapter { number: u32, title: Option<String> },
    /// Free-text search by title/artist.
    Text {
        title: Option<String>,
        artist: Option<String>,
    },
}

/// Fingerprint lookup service (AcoustID-shaped).
#[async_trait]
pub trait FingerprintOracle: Send + Sync {
    /// Look up a fingerprint; hits come back best-first.
    async fn lookup(
        &self,
        fingerprint: &str,
        duration_secs: f64,
    ) -> Result<Vec<FingerprintHit>, OracleError>;
}

/// Release metadata service (MusicBrainz-shaped).
#[async_trait]
pub trait ReleaseOracle: Send + Sync {
    async fn release(&self, handle: &str) -> Result<ReleaseInfo, OracleError>;
}

/// Cover art service. Returns an image handle, or None when the release
/// has no front cover.
#[async_trait]
pub trait CoverArtOracle: Send + Sync {
    async fn art(&self, release_handle: &str) -> Result<Option<String>, OracleError>;
}

/// Archive service used for mix-series chapters and last-resort search.
#[async_trait]
pub trait ArchiveOracle: Send + Sync {
    async fn search(&self, query: &ArchiveQuery) -> Result<Vec<MatchCandidate>, OracleError>;
}

/// Scripted oracle implementations for tests.
#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fingerprint oracle returning fixed hits and counting calls.
    pub struct MockFingerprintOracle {
        pub hits: Vec<FingerprintHit>,
        pub error: Option<OracleError>,
        pub calls: AtomicUsize,
    }

    impl MockFingerprintOracle {
        pub fn with_hits(hits: Vec<FingerprintHit>) -> Self {
            Self {
                hits,
                error: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn no_matches() -> Self {
            Self::with_hits(vec![])
        }

        pub fn single(score: f64, recording: &str, release: &str) -> Self {
            Self::with_hits(vec![FingerprintHit {
                score,
                recording_id: recording.to_string(),
                title: None,
                artist: None,
                duration_secs: None,
                release_ids: vec![release.to_string()],
            }])
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FingerprintOracle for MockFingerprintOracle {
        async fn lookup(
            &self,
            _fingerprint: &str,
            _duration_secs: f64,
        ) -> Result<Vec<FingerprintHit>, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.error {
                return Err(err.clone());
            }
            Ok(self.hits.clone())
        }
    }

    /// Release oracle serving a fixed map of handle -> info.
    pub struct MockReleaseOracle {
        pub releases: std::collections::HashMap<String, ReleaseInfo>,
        pub calls: AtomicUsize,
    }

    impl MockReleaseOracle {
        pub fn with_release(info: ReleaseInfo) -> Self {
            let mut releases = std::collections::HashMap::new();
            releases.insert(info.release_id.clone(), info);
            Self {
                releases,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn empty() -> Self {
            Self {
                releases: std::collections::HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReleaseOracle for MockReleaseOracle {
        async fn release(&self, handle: &str) -> Result<ReleaseInfo, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.releases
                .get(handle)
                .cloned()
                .ok_or(OracleError::NotFound)
        }
    }

    /// Cover art oracle returning a fixed handle.
    pub struct MockCoverArtOracle {
        pub handle: Option<String>,
    }

    #[async_trait]
    impl CoverArtOracle for MockCoverArtOracle {
        async fn art(&self, _release_handle: &str) -> Result<Option<String>, OracleError> {
            Ok(self.handle.clone())
        }
    }

    /// Archive oracle returning fixed candidates.
    pub struct MockArchiveOracle {
        pub candidates: Vec<MatchCandidate>,
        pub calls: AtomicUsize,
    }

    impl MockArchiveOracle {
        pub fn with_candidates(candidates: Vec<MatchCandidate>) -> Self {
            Self {
                candidates,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn empty() -> Self {
            Self::with_candidates(vec![])
        }
    }

    #[async_trait]
    impl ArchiveOracle for MockArchiveOracle {
        async fn search(&self, _query: &ArchiveQuery) -> Result<Vec<MatchCandidate>, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.candidates.clone())
        }
    }
}
