//! Core data models for the identification pipeline.
//!
//! These types are OUR types - oracle responses are converted into them
//! by the adapter layer in `resolve`, and they are what the scorer,
//! organizer, and track store operate on.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Processing state of a track within a batch.
///
/// State machine:
/// `pending -> fingerprinted -> resolved -> classified ->
/// {applied | queued_for_review | unmatched | failed}`.
///
/// Terminal states are persisted; on restart, tracks in a terminal state
/// for the same batch id are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    Fingerprinted,
    Resolved,
    Classified,
    Applied,
    QueuedForReview,
    Unmatched,
    Failed,
    Skipped,
}

impl ProcessingState {
    /// Terminal states survive restarts and are skipped on resume.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Applied | Self::QueuedForReview | Self::Unmatched | Self::Failed | Self::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fingerprinted => "fingerprinted",
            Self::Resolved => "resolved",
            Self::Classified => "classified",
            Self::Applied => "applied",
            Self::QueuedForReview => "queued_for_review",
            Self::Unmatched => "unmatched",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "fingerprinted" => Self::Fingerprinted,
            "resolved" => Self::Resolved,
            "classified" => Self::Classified,
            "applied" => Self::Applied,
            "queued_for_review" => Self::QueuedForReview,
            "unmatched" => Self::Unmatched,
            "failed" => Self::Failed,
            "skipped" => Self::Skipped,
            _ => return None,
        })
    }
}

/// Embedded tags read from an audio file. All fields optional; the
/// resolver falls back to filename parsing when they are missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub disc_number: Option<u32>,
    pub total_discs: Option<u32>,
    pub genre: Option<String>,
}

impl TrackTags {
    /// At least title and artist are needed for a tag-based search.
    pub fn has_basics(&self) -> bool {
        self.title.is_some() && self.artist.is_some()
    }
}

/// A single audio file moving through the pipeline.
///
/// Unique by absolute source path; owned exclusively by the orchestrator
/// for the duration of a batch.
#[derive(Debug, Clone)]
pub struct Track {
    /// Absolute path the file was scanned at.
    pub source_path: PathBuf,
    /// Byte size at scan time.
    pub size_bytes: u64,
    /// Container format from the extension (mp3, flac, ...).
    pub format: String,
    /// Decoded duration in seconds, from tags or the extractor.
    pub duration_secs: Option<f64>,
    /// Embedded tags as read from the file.
    pub tags: TrackTags,
    /// Acoustic fingerprint plus the duration used for extraction.
    pub fingerprint: Option<Fingerprint>,
    pub state: ProcessingState,
    pub error: Option<String>,
    /// Last candidate set, sorted by descending score.
    pub candidates: Vec<MatchCandidate>,
    /// Index into `candidates` of the chosen match, if any.
    pub chosen: Option<usize>,
    /// Final destination path once moved.
    pub dest_path: Option<PathBuf>,
}

impl Track {
    pub fn new(source_path: PathBuf, size_bytes: u64) -> Self {
        let format = source_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            source_path,
            size_bytes,
            format,
            duration_secs: None,
            tags: TrackTags::default(),
            fingerprint: None,
            state: ProcessingState::Pending,
            error: None,
            candidates: Vec::new(),
            chosen: None,
            dest_path: None,
        }
    }

    /// Human-readable title, falling back to the filename stem.
    pub fn display_title(&self) -> String {
        self.tags.title.clone().unwrap_or_else(|| {
            self.source_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    pub fn chosen_candidate(&self) -> Option<&MatchCandidate> {
        self.chosen.and_then(|i| self.candidates.get(i))
    }
}

/// Acoustic fingerprint paired with the duration used for extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub fingerprint: String,
    pub duration_secs: f64,
}

/// Outcome of fingerprinting one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FingerprintOutcome {
    Ok(Fingerprint),
    /// Too short for a meaningful fingerprint (intros, skits).
    ShortAudio,
    /// The extractor could not decode the file.
    DecodeError,
    /// fpcalc is not installed; degrades the whole stage.
    ToolMissing,
    Cancelled,
}

/// Which oracle produced a candidate. Ordering is the tie-break priority
/// used when aggregate scores are equal (lower = preferred).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Acoustid,
    Musicbrainz,
    Archive,
    ExistingTags,
    Filename,
}

/// Per-factor score breakdown, 0..100 each, filled in by the scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorScores {
    pub fingerprint: f64,
    pub title: f64,
    pub artist: f64,
    pub duration: f64,
    pub album_consistency: f64,
}

/// A proposed identity for a track, with per-factor similarity scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub disc_number: Option<u32>,
    pub total_discs: Option<u32>,
    pub genre: Option<String>,
    /// Candidate duration in seconds, when the oracle reports one.
    pub duration_secs: Option<f64>,
    /// Opaque oracle handle for the release this identity comes from.
    pub release_id: Option<String>,
    /// Recording-level handle, when distinct from the release.
    pub recording_id: Option<String>,
    /// Cover art handle (URL) when the art oracle has one.
    pub cover_art: Option<String>,
    /// Oracle-reported fingerprint similarity, 0..1.
    pub fingerprint_score: f64,
    pub provenance: Option<Provenance>,
    /// Per-factor breakdown, filled in by the scorer.
    #[serde(default)]
    pub factors: FactorScores,
    /// Aggregate confidence 0..100, filled in by the scorer.
    pub confidence: f64,
    /// Marks this identity as a compilation / various-artists release.
    pub is_compilation: bool,
}

impl MatchCandidate {
    pub fn display_label(&self) -> String {
        let mut parts = Vec::new();
        if let Some(artist) = &self.artist {
            parts.push(artist.clone());
        }
        if let Some(title) = &self.title {
            parts.push(format!("\"{}\"", title));
        }
        if let Some(album) = &self.album {
            parts.push(format!("from {}", album));
        }
        if let Some(year) = self.year {
            parts.push(format!("({})", year));
        }
        if parts.is_empty() {
            "(Unknown)".to_string()
        } else {
            parts.join(" - ")
        }
    }
}

/// Classification tier assigned from the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    AutoApply,
    Review,
    Manual,
    Unmatched,
}

/// Scored match results for one track.
///
/// Candidates are sorted stably by aggregate score descending; ties break
/// by provenance priority, then title similarity.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub candidates: Vec<MatchCandidate>,
    pub chosen: Option<usize>,
    pub aggregate_score: f64,
    pub tier: Option<Tier>,
}

impl MatchResult {
    pub fn best(&self) -> Option<&MatchCandidate> {
        match self.chosen {
            Some(i) => self.candidates.get(i),
            None => self.candidates.first(),
        }
    }

    pub fn has_match(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// One planned file operation, reported from dry runs.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedOperation {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub op_kind: String,
}

/// Error category used for the per-kind aggregation in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Resolution,
    FileOperation,
    Fingerprint,
}

/// Summary of a batch run, returned by the orchestrator.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub batch_id: String,
    pub total: usize,
    pub skipped_resume: usize,
    pub fingerprinted: usize,
    pub auto_applied: usize,
    pub queued_for_review: usize,
    pub manual: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub cancelled: bool,
    /// Dry-run plan; empty on real runs.
    pub planned: Vec<PlannedOperation>,
    /// Error counts aggregated by kind.
    pub errors_by_kind: std::collections::HashMap<ErrorKind, usize>,
    /// User-visible notes, e.g. a missing fingerprint tool.
    pub advisories: Vec<String>,
}

impl BatchSummary {
    pub fn record_error(&mut self, kind: ErrorKind) {
        *self.errors_by_kind.entry(kind).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            ProcessingState::Pending,
            ProcessingState::Fingerprinted,
            ProcessingState::Resolved,
            ProcessingState::Classified,
            ProcessingState::Applied,
            ProcessingState::QueuedForReview,
            ProcessingState::Unmatched,
            ProcessingState::Failed,
            ProcessingState::Skipped,
        ] {
            assert_eq!(ProcessingState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ProcessingState::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProcessingState::Applied.is_terminal());
        assert!(ProcessingState::QueuedForReview.is_terminal());
        assert!(ProcessingState::Unmatched.is_terminal());
        assert!(ProcessingState::Failed.is_terminal());
        assert!(!ProcessingState::Pending.is_terminal());
        assert!(!ProcessingState::Resolved.is_terminal());
    }

    #[test]
    fn test_track_display_title_falls_back_to_stem() {
        let track = Track::new(PathBuf::from("/music/05 - Hellraizer.mp3"), 1024);
        assert_eq!(track.display_title(), "05 - Hellraizer");
        assert_eq!(track.format, "mp3");
    }

    #[test]
    fn test_provenance_priority_ordering() {
        assert!(Provenance::Acoustid < Provenance::Musicbrainz);
        assert!(Provenance::Archive < Provenance::ExistingTags);
        assert!(Provenance::ExistingTags < Provenance::Filename);
    }

    #[test]
    fn test_candidate_display_label() {
        let candidate = MatchCandidate {
            artist: Some("The Beatles".to_string()),
            title: Some("Here Comes The Sun".to_string()),
            album: Some("Abbey Road".to_string()),
            year: Some(1969),
            ..Default::default()
        };
        let label = candidate.display_label();
        assert!(label.contains("The Beatles"));
        assert!(label.contains("(1969)"));
    }

    #[test]
    fn test_summary_error_aggregation() {
        let mut summary = BatchSummary::default();
        summary.record_error(ErrorKind::Transient);
        summary.record_error(ErrorKind::Transient);
        summary.record_error(ErrorKind::FileOperation);
        assert_eq!(summary.errors_by_kind[&ErrorKind::Transient], 2);
        assert_eq!(summary.errors_by_kind[&ErrorKind::FileOperation], 1);
    }
}
