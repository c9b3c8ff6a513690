//! Confidence scoring for match quality assessment.
//!
//! Scoring is based on multiple weighted factors:
//! - Fingerprint match score (40%)
//! - Title similarity (20%)
//! - Artist similarity (20%)
//! - Duration match (10%)
//! - Album consistency (10%)
//!
//! Thresholds (defaults): above 90 auto-apply, above 70 review, anything
//! scored but below that is manual. A score exactly at a threshold
//! classifies into the lower tier.

use crate::fuzzy;
use crate::model::{FactorScores, MatchCandidate, MatchResult, Tier, Track};

const WEIGHT_FINGERPRINT: f64 = 0.40;
const WEIGHT_TITLE: f64 = 0.20;
const WEIGHT_ARTIST: f64 = 0.20;
const WEIGHT_DURATION: f64 = 0.10;
const WEIGHT_ALBUM_CONSISTENCY: f64 = 0.10;

/// Batch fraction at or above which album consistency earns full credit.
const ALBUM_CONSENSUS_FRACTION: f64 = 0.80;

/// Album names of the other tracks in the batch, used for the album
/// consistency factor.
#[derive(Debug, Clone, Default)]
pub struct BatchContext {
    pub other_albums: Vec<String>,
}

impl BatchContext {
    /// Context for `track` built from the rest of the batch: every other
    /// track's album tag, when it has one.
    pub fn for_track(track: &Track, batch: &[Track]) -> Self {
        let other_albums = batch
            .iter()
            .filter(|other| other.source_path != track.source_path)
            .filter_map(|other| other.tags.album.clone())
            .collect();
        Self { other_albums }
    }
}

/// Calculates confidence scores and classifies them into action tiers.
pub struct ConfidenceScorer {
    auto_threshold: f64,
    review_threshold: f64,
}

impl ConfidenceScorer {
    pub fn new(auto_threshold: f64, review_threshold: f64) -> Self {
        Self {
            auto_threshold,
            review_threshold,
        }
    }

    /// Overall confidence for a single candidate, 0.0 - 100.0.
    pub fn score(&self, track: &Track, candidate: &MatchCandidate, ctx: &BatchContext) -> f64 {
        weighted_total(self.factor_scores(track, candidate, ctx))
    }

    /// The per-factor breakdown for a candidate.
    pub fn factor_scores(
        &self,
        track: &Track,
        candidate: &MatchCandidate,
        ctx: &BatchContext,
    ) -> FactorScores {
        let factors = FactorScores {
            fingerprint: candidate.fingerprint_score.clamp(0.0, 1.0) * 100.0,
            title: self.title_similarity(track, candidate),
            artist: fuzzy::similarity(track.tags.artist.as_deref(), candidate.artist.as_deref()),
            duration: fuzzy::duration_score(track.duration_secs, candidate.duration_secs),
            album_consistency: album_consistency(candidate, ctx),
        };

        tracing::debug!(
            track = %track.display_title(),
            candidate = %candidate.display_label(),
            fp = factors.fingerprint,
            title = factors.title,
            artist = factors.artist,
            duration = factors.duration,
            album = factors.album_consistency,
            "scored candidate"
        );

        factors
    }

    /// Score all candidates, sort them, and pick the best.
    ///
    /// The sort is stable on aggregate score descending; ties break by
    /// provenance priority, then by title similarity.
    pub fn score_result(
        &self,
        track: &Track,
        mut candidates: Vec<MatchCandidate>,
        ctx: &BatchContext,
    ) -> MatchResult {
        for candidate in &mut candidates {
            candidate.factors = self.factor_scores(track, candidate, ctx);
            candidate.confidence = weighted_total(candidate.factors);
        }

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.provenance.cmp(&b.provenance))
                .then_with(|| {
                    b.factors
                        .title
                        .partial_cmp(&a.factors.title)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        let aggregate_score = candidates.first().map(|c| c.confidence).unwrap_or(0.0);
        let tier = Some(self.classify(aggregate_score));
        let chosen = if candidates.is_empty() { None } else { Some(0) };

        MatchResult {
            candidates,
            chosen,
            aggregate_score,
            tier,
        }
    }

    /// Classify a score into an action tier.
    ///
    /// A score exactly at a threshold resolves to the lower tier.
    pub fn classify(&self, score: f64) -> Tier {
        if score > self.auto_threshold {
            Tier::AutoApply
        } else if score > self.review_threshold {
            Tier::Review
        } else if score > 0.0 {
            Tier::Manual
        } else {
            Tier::Unmatched
        }
    }

    fn title_similarity(&self, track: &Track, candidate: &MatchCandidate) -> f64 {
        let track_title = track.display_title();
        fuzzy::similarity(Some(track_title.as_str()), candidate.title.as_deref())
    }
}

/// Weighted sum of the factor breakdown, clamped to 0..100.
fn weighted_total(factors: FactorScores) -> f64 {
    let overall = factors.fingerprint * WEIGHT_FINGERPRINT
        + factors.title * WEIGHT_TITLE
        + factors.artist * WEIGHT_ARTIST
        + factors.duration * WEIGHT_DURATION
        + factors.album_consistency * WEIGHT_ALBUM_CONSISTENCY;
    overall.clamp(0.0, 100.0)
}

/// Album consistency factor, 0.0 - 100.0.
///
/// Fraction of other tracks in the batch whose album fuzzy-matches this
/// candidate's album; reaching the consensus fraction earns full credit.
/// A batch with no other album-bearing tracks scores full credit.
fn album_consistency(candidate: &MatchCandidate, ctx: &BatchContext) -> f64 {
    let Some(album) = candidate.album.as_deref() else {
        return 50.0;
    };
    if ctx.other_albums.is_empty() {
        return 100.0;
    }

    let matches = ctx
        .other_albums
        .iter()
        .filter(|other| fuzzy::is_match(Some(album), Some(other.as_str())))
        .count();
    let fraction = matches as f64 / ctx.other_albums.len() as f64;
    if fraction >= ALBUM_CONSENSUS_FRACTION {
        100.0
    } else {
        fraction * 100.0
    }
}
