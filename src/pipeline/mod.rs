//! Batch pipeline orchestrator.
//!
//! Phases per batch:
//! 1. **Scan & resume filter** - enumerate audio files under the roots,
//!    drop paths already in a terminal state for this batch id.
//! 2. **Parallel fingerprint** - bounded worker pool, responsive
//!    cancellation (see [`crate::fingerprint`]).
//! 3. **Per-track resolution** - sequential (to respect oracle pacing):
//!    resolve, score, classify, then apply / queue for review / mark
//!    unmatched.
//!
//! Control flow is orthogonal to data flow: the pause/cancel latch is
//! sampled at every suspension point, and progress events are throttled
//! to one per 1% or per 250 ms. A paused pipeline holds between tracks,
//! never mid-mutation; a cancelled one finishes any in-progress apply
//! (mutations are atomic with rollback-on-error) and stops. Mutations
//! that already completed are never rolled back on cancel - the ledger
//! lets the user undo explicitly.

pub mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::BatchOptions;
use crate::db::TrackStore;
use crate::error::Result;
use crate::fingerprint::{FingerprintExtractor, FingerprintStage};
use crate::metadata;
use crate::model::{
    BatchSummary, ErrorKind, FingerprintOutcome, ProcessingState, Tier, Track,
};
use crate::organizer::{ApplyOutcome, SafeOrganizer};
use crate::resolve::{filename, OracleError, Resolver};
use crate::scanner;
use crate::scorer::{BatchContext, ConfidenceScorer};
use progress::{ControlLatch, Phase, ProgressEvent, ProgressThrottle};

/// The pipeline orchestrator. Owns the tracks of a batch for its whole
/// duration; everything else is injected.
pub struct Pipeline<E: FingerprintExtractor> {
    store: TrackStore,
    resolver: Resolver,
    organizer: SafeOrganizer,
    stage: FingerprintStage<E>,
    scorer: ConfidenceScorer,
    options: BatchOptions,
    latch: Arc<ControlLatch>,
    sinks: std::sync::Mutex<Vec<mpsc::UnboundedSender<ProgressEvent>>>,
}

impl<E: FingerprintExtractor> Pipeline<E> {
    pub fn new(
        store: TrackStore,
        resolver: Resolver,
        organizer: SafeOrganizer,
        stage: FingerprintStage<E>,
        options: BatchOptions,
    ) -> Self {
        let scorer = ConfidenceScorer::new(options.auto_apply_threshold, options.review_threshold);
        Self {
            store,
            resolver,
            organizer,
            stage,
            scorer,
            options,
            latch: ControlLatch::new(),
            sinks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Hold Phase 3 between tracks; Phase 1 stops spawning subprocesses.
    pub fn pause(&self) {
        self.latch.pause();
    }

    pub fn resume(&self) {
        self.latch.resume();
    }

    /// Tear down Phase 1 without joining; Phase 3 stops after any
    /// in-progress apply completes.
    pub fn cancel(&self) {
        self.latch.cancel();
    }

    /// Subscribe to throttled progress events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sinks.lock().expect("sinks lock").push(tx);
        rx
    }

    fn emit(&self, event: ProgressEvent) {
        let mut sinks = self.sinks.lock().expect("sinks lock");
        sinks.retain(|sink| sink.send(event.clone()).is_ok());
    }

    /// Run a full batch. Cancellation is not an error: the summary comes
    /// back with `cancelled = true` and partial counts.
    pub async fn run_batch(&self, batch_id: &str, roots: &[PathBuf]) -> Result<BatchSummary> {
        // Invalid configuration fails here, before any mutation
        let mut options = self.options.clone();
        options.validate()?;

        let mut summary = BatchSummary {
            batch_id: batch_id.to_string(),
            ..Default::default()
        };

        // --- Phase 1: scan & resume filter ---
        let scan_roots: Vec<PathBuf> = roots.to_vec();
        let scanned =
            tokio::task::spawn_blocking(move || scanner::scan_roots(&scan_roots))
                .await
                .unwrap_or_default();
        summary.total = scanned.len();

        let done = self.store.terminal_paths(batch_id).await?;
        let mut remaining: Vec<Track> = Vec::with_capacity(scanned.len());
        for track in scanned {
            if done.contains(track.source_path.to_string_lossy().as_ref()) {
                summary.skipped_resume += 1;
            } else {
                remaining.push(track);
            }
        }
        // Read embedded tags up front so Phase 3's album-consistency
        // factor sees the whole batch, not just already-processed tracks
        let mut tracks = tokio::task::spawn_blocking(move || {
            for track in &mut remaining {
                read_tags(track);
            }
            remaining
        })
        .await
        .unwrap_or_default();
        if summary.skipped_resume > 0 {
            tracing::info!(
                "resuming batch {}: skipping {} already-processed tracks ({} remaining)",
                batch_id,
                summary.skipped_resume,
                tracks.len()
            );
        }
        self.emit(ProgressEvent {
            phase: Phase::Scan,
            completed: summary.total,
            total: summary.total,
            eta_hint: None,
            current_path: None,
            last_outcome: None,
        });

        if tracks.is_empty() {
            return Ok(summary);
        }
        if !self.latch.wait_if_paused().await {
            summary.cancelled = true;
            return Ok(summary);
        }

        // --- Phase 2: parallel fingerprint ---
        let outcomes = self.fingerprint_phase(&mut tracks, &mut summary).await;
        if self.latch.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }

        // --- Phase 3: per-track resolution (sequential) ---
        let total = tracks.len();
        let mut throttle = ProgressThrottle::new(total);
        for idx in 0..total {
            if !self.latch.wait_if_paused().await {
                summary.cancelled = true;
                break;
            }

            let outcome = outcomes.get(idx).cloned().unwrap_or(FingerprintOutcome::Cancelled);
            let last_outcome = self
                .process_track(batch_id, idx, &mut tracks, outcome, &mut summary)
                .await;

            if summary.cancelled {
                break;
            }

            let completed = idx + 1;
            if throttle.should_emit(completed) {
                self.emit(ProgressEvent {
                    phase: Phase::Resolve,
                    completed,
                    total,
                    eta_hint: throttle.eta_hint(completed),
                    current_path: Some(tracks[idx].source_path.clone()),
                    last_outcome: Some(last_outcome),
                });
            }
        }

        tracing::info!(
            "batch {} complete: {} total, {} auto-applied, {} review, {} manual, {} unmatched, {} failed",
            batch_id,
            summary.total,
            summary.auto_applied,
            summary.queued_for_review,
            summary.manual,
            summary.unmatched,
            summary.failed
        );
        Ok(summary)
    }

    /// Phase 2: fingerprint all tracks in parallel, recording outcomes.
    async fn fingerprint_phase(
        &self,
        tracks: &mut [Track],
        summary: &mut BatchSummary,
    ) -> Vec<FingerprintOutcome> {
        let paths: Vec<PathBuf> = tracks.iter().map(|t| t.source_path.clone()).collect();
        let total = paths.len();
        let mut throttle = ProgressThrottle::new(total);

        let outcomes = self
            .stage
            .fingerprint_batch(&paths, self.options.worker_count, self.latch.clone(), {
                let pipeline = &*self;
                move |completed, path, outcome| {
                    if throttle.should_emit(completed) {
                        pipeline.emit(ProgressEvent {
                            phase: Phase::Fingerprint,
                            completed,
                            total,
                            eta_hint: throttle.eta_hint(completed),
                            current_path: Some(path.to_path_buf()),
                            last_outcome: Some(format!("{:?}", outcome)),
                        });
                    }
                }
            })
            .await;

        let mut tool_missing = false;
        for (track, outcome) in tracks.iter_mut().zip(&outcomes) {
            match outcome {
                FingerprintOutcome::Ok(fp) => {
                    // Tag-derived duration wins when present
                    if track.duration_secs.is_none() {
                        track.duration_secs = Some(fp.duration_secs);
                    }
                    track.fingerprint = Some(fp.clone());
                    track.state = ProcessingState::Fingerprinted;
                    summary.fingerprinted += 1;
                }
                FingerprintOutcome::ToolMissing => tool_missing = true,
                FingerprintOutcome::DecodeError => {
                    summary.record_error(ErrorKind::Fingerprint);
                }
                _ => {}
            }
        }
        if tool_missing {
            summary
                .advisories
                .push("fingerprint tool (fpcalc) not found; identification is tag-based only".to_string());
        }
        tracing::info!(
            "fingerprint phase complete: {}/{} fingerprinted",
            summary.fingerprinted,
            total
        );
        outcomes
    }

    /// Phase 3 body for one track: read tags, resolve, score, classify,
    /// act. Returns a short outcome label for the progress stream.
    async fn process_track(
        &self,
        batch_id: &str,
        idx: usize,
        tracks: &mut [Track],
        outcome: FingerprintOutcome,
        summary: &mut BatchSummary,
    ) -> String {
        // Candidate context from the rest of the batch
        let ctx = BatchContext::for_track(&tracks[idx], &*tracks);

        let candidates = match self
            .resolver
            .resolve(&tracks[idx], &outcome, &|| self.latch.is_cancelled())
            .await
        {
            Ok(candidates) => candidates,
            Err(OracleError::Cancelled) => {
                summary.cancelled = true;
                return "cancelled".to_string();
            }
            Err(e) => {
                tracks[idx].state = ProcessingState::Failed;
                tracks[idx].error = Some(e.to_string());
                summary.failed += 1;
                summary.record_error(if e.is_transient() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Resolution
                });
                self.save_track(batch_id, &tracks[idx]).await;
                return format!("failed: {}", e);
            }
        };
        tracks[idx].state = ProcessingState::Resolved;

        let result = self.scorer.score_result(&tracks[idx], candidates, &ctx);
        tracks[idx].candidates = result.candidates.clone();
        tracks[idx].chosen = result.chosen;
        tracks[idx].state = ProcessingState::Classified;

        let label = match result.tier {
            Some(Tier::AutoApply) => {
                let chosen = result.best().cloned();
                match chosen {
                    Some(candidate) => {
                        self.apply_candidate(batch_id, idx, tracks, &candidate, summary)
                            .await
                    }
                    None => {
                        tracks[idx].state = ProcessingState::Unmatched;
                        summary.unmatched += 1;
                        "unmatched".to_string()
                    }
                }
            }
            Some(Tier::Review) => {
                tracks[idx].state = ProcessingState::QueuedForReview;
                summary.queued_for_review += 1;
                format!("review ({:.0}%)", result.aggregate_score)
            }
            Some(Tier::Manual) => {
                tracks[idx].state = ProcessingState::QueuedForReview;
                summary.manual += 1;
                format!("manual ({:.0}%)", result.aggregate_score)
            }
            Some(Tier::Unmatched) | None => {
                tracks[idx].state = ProcessingState::Unmatched;
                summary.unmatched += 1;
                "unmatched".to_string()
            }
        };

        self.save_track(batch_id, &tracks[idx]).await;
        label
    }

    /// Apply an auto-accepted candidate through the safe organizer.
    async fn apply_candidate(
        &self,
        batch_id: &str,
        idx: usize,
        tracks: &mut [Track],
        candidate: &crate::model::MatchCandidate,
        summary: &mut BatchSummary,
    ) -> String {
        match self.organizer.apply(batch_id, &tracks[idx], candidate).await {
            Ok(ApplyOutcome::Applied { dest, .. }) => {
                tracks[idx].dest_path = Some(dest);
                tracks[idx].state = ProcessingState::Applied;
                summary.auto_applied += 1;
                "applied".to_string()
            }
            Ok(ApplyOutcome::Planned(plan)) => {
                tracks[idx].dest_path = Some(plan.destination.clone());
                tracks[idx].state = ProcessingState::Applied;
                summary.auto_applied += 1;
                summary.planned.push(plan);
                "planned".to_string()
            }
            Err(e) => {
                tracks[idx].state = ProcessingState::Failed;
                tracks[idx].error = Some(e.to_string());
                summary.failed += 1;
                summary.record_error(ErrorKind::FileOperation);
                format!("failed: {}", e)
            }
        }
    }

    /// Save-as-you-go persistence. Dry runs leave the store untouched so
    /// a later real run does not resume-skip files that never changed.
    async fn save_track(&self, batch_id: &str, track: &Track) {
        if self.options.dry_run {
            return;
        }
        if let Err(e) = self.store.save(batch_id, track).await {
            tracing::warn!("failed to persist track state: {}", e);
        }
    }
}

/// Read embedded tags into a track; a file we cannot parse still
/// proceeds with filename-derived identity.
fn read_tags(track: &mut Track) {
    match metadata::read(&track.source_path) {
        Ok(meta) => {
            track.tags = meta.tags;
            if track.duration_secs.is_none() {
                track.duration_secs = Some(meta.duration_secs);
            }
        }
        Err(e) => tracing::debug!(
            "tag read failed for {}: {}",
            track.source_path.display(),
            e
        ),
    }
    if !track.tags.has_basics() {
        merge_guessed_tags(track);
    }
}

/// Fill missing tags from the parsed filename.
fn merge_guessed_tags(track: &mut Track) {
    let guessed = filename::guess_from_filename(&track.source_path);
    let tags = &mut track.tags;
    tags.title = tags.title.take().or(guessed.title);
    tags.artist = tags.artist.take().or(guessed.artist);
    tags.track_number = tags.track_number.or(guessed.track_number);
    tags.disc_number = tags.disc_number.or(guessed.disc_number);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, MoveLedger, ResponseCache};
    use crate::model::{Fingerprint, MatchCandidate};
    use crate::organizer::TagWriter;
    use crate::ratelimit::RateLimiter;
    use crate::resolve::traits::mocks::*;
    use crate::resolve::traits::{ReleaseInfo, ReleaseTrack};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct NoopTagWriter;
    impl TagWriter for NoopTagWriter {
        fn write(&self, _path: &Path, _candidate: &MatchCandidate) -> crate::error::Result<usize> {
            Ok(0)
        }
    }

    /// Extractor returning a fixed fingerprint for every file.
    struct FixedExtractor {
        score_fingerprint: String,
    }
    impl FingerprintExtractor for FixedExtractor {
        fn extract(&self, _path: &Path) -> FingerprintOutcome {
            FingerprintOutcome::Ok(Fingerprint {
                fingerprint: self.score_fingerprint.clone(),
                duration_secs: 185.0,
            })
        }
    }

    /// Extractor whose tool is absent.
    struct AbsentExtractor;
    impl FingerprintExtractor for AbsentExtractor {
        fn extract(&self, _path: &Path) -> FingerprintOutcome {
            FingerprintOutcome::ToolMissing
        }
        fn is_available(&self) -> bool {
            false
        }
    }

    struct Fixture {
        _tmp: TempDir,
        source_dir: PathBuf,
        library: PathBuf,
        options: BatchOptions,
        pool: sqlx::SqlitePool,
    }

    async fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let library = tmp.path().join("library");
        let source_dir = tmp.path().join("incoming");
        fs::create_dir_all(&library).unwrap();
        fs::create_dir_all(&source_dir).unwrap();

        let options = BatchOptions {
            dry_run: false,
            auto_apply_threshold: 90.0,
            review_threshold: 70.0,
            worker_count: 2,
            keep_originals: true,
            library_root: library.clone(),
            backup_root: library.join("_Backups"),
            folder_template: "{artist}/{album} ({year})".to_string(),
            file_template: "{track:02d} - {title}".to_string(),
            skip_short_duration_seconds: 10.0,
        };
        Fixture {
            _tmp: tmp,
            source_dir,
            library,
            options,
            pool: test_pool().await,
        }
    }

    fn fast_limiter() -> Arc<RateLimiter> {
        Arc::new(
            RateLimiter::new()
                .with_interval("acoustid", Duration::ZERO)
                .with_interval("musicbrainz", Duration::ZERO)
                .with_interval("coverart", Duration::ZERO)
                .with_interval("archive", Duration::ZERO),
        )
    }

    fn abbey_road_release() -> ReleaseInfo {
        ReleaseInfo {
            release_id: "rel-abbey".to_string(),
            artist: Some("The Beatles".to_string()),
            album: Some("Abbey Road".to_string()),
            year: Some(1969),
            total_tracks: Some(17),
            total_discs: Some(1),
            tracks: vec![ReleaseTrack {
                position: 7,
                disc: 1,
                title: "Here Comes The Sun".to_string(),
                duration_secs: Some(185.0),
            }],
        }
    }

    fn strong_hit() -> MockFingerprintOracle {
        let mut fp = MockFingerprintOracle::single(0.95, "rec-sun", "rel-abbey");
        fp.hits[0].title = Some("Here Comes The Sun".to_string());
        fp.hits[0].artist = Some("The Beatles".to_string());
        fp.hits[0].duration_secs = Some(185.0);
        fp
    }

    fn build_pipeline<X: FingerprintExtractor>(
        fix: &Fixture,
        fp: MockFingerprintOracle,
        release: MockReleaseOracle,
        extractor: X,
        options: BatchOptions,
    ) -> Pipeline<X> {
        let resolver = Resolver::new(
            Arc::new(fp),
            Arc::new(release),
            Arc::new(MockCoverArtOracle { handle: None }),
            Arc::new(MockArchiveOracle::empty()),
            ResponseCache::new(fix.pool.clone()),
            fast_limiter(),
        );
        let organizer = SafeOrganizer::with_tag_writer(
            &options,
            MoveLedger::new(fix.pool.clone()),
            Box::new(NoopTagWriter),
        );
        Pipeline::new(
            TrackStore::new(fix.pool.clone()),
            resolver,
            organizer,
            FingerprintStage::new(extractor, options.skip_short_duration_seconds),
            options,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_strong_match_is_auto_applied_end_to_end() {
        let fix = fixture().await;
        fs::write(fix.source_dir.join("The Beatles - Here Comes The Sun.mp3"), b"audio-bytes").unwrap();

        let pipeline = build_pipeline(
            &fix,
            strong_hit(),
            MockReleaseOracle::with_release(abbey_road_release()),
            FixedExtractor {
                score_fingerprint: "FP".to_string(),
            },
            fix.options.clone(),
        );

        let summary = pipeline
            .run_batch("batch-1", &[fix.source_dir.clone()])
            .await
            .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.fingerprinted, 1);
        assert_eq!(summary.auto_applied, 1);
        assert_eq!(summary.failed, 0);
        assert!(!summary.cancelled);

        let dest = fix
            .library
            .join("The Beatles/Abbey Road (1969)/07 - Here Comes The Sun.mp3");
        assert!(dest.exists(), "expected organized file at {:?}", dest);
        // Backup exists under the backup root
        assert!(fix.options.backup_root.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_resume_skips_terminal_tracks() {
        let fix = fixture().await;
        fs::write(fix.source_dir.join("The Beatles - Here Comes The Sun.mp3"), b"audio-bytes").unwrap();

        let pipeline = build_pipeline(
            &fix,
            strong_hit(),
            MockReleaseOracle::with_release(abbey_road_release()),
            FixedExtractor {
                score_fingerprint: "FP".to_string(),
            },
            fix.options.clone(),
        );
        let first = pipeline
            .run_batch("batch-1", &[fix.source_dir.clone()])
            .await
            .unwrap();
        assert_eq!(first.auto_applied, 1);

        // The applied file moved into the library; drop a copy back at
        // the original path to simulate a re-run over the same scan set
        fs::write(fix.source_dir.join("The Beatles - Here Comes The Sun.mp3"), b"audio-bytes").unwrap();
        let second = pipeline
            .run_batch("batch-1", &[fix.source_dir.clone()])
            .await
            .unwrap();
        assert_eq!(second.skipped_resume, 1);
        assert_eq!(second.auto_applied, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dry_run_changes_nothing_but_reports_plan() {
        let fix = fixture().await;
        fs::write(fix.source_dir.join("The Beatles - Here Comes The Sun.mp3"), b"audio-bytes").unwrap();

        let mut options = fix.options.clone();
        options.dry_run = true;
        let pipeline = build_pipeline(
            &fix,
            strong_hit(),
            MockReleaseOracle::with_release(abbey_road_release()),
            FixedExtractor {
                score_fingerprint: "FP".to_string(),
            },
            options,
        );

        let summary = pipeline
            .run_batch("batch-dry", &[fix.source_dir.clone()])
            .await
            .unwrap();

        assert_eq!(summary.auto_applied, 1);
        assert_eq!(summary.planned.len(), 1);
        // Source untouched, library empty apart from the root dir
        assert!(fix.source_dir.join("The Beatles - Here Comes The Sun.mp3").exists());
        let library_files: Vec<_> = walkdir::WalkDir::new(&fix.library)
            .into_iter()
            .flatten()
            .filter(|e| e.file_type().is_file())
            .collect();
        assert!(library_files.is_empty());

        // A real run afterwards is not resume-skipped
        let pipeline = build_pipeline(
            &fix,
            strong_hit(),
            MockReleaseOracle::with_release(abbey_road_release()),
            FixedExtractor {
                score_fingerprint: "FP".to_string(),
            },
            fix.options.clone(),
        );
        let real = pipeline
            .run_batch("batch-dry", &[fix.source_dir.clone()])
            .await
            .unwrap();
        assert_eq!(real.skipped_resume, 0);
        assert_eq!(real.auto_applied, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tool_missing_degrades_to_tag_based() {
        let fix = fixture().await;
        fs::write(fix.source_dir.join("unknown.mp3"), b"bytes").unwrap();

        let pipeline = build_pipeline(
            &fix,
            MockFingerprintOracle::no_matches(),
            MockReleaseOracle::empty(),
            AbsentExtractor,
            fix.options.clone(),
        );

        let summary = pipeline
            .run_batch("batch-1", &[fix.source_dir.clone()])
            .await
            .unwrap();

        assert_eq!(summary.fingerprinted, 0);
        assert!(!summary.advisories.is_empty());
        // Filename-synthesized candidate scores low: manual tier
        assert_eq!(summary.manual + summary.unmatched, 1);
        // File untouched
        assert!(fix.source_dir.join("unknown.mp3").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unsafe_library_root_fails_before_any_mutation() {
        let fix = fixture().await;
        fs::write(fix.source_dir.join("a.mp3"), b"bytes").unwrap();

        let mut options = fix.options.clone();
        options.library_root = PathBuf::from("/usr");
        let pipeline = build_pipeline(
            &fix,
            strong_hit(),
            MockReleaseOracle::with_release(abbey_road_release()),
            FixedExtractor {
                score_fingerprint: "FP".to_string(),
            },
            options,
        );

        let result = pipeline.run_batch("batch-1", &[fix.source_dir.clone()]).await;
        assert!(result.is_err());
        assert!(fix.source_dir.join("a.mp3").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_before_run_yields_cancelled_summary() {
        let fix = fixture().await;
        fs::write(fix.source_dir.join("a.mp3"), b"bytes").unwrap();

        let pipeline = build_pipeline(
            &fix,
            strong_hit(),
            MockReleaseOracle::with_release(abbey_road_release()),
            FixedExtractor {
                score_fingerprint: "FP".to_string(),
            },
            fix.options.clone(),
        );
        pipeline.cancel();

        let summary = pipeline
            .run_batch("batch-1", &[fix.source_dir.clone()])
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.auto_applied, 0);
        assert!(fix.source_dir.join("a.mp3").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_progress_events_end_with_final() {
        let fix = fixture().await;
        for i in 0..5 {
            fs::write(fix.source_dir.join(format!("{:02} t.mp3", i)), b"bytes").unwrap();
        }

        let pipeline = build_pipeline(
            &fix,
            MockFingerprintOracle::no_matches(),
            MockReleaseOracle::empty(),
            FixedExtractor {
                score_fingerprint: "FP".to_string(),
            },
            fix.options.clone(),
        );
        let mut events = pipeline.subscribe();

        pipeline
            .run_batch("batch-1", &[fix.source_dir.clone()])
            .await
            .unwrap();

        let mut resolve_events = Vec::new();
        while let Ok(event) = events.try_recv() {
            if event.phase == Phase::Resolve {
                resolve_events.push(event);
            }
        }
        let last = resolve_events.last().expect("resolve events emitted");
        assert_eq!(last.completed, last.total);
        assert_eq!(last.total, 5);
    }

    #[test]
    fn test_merge_guessed_tags_fills_holes_only() {
        let mut track = Track::new(PathBuf::from("/m/03 Big Moe - Freestyle.mp3"), 10);
        track.tags.title = Some("Kept Title".to_string());
        merge_guessed_tags(&mut track);
        assert_eq!(track.tags.title.as_deref(), Some("Kept Title"));
        assert_eq!(track.tags.artist.as_deref(), Some("Big Moe"));
        assert_eq!(track.tags.track_number, Some(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_existing_tags_candidate_provenance_survives_to_review() {
        // Tag-only identification: no fingerprint match, no archive, so
        // the existing-tags candidate is what gets scored
        let fix = fixture().await;
        fs::write(fix.source_dir.join("tagged.mp3"), b"bytes").unwrap();

        let pipeline = build_pipeline(
            &fix,
            MockFingerprintOracle::no_matches(),
            MockReleaseOracle::empty(),
            FixedExtractor {
                score_fingerprint: "FP".to_string(),
            },
            fix.options.clone(),
        );

        let summary = pipeline
            .run_batch("batch-1", &[fix.source_dir.clone()])
            .await
            .unwrap();
        // Without usable tags the synthesized candidate lands in manual
        assert_eq!(summary.manual + summary.unmatched + summary.queued_for_review, 1);

        let state = TrackStore::new(fix.pool.clone())
            .get_state("batch-1", &fix.source_dir.join("tagged.mp3"))
            .await
            .unwrap();
        assert!(matches!(
            state,
            Some(ProcessingState::QueuedForReview) | Some(ProcessingState::Unmatched)
        ));
    }
}
