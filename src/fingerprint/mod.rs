//! Audio fingerprint extraction and the parallel fingerprint stage.
//!
//! Extraction shells out to the `fpcalc` command-line tool (part of
//! Chromaprint); this is more reliable than bindings and works anywhere
//! fpcalc is installed. The stage runs extractions on a bounded pool of
//! workers with responsive cancellation: cancel stops new subprocesses
//! immediately, and in-flight ones finish in the background with their
//! results discarded.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::model::{Fingerprint, FingerprintOutcome};
use crate::pipeline::progress::ControlLatch;

/// Exit code fpcalc uses when the file cannot be decoded.
const EXIT_DECODE_ERROR: i32 = 2;
/// Exit code fpcalc uses when the audio is too short to fingerprint.
const EXIT_SHORT_AUDIO: i32 = 3;

/// Common installation paths for fpcalc on Windows
#[cfg(windows)]
const FPCALC_PATHS: &[&str] = &[
    "fpcalc", // In PATH
    r"C:\Program Files\Chromaprint\fpcalc.exe",
    r"C:\Program Files\MusicBrainz Picard\fpcalc.exe",
    r"C:\Program Files (x86)\Chromaprint\fpcalc.exe",
];

#[cfg(not(windows))]
const FPCALC_PATHS: &[&str] = &[
    "fpcalc", // In PATH
    "/usr/bin/fpcalc",
    "/usr/local/bin/fpcalc",
    "/opt/homebrew/bin/fpcalc",
];

/// Low-level fingerprint extraction for one file.
///
/// Injected into the stage so tests can substitute a scripted extractor.
pub trait FingerprintExtractor: Send + Sync + 'static {
    fn extract(&self, path: &Path) -> FingerprintOutcome;

    /// Whether the underlying tool is present at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Extractor backed by the Chromaprint `fpcalc` binary.
pub struct FpcalcExtractor;

impl FpcalcExtractor {
    fn find_fpcalc() -> Option<&'static str> {
        FPCALC_PATHS
            .iter()
            .find(|&path| {
                Command::new(path)
                    .arg("-version")
                    .output()
                    .map(|o| o.status.success())
                    .unwrap_or(false)
            })
            .map(|v| v as _)
    }

    /// fpcalc version string, for the startup advisory.
    pub fn version() -> Option<String> {
        let fpcalc = Self::find_fpcalc()?;
        Command::new(fpcalc)
            .arg("-version")
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
    }
}

impl FingerprintExtractor for FpcalcExtractor {
    fn extract(&self, path: &Path) -> FingerprintOutcome {
        let Some(fpcalc) = Self::find_fpcalc() else {
            return FingerprintOutcome::ToolMissing;
        };

        let output = match Command::new(fpcalc).arg("-json").arg(path).output() {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("failed to run fpcalc for {:?}: {}", path, e);
                return FingerprintOutcome::DecodeError;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return match output.status.code() {
                Some(EXIT_SHORT_AUDIO) => FingerprintOutcome::ShortAudio,
                Some(EXIT_DECODE_ERROR) => {
                    tracing::warn!("fpcalc could not decode {:?}: {}", path, stderr.trim());
                    FingerprintOutcome::DecodeError
                }
                _ if stderr.to_lowercase().contains("too short") => {
                    FingerprintOutcome::ShortAudio
                }
                _ => {
                    tracing::warn!("fpcalc failed for {:?}: {}", path, stderr.trim());
                    FingerprintOutcome::DecodeError
                }
            };
        }

        parse_fpcalc_json(&String::from_utf8_lossy(&output.stdout))
    }

    fn is_available(&self) -> bool {
        Self::find_fpcalc().is_some()
    }
}

/// fpcalc JSON output structure
#[derive(serde::Deserialize)]
struct FpcalcOutput {
    fingerprint: String,
    duration: f64,
}

fn parse_fpcalc_json(json: &str) -> FingerprintOutcome {
    match serde_json::from_str::<FpcalcOutput>(json) {
        Ok(parsed) => FingerprintOutcome::Ok(Fingerprint {
            fingerprint: parsed.fingerprint,
            duration_secs: parsed.duration,
        }),
        Err(e) => {
            tracing::error!("failed to parse fpcalc output: {}", e);
            FingerprintOutcome::DecodeError
        }
    }
}

/// Bounded-parallel fingerprint stage.
pub struct FingerprintStage<E: FingerprintExtractor> {
    extractor: Arc<E>,
    /// Durations below this many seconds count as short audio.
    short_cutoff_secs: f64,
}

impl<E: FingerprintExtractor> FingerprintStage<E> {
    pub fn new(extractor: E, short_cutoff_secs: f64) -> Self {
        Self {
            extractor: Arc::new(extractor),
            short_cutoff_secs,
        }
    }

    /// Fingerprint `paths` with at most `worker_count` concurrent
    /// extractions.
    ///
    /// Returns one outcome per input path, in input order. `on_complete`
    /// fires after each finished extraction with the running completion
    /// count. Cancellation via `latch` prevents any further subprocess
    /// spawns; unfinished entries come back as `Cancelled`. Pause holds
    /// workers before their subprocess spawn but keeps pending work
    /// scheduled for resume.
    pub async fn fingerprint_batch(
        &self,
        paths: &[PathBuf],
        worker_count: usize,
        latch: Arc<ControlLatch>,
        mut on_complete: impl FnMut(usize, &Path, &FingerprintOutcome),
    ) -> Vec<FingerprintOutcome> {
        let total = paths.len();
        let mut outcomes: Vec<FingerprintOutcome> = vec![FingerprintOutcome::Cancelled; total];
        if total == 0 {
            return outcomes;
        }

        // Missing tool degrades the whole stage; the pipeline records a
        // user-visible advisory and continues with tag-based resolution.
        if !self.extractor.is_available() {
            tracing::warn!(
                "fingerprint tool not found; all tracks degrade to tag-based resolution"
            );
            outcomes.fill(FingerprintOutcome::ToolMissing);
            return outcomes;
        }

        tracing::info!("fingerprinting {} files with {} workers", total, worker_count);

        let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
        let mut join_set: JoinSet<(usize, FingerprintOutcome)> = JoinSet::new();

        for (idx, path) in paths.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let latch = Arc::clone(&latch);
            let extractor = Arc::clone(&self.extractor);
            let cutoff = self.short_cutoff_secs;
            join_set.spawn(async move {
                // closed only if the set is being torn down
                let Ok(_permit) = semaphore.acquire().await else {
                    return (idx, FingerprintOutcome::Cancelled);
                };
                // Pause holds here, before the subprocess spawn; cancel
                // wins over pause.
                if !latch.wait_if_paused().await || latch.is_cancelled() {
                    return (idx, FingerprintOutcome::Cancelled);
                }
                let outcome = tokio::task::spawn_blocking(move || {
                    let outcome = extractor.extract(&path);
                    match outcome {
                        FingerprintOutcome::Ok(fp) if fp.duration_secs < cutoff => {
                            FingerprintOutcome::ShortAudio
                        }
                        other => other,
                    }
                })
                .await
                .unwrap_or(FingerprintOutcome::DecodeError);
                (idx, outcome)
            });
        }

        let mut completed = 0usize;
        while let Some(joined) = join_set.join_next().await {
            if let Ok((idx, outcome)) = joined {
                completed += 1;
                on_complete(completed, &paths[idx], &outcome);
                outcomes[idx] = outcome;
            }
            if latch.is_cancelled() {
                tracing::info!(
                    "fingerprinting cancelled at {}/{}, tearing down pool",
                    completed,
                    total
                );
                // Dropping the set aborts queued workers without joining;
                // in-flight subprocesses finish in the background and
                // their results are discarded.
                drop(join_set);
                return outcomes;
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted extractor: outcome per file name, with optional delay.
    struct MockExtractor {
        delay: Duration,
        spawned: Arc<AtomicUsize>,
        available: bool,
    }

    impl MockExtractor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                spawned: Arc::new(AtomicUsize::new(0)),
                available: true,
            }
        }
    }

    impl FingerprintExtractor for MockExtractor {
        fn extract(&self, path: &Path) -> FingerprintOutcome {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            let name = path.file_name().unwrap().to_string_lossy();
            if name.starts_with("short") {
                FingerprintOutcome::ShortAudio
            } else if name.starts_with("broken") {
                FingerprintOutcome::DecodeError
            } else {
                FingerprintOutcome::Ok(Fingerprint {
                    fingerprint: format!("fp-{}", name),
                    duration_secs: 180.0,
                })
            }
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/m/{n}"))).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_outcomes_preserve_input_order() {
        let stage = FingerprintStage::new(MockExtractor::new(Duration::ZERO), 10.0);
        let input = paths(&["a.mp3", "short.mp3", "broken.mp3", "b.mp3"]);
        let outcomes = stage
            .fingerprint_batch(&input, 2, ControlLatch::new(), |_, _, _| {})
            .await;

        assert_eq!(outcomes.len(), 4);
        assert!(matches!(&outcomes[0], FingerprintOutcome::Ok(fp) if fp.fingerprint == "fp-a.mp3"));
        assert_eq!(outcomes[1], FingerprintOutcome::ShortAudio);
        assert_eq!(outcomes[2], FingerprintOutcome::DecodeError);
        assert!(matches!(&outcomes[3], FingerprintOutcome::Ok(fp) if fp.fingerprint == "fp-b.mp3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_progress_fires_per_completion() {
        let stage = FingerprintStage::new(MockExtractor::new(Duration::ZERO), 10.0);
        let input = paths(&["a.mp3", "b.mp3", "c.mp3"]);
        let mut seen = Vec::new();
        stage
            .fingerprint_batch(&input, 2, ControlLatch::new(), |n, _, _| seen.push(n))
            .await;
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_short_cutoff_applies_to_ok_results() {
        struct TinyExtractor;
        impl FingerprintExtractor for TinyExtractor {
            fn extract(&self, _path: &Path) -> FingerprintOutcome {
                FingerprintOutcome::Ok(Fingerprint {
                    fingerprint: "fp".to_string(),
                    duration_secs: 4.0,
                })
            }
        }
        let stage = FingerprintStage::new(TinyExtractor, 10.0);
        let outcomes = stage
            .fingerprint_batch(&paths(&["intro.mp3"]), 1, ControlLatch::new(), |_, _, _| {})
            .await;
        assert_eq!(outcomes[0], FingerprintOutcome::ShortAudio);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_missing_tool_degrades_whole_stage() {
        let mut extractor = MockExtractor::new(Duration::ZERO);
        extractor.available = false;
        let spawned = Arc::clone(&extractor.spawned);
        let stage = FingerprintStage::new(extractor, 10.0);

        let outcomes = stage
            .fingerprint_batch(&paths(&["a.mp3", "b.mp3"]), 2, ControlLatch::new(), |_, _, _| {})
            .await;
        assert!(outcomes
            .iter()
            .all(|o| *o == FingerprintOutcome::ToolMissing));
        assert_eq!(spawned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_stops_new_spawns() {
        let extractor = MockExtractor::new(Duration::from_millis(50));
        let spawned = Arc::clone(&extractor.spawned);
        let stage = FingerprintStage::new(extractor, 10.0);
        let latch = ControlLatch::new();

        let input = paths(&[
            "a.mp3", "b.mp3", "c.mp3", "d.mp3", "e.mp3", "f.mp3", "g.mp3", "h.mp3",
        ]);
        let cancel_latch = latch.clone();
        let outcomes = stage
            .fingerprint_batch(&input, 1, latch, move |n, _, _| {
                if n == 2 {
                    cancel_latch.cancel();
                }
            })
            .await;

        let finished = outcomes
            .iter()
            .filter(|o| !matches!(o, FingerprintOutcome::Cancelled))
            .count();
        assert!(finished <= 3, "finished {}", finished);
        // With one worker and cancel after the second completion, at most
        // one more subprocess can already be in flight.
        assert!(spawned.load(Ordering::SeqCst) <= 3);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, FingerprintOutcome::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pause_holds_work_and_resume_completes_it() {
        let extractor = MockExtractor::new(Duration::from_millis(20));
        let spawned = Arc::clone(&extractor.spawned);
        let stage = FingerprintStage::new(extractor, 10.0);
        let latch = ControlLatch::new();
        latch.pause();

        // Resume shortly after; until then no subprocess may spawn
        let resume_latch = latch.clone();
        let resume_task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            resume_latch.resume();
        });

        let input = paths(&["a.mp3", "b.mp3", "c.mp3", "d.mp3"]);
        let check_spawned = Arc::clone(&spawned);
        let probe = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            check_spawned.load(Ordering::SeqCst)
        });

        let outcomes = stage
            .fingerprint_batch(&input, 2, latch, |_, _, _| {})
            .await;

        // While paused, nothing was spawned
        assert_eq!(probe.await.unwrap(), 0);
        resume_task.await.unwrap();
        // After resume, every pending extraction completed
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, FingerprintOutcome::Ok(_))));
        assert_eq!(spawned.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_empty_batch() {
        let stage = FingerprintStage::new(MockExtractor::new(Duration::ZERO), 10.0);
        let outcomes = stage
            .fingerprint_batch(&[], 4, ControlLatch::new(), |_, _, _| {})
            .await;
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_parse_fpcalc_json() {
        let json = r#"{"duration": 180.5, "fingerprint": "AQADtNIyRUkkZUqS"}"#;
        let outcome = parse_fpcalc_json(json);
        assert!(
            matches!(outcome, FingerprintOutcome::Ok(fp) if fp.fingerprint == "AQADtNIyRUkkZUqS")
        );
    }

    #[test]
    fn test_parse_fpcalc_json_error() {
        assert_eq!(
            parse_fpcalc_json(r#"{"error": "invalid"}"#),
            FingerprintOutcome::DecodeError
        );
    }
}
