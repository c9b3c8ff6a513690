//! Pause/cancel latch and throttled progress reporting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// How long a paused pipeline sleeps between latch samples.
pub const PAUSE_POLL: Duration = Duration::from_millis(250);

/// Minimum wall-clock spacing between throttled progress events.
const THROTTLE_INTERVAL: Duration = Duration::from_millis(250);

/// Snapshot of the control latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub paused: bool,
    pub cancelled: bool,
}

/// Pause/cancel latch, sampled at every suspension point.
///
/// Shared between the orchestrator (which owns the batch) and whatever
/// control surface calls `pause`/`resume`/`cancel`.
#[derive(Debug, Default)]
pub struct ControlLatch {
    paused: AtomicBool,
    cancelled: AtomicBool,
}

impl ControlLatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::info!("pipeline paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        tracing::info!("pipeline resumed");
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        tracing::info!("pipeline cancelled");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ControlState {
        ControlState {
            paused: self.is_paused(),
            cancelled: self.is_cancelled(),
        }
    }

    /// Block while paused; returns `false` if cancelled while waiting
    /// (or before).
    pub async fn wait_if_paused(&self) -> bool {
        while self.is_paused() && !self.is_cancelled() {
            tokio::time::sleep(PAUSE_POLL).await;
        }
        !self.is_cancelled()
    }
}

/// Pipeline phase a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Fingerprint,
    Resolve,
}

/// One progress update delivered to subscribers.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub completed: usize,
    pub total: usize,
    /// Estimated seconds remaining, when derivable.
    pub eta_hint: Option<f64>,
    pub current_path: Option<std::path::PathBuf>,
    pub last_outcome: Option<String>,
}

/// Emission throttle: at most one event per 1% of total or one per
/// 250 ms, whichever fires first. The final event always passes.
pub struct ProgressThrottle {
    total: usize,
    step: usize,
    last_emit: Option<Instant>,
    started: Instant,
}

impl ProgressThrottle {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            step: (total / 100).max(1),
            last_emit: None,
            started: Instant::now(),
        }
    }

    /// Whether an event for `completed` items should be emitted now.
    /// Records the emission when it answers yes.
    pub fn should_emit(&mut self, completed: usize) -> bool {
        let is_final = completed >= self.total;
        let is_milestone = completed % self.step == 0;
        let elapsed_ok = match self.last_emit {
            Some(stamp) => stamp.elapsed() >= THROTTLE_INTERVAL,
            None => true,
        };
        if is_final || is_milestone || elapsed_ok {
            self.last_emit = Some(Instant::now());
            true
        } else {
            false
        }
    }

    /// Linear ETA from throughput so far.
    pub fn eta_hint(&self, completed: usize) -> Option<f64> {
        if completed == 0 || completed >= self.total {
            return None;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = completed as f64 / elapsed;
        if rate > 0.0 {
            Some((self.total - completed) as f64 / rate)
        } else {
            None
        }
    }
}
