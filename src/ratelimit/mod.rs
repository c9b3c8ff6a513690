//! Per-service request pacing.
//!
//! Each external oracle gets its own minimum interval between calls
//! (1 req/s by default, per the MusicBrainz/AcoustID terms). Waiting on
//! one service never delays another. Pacing sleeps are chunked so that a
//! cancellation is observed within the pacing interval rather than after
//! it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default minimum interval between calls to one service.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Extra pacing applied after a 429 response before the single retry.
pub const RATE_LIMITED_BACKOFF: Duration = Duration::from_secs(5);

/// How often the pacing sleep re-samples the cancel check.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Token pacing for external services.
///
/// Injected into the resolver; process-wide by lifecycle but never a
/// module-level global.
pub struct RateLimiter {
    intervals: HashMap<String, Duration>,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Create a limiter where every service defaults to 1 req/s.
    pub fn new() -> Self {
        Self {
            intervals: HashMap::new(),
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Override the interval for one service.
    pub fn with_interval(mut self, service: impl Into<String>, interval: Duration) -> Self {
        self.intervals.insert(service.into(), interval);
        self
    }

    fn interval_for(&self, service: &str) -> Duration {
        self.intervals
            .get(service)
            .copied()
            .unwrap_or(DEFAULT_MIN_INTERVAL)
    }

    /// Suspend until a slot is available for `service`.
    ///
    /// Returns `false` (without stamping a call) if `cancelled` fires
    /// while waiting; the check is sampled at least every 100 ms.
    pub async fn acquire(&self, service: &str, cancelled: impl Fn() -> bool) -> bool {
        let interval = self.interval_for(service);

        let wait = {
            let last = self.last_call.lock().await;
            match last.get(service) {
                // The stamp may sit in the future after a forced backoff
                Some(stamp) => (*stamp + interval).saturating_duration_since(Instant::now()),
                None => Duration::ZERO,
            }
        };

        // Sleep outside the lock so other services aren't blocked
        let mut remaining = wait;
        while !remaining.is_zero() {
            if cancelled() {
                return false;
            }
            let chunk = remaining.min(CANCEL_POLL);
            tokio::time::sleep(chunk).await;
            remaining = remaining.saturating_sub(chunk);
        }
        if cancelled() {
            return false;
        }

        let mut last = self.last_call.lock().await;
        last.insert(service.to_string(), Instant::now());
        true
    }

    /// Apply a forced pacing backoff after a 429 from `service`.
    ///
    /// Pushes the service's next slot out by [`RATE_LIMITED_BACKOFF`].
    pub async fn force_backoff(&self, service: &str) {
        let mut last = self.last_call.lock().await;
        last.insert(service.to_string(), Instant::now() + RATE_LIMITED_BACKOFF);
        tracing::warn!(service, "rate limited by server, backing off");
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
