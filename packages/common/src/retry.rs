//! In-process retry bookkeeping for queue consumers.
//!
//! The broker redelivers whole messages; this module handles the layer
//! below that: a consumer retrying one job in place, with exponential
//! backoff, until its budget runs out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tracing::info;

/// What a consumer should do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back off and try again. `attempt` is 1-based.
    Retry { attempt: u8 },
    /// Budget spent; the job must not be attempted again.
    Exhausted { attempts: u8 },
}

#[derive(Debug)]
struct FailureRecord {
    failures: u8,
    last_failure: Instant,
}

/// Per-job failure counts, keyed by message id.
///
/// Exhausted and cleared jobs are forgotten immediately; anything else is
/// swept out by `cleanup_stale` so abandoned ids cannot accumulate.
#[derive(Debug, Default)]
pub struct RetryTracker {
    jobs: HashMap<String, FailureRecord>,
    max_retries: u8,
}

impl RetryTracker {
    pub fn new(max_retries: u8) -> Self {
        Self {
            jobs: HashMap::new(),
            max_retries,
        }
    }

    /// Count a failure against a job and decide whether to retry it.
    pub fn record_failure(&mut self, id: &str) -> RetryDecision {
        let record = self.jobs.entry(id.to_string()).or_insert(FailureRecord {
            failures: 0,
            last_failure: Instant::now(),
        });

        record.failures += 1;
        record.last_failure = Instant::now();

        if record.failures <= self.max_retries {
            RetryDecision::Retry {
                attempt: record.failures,
            }
        } else {
            let attempts = record.failures;
            self.jobs.remove(id);
            RetryDecision::Exhausted { attempts }
        }
    }

    /// Forget a job, e.g. after it finally succeeded.
    pub fn clear(&mut self, id: &str) {
        self.jobs.remove(id);
    }

    /// Drop entries with no failure newer than `max_age`. Returns how many
    /// were removed.
    pub fn cleanup_stale(&mut self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.jobs.len();
        self.jobs
            .retain(|_, record| now.duration_since(record.last_failure) < max_age);
        before - self.jobs.len()
    }
}

/// Backoff for the given 1-based attempt: `base_ms` doubled per attempt,
/// plus 0-25% jitter, capped at `max_ms`.
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let doubled = base_ms.saturating_mul(2u64.saturating_pow(u32::from(attempt) - 1));
    let jitter = rand::rng().random_range(0..=doubled / 4);

    Duration::from_millis(doubled.saturating_add(jitter).min(max_ms))
}

/// Clears a job's retry state on drop unless defused.
///
/// A handler that returns early (panic unwind, `?`) must not leave a stale
/// failure count behind to poison the next delivery of the same id.
pub struct RetryCleanupGuard<'a> {
    tracker: &'a Arc<Mutex<RetryTracker>>,
    job_id: String,
    armed: bool,
}

impl<'a> RetryCleanupGuard<'a> {
    pub fn new(tracker: &'a Arc<Mutex<RetryTracker>>, job_id: impl Into<String>) -> Self {
        Self {
            tracker,
            job_id: job_id.into(),
            armed: true,
        }
    }

    /// Disarm the guard; the caller has settled the job's state itself.
    pub fn defuse(&mut self) {
        self.armed = false;
    }
}

impl Drop for RetryCleanupGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut tracker) = self.tracker.try_lock() {
                tracker.clear(&self.job_id);
            }
        }
    }
}

/// Periodically sweep stale entries out of a shared tracker.
pub fn spawn_cleanup_task(
    tracker: Arc<Mutex<RetryTracker>>,
    cleanup_interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);

        loop {
            interval.tick().await;
            let removed = tracker.lock().await.cleanup_stale(max_age);
            if removed > 0 {
                info!(removed, "Cleaned up stale retry tracker entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt_with_bounded_jitter() {
        let d1 = calculate_backoff(1, 1000, 60000);
        assert!(d1.as_millis() >= 1000 && d1.as_millis() <= 1250);

        let d2 = calculate_backoff(2, 1000, 60000);
        assert!(d2.as_millis() >= 2000 && d2.as_millis() <= 2500);

        let d3 = calculate_backoff(3, 1000, 60000);
        assert!(d3.as_millis() >= 4000 && d3.as_millis() <= 5000);
    }

    #[test]
    fn backoff_respects_the_ceiling() {
        let d = calculate_backoff(20, 10000, 60000);
        assert!(d.as_millis() <= 60000);
    }

    #[test]
    fn backoff_for_attempt_zero_is_zero() {
        assert_eq!(calculate_backoff(0, 1000, 60000), Duration::ZERO);
    }

    #[test]
    fn tracker_exhausts_after_budget() {
        let mut tracker = RetryTracker::new(2);

        assert_eq!(
            tracker.record_failure("job1"),
            RetryDecision::Retry { attempt: 1 }
        );
        assert_eq!(
            tracker.record_failure("job1"),
            RetryDecision::Retry { attempt: 2 }
        );
        assert_eq!(
            tracker.record_failure("job1"),
            RetryDecision::Exhausted { attempts: 3 }
        );

        // Exhausted jobs are forgotten; a redelivery starts over.
        assert_eq!(
            tracker.record_failure("job1"),
            RetryDecision::Retry { attempt: 1 }
        );
    }

    #[test]
    fn tracker_counts_jobs_independently() {
        let mut tracker = RetryTracker::new(3);

        tracker.record_failure("job1");
        tracker.record_failure("job2");

        assert_eq!(
            tracker.record_failure("job1"),
            RetryDecision::Retry { attempt: 2 }
        );
        assert_eq!(
            tracker.record_failure("job2"),
            RetryDecision::Retry { attempt: 2 }
        );
    }

    #[test]
    fn clear_and_stale_sweep_reset_counts() {
        let mut tracker = RetryTracker::new(3);

        tracker.record_failure("job1");
        tracker.record_failure("job1");
        tracker.clear("job1");
        assert_eq!(
            tracker.record_failure("job1"),
            RetryDecision::Retry { attempt: 1 }
        );

        assert_eq!(tracker.cleanup_stale(Duration::ZERO), 1);
        assert_eq!(tracker.cleanup_stale(Duration::from_secs(3600)), 0);
        assert_eq!(
            tracker.record_failure("job1"),
            RetryDecision::Retry { attempt: 1 }
        );
    }

    #[tokio::test]
    async fn dropped_guard_clears_state() {
        let tracker = Arc::new(Mutex::new(RetryTracker::new(3)));
        tracker.lock().await.record_failure("job1");

        {
            let _guard = RetryCleanupGuard::new(&tracker, "job1");
            // Dropped armed, as on an early return.
        }

        assert_eq!(
            tracker.lock().await.record_failure("job1"),
            RetryDecision::Retry { attempt: 1 }
        );
    }

    #[tokio::test]
    async fn defused_guard_leaves_state_alone() {
        let tracker = Arc::new(Mutex::new(RetryTracker::new(3)));
        tracker.lock().await.record_failure("job1");

        {
            let mut guard = RetryCleanupGuard::new(&tracker, "job1");
            guard.defuse();
        }

        assert_eq!(
            tracker.lock().await.record_failure("job1"),
            RetryDecision::Retry { attempt: 2 }
        );
    }
}
