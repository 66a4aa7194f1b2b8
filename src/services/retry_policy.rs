//! Retry policy for failing jobs.
//!
//! Turns a job failure into its stored record: how many times in a row it
//! has failed, when it may next be attempted, and whether it is stuck.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::models::{JobFailure, RetryConfig};

/// Backoff and stuck-job decisions for failed attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new policy from `config`.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the next attempt after `failures` consecutive failures,
    /// or `None` when the job is simply retried next cycle.
    pub fn delay_after(&self, failures: u32) -> Option<Duration> {
        if !self.config.backoff_enabled || failures == 0 {
            return None;
        }

        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(self.config.initial_backoff_secs))
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(Duration::from_secs(self.config.max_backoff_secs))
            .with_max_elapsed_time(None)
            .build();

        let mut delay = None;
        for _ in 0..failures {
            delay = backoff.next_backoff();
        }
        // whole seconds; the jitter-free interval still carries sub-ns noise
        delay.map(|d| Duration::from_secs(d.as_secs()))
    }

    /// Build the failure record that follows `previous` after a new failure.
    pub fn record_failure(
        &self,
        patient_id: &str,
        attempt: i64,
        previous: Option<&JobFailure>,
        error: &str,
        now: DateTime<Utc>,
    ) -> JobFailure {
        let consecutive_failures = previous.map_or(0, |f| f.consecutive_failures) + 1;
        let next_retry_at = self
            .delay_after(consecutive_failures)
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| now + d);
        let stuck = self
            .config
            .max_consecutive_failures
            .is_some_and(|max| consecutive_failures >= max);

        JobFailure {
            patient_id: patient_id.to_string(),
            attempt,
            consecutive_failures,
            last_error: error.to_string(),
            last_failed_at: now,
            next_retry_at,
            stuck,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(backoff_enabled: bool, max: Option<u32>) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            backoff_enabled,
            initial_backoff_secs: 60,
            max_backoff_secs: 300,
            max_consecutive_failures: max,
        })
    }

    #[test]
    fn test_disabled_backoff_retries_next_cycle() {
        let p = policy(false, None);
        assert_eq!(p.delay_after(1), None);
        assert_eq!(p.delay_after(10), None);
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let p = policy(true, None);
        assert_eq!(p.delay_after(1), Some(Duration::from_secs(60)));
        assert_eq!(p.delay_after(2), Some(Duration::from_secs(120)));
        assert_eq!(p.delay_after(3), Some(Duration::from_secs(240)));
        assert_eq!(p.delay_after(4), Some(Duration::from_secs(300)));
        assert_eq!(p.delay_after(9), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_record_failure_counts_and_marks_stuck() {
        let p = policy(true, Some(2));
        let now = Utc::now();

        let first = p.record_failure("p", 1, None, "fetch failed", now);
        assert_eq!(first.consecutive_failures, 1);
        assert!(!first.stuck);
        assert_eq!(first.next_retry_at, Some(now + chrono::Duration::seconds(60)));

        let second = p.record_failure("p", 1, Some(&first), "fetch failed again", now);
        assert_eq!(second.consecutive_failures, 2);
        assert!(second.stuck);
        assert_eq!(second.last_error, "fetch failed again");
    }
}
