//! Retry policy — exponential backoff with jitter, per-worker defaults.
//!
//! `delay(attempt) = base_delay * backoff_factor^(attempt - 1) * (1 ± 25%)`
//!
//! `auth`, `invalid_input`, and `permanent` failures are never retried
//! regardless of `max_attempts` — see [`FailureCategory::is_retryable`].

use super::error_classify::FailureCategory;
use rand::Rng;
use std::time::Duration;

/// Retry budget and backoff shape for one worker kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt, in seconds.
    pub base_delay_secs: f64,
    /// Multiplier applied to the delay after every attempt.
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_secs: f64, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay_secs,
            backoff_factor,
        }
    }

    /// Policy defaults per spec.md worker table.
    pub fn for_worker(worker: &str) -> Self {
        match worker {
            "scribe" => Self::new(3, 2.0, 2.0),
            "runner" => Self::new(2, 5.0, 2.0),
            "medic" => Self::new(2, 2.0, 2.0),
            "critic" => Self::new(1, 0.0, 1.0),
            "gemini" => Self::new(2, 3.0, 2.0),
            _ => Self::new(1, 1.0, 2.0),
        }
    }

    /// Whether a failure of `category` on the `attempt`'th try (1-indexed)
    /// should be retried.
    pub fn should_retry(&self, category: FailureCategory, attempt: u32) -> bool {
        category.is_retryable() && attempt < self.max_attempts
    }

    /// Delay to wait before `attempt` (the attempt about to be made,
    /// 2-indexed — there's no delay before the first attempt), including
    /// ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.base_delay_secs <= 0.0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1) as i32 - 1;
        let raw = self.base_delay_secs * self.backoff_factor.powi(exponent);
        let jitter = rand::thread_rng().gen_range(-0.25..=0.25);
        let jittered = (raw * (1.0 + jitter)).max(0.0);
        Duration::from_secs_f64(jittered)
    }
}

/// Outcome of a single [`retry`] run.
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: u32,
}

/// Runs `op` up to `policy.max_attempts` times, classifying failures with
/// `classify` and sleeping per [`RetryPolicy::delay_for_attempt`] between
/// retryable failures. Returns the last error if every attempt failed or a
/// non-retryable category was hit.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    classify: impl Fn(&E) -> FailureCategory,
    mut op: F,
) -> Result<RetryOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(result) => return Ok(RetryOutcome { result, attempts: attempt }),
            Err(err) => {
                let category = classify(&err);
                if !policy.should_retry(category, attempt) {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt + 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn worker_defaults_match_spec_table() {
        assert_eq!(RetryPolicy::for_worker("scribe"), RetryPolicy::new(3, 2.0, 2.0));
        assert_eq!(RetryPolicy::for_worker("runner"), RetryPolicy::new(2, 5.0, 2.0));
        assert_eq!(RetryPolicy::for_worker("medic"), RetryPolicy::new(2, 2.0, 2.0));
        assert_eq!(RetryPolicy::for_worker("critic"), RetryPolicy::new(1, 0.0, 1.0));
        assert_eq!(RetryPolicy::for_worker("gemini"), RetryPolicy::new(2, 3.0, 2.0));
    }

    #[test]
    fn auth_failures_are_never_retried() {
        let policy = RetryPolicy::for_worker("scribe");
        assert!(!policy.should_retry(FailureCategory::Auth, 1));
    }

    #[test]
    fn exhausting_max_attempts_stops_retrying() {
        let policy = RetryPolicy::for_worker("critic");
        assert!(!policy.should_retry(FailureCategory::Timeout, 1));
    }

    #[test]
    fn delay_grows_exponentially_within_jitter_band() {
        let policy = RetryPolicy::new(5, 2.0, 2.0);
        let d2 = policy.delay_for_attempt(2).as_secs_f64();
        let d3 = policy.delay_for_attempt(3).as_secs_f64();
        assert!((1.5..=2.5).contains(&d2), "d2={d2}");
        assert!((3.0..=5.0).contains(&d3), "d3={d3}");
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, 0.0, 1.0);
        let calls = AtomicU32::new(0);
        let outcome = retry(
            &policy,
            |_: &&str| FailureCategory::Transient,
            |attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient failure")
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn retry_stops_on_non_retryable_category() {
        let policy = RetryPolicy::new(5, 0.0, 1.0);
        let result: Result<RetryOutcome<()>, &str> = retry(
            &policy,
            |_: &&str| FailureCategory::Auth,
            |_| async { Err("bad credentials") },
        )
        .await;
        assert!(result.is_err());
    }
}
