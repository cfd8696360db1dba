//! Backoff policy for jobs that hit transient provider errors.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use worldsync_common::Result;

/// How often a job is re-run after a transient failure, and how long to
/// wait in between.
///
/// Only errors for which `Error::is_transient` holds are retried; a
/// missing backup or a bad name fails the job on the first attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Re-runs allowed after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Wait before the first re-run. Doubles for each further one.
    pub base_delay: Duration,
    /// Upper bound on a single wait.
    pub max_delay: Duration,
    /// Spread each wait over 75%..125% of its nominal length.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait before re-run number `retry`, counting from 1.
    pub fn backoff(&self, retry: u32) -> Duration {
        let doublings = retry.saturating_sub(1).min(31);
        let nominal = self
            .base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay);

        if self.jitter {
            nominal.mul_f64(0.75 + rand::random::<f64>() * 0.5)
        } else {
            nominal
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or the
    /// retries are used up. The last error is returned in the latter cases.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            let err = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!("{} succeeded after {} retries", label, retries);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_transient() || retries >= self.max_retries {
                return Err(err);
            }

            retries += 1;
            let delay = self.backoff(retries);
            warn!(
                "{} failed: {}. Retry {}/{} in {:?}",
                label, err, retries, self.max_retries, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use worldsync_common::Error;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3)
            .with_base_delay(Duration::from_secs(1))
            .with_jitter(false);

        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy::new(50)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10))
            .with_jitter(false);

        assert_eq!(policy.backoff(5), Duration::from_secs(10));
        assert_eq!(policy.backoff(50), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::new(1).with_base_delay(Duration::from_millis(1000));
        for _ in 0..50 {
            let delay = policy.backoff(1);
            assert!(delay >= Duration::from_millis(750) && delay <= Duration::from_millis(1250));
        }
    }

    #[tokio::test]
    async fn test_unavailable_is_retried() {
        let calls = AtomicU32::new(0);

        let result = fast(3)
            .run("backup", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Unavailable("backend offline".to_string()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = fast(3)
            .run("delete", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::NotFound("save1".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = fast(2)
            .run("restore", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Unavailable("still offline".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = fast(0)
            .run("backup", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Unavailable("offline".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
