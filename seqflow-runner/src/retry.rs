//! Retry with exponential backoff
//!
//! Transient failures (network blips, interrupted I/O, a tool that could not
//! be spawned) are retried where they happen. Once the attempt budget is
//! spent the last error escalates to the caller.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry budget and backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first one
    pub max_attempts: usize,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Policy that never retries
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 1_u32.checked_shl((attempt - 1) as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn can_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of attempts
    ///
    /// # Arguments
    /// * `what` - Label used in log messages
    /// * `op` - Operation to run; called once per attempt
    /// * `is_transient` - Whether an error is worth another attempt
    ///
    /// # Returns
    /// The value, or the last error together with the number of attempts made
    pub async fn run<T, E, F, Fut>(
        &self,
        what: &str,
        mut op: F,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, (E, usize)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && self.can_retry(attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what, attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}
