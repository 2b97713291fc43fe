//! Bounded retry with exponential backoff.
//!
//! One policy type drives both the LLM subprocess retries and the lint/test
//! fix loop. The loop is parameterized by an is-retryable predicate and a
//! between-attempts hook; the hook is where the fix loop asks the model for a
//! repair, and it only runs when another attempt will follow.

use std::thread;
use std::time::Duration;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Sleep before the second attempt; zero disables sleeping
    pub initial_backoff: Duration,
    /// Growth factor applied per further retry
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Policy with `max_attempts` total attempts and no sleeping in between.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            multiplier: 2,
        }
    }

    pub fn with_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self
    }

    /// Delay before retry number `retry` (0-based), capped at [`MAX_BACKOFF`].
    pub fn backoff_for(&self, retry: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let factor = self.multiplier.max(1).saturating_pow(retry);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt cap is reached. `op` receives the 1-based attempt number.
    ///
    /// `on_retry` is called with the failed attempt number and its error
    /// before the next attempt starts. An error from the hook ends the loop
    /// immediately and is returned as-is.
    pub fn run<T, E, Op, Retryable, OnRetry>(
        &self,
        mut op: Op,
        is_retryable: Retryable,
        mut on_retry: OnRetry,
    ) -> Result<T, E>
    where
        Op: FnMut(u32) -> Result<T, E>,
        Retryable: Fn(&E) -> bool,
        OnRetry: FnMut(u32, &E) -> Result<(), E>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max && is_retryable(&err) => {
                    on_retry(attempt, &err)?;

                    let delay = self.backoff_for(attempt - 1);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}
