use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Exponential backoff for transient failures.
///
/// The wait after attempt `n` is `multiplier * unit * 2^(n-1)`, clamped to
/// `[min_delay, max_delay]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub unit: Duration,
    pub multiplier: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            unit: Duration::from_secs(1),
            multiplier: 1.0,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy with the default shape but scaled down to `unit`, for tests.
    #[must_use]
    pub fn with_unit(unit: Duration) -> Self {
        Self {
            unit,
            min_delay: unit,
            max_delay: unit * 10,
            ..Self::default()
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let factor = self.multiplier * f64::from(1u32 << exponent);
        let delay = self.unit.mul_f64(factor.max(0.0));
        delay.clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only errors for which `is_transient` returns true are retried.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run<T, E, F, Fut>(&self, mut op: F, is_transient: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_transient(&e) => {
                    let delay = self.delay_after(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
