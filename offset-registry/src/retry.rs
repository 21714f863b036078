//! Retry policy with exponential backoff.

use std::time::Duration;

use crate::client::RegistryError;

/// How many times to call a registry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
            max_backoff,
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// Doubles from `base_backoff`, capped at `max_backoff`. A registry's
    /// `Retry-After` hint replaces the computed delay, still capped.
    pub fn backoff(&self, attempt: u32, error: Option<&RegistryError>) -> Duration {
        if let Some(RegistryError::RateLimited {
            retry_after_ms: Some(ms),
        }) = error
        {
            return Duration::from_millis(*ms).min(self.max_backoff);
        }

        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(2))
    }
}
