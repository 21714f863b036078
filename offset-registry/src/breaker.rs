//! Circuit breaker for registry calls.
//!
//! Closed → Open after `failure_threshold` consecutive failed verifications.
//! Open short-circuits every call until `cooldown` elapses, then Half-open
//! admits a single trial call: success closes the breaker, failure re-opens it.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    /// A single trial call is in flight.
    HalfOpen,
}

/// Consecutive-failure circuit breaker.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

/// Admission for one call through the breaker.
///
/// A half-open trial permit dropped without an outcome re-opens the
/// breaker, so a cancelled trial call cannot leave it half-open.
#[must_use = "record the call's outcome on the permit"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Whether this call is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// The call got an answer from the registry.
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    /// The call failed after all retries.
    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.abandon_trial();
        }
    }
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state.
    pub fn state(&self) -> BreakerState {
        match *self.lock() {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { until } if Instant::now() >= until => BreakerState::HalfOpen,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen => BreakerState::HalfOpen,
        }
    }

    /// Ask to make a call. `None` means short-circuit.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let mut inner = self.lock();
        let trial = match *inner {
            Inner::Closed { .. } => false,
            Inner::Open { until } if Instant::now() >= until => {
                info!(breaker = %self.name, "Circuit half-open, admitting trial call");
                *inner = Inner::HalfOpen;
                true
            }
            Inner::Open { .. } | Inner::HalfOpen => return None,
        };
        Some(BreakerPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// Record an answer from the registry.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if !matches!(*inner, Inner::Closed { .. }) {
            info!(breaker = %self.name, "Circuit closed");
        }
        *inner = Inner::Closed {
            consecutive_failures: 0,
        };
    }

    /// Record a call that failed after all retries.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        let open = match *inner {
            Inner::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures.saturating_add(1);
                if failures >= self.failure_threshold {
                    true
                } else {
                    *inner = Inner::Closed {
                        consecutive_failures: failures,
                    };
                    false
                }
            }
            Inner::HalfOpen => true,
            Inner::Open { .. } => false,
        };

        if open {
            warn!(
                breaker = %self.name,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit opened"
            );
            *inner = self.open_until();
        }
    }

    /// The trial call ended without an outcome.
    fn abandon_trial(&self) {
        let mut inner = self.lock();
        if matches!(*inner, Inner::HalfOpen) {
            warn!(breaker = %self.name, "Circuit trial abandoned, circuit re-opened");
            *inner = self.open_until();
        }
    }

    fn open_until(&self) -> Inner {
        Inner::Open {
            until: Instant::now() + self.cooldown,
        }
    }
}
