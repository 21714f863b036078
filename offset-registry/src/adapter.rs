//! Registry verification adapter.
//!
//! Wraps a [`RegistryClient`] with a per-attempt timeout, retry with
//! exponential backoff, and one circuit breaker per registry. Callers never
//! see a raw client error: every call ends in a typed [`RegistryOutcome`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::client::{RegistryClient, RegistryError, RegistryRecord};
use crate::registry::Registry;
use crate::retry::RetryPolicy;

/// Timeout, retry and breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Per-attempt timeout (ms)
    pub timeout_ms: u64,
    /// Total attempts per verification
    pub max_attempts: u32,
    /// First backoff delay (ms)
    pub base_backoff_ms: u64,
    /// Backoff ceiling (ms)
    pub max_backoff_ms: u64,
    /// Consecutive failed verifications before the breaker opens
    pub failure_threshold: u32,
    /// How long an open breaker short-circuits (seconds)
    pub cooldown_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_attempts: 3,
            base_backoff_ms: 200,
            max_backoff_ms: 2_000,
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

impl RegistrySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// Result of verifying a registry id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegistryOutcome {
    /// Registry confirmed the project
    Verified(RegistryRecord),
    /// Registry answered that the project does not exist or is not verified
    NotFound,
    /// Id prefix matches no known registry
    Unrecognized,
    /// Registry kept failing after every attempt
    TransientError { detail: String, attempts: u32 },
    /// Every attempt ran past the timeout
    TimedOut { attempts: u32 },
    /// Breaker is open, registry was not called
    Unavailable,
}

impl RegistryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified(_) => "verified",
            Self::NotFound => "not_found",
            Self::Unrecognized => "unrecognized",
            Self::TransientError { .. } => "transient_error",
            Self::TimedOut { .. } => "timed_out",
            Self::Unavailable => "unavailable",
        }
    }

    /// The registry gave an answer that will not change on retry.
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Verified(_) | Self::NotFound | Self::Unrecognized)
    }
}

/// Verifies certified-project ids against their registries.
pub struct RegistryVerificationAdapter {
    client: Arc<dyn RegistryClient>,
    retry: RetryPolicy,
    timeout: Duration,
    breakers: BTreeMap<Registry, CircuitBreaker>,
}

impl RegistryVerificationAdapter {
    /// Create an adapter over a client.
    pub fn new(client: Arc<dyn RegistryClient>, settings: &RegistrySettings) -> Self {
        let breakers = Registry::all()
            .iter()
            .map(|registry| {
                (
                    *registry,
                    CircuitBreaker::new(
                        registry.as_str(),
                        settings.failure_threshold,
                        settings.cooldown(),
                    ),
                )
            })
            .collect();

        Self {
            client,
            retry: settings.retry_policy(),
            timeout: settings.timeout(),
            breakers,
        }
    }

    /// Breaker state for a registry.
    pub fn breaker_state(&self, registry: Registry) -> BreakerState {
        self.breakers
            .get(&registry)
            .map(|b| b.state())
            .unwrap_or(BreakerState::Closed)
    }

    /// Verify a registry id.
    pub async fn verify(&self, registry_id: &str) -> RegistryOutcome {
        let registry_id = registry_id.trim();
        let (registry, breaker) = match Registry::from_registry_id(registry_id)
            .and_then(|r| self.breakers.get(&r).map(|b| (r, b)))
        {
            Some(found) => found,
            None => {
                warn!(registry_id = %registry_id, "Unrecognized registry prefix");
                return RegistryOutcome::Unrecognized;
            }
        };

        let Some(permit) = breaker.try_acquire() else {
            warn!(
                registry = %registry,
                registry_id = %registry_id,
                "Registry circuit open, skipping call"
            );
            return RegistryOutcome::Unavailable;
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(
                registry = %registry,
                registry_id = %registry_id,
                attempt,
                trial = permit.is_trial(),
                client = %self.client.id(),
                "Verifying registry id"
            );

            let last_error =
                match tokio::time::timeout(self.timeout, self.client.fetch(registry, registry_id))
                    .await
                {
                    Ok(Ok(record)) if record.verified => {
                        permit.record_success();
                        info!(
                            registry = %registry,
                            registry_id = %registry_id,
                            methodology = %record.methodology,
                            credits_available = record.credits_available,
                            "Registry verified project"
                        );
                        return RegistryOutcome::Verified(record);
                    }
                    Ok(Ok(_)) | Ok(Err(RegistryError::NotFound(_))) => {
                        permit.record_success();
                        info!(registry_id = %registry_id, "Registry has no verified project");
                        return RegistryOutcome::NotFound;
                    }
                    Ok(Err(RegistryError::UnrecognizedRegistry(_))) => {
                        permit.record_success();
                        warn!(registry_id = %registry_id, "No endpoint configured for registry");
                        return RegistryOutcome::Unrecognized;
                    }
                    Ok(Err(e)) if e.is_transient() => Some(e),
                    Ok(Err(e)) => {
                        permit.record_failure();
                        warn!(registry_id = %registry_id, error = %e, "Registry call failed");
                        return RegistryOutcome::TransientError {
                            detail: e.to_string(),
                            attempts: attempt,
                        };
                    }
                    Err(_) => None,
                };

            if attempt >= self.retry.max_attempts {
                permit.record_failure();
                return match last_error {
                    Some(e) => {
                        warn!(
                            registry_id = %registry_id,
                            attempts = attempt,
                            error = %e,
                            "Registry verification gave up"
                        );
                        RegistryOutcome::TransientError {
                            detail: e.to_string(),
                            attempts: attempt,
                        }
                    }
                    None => {
                        warn!(
                            registry_id = %registry_id,
                            attempts = attempt,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Registry verification timed out"
                        );
                        RegistryOutcome::TimedOut { attempts: attempt }
                    }
                };
            }

            let delay = self.retry.backoff(attempt, last_error.as_ref());
            warn!(
                registry_id = %registry_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = last_error.as_ref().map(|e| e.to_string()).unwrap_or_else(|| "timeout".into()),
                "Retrying registry call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StaticRegistry;

    fn settings() -> RegistrySettings {
        RegistrySettings {
            timeout_ms: 1_000,
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
            failure_threshold: 2,
            cooldown_secs: 30,
        }
    }

    fn adapter(registry: Arc<StaticRegistry>) -> RegistryVerificationAdapter {
        RegistryVerificationAdapter::new(registry, &settings())
    }

    #[tokio::test]
    async fn test_verified() {
        let registry = Arc::new(
            StaticRegistry::new().with_record("VCS-1001", RegistryRecord::verified("VM0042", 5.0)),
        );
        let outcome = adapter(registry).verify("VCS-1001").await;
        assert!(matches!(outcome, RegistryOutcome::Verified(ref r) if r.methodology == "VM0042"));
        assert!(outcome.is_definitive());
    }

    #[tokio::test]
    async fn test_not_found_and_unverified() {
        let mut unverified = RegistryRecord::verified("VM0017", 1.0);
        unverified.verified = false;
        let registry = Arc::new(StaticRegistry::new().with_record("GS-5", unverified));
        let adapter = adapter(registry.clone());

        assert_eq!(adapter.verify("VCS-404").await, RegistryOutcome::NotFound);
        assert_eq!(adapter.verify("GS-5").await, RegistryOutcome::NotFound);
        assert_eq!(registry.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unrecognized_prefix_skips_call() {
        let registry = Arc::new(StaticRegistry::new());
        let adapter = adapter(registry.clone());
        assert_eq!(adapter.verify("XYZ-1").await, RegistryOutcome::Unrecognized);
        assert_eq!(registry.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let registry = Arc::new(
            StaticRegistry::new()
                .with_record("CAR-77", RegistryRecord::verified("Soil", 2.0))
                .with_failures([
                    RegistryError::Transient("503".into()),
                    RegistryError::RateLimited { retry_after_ms: Some(500) },
                ]),
        );
        let outcome = adapter(registry.clone()).verify("CAR-77").await;
        assert!(matches!(outcome, RegistryOutcome::Verified(_)));
        assert_eq!(registry.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let registry = Arc::new(StaticRegistry::new().with_failures(
            std::iter::repeat(RegistryError::Transient("503".into())).take(3),
        ));
        let outcome = adapter(registry.clone()).verify("ACR-1").await;
        assert!(matches!(
            outcome,
            RegistryOutcome::TransientError { attempts: 3, .. }
        ));
        assert_eq!(registry.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let registry = Arc::new(
            StaticRegistry::new()
                .with_record("VCS-1", RegistryRecord::verified("VM0042", 1.0))
                .with_delay(Duration::from_secs(10)),
        );
        let outcome = adapter(registry).verify("VCS-1").await;
        assert_eq!(outcome, RegistryOutcome::TimedOut { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_and_recovers() {
        let registry = Arc::new(
            StaticRegistry::new()
                .with_record("VCS-9", RegistryRecord::verified("VM0042", 1.0))
                .with_failures(std::iter::repeat(RegistryError::Transient("down".into())).take(6)),
        );
        let adapter = adapter(registry.clone());

        adapter.verify("VCS-9").await;
        adapter.verify("VCS-9").await;
        assert_eq!(adapter.breaker_state(Registry::Vcs), BreakerState::Open);
        assert_eq!(registry.call_count(), 6);

        assert_eq!(adapter.verify("VCS-9").await, RegistryOutcome::Unavailable);
        assert_eq!(registry.call_count(), 6);

        // Other registries keep their own breaker.
        assert_eq!(adapter.breaker_state(Registry::GoldStandard), BreakerState::Closed);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(adapter.verify("VCS-9").await, RegistryOutcome::Verified(_)));
        assert_eq!(adapter.breaker_state(Registry::Vcs), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_reopens_breaker() {
        let registry = Arc::new(
            StaticRegistry::new()
                .with_record("VCS-9", RegistryRecord::verified("VM0042", 1.0))
                .with_failures(std::iter::repeat(RegistryError::Transient("down".into())).take(7)),
        );
        let adapter = adapter(registry.clone());

        adapter.verify("VCS-9").await;
        adapter.verify("VCS-9").await;
        assert_eq!(adapter.breaker_state(Registry::Vcs), BreakerState::Open);

        // The trial call fails once, then the caller gives up during its backoff.
        tokio::time::advance(Duration::from_secs(31)).await;
        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), adapter.verify("VCS-9")).await;
        assert!(cancelled.is_err());
        assert_eq!(registry.call_count(), 7);
        assert_eq!(adapter.breaker_state(Registry::Vcs), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(adapter.verify("VCS-9").await, RegistryOutcome::Verified(_)));
        assert_eq!(adapter.breaker_state(Registry::Vcs), BreakerState::Closed);
    }
}
