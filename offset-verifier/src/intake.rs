//! Claim intake and background registry verification.
//!
//! Self-reported claims are processed inline. Certified-project claims get
//! their synchronous checks at submission, then wait in a bounded queue for
//! a worker to run registry verification and the rest of the pipeline. The
//! submitter learns the final outcome through [`ClaimIntake::status`] or a
//! [`ClaimIntake::subscribe`] stream.

use futures::future::join_all;
use offset_claims::{CarbonClaim, HoldReason, ReviewState, VerificationTier};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::service::VerificationService;
use crate::types::{ClaimResult, ClaimStatus, ClaimSubmission, Result};

/// Capacity of the result broadcast channel.
const EVENT_CAPACITY: usize = 1024;

/// Front door for claim submissions.
pub struct ClaimIntake {
    service: Arc<VerificationService>,
    queue: mpsc::Sender<String>,
    events: broadcast::Sender<ClaimResult>,
    workers: Vec<JoinHandle<()>>,
}

impl ClaimIntake {
    /// Start the intake and its registry workers.
    ///
    /// Worker count and queue capacity come from the registry config.
    pub fn start(service: Arc<VerificationService>) -> Self {
        let worker_count = service.config().registry.worker_count;
        let queue_capacity = service.config().registry.queue_capacity;

        let (queue, queue_rx) = mpsc::channel::<String>(queue_capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!(worker_count, queue_capacity, "Starting registry verification workers");

        let workers = (0..worker_count)
            .map(|worker_id| {
                let service = Arc::clone(&service);
                let queue_rx = Arc::clone(&queue_rx);
                let events = events.clone();
                tokio::spawn(async move {
                    verification_worker(worker_id, service, queue_rx, events).await;
                })
            })
            .collect();

        Self {
            service,
            queue,
            events,
            workers,
        }
    }

    /// Submit a claim.
    ///
    /// Returns the final result for self-reported claims. Certified-project
    /// claims come back as awaiting registry verification, or held for
    /// review when the queue is full.
    pub async fn submit_claim(&self, submission: ClaimSubmission) -> Result<ClaimResult> {
        let mut claim = submission.into_claim()?;
        let store = self.service.store();

        if let Some(existing) = store.get(&claim.id).await {
            if existing.processed || existing.is_revoked() {
                debug!(claim_id = %existing.id, "Resubmission of a processed claim");
                return Ok(ClaimResult::from(&existing));
            }
        }

        self.service.validate(&claim)?;

        match claim.verification_tier {
            VerificationTier::SelfReported => {
                let processed = self.service.process(claim).await?;
                let result = processed.result();
                self.publish(&result);
                Ok(result)
            }
            VerificationTier::CertifiedProject => {
                claim.review = ReviewState::AwaitingRegistry;
                store.insert(claim.clone()).await?;
                Ok(self.enqueue(claim).await)
            }
        }
    }

    /// Current result for a claim.
    pub async fn status(&self, claim_id: &str) -> Option<ClaimResult> {
        self.service
            .store()
            .get(claim_id)
            .await
            .map(|claim| ClaimResult::from(&claim))
    }

    /// Receive a result each time a claim reaches an outcome.
    pub fn subscribe(&self) -> broadcast::Receiver<ClaimResult> {
        self.events.subscribe()
    }

    /// Re-queue every claim held for manual review.
    ///
    /// Returns how many claims were queued.
    pub async fn retry_held_claims(&self) -> usize {
        let store = self.service.store();
        let held = store.held_for_review().await;
        let mut queued = 0;

        for mut claim in held {
            claim.review = ReviewState::AwaitingRegistry;
            let stored = store.save_unprocessed(claim).await;
            if stored.processed || stored.is_revoked() {
                continue;
            }
            let result = self.enqueue(stored).await;
            if result.status == ClaimStatus::AwaitingRegistry {
                queued += 1;
            }
        }

        info!(queued, "Re-queued held claims");
        queued
    }

    /// Stop accepting work and wait for workers to drain the queue.
    pub async fn shutdown(self) {
        let Self { queue, workers, .. } = self;
        drop(queue);
        for joined in join_all(workers).await {
            if let Err(e) = joined {
                error!(error = %e, "Registry worker panicked");
            }
        }
        info!("Claim intake stopped");
    }

    /// Queue a stored claim for background verification.
    async fn enqueue(&self, mut claim: CarbonClaim) -> ClaimResult {
        match self.queue.try_send(claim.id.clone()) {
            Ok(()) => {
                debug!(claim_id = %claim.id, "Claim queued for registry verification");
                ClaimResult::from(&claim)
            }
            Err(e) => {
                let closed = matches!(e, mpsc::error::TrySendError::Closed(_));
                warn!(
                    claim_id = %claim.id,
                    closed,
                    "Registry verification queue unavailable, claim held for review"
                );
                claim.hold(HoldReason::QueueFull);
                let stored = self.service.store().save_unprocessed(claim).await;
                let result = ClaimResult::from(&stored);
                self.publish(&result);
                result
            }
        }
    }

    fn publish(&self, result: &ClaimResult) {
        // No subscribers is fine.
        let _ = self.events.send(result.clone());
    }
}

/// Worker task that verifies queued claims.
async fn verification_worker(
    worker_id: usize,
    service: Arc<VerificationService>,
    queue_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    events: broadcast::Sender<ClaimResult>,
) {
    debug!(worker_id, "Registry worker started");

    loop {
        let claim_id = {
            let mut rx = queue_rx.lock().await;
            match rx.recv().await {
                Some(id) => id,
                None => {
                    debug!(worker_id, "Registry worker shutting down (queue closed)");
                    return;
                }
            }
        };

        let store = service.store();
        let Some(claim) = store.get(&claim_id).await else {
            warn!(worker_id, claim_id = %claim_id, "Queued claim missing from store");
            continue;
        };

        let result = match service.process(claim.clone()).await {
            Ok(processed) => processed.result(),
            Err(e) => {
                if e.is_recoverable() {
                    warn!(worker_id, claim_id = %claim_id, error = %e, "Background verification rejected claim");
                } else {
                    error!(worker_id, claim_id = %claim_id, error = %e, "Background verification failed");
                }
                let mut rejected = claim;
                rejected.reject(e.to_string());
                ClaimResult::from(&store.save_unprocessed(rejected).await)
            }
        };

        debug!(
            worker_id,
            claim_id = %result.claim_id,
            status = ?result.status,
            "Background verification finished"
        );
        let _ = events.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::types::{ReasonCode, VerificationError};
    use offset_claims::{Evidence, OffsetSource};
    use offset_registry::{RegistryError, RegistryRecord, StaticRegistry};
    use std::time::Duration;
    use tokio_test::assert_err;

    fn config(worker_count: usize, queue_capacity: usize) -> VerifierConfig {
        let mut config = VerifierConfig::default();
        config.audit.random_sample_rate = 0.0;
        config.audit.sampling_seed = Some(3);
        config.registry.worker_count = worker_count;
        config.registry.queue_capacity = queue_capacity;
        config.registry.max_attempts = 1;
        config
    }

    fn intake_with(config: VerifierConfig, registry: StaticRegistry) -> (ClaimIntake, Arc<StaticRegistry>) {
        let registry = Arc::new(registry.with_record("VCS-1001", RegistryRecord::verified("VM0042", 40.0)));
        let service = VerificationService::builder()
            .config(config)
            .registry_client(registry.clone())
            .notifier(Arc::new(crate::notify::testing::RecordingNotifier::default()))
            .build()
            .unwrap();
        (ClaimIntake::start(Arc::new(service)), registry)
    }

    fn certified(id: &str, registry_id: &str) -> ClaimSubmission {
        ClaimSubmission::new("farm-9", 1000.0, OffsetSource::Agroforestry, VerificationTier::CertifiedProject)
            .with_claim_id(id)
            .with_registry_id(registry_id)
    }

    async fn next_for(rx: &mut broadcast::Receiver<ClaimResult>, claim_id: &str) -> ClaimResult {
        loop {
            let result = tokio::time::timeout(Duration::from_secs(30), rx.recv())
                .await
                .expect("no result in time")
                .expect("event stream closed");
            if result.claim_id == claim_id {
                return result;
            }
        }
    }

    #[tokio::test]
    async fn test_self_reported_processed_inline() {
        let (intake, _) = intake_with(config(1, 8), StaticRegistry::new());
        let submission = ClaimSubmission::new("farm-1", 20.0, OffsetSource::NoTill, VerificationTier::SelfReported);

        let result = intake.submit_claim(submission).await.unwrap();
        assert_eq!(result.status, ClaimStatus::Credited);
        assert!((result.effective_amount - 8.0).abs() < 1e-9);
        assert!(result.computation_digest.is_some());
    }

    #[tokio::test]
    async fn test_synchronous_rejections() {
        let (intake, _) = intake_with(config(1, 8), StaticRegistry::new());

        let missing_registry =
            ClaimSubmission::new("farm-1", 100.0, OffsetSource::CoverCrop, VerificationTier::CertifiedProject);
        let err = assert_err!(intake.submit_claim(missing_registry).await);
        assert_eq!(err.rejection().code, ReasonCode::EvidenceIncomplete);

        let negative = ClaimSubmission::new("farm-1", -1.0, OffsetSource::CoverCrop, VerificationTier::SelfReported);
        assert!(matches!(
            intake.submit_claim(negative).await,
            Err(VerificationError::InvalidClaim(_))
        ));
    }

    #[tokio::test]
    async fn test_certified_verified_in_background() {
        let (intake, _) = intake_with(config(2, 8), StaticRegistry::new());
        let mut rx = intake.subscribe();

        let result = intake.submit_claim(certified("cp-1", "VCS-1001")).await.unwrap();
        assert_eq!(result.status, ClaimStatus::AwaitingRegistry);
        assert_eq!(result.effective_amount, 0.0);

        let done = next_for(&mut rx, "cp-1").await;
        assert_eq!(done.status, ClaimStatus::Credited);
        assert!((done.effective_amount - 900.0).abs() < 1e-9);
        assert_eq!(intake.status("cp-1").await.unwrap(), done);

        // Resubmitting returns the stored result.
        let again = intake.submit_claim(certified("cp-1", "VCS-1001")).await.unwrap();
        assert_eq!(again.computation_digest, done.computation_digest);
    }

    #[tokio::test]
    async fn test_background_rejection_is_recorded() {
        let (intake, _) = intake_with(config(1, 8), StaticRegistry::new());
        let mut rx = intake.subscribe();

        intake.submit_claim(certified("cp-2", "VCS-4040")).await.unwrap();
        let done = next_for(&mut rx, "cp-2").await;
        assert_eq!(done.status, ClaimStatus::Rejected);
        assert_eq!(done.reason_code, Some(ReasonCode::RegistryVerificationFailed));
        assert_eq!(done.effective_amount, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_full_holds_then_retries() {
        let (intake, _) = intake_with(
            config(1, 1),
            StaticRegistry::new().with_delay(Duration::from_millis(50)),
        );
        let mut rx = intake.subscribe();

        let first = intake.submit_claim(certified("cp-a", "VCS-1001")).await.unwrap();
        let second = intake.submit_claim(certified("cp-b", "VCS-1001")).await.unwrap();
        assert_eq!(first.status, ClaimStatus::AwaitingRegistry);
        assert_eq!(second.status, ClaimStatus::HeldForReview);
        assert_eq!(second.reason_code, Some(ReasonCode::RegistryUnavailable));

        assert_eq!(next_for(&mut rx, "cp-a").await.status, ClaimStatus::Credited);

        assert_eq!(intake.retry_held_claims().await, 1);
        assert_eq!(next_for(&mut rx, "cp-b").await.status, ClaimStatus::Credited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_outage_holds_claim() {
        let (intake, registry) = intake_with(
            config(1, 8),
            StaticRegistry::new().with_failures([RegistryError::Transient("502".into())]),
        );
        let mut rx = intake.subscribe();

        intake.submit_claim(certified("cp-h", "VCS-1001")).await.unwrap();
        let held = next_for(&mut rx, "cp-h").await;
        assert_eq!(held.status, ClaimStatus::HeldForReview);
        assert_eq!(held.effective_amount, 0.0);
        assert_eq!(registry.call_count(), 1);

        assert_eq!(intake.retry_held_claims().await, 1);
        let done = next_for(&mut rx, "cp-h").await;
        assert_eq!(done.status, ClaimStatus::Credited);
    }

    #[tokio::test]
    async fn test_shutdown_drains_workers() {
        let (intake, _) = intake_with(config(2, 8), StaticRegistry::new());
        intake
            .submit_claim(
                certified("cp-s", "VCS-1001").with_evidence(Evidence::default().with_document("deed.pdf")),
            )
            .await
            .unwrap();
        let service = Arc::clone(&intake.service);

        intake.shutdown().await;
        let claim = service.store().get("cp-s").await.unwrap();
        assert!(claim.processed);
    }
}
