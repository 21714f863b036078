//! Verification service: the claim processing pipeline.
//!
//! `process` runs, in order and stopping at the first rejection:
//!
//! 1. evidence requirements
//! 2. cumulative cap reservation (self-reported only)
//! 3. anti-gaming checks (advisory)
//! 4. registry verification (certified projects only)
//! 5. trust weights and effective amount, written exactly once
//! 6. risk-triggered or random audit scheduling
//!
//! Steps 1 to 5 hold a per-submitter lock, so the anti-gaming history a
//! claim is judged against includes every earlier claim from the same
//! submitter.

use chrono::Utc;
use dashmap::DashMap;
use offset_claims::{
    AuditType, CarbonClaim, EvidenceValidator, HoldReason, Period, RegistryAttestation,
    TrustScoreTable,
};
use offset_registry::{HttpRegistryClient, RegistryClient, RegistryOutcome, RegistryVerificationAdapter};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::anti_gaming::{AntiGamingEngine, EmissionsSource, InMemoryEmissions};
use crate::audit::{AuditSampler, AuditScheduler};
use crate::config::VerifierConfig;
use crate::ledger::{CumulativeLimitGuard, Reservation};
use crate::notify::{AuditNotifier, TracingNotifier};
use crate::store::{ClaimStore, Commit};
use crate::types::{
    ProcessOutcome, ProcessedClaim, RegistryFailure, Result, VerificationError,
};

/// Registry credits are tonnes; claims are kilograms.
const KG_PER_CREDIT: f64 = 1000.0;

/// Orchestrates claim verification.
pub struct VerificationService {
    config: VerifierConfig,
    store: Arc<ClaimStore>,
    evidence: EvidenceValidator,
    limits: CumulativeLimitGuard,
    anti_gaming: AntiGamingEngine,
    registry: RegistryVerificationAdapter,
    scheduler: Arc<AuditScheduler>,
    sampler: AuditSampler,
    /// Serializes processing per submitter
    submitters: DashMap<String, Arc<Mutex<()>>>,
}

impl VerificationService {
    /// Create a builder.
    pub fn builder() -> VerificationServiceBuilder {
        VerificationServiceBuilder::new()
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ClaimStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<AuditScheduler> {
        &self.scheduler
    }

    pub fn limits(&self) -> &CumulativeLimitGuard {
        &self.limits
    }

    pub fn registry(&self) -> &RegistryVerificationAdapter {
        &self.registry
    }

    fn submitter_lock(&self, submitter_ref: &str) -> Arc<Mutex<()>> {
        // Clone the Arc so the DashMap shard lock is released before awaiting.
        self.submitters
            .entry(submitter_ref.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Check the claimed amount and evidence without side effects.
    pub fn validate(&self, claim: &CarbonClaim) -> Result<()> {
        claim.validate_amount()?;
        if let Err(e) = self.evidence.require(claim) {
            warn!(
                claim_id = %claim.id,
                submitter = %claim.submitter_ref,
                error = %e,
                "Claim rejected: evidence incomplete"
            );
            return Err(e.into());
        }
        Ok(())
    }

    /// Run the verification pipeline on a claim.
    ///
    /// A claim that is already processed (or revoked) is returned as stored,
    /// with no step re-run.
    pub async fn process(&self, claim: CarbonClaim) -> Result<ProcessedClaim> {
        if let Some(stored) = self.store.get(&claim.id).await {
            if stored.processed || stored.is_revoked() {
                debug!(claim_id = %stored.id, "Claim already processed, returning stored result");
                return Ok(replayed(stored));
            }
        }
        if claim.processed || claim.is_revoked() {
            let stored = match self.store.commit(claim).await {
                Commit::Stored(c) | Commit::Existing(c) => c,
            };
            return Ok(replayed(stored));
        }

        let mut claim = claim;
        let submitter = self.submitter_lock(&claim.submitter_ref);
        let serialized = submitter.lock().await;

        // 1. Evidence
        self.validate(&claim)?;

        // 2. Cumulative caps
        if claim.verification_tier.is_capped() {
            let period = Period::containing(claim.created_at);
            let reservation = self
                .limits
                .reserve(&claim.submitter_ref, period, &claim.id, claim.claimed_amount)
                .await;
            if let Reservation::Rejected {
                window,
                current_total,
                cap,
            } = reservation
            {
                return Err(VerificationError::LimitExceeded {
                    window,
                    period,
                    current_total,
                    cap,
                    requested: claim.claimed_amount,
                });
            }
        }

        // 3. Anti-gaming
        let history: Vec<CarbonClaim> = self
            .store
            .claims_for_submitter(&claim.submitter_ref)
            .await
            .into_iter()
            .filter(|c| c.id != claim.id)
            .collect();
        let risk = self.anti_gaming.evaluate(&claim, &history).await;
        let flagged = risk.is_flagged();
        claim.risk = Some(risk);

        // 4. Registry
        if claim.verification_tier.requires_registry() {
            if let Some(reason) = self.verify_registry(&mut claim).await? {
                return Ok(self.hold(claim, reason).await);
            }
        }

        // 5. Trust weights
        let weights = TrustScoreTable::lookup(claim.verification_tier);
        claim.apply_weights(weights, Utc::now())?;
        let claim = match self.store.commit(claim).await {
            Commit::Stored(c) => c,
            Commit::Existing(c) => return Ok(replayed(c)),
        };
        drop(serialized);

        info!(
            claim_id = %claim.id,
            submitter = %claim.submitter_ref,
            tier = claim.verification_tier.as_str(),
            claimed_amount = claim.claimed_amount,
            trust_score = claim.trust_score,
            buffer_deduction = claim.buffer_deduction,
            effective_amount = claim.effective_amount,
            "Claim processed"
        );

        // 6. Audit hand-off
        let audit_type = if flagged {
            Some(AuditType::RiskTriggered)
        } else if self.sampler.draw() {
            Some(AuditType::Random)
        } else {
            None
        };

        match audit_type {
            Some(audit_type) => self.hand_off_audit(claim, audit_type).await,
            None => Ok(ProcessedClaim {
                claim,
                outcome: ProcessOutcome::Credited,
                scheduled_audit: None,
            }),
        }
    }

    /// Schedule an audit for a freshly credited claim.
    ///
    /// The claim is already committed, so an audit opened by another path
    /// in the meantime leaves it credited with no audit of its own.
    async fn hand_off_audit(&self, claim: CarbonClaim, audit_type: AuditType) -> Result<ProcessedClaim> {
        let scheduled_audit = match self.scheduler.schedule(&claim.id, audit_type).await {
            Ok(audit) => Some(audit),
            Err(e @ VerificationError::AuditStateConflict { .. }) => {
                warn!(
                    claim_id = %claim.id,
                    audit_type = audit_type.as_str(),
                    error = %e,
                    "Audit not scheduled, claim already has one"
                );
                None
            }
            Err(e) => return Err(e),
        };
        let claim = self.store.get(&claim.id).await.unwrap_or(claim);
        Ok(ProcessedClaim {
            claim,
            outcome: ProcessOutcome::Credited,
            scheduled_audit,
        })
    }

    /// Confirm the claim's project with its registry.
    ///
    /// Returns a hold reason when the registry could not give an answer.
    async fn verify_registry(&self, claim: &mut CarbonClaim) -> Result<Option<HoldReason>> {
        let registry_id = claim
            .registry_verification_id
            .clone()
            .unwrap_or_default();

        let rejected = |reason: RegistryFailure| -> Result<Option<HoldReason>> {
            warn!(
                claim_id = %claim.id,
                registry_id = %registry_id,
                reason = %reason,
                "Claim rejected by registry verification"
            );
            Err(VerificationError::RegistryVerificationFailed {
                registry_id: registry_id.clone(),
                reason,
            })
        };

        let outcome = self.registry.verify(&registry_id).await;
        debug!(
            claim_id = %claim.id,
            registry_id = %registry_id,
            outcome = outcome.as_str(),
            definitive = outcome.is_definitive(),
            "Registry outcome"
        );

        match outcome {
            RegistryOutcome::Verified(record) => {
                let available_kg = record.credits_available * KG_PER_CREDIT;
                if available_kg < claim.claimed_amount {
                    return rejected(RegistryFailure::InsufficientCredits {
                        available_kg,
                        claimed_kg: claim.claimed_amount,
                    });
                }
                claim.registry_attestation = Some(RegistryAttestation {
                    registry_id: registry_id.clone(),
                    methodology: record.methodology,
                    credits_available: record.credits_available,
                    verifying_body: record.verifying_body,
                    verified_at: Utc::now(),
                });
                Ok(None)
            }
            RegistryOutcome::NotFound => rejected(RegistryFailure::NotFound),
            RegistryOutcome::Unrecognized => rejected(RegistryFailure::UnrecognizedRegistry),
            RegistryOutcome::TransientError { detail, .. } => {
                Ok(Some(HoldReason::RegistryTransient { detail }))
            }
            RegistryOutcome::TimedOut { .. } => Ok(Some(HoldReason::RegistryTimeout)),
            RegistryOutcome::Unavailable => Ok(Some(HoldReason::RegistryUnavailable)),
        }
    }

    /// Hold a claim for manual review without crediting it.
    async fn hold(&self, mut claim: CarbonClaim, reason: HoldReason) -> ProcessedClaim {
        warn!(
            claim_id = %claim.id,
            registry_id = claim.registry_verification_id.as_deref().unwrap_or(""),
            reason = %reason.description(),
            "Registry unavailable, claim held for manual review"
        );
        claim.hold(reason.clone());
        let stored = self.store.save_unprocessed(claim).await;
        if stored.processed {
            return replayed(stored);
        }
        ProcessedClaim {
            claim: stored,
            outcome: ProcessOutcome::Held { reason },
            scheduled_audit: None,
        }
    }
}

fn replayed(claim: CarbonClaim) -> ProcessedClaim {
    ProcessedClaim {
        claim,
        outcome: ProcessOutcome::Replayed,
        scheduled_audit: None,
    }
}

/// Builder for [`VerificationService`].
pub struct VerificationServiceBuilder {
    config: VerifierConfig,
    store: Option<Arc<ClaimStore>>,
    registry_client: Option<Arc<dyn RegistryClient>>,
    emissions: Option<Arc<dyn EmissionsSource>>,
    notifier: Option<Arc<dyn AuditNotifier>>,
}

impl VerificationServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: VerifierConfig::default(),
            store: None,
            registry_client: None,
            emissions: None,
            notifier: None,
        }
    }

    pub fn config(mut self, config: VerifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<ClaimStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Registry client; defaults to HTTP against the configured endpoints.
    pub fn registry_client(mut self, client: Arc<dyn RegistryClient>) -> Self {
        self.registry_client = Some(client);
        self
    }

    /// Emissions source; defaults to an empty in-memory source.
    pub fn emissions(mut self, emissions: Arc<dyn EmissionsSource>) -> Self {
        self.emissions = Some(emissions);
        self
    }

    /// Notifier; defaults to [`TracingNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn AuditNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the service.
    pub fn build(self) -> Result<VerificationService> {
        let config = self.config;
        config.validate()?;

        let registry_client: Arc<dyn RegistryClient> = match self.registry_client {
            Some(client) => client,
            None => {
                let mut client = HttpRegistryClient::new(
                    config.registry.endpoints.clone(),
                    config.registry.request_timeout(),
                )
                .map_err(|e| VerificationError::Config(e.to_string()))?;
                if let Some(key) = &config.registry.api_key {
                    client = client.with_api_key(key.clone());
                }
                Arc::new(client)
            }
        };
        let emissions = self
            .emissions
            .unwrap_or_else(|| Arc::new(InMemoryEmissions::new()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));
        let store = self.store.unwrap_or_default();

        let scheduler = Arc::new(AuditScheduler::new(
            Arc::clone(&store),
            notifier,
            config.audit.clone(),
        ));

        Ok(VerificationService {
            evidence: EvidenceValidator::with_threshold(config.evidence.self_reported_threshold_kg),
            limits: CumulativeLimitGuard::new(config.limits.clone()),
            anti_gaming: AntiGamingEngine::new(&config.anti_gaming, emissions),
            registry: RegistryVerificationAdapter::new(registry_client, &config.registry.settings()),
            sampler: AuditSampler::new(config.audit.random_sample_rate, config.audit.sampling_seed),
            scheduler,
            store,
            config,
            submitters: DashMap::new(),
        })
    }
}

impl Default for VerificationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
