//! Audit scheduler and audit state machine.
//!
//! ```text
//! Pending ──schedule──▶ Scheduled ──begin──▶ InProgress ──complete──▶ Passed
//!                                                              └────▶ Failed (credit revoked)
//! ```

use chrono::Utc;
use offset_claims::{
    AuditFindings, AuditStatus, AuditType, AuditVerdict, CarbonClaim, VerificationAudit,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::sampler::AuditSampler;
use crate::config::AuditConfig;
use crate::notify::{AuditNotifier, NotificationDispatcher};
use crate::store::ClaimStore;
use crate::types::{Result, VerificationError};

/// Summary of one sampling run.
#[derive(Debug, Clone, Serialize)]
pub struct SamplingReport {
    /// Claims eligible for random audit
    pub eligible: usize,
    /// Audits opened by this run
    pub scheduled: Vec<VerificationAudit>,
    /// Sampled claims that could no longer be scheduled
    pub skipped: usize,
    /// Sampler seed
    pub seed: u64,
}

fn conflict(id: &str, detail: impl Into<String>) -> VerificationError {
    VerificationError::AuditStateConflict {
        id: id.to_string(),
        detail: detail.into(),
    }
}

/// Schedules audits and owns their transitions.
pub struct AuditScheduler {
    store: Arc<ClaimStore>,
    notifications: NotificationDispatcher,
    config: AuditConfig,
    sampler: AuditSampler,
    /// Held for the duration of a sampling run
    sampling_lock: Mutex<()>,
}

impl AuditScheduler {
    pub fn new(store: Arc<ClaimStore>, notifier: Arc<dyn AuditNotifier>, config: AuditConfig) -> Self {
        let sampler = AuditSampler::new(config.random_sample_rate, config.sampling_seed);
        Self {
            store,
            notifications: NotificationDispatcher::new(notifier),
            config,
            sampler,
            sampling_lock: Mutex::new(()),
        }
    }

    /// Schedule an audit for a processed claim.
    ///
    /// Only valid while the claim's audit status is `Pending`. The audit is
    /// due `due_days` from now.
    pub async fn schedule(&self, claim_id: &str, audit_type: AuditType) -> Result<VerificationAudit> {
        let due = Utc::now() + self.config.due_window();

        let (_, audit) = self
            .store
            .open_audit(claim_id, |claim| {
                if !claim.processed {
                    return Err(conflict(&claim.id, "claim has not been processed"));
                }
                if claim.audit_status != AuditStatus::Pending {
                    return Err(conflict(
                        &claim.id,
                        format!("cannot schedule from {}", claim.audit_status),
                    ));
                }
                claim.audit_status = AuditStatus::Scheduled;
                Ok(VerificationAudit::scheduled(claim.id.clone(), audit_type, due))
            })
            .await?;

        info!(
            audit_id = %audit.id,
            claim_id = %claim_id,
            audit_type = audit_type.as_str(),
            due = %due,
            "Audit scheduled"
        );
        self.notifications.audit_scheduled(claim_id.to_string(), due);
        Ok(audit)
    }

    /// Start a scheduled audit.
    pub async fn begin(&self, audit_id: &str) -> Result<VerificationAudit> {
        let now = Utc::now();
        let (_, audit) = self
            .store
            .update_audit(audit_id, |claim, audit| {
                if !audit.is_open() || audit.is_started() || claim.audit_status != AuditStatus::Scheduled {
                    return Err(conflict(
                        &audit.id,
                        format!("cannot begin from {}", claim.audit_status),
                    ));
                }
                audit.started_at = Some(now);
                claim.audit_status = AuditStatus::InProgress;
                Ok(())
            })
            .await?;

        info!(audit_id = %audit.id, claim_id = %audit.claim_ref, "Audit started");
        Ok(audit)
    }

    /// Complete an in-progress audit.
    ///
    /// `Failed` zeroes the claim's trust score and effective amount for
    /// good. `Passed` leaves the computed values as they are.
    pub async fn complete(
        &self,
        audit_id: &str,
        verdict: AuditVerdict,
        findings: AuditFindings,
        corrective_actions: Option<String>,
    ) -> Result<VerificationAudit> {
        let now = Utc::now();
        let actions = corrective_actions.clone();
        let (claim, audit) = self
            .store
            .update_audit(audit_id, move |claim, audit| {
                if !audit.is_open() || !audit.is_started() || claim.audit_status != AuditStatus::InProgress {
                    return Err(conflict(
                        &audit.id,
                        format!("cannot complete from {}", claim.audit_status),
                    ));
                }
                audit.result = verdict.into();
                audit.completed_at = Some(now);
                audit.findings = Some(findings);
                audit.corrective_actions = actions;
                match verdict {
                    AuditVerdict::Passed => claim.audit_status = AuditStatus::Passed,
                    AuditVerdict::Failed => claim.revoke(),
                }
                Ok(())
            })
            .await?;

        match verdict {
            AuditVerdict::Passed => info!(
                audit_id = %audit.id,
                claim_id = %claim.id,
                "Audit passed"
            ),
            AuditVerdict::Failed => warn!(
                audit_id = %audit.id,
                claim_id = %claim.id,
                unconfirmed = ?audit.findings.as_ref().map(|f| f.unconfirmed()),
                "Audit failed, credit revoked"
            ),
        }
        self.notifications
            .audit_result(claim.id.clone(), verdict, corrective_actions);
        Ok(audit)
    }

    fn is_sampling_candidate(&self, claim: &CarbonClaim, cutoff: chrono::DateTime<Utc>) -> bool {
        claim.processed
            && claim.audit_status == AuditStatus::Pending
            && !claim.risk.as_ref().is_some_and(|r| r.is_flagged())
            && claim.created_at <= cutoff
    }

    /// Schedule random audits over eligible claims.
    ///
    /// Eligible claims are processed, unflagged, `Pending`, and older than
    /// `random_audit_min_age_days`. They are visited oldest first and each
    /// is drawn with probability `random_sample_rate`. Overlapping runs are
    /// refused with `SamplingInProgress`.
    pub async fn run_periodic_sampling(&self) -> Result<SamplingReport> {
        let _run = self
            .sampling_lock
            .try_lock()
            .map_err(|_| VerificationError::SamplingInProgress)?;

        let cutoff = Utc::now() - self.config.min_age();
        let candidates: Vec<CarbonClaim> = self
            .store
            .all_claims()
            .await
            .into_iter()
            .filter(|c| self.is_sampling_candidate(c, cutoff))
            .collect();

        let mut report = SamplingReport {
            eligible: candidates.len(),
            scheduled: Vec::new(),
            skipped: 0,
            seed: self.sampler.seed(),
        };

        for claim in &candidates {
            if !self.sampler.draw() {
                continue;
            }
            match self.schedule(&claim.id, AuditType::Random).await {
                Ok(audit) => report.scheduled.push(audit),
                Err(e @ VerificationError::AuditStateConflict { .. }) => {
                    // Another path opened an audit since the candidate list was read.
                    warn!(claim_id = %claim.id, error = %e, "Skipping sampled claim");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            eligible = report.eligible,
            scheduled = report.scheduled.len(),
            skipped = report.skipped,
            rate = self.sampler.rate(),
            seed = report.seed,
            "Periodic audit sampling complete"
        );
        Ok(report)
    }

    /// Run sampling every `interval` on a background task.
    pub fn spawn_periodic_sampling(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.run_periodic_sampling().await {
                    Ok(_) => {}
                    Err(VerificationError::SamplingInProgress) => {
                        warn!("Previous sampling run still active, skipping tick");
                    }
                    Err(e) => error!(error = %e, "Periodic audit sampling failed"),
                }
            }
        })
    }

    /// Sampler in use.
    pub fn sampler(&self) -> &AuditSampler {
        &self.sampler
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }
}
