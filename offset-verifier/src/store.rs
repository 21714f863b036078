//! In-memory persistence for claims and audits.
//!
//! Claims are never deleted. A claim's computed values are written once by
//! [`ClaimStore::commit`]; afterwards only audit transitions touch it.
//! At most one open audit exists per claim.

use offset_claims::{CarbonClaim, VerificationAudit};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{Result, VerificationError};

/// Outcome of committing a processed claim.
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    /// This call wrote the values
    Stored(CarbonClaim),
    /// Values were already committed; stored claim returned unchanged
    Existing(CarbonClaim),
}

/// Claim and audit store.
#[derive(Default)]
pub struct ClaimStore {
    claims: RwLock<HashMap<String, CarbonClaim>>,
    audits: RwLock<HashMap<String, VerificationAudit>>,
}

fn is_final(claim: &CarbonClaim) -> bool {
    claim.processed || claim.is_revoked()
}

impl ClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new claim. Fails if the id is taken.
    pub async fn insert(&self, claim: CarbonClaim) -> Result<()> {
        let mut claims = self.claims.write().await;
        if claims.contains_key(&claim.id) {
            return Err(VerificationError::InvalidClaim(format!(
                "claim id {} already exists",
                claim.id
            )));
        }
        claims.insert(claim.id.clone(), claim);
        Ok(())
    }

    /// Write an unprocessed claim (awaiting, held or rejected).
    ///
    /// A claim that is already processed or revoked is left as is and the
    /// stored copy is returned.
    pub async fn save_unprocessed(&self, claim: CarbonClaim) -> CarbonClaim {
        let mut claims = self.claims.write().await;
        if let Some(existing) = claims.get(&claim.id) {
            if is_final(existing) {
                return existing.clone();
            }
        }
        claims.insert(claim.id.clone(), claim.clone());
        claim
    }

    /// Write a processed claim exactly once.
    pub async fn commit(&self, claim: CarbonClaim) -> Commit {
        let mut claims = self.claims.write().await;
        if let Some(existing) = claims.get(&claim.id) {
            if is_final(existing) {
                debug!(claim_id = %claim.id, "Claim already committed");
                return Commit::Existing(existing.clone());
            }
        }
        claims.insert(claim.id.clone(), claim.clone());
        Commit::Stored(claim)
    }

    pub async fn get(&self, claim_id: &str) -> Option<CarbonClaim> {
        self.claims.read().await.get(claim_id).cloned()
    }

    /// Every claim, oldest first.
    pub async fn all_claims(&self) -> Vec<CarbonClaim> {
        let mut claims: Vec<CarbonClaim> = self.claims.read().await.values().cloned().collect();
        sort_claims(&mut claims);
        claims
    }

    /// Claims from one submitter, oldest first.
    pub async fn claims_for_submitter(&self, submitter_ref: &str) -> Vec<CarbonClaim> {
        let mut claims: Vec<CarbonClaim> = self
            .claims
            .read()
            .await
            .values()
            .filter(|c| c.submitter_ref == submitter_ref)
            .cloned()
            .collect();
        sort_claims(&mut claims);
        claims
    }

    /// Claims held for manual review, oldest first.
    pub async fn held_for_review(&self) -> Vec<CarbonClaim> {
        let mut claims: Vec<CarbonClaim> = self
            .claims
            .read()
            .await
            .values()
            .filter(|c| !is_final(c) && c.review.is_held())
            .cloned()
            .collect();
        sort_claims(&mut claims);
        claims
    }

    pub async fn get_audit(&self, audit_id: &str) -> Option<VerificationAudit> {
        self.audits.read().await.get(audit_id).cloned()
    }

    /// Audits of a claim, oldest due date first.
    pub async fn audits_for_claim(&self, claim_id: &str) -> Vec<VerificationAudit> {
        let mut audits: Vec<VerificationAudit> = self
            .audits
            .read()
            .await
            .values()
            .filter(|a| a.claim_ref == claim_id)
            .cloned()
            .collect();
        audits.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then_with(|| a.id.cmp(&b.id)));
        audits
    }

    /// The claim's open audit, if any.
    pub async fn open_audit_for_claim(&self, claim_id: &str) -> Option<VerificationAudit> {
        self.audits
            .read()
            .await
            .values()
            .find(|a| a.claim_ref == claim_id && a.is_open())
            .cloned()
    }

    /// Open an audit on a claim.
    ///
    /// `open` mutates a copy of the claim and returns the new audit; both are
    /// written only if it succeeds. Fails if the claim already has an open
    /// audit.
    pub async fn open_audit<F>(&self, claim_id: &str, open: F) -> Result<(CarbonClaim, VerificationAudit)>
    where
        F: FnOnce(&mut CarbonClaim) -> Result<VerificationAudit>,
    {
        let mut claims = self.claims.write().await;
        let mut audits = self.audits.write().await;

        let stored = claims
            .get(claim_id)
            .ok_or_else(|| VerificationError::ClaimNotFound(claim_id.to_string()))?;

        if let Some(open_audit) = audits.values().find(|a| a.claim_ref == claim_id && a.is_open()) {
            return Err(VerificationError::AuditStateConflict {
                id: claim_id.to_string(),
                detail: format!("audit {} is already open", open_audit.id),
            });
        }

        let mut claim = stored.clone();
        let audit = open(&mut claim)?;

        claims.insert(claim.id.clone(), claim.clone());
        audits.insert(audit.id.clone(), audit.clone());
        Ok((claim, audit))
    }

    /// Apply a transition to an audit and its claim.
    ///
    /// `transition` mutates copies; both are written only if it succeeds.
    pub async fn update_audit<F>(&self, audit_id: &str, transition: F) -> Result<(CarbonClaim, VerificationAudit)>
    where
        F: FnOnce(&mut CarbonClaim, &mut VerificationAudit) -> Result<()>,
    {
        let mut claims = self.claims.write().await;
        let mut audits = self.audits.write().await;

        let mut audit = audits
            .get(audit_id)
            .cloned()
            .ok_or_else(|| VerificationError::AuditNotFound(audit_id.to_string()))?;
        let mut claim = claims
            .get(&audit.claim_ref)
            .cloned()
            .ok_or_else(|| VerificationError::ClaimNotFound(audit.claim_ref.clone()))?;

        transition(&mut claim, &mut audit)?;

        claims.insert(claim.id.clone(), claim.clone());
        audits.insert(audit.id.clone(), audit.clone());
        Ok((claim, audit))
    }
}

fn sort_claims(claims: &mut [CarbonClaim]) {
    claims.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use offset_claims::{AuditType, HoldReason, OffsetSource, TrustScoreTable, VerificationTier};

    fn claim(id: &str) -> CarbonClaim {
        CarbonClaim::new("farm-1", 50.0, 2025, OffsetSource::NoTill, VerificationTier::SelfReported).with_id(id)
    }

    fn processed(id: &str) -> CarbonClaim {
        let mut c = claim(id);
        c.apply_weights(TrustScoreTable::lookup(c.verification_tier), Utc::now())
            .unwrap();
        c
    }

    #[tokio::test]
    async fn test_commit_once() {
        let store = ClaimStore::new();
        let first = processed("c1");
        assert!(matches!(store.commit(first.clone()).await, Commit::Stored(_)));

        let mut second = processed("c1");
        second.effective_amount = 999.0;
        assert_eq!(store.commit(second).await, Commit::Existing(first.clone()));
        assert_eq!(store.get("c1").await, Some(first));
    }

    #[tokio::test]
    async fn test_save_unprocessed_does_not_overwrite() {
        let store = ClaimStore::new();
        store.commit(processed("c1")).await;

        let mut held = claim("c1");
        held.hold(HoldReason::RegistryUnavailable);
        let kept = store.save_unprocessed(held).await;
        assert!(kept.processed);
        assert!(store.held_for_review().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert() {
        let store = ClaimStore::new();
        store.insert(claim("c1")).await.unwrap();
        assert!(store.insert(claim("c1")).await.is_err());
    }

    #[tokio::test]
    async fn test_single_open_audit() {
        let store = ClaimStore::new();
        store.commit(processed("c1")).await;

        let open = |c: &mut CarbonClaim| Ok(VerificationAudit::scheduled(c.id.clone(), AuditType::Complaint, Utc::now()));
        let (_, audit) = store.open_audit("c1", open).await.unwrap();

        let err = store.open_audit("c1", open).await.unwrap_err();
        assert!(matches!(err, VerificationError::AuditStateConflict { .. }));
        assert_eq!(store.audits_for_claim("c1").await.len(), 1);
        assert_eq!(store.open_audit_for_claim("c1").await.map(|a| a.id), Some(audit.id));

        assert!(matches!(
            store.open_audit("missing", open).await,
            Err(VerificationError::ClaimNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_transition_writes_nothing() {
        let store = ClaimStore::new();
        store.commit(processed("c1")).await;
        let (_, audit) = store
            .open_audit("c1", |c| Ok(VerificationAudit::scheduled(c.id.clone(), AuditType::Random, Utc::now())))
            .await
            .unwrap();

        let result = store
            .update_audit(&audit.id, |claim, audit| {
                claim.revoke();
                audit.corrective_actions = Some("x".into());
                Err(VerificationError::AuditStateConflict {
                    id: audit.id.clone(),
                    detail: "rejected".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert!(!store.get("c1").await.unwrap().is_revoked());
        assert!(store.get_audit(&audit.id).await.unwrap().corrective_actions.is_none());
    }
}
