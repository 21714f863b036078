//! Core types for the verification engine.

use chrono::{DateTime, Datelike, Utc};
use offset_claims::{
    AuditStatus, CarbonClaim, ClaimError, Evidence, HoldReason, MissingRequirement, OffsetSource,
    Period, ReviewState, RiskLevel, VerificationAudit, VerificationTier,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cap window a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapWindow {
    Monthly,
    Annual,
}

impl CapWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }
}

impl fmt::Display for CapWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a registry id could not be accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryFailure {
    /// Registry has no verified project under this id
    NotFound,
    /// Id prefix matches no supported registry
    UnrecognizedRegistry,
    /// Project cannot cover the claimed amount
    InsufficientCredits { available_kg: f64, claimed_kg: f64 },
}

impl fmt::Display for RegistryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("project not found or not verified"),
            Self::UnrecognizedRegistry => f.write_str("unrecognized registry"),
            Self::InsufficientCredits {
                available_kg,
                claimed_kg,
            } => write!(
                f,
                "insufficient credits: {} kg available, {} kg claimed",
                available_kg, claimed_kg
            ),
        }
    }
}

/// Errors raised by the verification engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerificationError {
    /// Evidence does not satisfy the tier's minimum requirements
    #[error("Evidence incomplete, missing: {}", format_missing(.missing))]
    EvidenceIncomplete { missing: Vec<MissingRequirement> },

    /// Self-reported cap would be exceeded
    #[error(
        "Self-reported {window} cap exceeded for {period}: {current_total} kg reserved, \
         {requested} kg requested, cap {cap} kg"
    )]
    LimitExceeded {
        window: CapWindow,
        period: Period,
        current_total: f64,
        cap: f64,
        requested: f64,
    },

    /// Registry rejected the project id
    #[error("Registry verification failed for {registry_id}: {reason}")]
    RegistryVerificationFailed {
        registry_id: String,
        reason: RegistryFailure,
    },

    /// Tier outside the closed set
    #[error("Unknown verification tier: {0}")]
    UnknownTier(String),

    /// Claim input is malformed
    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    /// Audit or claim is not in the state the transition requires
    #[error("Audit state conflict for {id}: {detail}")]
    AuditStateConflict { id: String, detail: String },

    #[error("Claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Audit not found: {0}")]
    AuditNotFound(String),

    /// Another sampling run holds the run-lock
    #[error("Audit sampling already in progress")]
    SamplingInProgress,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_missing(missing: &[MissingRequirement]) -> String {
    missing
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ClaimError> for VerificationError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::UnknownTier(tier) => Self::UnknownTier(tier),
            ClaimError::EvidenceIncomplete { missing } => Self::EvidenceIncomplete { missing },
            ClaimError::InvalidAmount(amount) => {
                Self::InvalidClaim(format!("claimed amount must be a finite number >= 0, got {}", amount))
            }
            ClaimError::AlreadyProcessed(id) => Self::AuditStateConflict {
                id,
                detail: "claim already processed".to_string(),
            },
            ClaimError::Revoked(id) => Self::AuditStateConflict {
                id,
                detail: "claim revoked by a failed audit".to_string(),
            },
        }
    }
}

impl VerificationError {
    /// Stable machine code.
    pub fn code(&self) -> ReasonCode {
        match self {
            Self::EvidenceIncomplete { .. } => ReasonCode::EvidenceIncomplete,
            Self::LimitExceeded { .. } => ReasonCode::LimitExceeded,
            Self::RegistryVerificationFailed { .. } => ReasonCode::RegistryVerificationFailed,
            Self::UnknownTier(_) => ReasonCode::UnknownTier,
            Self::InvalidClaim(_) | Self::Config(_) => ReasonCode::InvalidClaim,
            Self::AuditStateConflict { .. } | Self::SamplingInProgress => ReasonCode::AuditStateConflict,
            Self::ClaimNotFound(_) | Self::AuditNotFound(_) => ReasonCode::NotFound,
        }
    }

    /// The caller can fix the submission and try again.
    ///
    /// `UnknownTier` and `AuditStateConflict` are programming or data
    /// errors and must be surfaced, never retried away.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EvidenceIncomplete { .. }
                | Self::LimitExceeded { .. }
                | Self::RegistryVerificationFailed { .. }
                | Self::InvalidClaim(_)
                | Self::SamplingInProgress
        )
    }

    /// Caller-facing rejection.
    pub fn rejection(&self) -> Rejection {
        let mut rejection = Rejection {
            code: self.code(),
            message: self.to_string(),
            missing: Vec::new(),
            current_total: None,
            cap: None,
        };
        match self {
            Self::EvidenceIncomplete { missing } => rejection.missing = missing.clone(),
            Self::LimitExceeded {
                current_total, cap, ..
            } => {
                rejection.current_total = Some(*current_total);
                rejection.cap = Some(*cap);
            }
            _ => {}
        }
        rejection
    }
}

pub type Result<T> = std::result::Result<T, VerificationError>;

/// Machine-readable reason for a rejection or hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    EvidenceIncomplete,
    LimitExceeded,
    RegistryVerificationFailed,
    RegistryUnavailable,
    UnknownTier,
    InvalidClaim,
    AuditStateConflict,
    NotFound,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvidenceIncomplete => "evidence_incomplete",
            Self::LimitExceeded => "limit_exceeded",
            Self::RegistryVerificationFailed => "registry_verification_failed",
            Self::RegistryUnavailable => "registry_unavailable",
            Self::UnknownTier => "unknown_tier",
            Self::InvalidClaim => "invalid_claim",
            Self::AuditStateConflict => "audit_state_conflict",
            Self::NotFound => "not_found",
        }
    }
}

/// Why a submission was refused, with remediation detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: ReasonCode,
    pub message: String,
    /// Evidence requirements that were not met
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<MissingRequirement>,
    /// Cumulative total already reserved (kg CO2e)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_total: Option<f64>,
    /// Cap that would have been exceeded (kg CO2e)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<f64>,
}

/// Inbound claim submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSubmission {
    /// Client-supplied id, generated when absent
    #[serde(default)]
    pub claim_id: Option<String>,
    pub submitter_ref: String,
    pub claimed_amount: f64,
    /// Offset year, defaults to the submission year
    #[serde(default)]
    pub year: Option<i32>,
    pub source: OffsetSource,
    pub tier: VerificationTier,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default)]
    pub registry_id: Option<String>,
    #[serde(default)]
    pub acreage: Option<f64>,
    /// Submission time, defaults to now
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl ClaimSubmission {
    /// Create a submission.
    pub fn new(
        submitter_ref: impl Into<String>,
        claimed_amount: f64,
        source: OffsetSource,
        tier: VerificationTier,
    ) -> Self {
        Self {
            claim_id: None,
            submitter_ref: submitter_ref.into(),
            claimed_amount,
            year: None,
            source,
            tier,
            evidence: Evidence::default(),
            registry_id: None,
            acreage: None,
            submitted_at: None,
        }
    }

    pub fn with_claim_id(mut self, id: impl Into<String>) -> Self {
        self.claim_id = Some(id.into());
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_registry_id(mut self, registry_id: impl Into<String>) -> Self {
        self.registry_id = Some(registry_id.into());
        self
    }

    pub fn with_acreage(mut self, acreage: f64) -> Self {
        self.acreage = Some(acreage);
        self
    }

    pub fn with_submitted_at(mut self, at: DateTime<Utc>) -> Self {
        self.submitted_at = Some(at);
        self
    }

    /// Build the claim record.
    pub fn into_claim(self) -> Result<CarbonClaim> {
        if self.submitter_ref.trim().is_empty() {
            return Err(VerificationError::InvalidClaim(
                "submitter_ref must not be empty".to_string(),
            ));
        }
        if let Some(acreage) = self.acreage {
            if !(acreage.is_finite() && acreage > 0.0) {
                return Err(VerificationError::InvalidClaim(format!(
                    "acreage must be a finite number > 0, got {}",
                    acreage
                )));
            }
        }

        let submitted_at = self.submitted_at.unwrap_or_else(Utc::now);
        let year = self.year.unwrap_or_else(|| submitted_at.year());
        let mut claim = CarbonClaim::new(
            self.submitter_ref,
            self.claimed_amount,
            year,
            self.source,
            self.tier,
        )
        .with_evidence(self.evidence)
        .with_created_at(submitted_at);

        if let Some(id) = self.claim_id {
            claim = claim.with_id(id);
        }
        if let Some(registry_id) = self.registry_id {
            claim = claim.with_registry_id(registry_id);
        }
        if let Some(acreage) = self.acreage {
            claim = claim.with_acreage(acreage);
        }

        claim.validate_amount()?;
        Ok(claim)
    }
}

/// Where a claim stands for the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Values computed and credited
    Credited,
    /// Waiting on background registry verification
    AwaitingRegistry,
    /// Held for manual review, not credited
    HeldForReview,
    /// Registry rejected the claim after submission
    Rejected,
    /// Credit revoked by a failed audit
    Revoked,
}

/// Synchronous answer to a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimResult {
    pub claim_id: String,
    pub submitter_ref: String,
    pub status: ClaimStatus,
    pub trust_score: f64,
    pub buffer_deduction: f64,
    pub effective_amount: f64,
    pub audit_status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    /// Why the claim is held or rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computation_digest: Option<String>,
}

impl From<&CarbonClaim> for ClaimResult {
    fn from(claim: &CarbonClaim) -> Self {
        let (status, reason_code, detail) = if claim.is_revoked() {
            (ClaimStatus::Revoked, None, None)
        } else {
            match &claim.review {
                ReviewState::ManualReview { reason } => (
                    ClaimStatus::HeldForReview,
                    Some(ReasonCode::RegistryUnavailable),
                    Some(reason.description()),
                ),
                ReviewState::Rejected { reason } => (
                    ClaimStatus::Rejected,
                    Some(ReasonCode::RegistryVerificationFailed),
                    Some(reason.clone()),
                ),
                ReviewState::AwaitingRegistry => (ClaimStatus::AwaitingRegistry, None, None),
                ReviewState::Clear if claim.processed => (ClaimStatus::Credited, None, None),
                ReviewState::Clear => (ClaimStatus::AwaitingRegistry, None, None),
            }
        };

        Self {
            claim_id: claim.id.clone(),
            submitter_ref: claim.submitter_ref.clone(),
            status,
            trust_score: claim.trust_score,
            buffer_deduction: claim.buffer_deduction,
            effective_amount: claim.effective_amount,
            audit_status: claim.audit_status,
            risk_level: claim.risk.as_ref().map(|r| r.level),
            reason_code,
            detail,
            computation_digest: claim.computation_digest.clone(),
        }
    }
}

/// How `process` ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Values computed on this call
    Credited,
    /// Claim was already processed; stored values returned unchanged
    Replayed,
    /// Registry could not answer; held for manual review
    Held { reason: HoldReason },
}

/// Result of running the verification pipeline on a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedClaim {
    pub claim: CarbonClaim,
    pub outcome: ProcessOutcome,
    /// Audit scheduled by this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_audit: Option<VerificationAudit>,
}

impl ProcessedClaim {
    pub fn result(&self) -> ClaimResult {
        ClaimResult::from(&self.claim)
    }
}
