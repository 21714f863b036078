//! Core claim types.
//!
//! A [`CarbonClaim`] is created with a provisional (zero) credit, receives its
//! trust-weighted values exactly once when processed, and can only be changed
//! afterwards by an audit outcome. Claims are never deleted; a revoked claim
//! stays on record for the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::digest::computation_digest;
use crate::error::ClaimError;
use crate::evidence::Evidence;
use crate::risk::RiskAssessment;
use crate::trust::{TrustScoreTable, TrustWeights};

/// Verification tier of a claim.
///
/// Closed set: the retired peer-attestation tier is rejected at the parsing
/// boundary rather than mapped onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum VerificationTier {
    /// Producer's own assertion, discounted and capped
    SelfReported,
    /// Backed by a project certified on a third-party registry
    CertifiedProject,
}

impl VerificationTier {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfReported => "self_reported",
            Self::CertifiedProject => "certified_project",
        }
    }

    /// All tiers.
    pub fn all() -> [Self; 2] {
        [Self::SelfReported, Self::CertifiedProject]
    }

    /// Whether claims of this tier count against the cumulative caps.
    pub fn is_capped(&self) -> bool {
        matches!(self, Self::SelfReported)
    }

    /// Whether claims of this tier must be confirmed by a registry.
    pub fn requires_registry(&self) -> bool {
        matches!(self, Self::CertifiedProject)
    }
}

impl FromStr for VerificationTier {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "self_reported" | "selfreported" => Ok(Self::SelfReported),
            "certified_project" | "certifiedproject" => Ok(Self::CertifiedProject),
            _ => Err(ClaimError::UnknownTier(s.to_string())),
        }
    }
}

impl TryFrom<String> for VerificationTier {
    type Error = ClaimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for VerificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offset activity being claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetSource {
    NoTill,
    ReducedTillage,
    CoverCrop,
    Agroforestry,
    RotationalGrazing,
    NutrientManagement,
    MethaneCapture,
    RenewableEnergy,
    Other,
}

impl OffsetSource {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTill => "no_till",
            Self::ReducedTillage => "reduced_tillage",
            Self::CoverCrop => "cover_crop",
            Self::Agroforestry => "agroforestry",
            Self::RotationalGrazing => "rotational_grazing",
            Self::NutrientManagement => "nutrient_management",
            Self::MethaneCapture => "methane_capture",
            Self::RenewableEnergy => "renewable_energy",
            Self::Other => "other",
        }
    }

    /// Whether the activity sequesters carbon in land (and so scales with acreage).
    pub fn is_land_based(&self) -> bool {
        matches!(
            self,
            Self::NoTill
                | Self::ReducedTillage
                | Self::CoverCrop
                | Self::Agroforestry
                | Self::RotationalGrazing
                | Self::NutrientManagement
        )
    }
}

impl fmt::Display for OffsetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit status carried on the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// No audit scheduled
    #[default]
    Pending,
    /// Audit scheduled, not started
    Scheduled,
    /// Auditor has started
    InProgress,
    /// Audit passed (terminal)
    Passed,
    /// Audit failed, credit revoked (terminal)
    Failed,
}

impl AuditStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    /// An audit is open for the claim.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Scheduled | Self::InProgress)
    }

    /// No further audit transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a claim is held instead of credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HoldReason {
    /// Registry kept failing after retries
    RegistryTransient { detail: String },
    /// Registry call exceeded its time budget
    RegistryTimeout,
    /// Circuit breaker is open for the registry
    RegistryUnavailable,
    /// Background verification queue had no capacity
    QueueFull,
}

impl HoldReason {
    /// Get description.
    pub fn description(&self) -> String {
        match self {
            Self::RegistryTransient { detail } => format!("registry error after retries: {}", detail),
            Self::RegistryTimeout => "registry verification timed out".to_string(),
            Self::RegistryUnavailable => "registry temporarily unavailable".to_string(),
            Self::QueueFull => "verification queue full".to_string(),
        }
    }
}

/// Where a claim stands in the registry / review path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReviewState {
    /// Nothing outstanding
    #[default]
    Clear,
    /// Queued for background registry verification
    AwaitingRegistry,
    /// Held for manual review; never credited until resolved
    ManualReview { reason: HoldReason },
    /// Registry check rejected the claim after submission
    Rejected { reason: String },
}

impl ReviewState {
    /// Claim is held for manual review.
    pub fn is_held(&self) -> bool {
        matches!(self, Self::ManualReview { .. })
    }

    /// Claim is waiting on its registry answer.
    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::AwaitingRegistry)
    }

    /// Claim was rejected and will never be credited.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Registry confirmation stored with a certified claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryAttestation {
    /// Registry id the claim referenced
    pub registry_id: String,
    /// Methodology the project is certified under
    pub methodology: String,
    /// Credits available on the registry (tonnes CO2e)
    pub credits_available: f64,
    /// Body that verified the project
    pub verifying_body: Option<String>,
    /// When the registry answered
    pub verified_at: DateTime<Utc>,
}

/// A claimed carbon offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonClaim {
    /// Unique claim ID
    pub id: String,
    /// Owning establishment or production
    pub submitter_ref: String,
    /// Claimed amount (kg CO2e)
    pub claimed_amount: f64,
    /// Offset year
    pub year: i32,
    /// Offset activity
    pub source: OffsetSource,
    /// Verification tier
    pub verification_tier: VerificationTier,
    /// Registry id, required for certified projects
    #[serde(default)]
    pub registry_verification_id: Option<String>,
    /// Supporting evidence
    #[serde(default)]
    pub evidence: Evidence,
    /// Acreage the offset was produced on, when land based
    #[serde(default)]
    pub acreage: Option<f64>,
    /// Trust score in [0, 1]
    pub trust_score: f64,
    /// Buffer-pool deduction in [0, 1)
    pub buffer_deduction: f64,
    /// Credited amount (kg CO2e)
    pub effective_amount: f64,
    /// Audit status
    #[serde(default)]
    pub audit_status: AuditStatus,
    /// Latch: values have been computed
    #[serde(default)]
    pub processed: bool,
    /// Registry / manual review state
    #[serde(default)]
    pub review: ReviewState,
    /// Anti-gaming assessment
    #[serde(default)]
    pub risk: Option<RiskAssessment>,
    /// Registry confirmation
    #[serde(default)]
    pub registry_attestation: Option<RegistryAttestation>,
    /// Digest over the computed values
    #[serde(default)]
    pub computation_digest: Option<String>,
    /// When the claim was submitted
    pub created_at: DateTime<Utc>,
    /// When the values were computed
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl CarbonClaim {
    /// Create a new claim with a provisional (uncredited) value.
    pub fn new(
        submitter_ref: impl Into<String>,
        claimed_amount: f64,
        year: i32,
        source: OffsetSource,
        verification_tier: VerificationTier,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            submitter_ref: submitter_ref.into(),
            claimed_amount,
            year,
            source,
            verification_tier,
            registry_verification_id: None,
            evidence: Evidence::default(),
            acreage: None,
            trust_score: 0.0,
            buffer_deduction: TrustScoreTable::lookup(verification_tier).buffer_deduction,
            effective_amount: 0.0,
            audit_status: AuditStatus::Pending,
            processed: false,
            review: ReviewState::Clear,
            risk: None,
            registry_attestation: None,
            computation_digest: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Set the claim ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the registry id.
    pub fn with_registry_id(mut self, registry_id: impl Into<String>) -> Self {
        self.registry_verification_id = Some(registry_id.into());
        self
    }

    /// Set the evidence bundle.
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }

    /// Set the acreage.
    pub fn with_acreage(mut self, acreage: f64) -> Self {
        self.acreage = Some(acreage);
        self
    }

    /// Set the submission time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Check the claimed amount is a usable quantity.
    pub fn validate_amount(&self) -> Result<(), ClaimError> {
        if self.claimed_amount.is_finite() && self.claimed_amount >= 0.0 {
            Ok(())
        } else {
            Err(ClaimError::InvalidAmount(self.claimed_amount))
        }
    }

    /// Credit was revoked by a failed audit.
    pub fn is_revoked(&self) -> bool {
        self.audit_status == AuditStatus::Failed
    }

    /// Amount the stored weights imply.
    pub fn expected_effective_amount(&self) -> f64 {
        self.claimed_amount * self.trust_score * (1.0 - self.buffer_deduction)
    }

    /// Apply trust weights and latch the claim as processed.
    ///
    /// Fails if the claim was already processed or revoked; the computed
    /// values are written exactly once.
    pub fn apply_weights(&mut self, weights: TrustWeights, at: DateTime<Utc>) -> Result<(), ClaimError> {
        if self.is_revoked() {
            return Err(ClaimError::Revoked(self.id.clone()));
        }
        if self.processed {
            return Err(ClaimError::AlreadyProcessed(self.id.clone()));
        }

        self.trust_score = weights.trust_score;
        self.buffer_deduction = weights.buffer_deduction;
        self.effective_amount = weights.effective_amount(self.claimed_amount);
        self.processed = true;
        self.processed_at = Some(at);
        self.review = ReviewState::Clear;
        self.computation_digest = Some(computation_digest(self));
        Ok(())
    }

    /// Hold the claim for manual review without crediting it.
    pub fn hold(&mut self, reason: HoldReason) {
        self.trust_score = 0.0;
        self.effective_amount = 0.0;
        self.review = ReviewState::ManualReview { reason };
    }

    /// Mark the claim rejected after a background registry check.
    pub fn reject(&mut self, reason: impl Into<String>) {
        self.trust_score = 0.0;
        self.effective_amount = 0.0;
        self.review = ReviewState::Rejected {
            reason: reason.into(),
        };
    }

    /// Zero the credit after a failed audit.
    ///
    /// This is the only change permitted after the processed latch is set.
    pub fn revoke(&mut self) {
        self.trust_score = 0.0;
        self.effective_amount = 0.0;
        self.audit_status = AuditStatus::Failed;
        self.computation_digest = Some(computation_digest(self));
    }
}
