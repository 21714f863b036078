//! Carbon offset claim model for the verification engine.
//!
//! This crate holds the persisted units of work and the pure rules that
//! apply to them:
//!
//! - **Claims**: a producer's assertion of CO2e removed or avoided, with its tier
//! - **Trust table**: tier → base trust score and buffer-pool deduction
//! - **Evidence rules**: the minimum evidence each tier must carry
//! - **Audits**: verification audit records and findings checklists
//! - **Ledger rows**: per-establishment cumulative counters
//!
//! Nothing here performs I/O. Orchestration, limits, anti-gaming heuristics
//! and the audit state machine live in `offset-verifier`; the registry
//! boundary lives in `offset-registry`.
//!
//! # Example
//!
//! ```
//! use offset_claims::{CarbonClaim, Evidence, OffsetSource, TrustScoreTable, VerificationTier};
//!
//! let claim = CarbonClaim::new("farm-7", 50.0, 2025, OffsetSource::CoverCrop, VerificationTier::SelfReported)
//!     .with_evidence(Evidence::default().with_document("s3://evidence/plan.pdf").with_additionality("grant-funded seed"));
//!
//! let weights = TrustScoreTable::lookup(claim.verification_tier);
//! assert!((weights.effective_amount(claim.claimed_amount) - 20.0).abs() < 1e-9);
//! ```

pub mod audit;
pub mod digest;
pub mod error;
pub mod evidence;
pub mod ledger;
pub mod risk;
pub mod trust;
pub mod types;

// Re-export main types
pub use audit::{AuditFindings, AuditResult, AuditType, AuditVerdict, VerificationAudit};
pub use digest::computation_digest;
pub use error::ClaimError;
pub use evidence::{
    Evidence, EvidenceRef, EvidenceReport, EvidenceValidator, GpsPoint, MissingRequirement,
    DEFAULT_SELF_REPORTED_EVIDENCE_THRESHOLD_KG,
};
pub use ledger::{EstablishmentLedger, Period};
pub use risk::{CheckKind, CheckOutcome, RiskAssessment, RiskLevel};
pub use trust::{TrustScoreTable, TrustWeights};
pub use types::*;
