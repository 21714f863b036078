//! Anti-gaming heuristics.
//!
//! Four independent checks run over a claim and the submitter's other
//! claims:
//! - **Rate**: too many claims in a rolling window
//! - **Ratio**: offsets outpacing the submitter's emissions
//! - **Capacity**: per-acre sequestration above an agronomic ceiling
//! - **Additionality**: weak or generic rationale on large claims
//!
//! The result is advisory. It never blocks a submission or changes a trust
//! score; any flag makes the claim subject to a risk-triggered audit.

mod additionality;
mod capacity;
mod emissions;
mod rate;
mod ratio;

pub use additionality::{additionality_score, AdditionalityCheck};
pub use capacity::CapacityCheck;
pub use emissions::{EmissionsSource, InMemoryEmissions};
pub use rate::RateCheck;
pub use ratio::RatioCheck;

use chrono::Utc;
use offset_claims::{CarbonClaim, CheckKind, CheckOutcome, RiskAssessment};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AntiGamingConfig;

/// Inputs every check sees.
pub struct CheckContext<'a> {
    /// Claim under evaluation
    pub claim: &'a CarbonClaim,
    /// Submitter's other claims
    pub history: &'a [CarbonClaim],
    /// Submitter's cumulative emissions for the claim year, if known
    pub emissions_kg: Option<f64>,
}

/// A single anti-gaming heuristic.
pub trait GamingCheck: Send + Sync {
    /// Which check this is.
    fn kind(&self) -> CheckKind;

    /// Evaluate the claim.
    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckOutcome;
}

/// Runs every check and builds the risk assessment.
pub struct AntiGamingEngine {
    checks: Vec<Box<dyn GamingCheck>>,
    emissions: Arc<dyn EmissionsSource>,
}

impl AntiGamingEngine {
    /// Create an engine with the standard checks.
    pub fn new(config: &AntiGamingConfig, emissions: Arc<dyn EmissionsSource>) -> Self {
        let checks: Vec<Box<dyn GamingCheck>> = vec![
            Box::new(RateCheck::new(config.rate_window(), config.max_claims_per_window)),
            Box::new(RatioCheck::new(config.max_offset_to_emission_ratio)),
            Box::new(CapacityCheck::new(config.clone())),
            Box::new(AdditionalityCheck::new(
                config.additionality_threshold_kg,
                config.additionality_min_score,
            )),
        ];
        Self { checks, emissions }
    }

    /// Evaluate a claim against the submitter's history.
    pub async fn evaluate(&self, claim: &CarbonClaim, history: &[CarbonClaim]) -> RiskAssessment {
        let emissions_kg = self
            .emissions
            .cumulative_emissions_kg(&claim.submitter_ref, claim.year)
            .await;

        let ctx = CheckContext {
            claim,
            history,
            emissions_kg,
        };

        let outcomes: Vec<CheckOutcome> = self
            .checks
            .iter()
            .map(|check| {
                let outcome = check.evaluate(&ctx);
                debug!(
                    claim_id = %claim.id,
                    check = check.kind().as_str(),
                    flagged = outcome.flagged,
                    rationale = %outcome.rationale,
                    "Anti-gaming check evaluated"
                );
                outcome
            })
            .collect();

        let assessment = RiskAssessment::from_checks(outcomes, Utc::now());
        if assessment.is_flagged() {
            warn!(
                claim_id = %claim.id,
                submitter = %claim.submitter_ref,
                risk_level = assessment.level.as_str(),
                flags = ?assessment.flags().map(|f| f.check.as_str()).collect::<Vec<_>>(),
                "Claim flagged by anti-gaming checks"
            );
        }
        assessment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use offset_claims::{Evidence, OffsetSource, RiskLevel, VerificationTier};

    fn engine(emissions: Arc<InMemoryEmissions>) -> AntiGamingEngine {
        AntiGamingEngine::new(&AntiGamingConfig::default(), emissions)
    }

    #[tokio::test]
    async fn test_clean_claim_is_low_risk() {
        let claim = CarbonClaim::new("farm-1", 10.0, 2025, OffsetSource::NoTill, VerificationTier::SelfReported);
        let assessment = engine(Arc::new(InMemoryEmissions::new())).evaluate(&claim, &[]).await;
        assert_eq!(assessment.level, RiskLevel::Low);
        assert_eq!(assessment.checks.len(), 4);
        assert!(!assessment.is_flagged());
    }

    #[tokio::test]
    async fn test_multiple_flags_raise_level() {
        let emissions = Arc::new(InMemoryEmissions::new());
        emissions.set("farm-1", 2025, 50.0);

        let now = Utc::now();
        let history: Vec<CarbonClaim> = (0..5)
            .map(|i| {
                CarbonClaim::new("farm-1", 10.0, 2025, OffsetSource::NoTill, VerificationTier::SelfReported)
                    .with_created_at(now - Duration::minutes(10 * (i + 1)))
            })
            .collect();
        let claim = CarbonClaim::new("farm-1", 200.0, 2025, OffsetSource::NoTill, VerificationTier::SelfReported)
            .with_created_at(now)
            .with_evidence(Evidence::default().with_additionality("good for the environment"));

        let assessment = engine(emissions).evaluate(&claim, &history).await;
        assert_eq!(assessment.level, RiskLevel::High);
        assert!(assessment.outcome(CheckKind::Rate).is_some_and(|o| o.flagged));
        assert!(assessment.outcome(CheckKind::Ratio).is_some_and(|o| o.flagged));
        assert!(assessment.outcome(CheckKind::Additionality).is_some_and(|o| o.flagged));
        assert!(assessment.outcome(CheckKind::Capacity).is_some_and(|o| !o.flagged));
    }
}
