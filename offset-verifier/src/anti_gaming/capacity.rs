//! Agronomic capacity check.

use offset_claims::{CheckKind, CheckOutcome};

use super::{CheckContext, GamingCheck};
use crate::config::AntiGamingConfig;

/// Flags a land-based claim whose per-acre rate exceeds the ceiling for
/// its offset source.
pub struct CapacityCheck {
    config: AntiGamingConfig,
}

impl CapacityCheck {
    pub fn new(config: AntiGamingConfig) -> Self {
        Self { config }
    }
}

impl GamingCheck for CapacityCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Capacity
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckOutcome {
        let claim = ctx.claim;
        if !claim.source.is_land_based() {
            return CheckOutcome::clear(
                CheckKind::Capacity,
                format!("{} is not land based", claim.source),
            );
        }

        let acreage = match claim.acreage {
            Some(acres) if acres > 0.0 => acres,
            _ => {
                return CheckOutcome::clear(
                    CheckKind::Capacity,
                    "no acreage supplied, capacity not evaluated",
                )
            }
        };

        let per_acre = claim.claimed_amount / acreage;
        let ceiling = self.config.capacity_ceiling(claim.source);
        let outcome = if per_acre > ceiling {
            CheckOutcome::flagged(
                CheckKind::Capacity,
                format!(
                    "{:.1} kg/acre exceeds {} ceiling of {} kg/acre",
                    per_acre, claim.source, ceiling
                ),
            )
        } else {
            CheckOutcome::clear(
                CheckKind::Capacity,
                format!("{:.1} kg/acre within {} kg/acre", per_acre, ceiling),
            )
        };
        outcome.with_observed(per_acre)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offset_claims::{CarbonClaim, OffsetSource, VerificationTier};

    fn evaluate(claim: &CarbonClaim) -> CheckOutcome {
        CapacityCheck::new(AntiGamingConfig::default()).evaluate(&CheckContext {
            claim,
            history: &[],
            emissions_kg: None,
        })
    }

    fn claim(amount: f64, source: OffsetSource) -> CarbonClaim {
        CarbonClaim::new("farm-1", amount, 2025, source, VerificationTier::SelfReported)
    }

    #[test]
    fn test_over_ceiling() {
        // Cover crop ceiling is 800 kg/acre.
        let outcome = evaluate(&claim(4000.0, OffsetSource::CoverCrop).with_acreage(2.0));
        assert!(outcome.flagged);
        assert_eq!(outcome.observed, Some(2000.0));
    }

    #[test]
    fn test_within_ceiling() {
        assert!(!evaluate(&claim(4000.0, OffsetSource::Agroforestry).with_acreage(2.0)).flagged);
    }

    #[test]
    fn test_skipped_without_acreage_or_land() {
        assert!(!evaluate(&claim(1e6, OffsetSource::CoverCrop)).flagged);
        assert!(!evaluate(&claim(1e6, OffsetSource::MethaneCapture).with_acreage(1.0)).flagged);
    }
}
