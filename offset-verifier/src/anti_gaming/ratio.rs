//! Offset-to-emission ratio check.

use offset_claims::{CheckKind, CheckOutcome};

use super::{CheckContext, GamingCheck};

/// Flags a submitter whose claimed offsets for the year exceed
/// `max_ratio` times their emissions for the same year.
pub struct RatioCheck {
    max_ratio: f64,
}

impl RatioCheck {
    pub fn new(max_ratio: f64) -> Self {
        Self { max_ratio }
    }
}

impl GamingCheck for RatioCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Ratio
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckOutcome {
        let claim = ctx.claim;
        let Some(emissions) = ctx.emissions_kg else {
            return CheckOutcome::clear(
                CheckKind::Ratio,
                format!("emissions for {} unknown, ratio not evaluated", claim.year),
            );
        };

        // Revoked and rejected claims carry no offset.
        let offsets: f64 = ctx
            .history
            .iter()
            .filter(|c| c.id != claim.id && c.year == claim.year)
            .filter(|c| !c.is_revoked() && !c.review.is_rejected())
            .map(|c| c.claimed_amount)
            .sum::<f64>()
            + claim.claimed_amount;

        if emissions <= 0.0 {
            return if offsets > 0.0 {
                CheckOutcome::flagged(
                    CheckKind::Ratio,
                    format!("{} kg offsets claimed against zero recorded emissions", offsets),
                )
            } else {
                CheckOutcome::clear(CheckKind::Ratio, "no offsets and no emissions")
            };
        }

        let ratio = offsets / emissions;
        let outcome = if ratio > self.max_ratio {
            CheckOutcome::flagged(
                CheckKind::Ratio,
                format!(
                    "offsets {} kg are {:.2}x emissions {} kg, limit {}x",
                    offsets, ratio, emissions, self.max_ratio
                ),
            )
        } else {
            CheckOutcome::clear(
                CheckKind::Ratio,
                format!("offsets are {:.2}x emissions", ratio),
            )
        };
        outcome.with_observed(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offset_claims::{CarbonClaim, OffsetSource, VerificationTier};

    fn claim(amount: f64, year: i32) -> CarbonClaim {
        CarbonClaim::new("farm-1", amount, year, OffsetSource::NoTill, VerificationTier::SelfReported)
    }

    fn evaluate(claim: &CarbonClaim, history: &[CarbonClaim], emissions: Option<f64>) -> CheckOutcome {
        RatioCheck::new(2.0).evaluate(&CheckContext {
            claim,
            history,
            emissions_kg: emissions,
        })
    }

    #[test]
    fn test_ratio_over_limit() {
        let history = vec![claim(150.0, 2025), claim(400.0, 2024)];
        let outcome = evaluate(&claim(100.0, 2025), &history, Some(100.0));
        assert!(outcome.flagged);
        assert_eq!(outcome.observed, Some(2.5));
    }

    #[test]
    fn test_ratio_at_limit_is_clear() {
        let outcome = evaluate(&claim(200.0, 2025), &[], Some(100.0));
        assert!(!outcome.flagged);
    }

    #[test]
    fn test_revoked_history_ignored() {
        let mut revoked = claim(1000.0, 2025);
        revoked.revoke();
        let outcome = evaluate(&claim(50.0, 2025), &[revoked], Some(100.0));
        assert!(!outcome.flagged);
    }

    #[test]
    fn test_unknown_and_zero_emissions() {
        assert!(!evaluate(&claim(50.0, 2025), &[], None).flagged);
        assert!(evaluate(&claim(50.0, 2025), &[], Some(0.0)).flagged);
        assert!(!evaluate(&claim(0.0, 2025), &[], Some(0.0)).flagged);
    }
}
