//! Submission rate check.

use chrono::Duration;
use offset_claims::{CheckKind, CheckOutcome};

use super::{CheckContext, GamingCheck};

/// Flags a submitter with more than `max_claims` claims in `window`,
/// counting the claim under evaluation.
pub struct RateCheck {
    window: Duration,
    max_claims: usize,
}

impl RateCheck {
    pub fn new(window: Duration, max_claims: usize) -> Self {
        Self { window, max_claims }
    }
}

impl GamingCheck for RateCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Rate
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckOutcome {
        let end = ctx.claim.created_at;
        let start = end - self.window;

        let in_window = ctx
            .history
            .iter()
            .filter(|c| c.id != ctx.claim.id && c.created_at > start && c.created_at <= end)
            .count()
            + 1;

        let hours = self.window.num_hours();
        let outcome = if in_window > self.max_claims {
            CheckOutcome::flagged(
                CheckKind::Rate,
                format!(
                    "{} claims within {}h, limit {}",
                    in_window, hours, self.max_claims
                ),
            )
        } else {
            CheckOutcome::clear(
                CheckKind::Rate,
                format!("{} claims within {}h", in_window, hours),
            )
        };
        outcome.with_observed(in_window as f64)
    }
}
