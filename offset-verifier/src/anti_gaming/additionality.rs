//! Additionality rationale check.

use offset_claims::{CheckKind, CheckOutcome};

use super::{CheckContext, GamingCheck};

/// Phrases naming a concrete driver: a barrier that business as usual
/// would not overcome.
const DRIVER_TERMS: &[&str] = &[
    "financial barrier",
    "cost-share",
    "cost share",
    "grant",
    "loan",
    "subsid",
    "incentive",
    "investment",
    "upfront cost",
    "equipment",
    "uncommon",
    "not common",
    "rarely",
    "few farms",
    "few farmers",
    "first in",
    "not required",
    "no regulation",
    "technical barrier",
    "yield risk",
];

/// Boilerplate that says nothing about why the activity is additional.
const GENERIC_PHRASES: &[&str] = &[
    "good for the environment",
    "help the environment",
    "helps the environment",
    "save the planet",
    "help the planet",
    "fight climate change",
    "eco-friendly",
    "the right thing",
    "green practice",
];

/// Minimum length (chars) for a rationale to count as specific.
const DETAILED_LEN: usize = 80;

/// Score a rationale.
///
/// +2 for naming a driver, +1 for a detailed rationale, +1 for concrete
/// figures, -1 for each generic phrase.
pub fn additionality_score(rationale: &str) -> i32 {
    let text = rationale.trim().to_lowercase();
    if text.is_empty() {
        return 0;
    }

    let mut score = 0;
    if DRIVER_TERMS.iter().any(|term| text.contains(term)) {
        score += 2;
    }
    if text.chars().count() >= DETAILED_LEN {
        score += 1;
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        score += 1;
    }
    score -= GENERIC_PHRASES
        .iter()
        .filter(|phrase| text.contains(*phrase))
        .count() as i32;
    score
}

/// Flags large claims whose additionality rationale scores below the
/// threshold.
pub struct AdditionalityCheck {
    threshold_kg: f64,
    min_score: i32,
}

impl AdditionalityCheck {
    pub fn new(threshold_kg: f64, min_score: i32) -> Self {
        Self {
            threshold_kg,
            min_score,
        }
    }
}

impl GamingCheck for AdditionalityCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Additionality
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckOutcome {
        let claim = ctx.claim;
        if claim.claimed_amount < self.threshold_kg {
            return CheckOutcome::clear(
                CheckKind::Additionality,
                format!("below {} kg, rationale not scored", self.threshold_kg),
            );
        }

        let Some(text) = claim.evidence.additionality_text() else {
            return CheckOutcome::flagged(CheckKind::Additionality, "weak additionality: no rationale")
                .with_observed(0.0);
        };

        let score = additionality_score(text);
        let outcome = if score < self.min_score {
            CheckOutcome::flagged(
                CheckKind::Additionality,
                format!("weak additionality: score {} below {}", score, self.min_score),
            )
        } else {
            CheckOutcome::clear(
                CheckKind::Additionality,
                format!("additionality score {}", score),
            )
        };
        outcome.with_observed(f64::from(score))
    }
}
