//! Anti-gaming assessment attached to a claim.
//!
//! Advisory only: an assessment never changes a claim's trust score; it
//! decides whether a risk-triggered audit is scheduled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Heuristic that produced a check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Too many claims in a rolling window
    Rate,
    /// Offsets outpacing emissions
    Ratio,
    /// Implausible per-acre sequestration
    Capacity,
    /// Weak additionality rationale
    Additionality,
}

impl CheckKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rate => "rate",
            Self::Ratio => "ratio",
            Self::Capacity => "capacity",
            Self::Additionality => "additionality",
        }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: CheckKind,
    pub flagged: bool,
    /// Human-readable reason
    pub rationale: String,
    /// Measured value the check compared, if any
    pub observed: Option<f64>,
}

impl CheckOutcome {
    /// Check passed.
    pub fn clear(check: CheckKind, rationale: impl Into<String>) -> Self {
        Self {
            check,
            flagged: false,
            rationale: rationale.into(),
            observed: None,
        }
    }

    /// Check raised a flag.
    pub fn flagged(check: CheckKind, rationale: impl Into<String>) -> Self {
        Self {
            check,
            flagged: true,
            rationale: rationale.into(),
            observed: None,
        }
    }

    /// Record the measured value.
    pub fn with_observed(mut self, value: f64) -> Self {
        self.observed = Some(value);
        self
    }
}

/// Overall risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No flags
    #[default]
    Low,
    /// One flag
    Medium,
    /// Two or more flags
    High,
}

impl RiskLevel {
    /// Level implied by a number of raised flags.
    pub fn from_flag_count(count: usize) -> Self {
        match count {
            0 => Self::Low,
            1 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// All check outcomes for a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub checks: Vec<CheckOutcome>,
    pub evaluated_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Build from check outcomes.
    pub fn from_checks(checks: Vec<CheckOutcome>, evaluated_at: DateTime<Utc>) -> Self {
        let level = RiskLevel::from_flag_count(checks.iter().filter(|c| c.flagged).count());
        Self {
            level,
            checks,
            evaluated_at,
        }
    }

    /// Any check raised a flag.
    pub fn is_flagged(&self) -> bool {
        self.checks.iter().any(|c| c.flagged)
    }

    /// Checks that raised a flag.
    pub fn flags(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| c.flagged)
    }

    /// Outcome of a given check.
    pub fn outcome(&self, check: CheckKind) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.check == check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_flags() {
        let assessment = RiskAssessment::from_checks(
            vec![
                CheckOutcome::flagged(CheckKind::Rate, "6 claims in 24h"),
                CheckOutcome::clear(CheckKind::Ratio, "within ratio"),
                CheckOutcome::flagged(CheckKind::Capacity, "exceeds ceiling"),
            ],
            Utc::now(),
        );
        assert_eq!(assessment.level, RiskLevel::High);
        assert!(assessment.is_flagged());
        assert_eq!(assessment.flags().count(), 2);
        assert!(assessment.outcome(CheckKind::Ratio).is_some_and(|c| !c.flagged));
    }
}
