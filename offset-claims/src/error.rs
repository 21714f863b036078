//! Error types for claim-level rules.

use crate::evidence::MissingRequirement;

/// Errors raised by the claim model itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClaimError {
    /// Tier name outside the closed set of verification tiers
    #[error("Unknown verification tier: {0}")]
    UnknownTier(String),

    /// Claimed amount is negative or not a finite number
    #[error("Invalid claimed amount: {0}")]
    InvalidAmount(f64),

    /// Evidence bundle does not satisfy the tier's minimum requirements
    #[error("Evidence incomplete, missing: {}", format_missing(.missing))]
    EvidenceIncomplete { missing: Vec<MissingRequirement> },

    /// Claim already carries its computed values
    #[error("Claim {0} has already been processed")]
    AlreadyProcessed(String),

    /// Claim credit was revoked by a failed audit
    #[error("Claim {0} was revoked by a failed audit")]
    Revoked(String),
}

fn format_missing(missing: &[MissingRequirement]) -> String {
    missing
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_incomplete_lists_fields() {
        let err = ClaimError::EvidenceIncomplete {
            missing: vec![
                MissingRequirement::PhotoOrDocument,
                MissingRequirement::AdditionalityRationale,
            ],
        };
        assert_eq!(
            err.to_string(),
            "Evidence incomplete, missing: photo_or_document, additionality_rationale"
        );
    }
}
