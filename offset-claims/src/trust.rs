//! Tier → trust score and buffer-pool deduction.

use serde::{Deserialize, Serialize};

use crate::error::ClaimError;
use crate::types::VerificationTier;

/// Weights applied to a claimed amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustWeights {
    /// Credibility multiplier in [0, 1]
    pub trust_score: f64,
    /// Buffer-pool deduction in [0, 1)
    pub buffer_deduction: f64,
}

impl TrustWeights {
    /// Credited amount for a claimed amount.
    ///
    /// The buffer is applied once, after the trust score.
    pub fn effective_amount(&self, claimed_amount: f64) -> f64 {
        claimed_amount * self.trust_score * (1.0 - self.buffer_deduction)
    }
}

/// Static lookup table.
pub struct TrustScoreTable;

impl TrustScoreTable {
    /// Weights for a tier.
    pub const fn lookup(tier: VerificationTier) -> TrustWeights {
        match tier {
            VerificationTier::SelfReported => TrustWeights {
                trust_score: 0.50,
                buffer_deduction: 0.20,
            },
            VerificationTier::CertifiedProject => TrustWeights {
                trust_score: 1.00,
                buffer_deduction: 0.10,
            },
        }
    }

    /// Weights for a tier given by name.
    pub fn lookup_name(tier: &str) -> Result<TrustWeights, ClaimError> {
        let tier: VerificationTier = tier.parse()?;
        Ok(Self::lookup(tier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_values() {
        let sr = TrustScoreTable::lookup(VerificationTier::SelfReported);
        assert_eq!(sr.trust_score, 0.5);
        assert_eq!(sr.buffer_deduction, 0.2);

        let cp = TrustScoreTable::lookup(VerificationTier::CertifiedProject);
        assert_eq!(cp.trust_score, 1.0);
        assert_eq!(cp.buffer_deduction, 0.1);
    }

    #[test]
    fn test_effective_amount_single_buffer() {
        let sr = TrustScoreTable::lookup(VerificationTier::SelfReported);
        assert!((sr.effective_amount(50.0) - 20.0).abs() < 1e-9);

        let cp = TrustScoreTable::lookup(VerificationTier::CertifiedProject);
        assert!((cp.effective_amount(1000.0) - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_lookup_by_name() {
        assert!(TrustScoreTable::lookup_name("certified_project").is_ok());
        assert_eq!(
            TrustScoreTable::lookup_name("community_verified"),
            Err(ClaimError::UnknownTier("community_verified".to_string()))
        );
    }
}
