//! Digest over a claim's computed values.
//!
//! Lets payout and compliance consumers confirm that the credited numbers
//! were not recomputed after the fact. Floats are hashed by bit pattern so
//! the digest is exact.

use sha2::{Digest, Sha256};

use crate::types::CarbonClaim;

/// SHA-256 hex digest over id, amount, tier, weights, effective amount and audit status.
pub fn computation_digest(claim: &CarbonClaim) -> String {
    let mut hasher = Sha256::new();
    hasher.update(claim.id.as_bytes());
    hasher.update([0u8]);
    hasher.update(claim.claimed_amount.to_bits().to_be_bytes());
    hasher.update(claim.verification_tier.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(claim.trust_score.to_bits().to_be_bytes());
    hasher.update(claim.buffer_deduction.to_bits().to_be_bytes());
    hasher.update(claim.effective_amount.to_bits().to_be_bytes());
    hasher.update(claim.audit_status.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
