//! Audit scheduling.
//!
//! Audits are opened for risk-flagged claims, for a random sample of
//! processed claims, and on complaint. Completing an audit as `Failed` is
//! the only path that can revoke credit from a processed claim.

mod sampler;
mod scheduler;

pub use sampler::AuditSampler;
pub use scheduler::{AuditScheduler, SamplingReport};
