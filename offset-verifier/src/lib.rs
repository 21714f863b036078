//! Offset Verifier - carbon-offset claim verification engine
//!
//! Decides how much of a producer's claimed carbon offset is credited:
//!
//! - **Trust scoring**: tier-based trust score and buffer-pool deduction
//! - **Evidence rules**: minimum evidence per tier, checked at submission
//! - **Cumulative caps**: monthly and annual limits on self-reported claims
//! - **Anti-gaming**: rate, ratio, capacity and additionality heuristics
//! - **Registry verification**: certified projects confirmed with their registry
//! - **Audits**: risk-triggered, random and complaint audits; a failed audit revokes credit
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ClaimIntake                           │
//! │   self-reported: inline        certified: queue + workers    │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────▼───────────────────────────────┐
//! │                    VerificationService                       │
//! │                                                              │
//! │  ┌──────────┐ ┌────────┐ ┌─────────────┐ ┌──────────┐ ┌─────┐│
//! │  │ Evidence │─│ Limits │─│ Anti-gaming │─│ Registry │─│Trust││
//! │  └──────────┘ └────────┘ └─────────────┘ └──────────┘ └──┬──┘│
//! │                                                          │   │
//! │                                              ┌───────────▼─┐ │
//! │                                              │   Audits    │ │
//! │                                              └─────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod anti_gaming;
pub mod audit;
pub mod config;
pub mod intake;
pub mod ledger;
pub mod notify;
pub mod service;
pub mod store;
pub mod types;

// Re-export main types
pub use audit::{AuditSampler, AuditScheduler, SamplingReport};
pub use config::VerifierConfig;
pub use intake::ClaimIntake;
pub use ledger::{CumulativeLimitGuard, Reservation};
pub use notify::{AuditNotifier, NotificationDispatcher, NotifyError, TracingNotifier};
pub use service::{VerificationService, VerificationServiceBuilder};
pub use store::{ClaimStore, Commit};
pub use types::*;
