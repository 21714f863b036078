//! Registry verification for certified carbon projects.
//!
//! Confirms a certified-project claim against the third-party registry that
//! issued it (VCS, Gold Standard, CAR, ACR). Registries are treated as
//! untrusted and unreliable, so every call goes through:
//!
//! - a bounded per-attempt timeout
//! - retry with exponential backoff on transient failures
//! - a circuit breaker that short-circuits to `Unavailable` after repeated failures
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     RegistryVerificationAdapter         │
//! │  (timeout, retry/backoff, breaker)      │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌──────────────────┐  ┌──────────────────┐
//! │ HttpRegistry     │  │ StaticRegistry   │
//! │ GET /verify/{id} │  │ (fixtures/tests) │
//! └──────────────────┘  └──────────────────┘
//! ```

pub mod adapter;
pub mod breaker;
pub mod client;
pub mod registry;
pub mod retry;

// Re-export main types for convenience
pub use adapter::{RegistryOutcome, RegistrySettings, RegistryVerificationAdapter};
pub use breaker::{BreakerPermit, BreakerState, CircuitBreaker};
pub use client::{HttpRegistryClient, RegistryClient, RegistryError, RegistryRecord, StaticRegistry};
pub use registry::Registry;
pub use retry::RetryPolicy;
