//! Core trait for registry clients.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::registry::Registry;

/// Error types for registry calls.
///
/// Every failure is typed so callers can tell "the project does not exist"
/// apart from "the registry could not answer".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// Registry answered that the id is unknown
    #[error("Registry id not found: {0}")]
    NotFound(String),

    /// Id does not belong to any configured registry
    #[error("Unrecognized registry for id: {0}")]
    UnrecognizedRegistry(String),

    /// Rate limited by the registry
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Network error or server-side failure
    #[error("Transient registry error: {0}")]
    Transient(String),

    /// Response body could not be understood
    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),

    /// Client could not be constructed
    #[error("Registry client error: {0}")]
    Client(String),
}

impl RegistryError {
    /// Worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Transient(_) | Self::InvalidResponse(_)
        )
    }
}

/// Registry answer for a project id.
///
/// Wire shape of `GET /verify/{registry_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub verified: bool,
    pub methodology: String,
    /// Credits available (tonnes CO2e)
    pub credits_available: f64,
    #[serde(default)]
    pub verifying_body: Option<String>,
}

impl RegistryRecord {
    /// A verified record.
    pub fn verified(methodology: impl Into<String>, credits_available: f64) -> Self {
        Self {
            verified: true,
            methodology: methodology.into(),
            credits_available,
            verifying_body: None,
        }
    }

    /// Set the verifying body.
    pub fn with_verifying_body(mut self, body: impl Into<String>) -> Self {
        self.verifying_body = Some(body.into());
        self
    }
}

/// A client that can look up project ids on a registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Client identifier for logs.
    fn id(&self) -> &str;

    /// Look up a project id on a registry.
    async fn fetch(&self, registry: Registry, registry_id: &str) -> Result<RegistryRecord, RegistryError>;
}
