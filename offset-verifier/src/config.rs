//! Configuration for the verification engine.

use offset_claims::{OffsetSource, DEFAULT_SELF_REPORTED_EVIDENCE_THRESHOLD_KG};
use offset_registry::{Registry, RegistrySettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::types::{Result, VerificationError};

/// Configuration for a verifier instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Evidence requirements
    pub evidence: EvidenceConfig,
    /// Cumulative self-reported caps
    pub limits: LimitsConfig,
    /// Anti-gaming heuristics
    pub anti_gaming: AntiGamingConfig,
    /// Registry verification
    pub registry: RegistryConfig,
    /// Audit scheduling
    pub audit: AuditConfig,
    /// General settings
    pub general: GeneralConfig,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            evidence: EvidenceConfig::default(),
            limits: LimitsConfig::default(),
            anti_gaming: AntiGamingConfig::default(),
            registry: RegistryConfig::default(),
            audit: AuditConfig::default(),
            general: GeneralConfig::default(),
        }
    }
}

impl VerifierConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| VerificationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| VerificationError::Config(e.to_string()))
    }

    /// Load config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            VerificationError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: &str) -> Result<()> {
            Err(VerificationError::Config(msg.to_string()))
        }

        if !(self.evidence.self_reported_threshold_kg >= 0.0) {
            return invalid("evidence.self_reported_threshold_kg must be >= 0");
        }
        if !(self.limits.monthly_cap_kg > 0.0) || !(self.limits.annual_cap_kg > 0.0) {
            return invalid("limits caps must be > 0");
        }
        if self.limits.monthly_cap_kg > self.limits.annual_cap_kg {
            return invalid("limits.monthly_cap_kg must not exceed limits.annual_cap_kg");
        }
        if self.anti_gaming.rate_window_hours == 0 {
            return invalid("anti_gaming.rate_window_hours must be > 0");
        }
        if !(self.anti_gaming.max_offset_to_emission_ratio > 0.0) {
            return invalid("anti_gaming.max_offset_to_emission_ratio must be > 0");
        }
        if self
            .anti_gaming
            .capacity_ceilings_kg_per_acre
            .values()
            .chain(std::iter::once(
                &self.anti_gaming.default_capacity_ceiling_kg_per_acre,
            ))
            .any(|ceiling| !(*ceiling > 0.0))
        {
            return invalid("anti_gaming capacity ceilings must be > 0");
        }
        if self.registry.timeout_ms == 0 {
            return invalid("registry.timeout_ms must be > 0");
        }
        if self.registry.max_attempts == 0 {
            return invalid("registry.max_attempts must be > 0");
        }
        if self.registry.failure_threshold == 0 {
            return invalid("registry.failure_threshold must be > 0");
        }
        if self.registry.worker_count == 0 || self.registry.queue_capacity == 0 {
            return invalid("registry.worker_count and registry.queue_capacity must be > 0");
        }
        if !(0.0..=1.0).contains(&self.audit.random_sample_rate) {
            return invalid("audit.random_sample_rate must be within [0, 1]");
        }
        if self.audit.due_days == 0 {
            return invalid("audit.due_days must be > 0");
        }
        if self.audit.sampling_interval_secs == 0 {
            return invalid("audit.sampling_interval_secs must be > 0");
        }
        Ok(())
    }
}

/// Evidence configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Self-reported claims at or above this amount need evidence (kg CO2e)
    pub self_reported_threshold_kg: f64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            self_reported_threshold_kg: DEFAULT_SELF_REPORTED_EVIDENCE_THRESHOLD_KG,
        }
    }
}

/// Cumulative cap configuration for self-reported claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Per-submitter monthly cap (kg CO2e)
    pub monthly_cap_kg: f64,
    /// Per-submitter annual cap (kg CO2e)
    pub annual_cap_kg: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            monthly_cap_kg: 500.0,
            annual_cap_kg: 5000.0,
        }
    }
}

/// Anti-gaming configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiGamingConfig {
    /// Rolling window for the rate check (hours)
    pub rate_window_hours: u32,
    /// Claims allowed in the window before flagging
    pub max_claims_per_window: usize,
    /// Offsets may not exceed emissions by more than this factor
    pub max_offset_to_emission_ratio: f64,
    /// Claims at or above this amount need a strong additionality rationale (kg CO2e)
    pub additionality_threshold_kg: f64,
    /// Minimum rationale score
    pub additionality_min_score: i32,
    /// Per-source sequestration ceilings (kg CO2e per acre)
    pub capacity_ceilings_kg_per_acre: BTreeMap<OffsetSource, f64>,
    /// Ceiling for sources without an entry
    pub default_capacity_ceiling_kg_per_acre: f64,
}

impl Default for AntiGamingConfig {
    fn default() -> Self {
        let capacity_ceilings_kg_per_acre = BTreeMap::from([
            (OffsetSource::NoTill, 600.0),
            (OffsetSource::ReducedTillage, 400.0),
            (OffsetSource::CoverCrop, 800.0),
            (OffsetSource::Agroforestry, 5000.0),
            (OffsetSource::RotationalGrazing, 1500.0),
            (OffsetSource::NutrientManagement, 300.0),
        ]);

        Self {
            rate_window_hours: 24,
            max_claims_per_window: 5,
            max_offset_to_emission_ratio: 2.0,
            additionality_threshold_kg: 100.0,
            additionality_min_score: 3,
            capacity_ceilings_kg_per_acre,
            default_capacity_ceiling_kg_per_acre: 1000.0,
        }
    }
}

impl AntiGamingConfig {
    /// Ceiling for a source.
    pub fn capacity_ceiling(&self, source: OffsetSource) -> f64 {
        self.capacity_ceilings_kg_per_acre
            .get(&source)
            .copied()
            .unwrap_or(self.default_capacity_ceiling_kg_per_acre)
    }

    pub fn rate_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.rate_window_hours))
    }
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL per registry
    pub endpoints: BTreeMap<Registry, String>,
    /// Bearer token sent to every registry
    pub api_key: Option<String>,
    /// Per-attempt timeout (ms)
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    /// Background verification workers
    pub worker_count: usize,
    /// Bounded verification queue size
    pub queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let settings = RegistrySettings::default();
        Self {
            endpoints: BTreeMap::new(),
            api_key: None,
            timeout_ms: settings.timeout_ms,
            max_attempts: settings.max_attempts,
            base_backoff_ms: settings.base_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            failure_threshold: settings.failure_threshold,
            cooldown_secs: settings.cooldown_secs,
            worker_count: 4,
            queue_capacity: 256,
        }
    }
}

impl RegistryConfig {
    /// Adapter settings.
    pub fn settings(&self) -> RegistrySettings {
        RegistrySettings {
            timeout_ms: self.timeout_ms,
            max_attempts: self.max_attempts,
            base_backoff_ms: self.base_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            failure_threshold: self.failure_threshold,
            cooldown_secs: self.cooldown_secs,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Audit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Days between scheduling and the audit due date
    pub due_days: u32,
    /// Fraction of eligible claims sampled for random audit (0.0 - 1.0)
    pub random_sample_rate: f64,
    /// Claims younger than this are not sampled by the periodic job (days)
    pub random_audit_min_age_days: u32,
    /// Seed for audit sampling; random when absent
    pub sampling_seed: Option<u64>,
    /// Periodic sampling interval (seconds)
    pub sampling_interval_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            due_days: 7,
            random_sample_rate: 0.10,
            random_audit_min_age_days: 30,
            sampling_seed: None,
            sampling_interval_secs: 7 * 24 * 3600, // weekly
        }
    }
}

impl AuditConfig {
    pub fn due_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.due_days))
    }

    pub fn min_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.random_audit_min_age_days))
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instance ID
    pub verifier_id: String,
    /// Environment (development, staging, production)
    pub environment: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verifier_id: uuid::Uuid::new_v4().to_string(),
            environment: "development".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VerifierConfig::default();
        assert_eq!(config.evidence.self_reported_threshold_kg, 25.0);
        assert_eq!(config.limits.monthly_cap_kg, 500.0);
        assert_eq!(config.limits.annual_cap_kg, 5000.0);
        assert_eq!(config.anti_gaming.max_claims_per_window, 5);
        assert_eq!(config.anti_gaming.max_offset_to_emission_ratio, 2.0);
        assert_eq!(config.anti_gaming.additionality_threshold_kg, 100.0);
        assert_eq!(config.audit.due_days, 7);
        assert_eq!(config.audit.random_sample_rate, 0.10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = r#"
limits:
  monthly_cap_kg: 250.0
registry:
  endpoints:
    vcs: "https://registry.example/vcs"
  timeout_ms: 3000
audit:
  sampling_seed: 42
anti_gaming:
  capacity_ceilings_kg_per_acre:
    cover_crop: 900.0
"#;
        let config = VerifierConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limits.monthly_cap_kg, 250.0);
        assert_eq!(config.limits.annual_cap_kg, 5000.0);
        assert_eq!(
            config.registry.endpoints.get(&Registry::Vcs).map(String::as_str),
            Some("https://registry.example/vcs")
        );
        assert_eq!(config.registry.settings().timeout_ms, 3000);
        assert_eq!(config.audit.sampling_seed, Some(42));
        assert_eq!(config.anti_gaming.capacity_ceiling(OffsetSource::CoverCrop), 900.0);
        assert_eq!(config.anti_gaming.capacity_ceiling(OffsetSource::NoTill), 1000.0);
    }

    #[test]
    fn test_yaml_roundtrip_keeps_sections() {
        let config = VerifierConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("anti_gaming:"));
        let parsed = VerifierConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validation() {
        let mut config = VerifierConfig::default();
        config.audit.random_sample_rate = 1.5;
        assert!(matches!(config.validate(), Err(VerificationError::Config(_))));

        let mut config = VerifierConfig::default();
        config.limits.monthly_cap_kg = 0.0;
        assert!(config.validate().is_err());

        let mut config = VerifierConfig::default();
        config.registry.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
