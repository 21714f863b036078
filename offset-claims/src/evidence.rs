//! Evidence bundles and minimum-evidence rules per tier.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ClaimError;
use crate::types::{CarbonClaim, VerificationTier};

/// Claims at or above this amount (kg CO2e) must carry evidence when self reported.
pub const DEFAULT_SELF_REPORTED_EVIDENCE_THRESHOLD_KG: f64 = 25.0;

/// Reference to a stored photo or document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Storage URI
    pub uri: String,
    /// Optional caption
    #[serde(default)]
    pub caption: Option<String>,
}

impl EvidenceRef {
    /// Create a reference to a stored file.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            caption: None,
        }
    }
}

/// GPS location of the practice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Coordinates fall inside valid latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Evidence supplied with a claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Evidence {
    pub photos: Vec<EvidenceRef>,
    pub documents: Vec<EvidenceRef>,
    pub gps: Option<GpsPoint>,
    /// Why the offset goes beyond business as usual
    pub additionality_rationale: Option<String>,
    /// Why the offset will persist
    pub permanence_rationale: Option<String>,
}

impl Evidence {
    /// Add a photo.
    pub fn with_photo(mut self, uri: impl Into<String>) -> Self {
        self.photos.push(EvidenceRef::new(uri));
        self
    }

    /// Add a document.
    pub fn with_document(mut self, uri: impl Into<String>) -> Self {
        self.documents.push(EvidenceRef::new(uri));
        self
    }

    /// Set GPS location.
    pub fn with_gps(mut self, latitude: f64, longitude: f64) -> Self {
        self.gps = Some(GpsPoint { latitude, longitude });
        self
    }

    /// Set the additionality rationale.
    pub fn with_additionality(mut self, rationale: impl Into<String>) -> Self {
        self.additionality_rationale = Some(rationale.into());
        self
    }

    /// Set the permanence rationale.
    pub fn with_permanence(mut self, rationale: impl Into<String>) -> Self {
        self.permanence_rationale = Some(rationale.into());
        self
    }

    /// At least one photo or document is attached.
    pub fn has_attachment(&self) -> bool {
        !self.photos.is_empty() || !self.documents.is_empty()
    }

    /// Additionality rationale, if it has any content.
    pub fn additionality_text(&self) -> Option<&str> {
        self.additionality_rationale
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A requirement the evidence bundle did not meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingRequirement {
    /// At least one photo or document
    PhotoOrDocument,
    /// Non-empty additionality rationale
    AdditionalityRationale,
    /// Non-empty registry verification id
    RegistryVerificationId,
    /// Supplied GPS coordinates are out of range
    ValidGpsCoordinates,
}

impl MissingRequirement {
    /// Get the field name shown to submitters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhotoOrDocument => "photo_or_document",
            Self::AdditionalityRationale => "additionality_rationale",
            Self::RegistryVerificationId => "registry_verification_id",
            Self::ValidGpsCoordinates => "valid_gps_coordinates",
        }
    }
}

impl fmt::Display for MissingRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking a claim's evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceReport {
    pub missing: Vec<MissingRequirement>,
}

impl EvidenceReport {
    /// All requirements met.
    pub fn passed(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Checks a claim's evidence against its tier's minimum requirements.
#[derive(Debug, Clone)]
pub struct EvidenceValidator {
    self_reported_threshold_kg: f64,
}

impl EvidenceValidator {
    /// Create a validator with the default evidence threshold.
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_SELF_REPORTED_EVIDENCE_THRESHOLD_KG)
    }

    /// Create with a custom self-reported evidence threshold (kg CO2e).
    pub fn with_threshold(self_reported_threshold_kg: f64) -> Self {
        Self {
            self_reported_threshold_kg,
        }
    }

    /// List every requirement the claim misses.
    pub fn validate(&self, claim: &CarbonClaim) -> EvidenceReport {
        let evidence = &claim.evidence;
        let mut missing = Vec::new();

        match claim.verification_tier {
            VerificationTier::SelfReported => {
                if claim.claimed_amount >= self.self_reported_threshold_kg {
                    if !evidence.has_attachment() {
                        missing.push(MissingRequirement::PhotoOrDocument);
                    }
                    if evidence.additionality_text().is_none() {
                        missing.push(MissingRequirement::AdditionalityRationale);
                    }
                }
            }
            VerificationTier::CertifiedProject => {
                let has_id = claim
                    .registry_verification_id
                    .as_deref()
                    .is_some_and(|id| !id.trim().is_empty());
                if !has_id {
                    missing.push(MissingRequirement::RegistryVerificationId);
                }
            }
        }

        if evidence.gps.is_some_and(|gps| !gps.is_valid()) {
            missing.push(MissingRequirement::ValidGpsCoordinates);
        }

        EvidenceReport { missing }
    }

    /// Fail with `EvidenceIncomplete` when anything is missing.
    pub fn require(&self, claim: &CarbonClaim) -> Result<(), ClaimError> {
        let report = self.validate(claim);
        if report.passed() {
            Ok(())
        } else {
            Err(ClaimError::EvidenceIncomplete {
                missing: report.missing,
            })
        }
    }
}

impl Default for EvidenceValidator {
    fn default() -> Self {
        Self::new()
    }
}
