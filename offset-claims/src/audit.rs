//! Verification audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an audit was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    /// Periodic random sample
    Random,
    /// Anti-gaming flag raised at processing time
    RiskTriggered,
    /// Third-party complaint
    Complaint,
}

impl AuditType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RiskTriggered => "risk_triggered",
            Self::Complaint => "complaint",
        }
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit result as recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl AuditResult {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Outcome an auditor submits when completing an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditVerdict {
    Passed,
    Failed,
}

impl From<AuditVerdict> for AuditResult {
    fn from(verdict: AuditVerdict) -> Self {
        match verdict {
            AuditVerdict::Passed => AuditResult::Passed,
            AuditVerdict::Failed => AuditResult::Failed,
        }
    }
}

impl fmt::Display for AuditVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(AuditResult::from(*self).as_str())
    }
}

/// Auditor's checklist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditFindings {
    pub evidence_provided: bool,
    pub documentation_complete: bool,
    pub location_verified: bool,
    pub additionality_confirmed: bool,
    /// Free-form auditor notes
    pub notes: Option<String>,
}

impl AuditFindings {
    /// Every checklist item confirmed.
    pub fn all_confirmed(&self) -> bool {
        self.evidence_provided
            && self.documentation_complete
            && self.location_verified
            && self.additionality_confirmed
    }

    /// Names of checklist items that were not confirmed.
    pub fn unconfirmed(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.evidence_provided {
            out.push("evidence_provided");
        }
        if !self.documentation_complete {
            out.push("documentation_complete");
        }
        if !self.location_verified {
            out.push("location_verified");
        }
        if !self.additionality_confirmed {
            out.push("additionality_confirmed");
        }
        out
    }
}

/// An audit of one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationAudit {
    /// Unique audit ID
    pub id: String,
    /// Audited claim
    pub claim_ref: String,
    pub audit_type: AuditType,
    /// When the audit is due
    pub scheduled_at: DateTime<Utc>,
    /// When the auditor started
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub findings: Option<AuditFindings>,
    pub result: AuditResult,
    pub corrective_actions: Option<String>,
}

impl VerificationAudit {
    /// Create a newly scheduled audit.
    pub fn scheduled(claim_ref: impl Into<String>, audit_type: AuditType, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            claim_ref: claim_ref.into(),
            audit_type,
            scheduled_at,
            started_at: None,
            completed_at: None,
            findings: None,
            result: AuditResult::Pending,
            corrective_actions: None,
        }
    }

    /// Audit has not been completed.
    pub fn is_open(&self) -> bool {
        self.result == AuditResult::Pending
    }

    /// Auditor has started work.
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_findings_unconfirmed() {
        let findings = AuditFindings {
            evidence_provided: true,
            documentation_complete: true,
            location_verified: false,
            additionality_confirmed: false,
            notes: None,
        };
        assert!(!findings.all_confirmed());
        assert_eq!(
            findings.unconfirmed(),
            vec!["location_verified", "additionality_confirmed"]
        );
    }

    #[test]
    fn test_new_audit_is_open() {
        let audit = VerificationAudit::scheduled("claim-1", AuditType::Random, Utc::now());
        assert!(audit.is_open());
        assert!(!audit.is_started());
        assert_eq!(AuditResult::from(AuditVerdict::Failed), AuditResult::Failed);
    }
}
