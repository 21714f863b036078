//! Cumulative self-reported totals per establishment.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar month a submission counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    /// 1-12
    pub month: u32,
}

impl Period {
    /// Create a period.
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Period containing a timestamp.
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    /// Month key, e.g. `2025-03`.
    pub fn month_key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Year key, e.g. `2025`.
    pub fn year_key(&self) -> String {
        format!("{:04}", self.year)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.month_key())
    }
}

/// Snapshot of an establishment's self-reported totals for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstablishmentLedger {
    pub submitter_ref: String,
    pub month_key: String,
    pub year_key: String,
    /// kg CO2e reserved in the month
    pub self_reported_monthly_total: f64,
    /// kg CO2e reserved in the year
    pub self_reported_annual_total: f64,
}

impl EstablishmentLedger {
    /// Empty ledger for a submitter and period.
    pub fn empty(submitter_ref: impl Into<String>, period: Period) -> Self {
        Self {
            submitter_ref: submitter_ref.into(),
            month_key: period.month_key(),
            year_key: period.year_key(),
            self_reported_monthly_total: 0.0,
            self_reported_annual_total: 0.0,
        }
    }
}
