//! Cumulative emissions lookup for the ratio check.

use async_trait::async_trait;
use dashmap::DashMap;

/// Source of a submitter's cumulative emissions.
///
/// Emission factors and activity data live outside this engine; `None`
/// means the figure is not known.
#[async_trait]
pub trait EmissionsSource: Send + Sync {
    /// Cumulative emissions for a submitter in a year (kg CO2e).
    async fn cumulative_emissions_kg(&self, submitter_ref: &str, year: i32) -> Option<f64>;
}

/// In-memory emissions figures.
#[derive(Debug, Default)]
pub struct InMemoryEmissions {
    totals: DashMap<(String, i32), f64>,
}

impl InMemoryEmissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the total for a submitter and year.
    pub fn set(&self, submitter_ref: impl Into<String>, year: i32, kg: f64) {
        self.totals.insert((submitter_ref.into(), year), kg);
    }

    /// Add emissions to the running total.
    pub fn record(&self, submitter_ref: impl Into<String>, year: i32, kg: f64) {
        *self.totals.entry((submitter_ref.into(), year)).or_insert(0.0) += kg;
    }
}

#[async_trait]
impl EmissionsSource for InMemoryEmissions {
    async fn cumulative_emissions_kg(&self, submitter_ref: &str, year: i32) -> Option<f64> {
        self.totals
            .get(&(submitter_ref.to_string(), year))
            .map(|total| *total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_accumulates() {
        let emissions = InMemoryEmissions::new();
        emissions.record("farm-1", 2025, 100.0);
        emissions.record("farm-1", 2025, 50.0);
        emissions.set("farm-2", 2025, 10.0);

        assert_eq!(emissions.cumulative_emissions_kg("farm-1", 2025).await, Some(150.0));
        assert_eq!(emissions.cumulative_emissions_kg("farm-2", 2025).await, Some(10.0));
        assert_eq!(emissions.cumulative_emissions_kg("farm-1", 2024).await, None);
    }
}
