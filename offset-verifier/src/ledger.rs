//! Cumulative limit guard for self-reported claims.
//!
//! Each (submitter, year) row holds the annual total and every monthly
//! total for that year behind one lock, so the monthly and annual caps are
//! checked and incremented as a single step. Two concurrent reservations
//! for the same submitter serialize on the row; neither can observe a total
//! the other is about to change.

use dashmap::DashMap;
use offset_claims::{EstablishmentLedger, Period};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::LimitsConfig;
use crate::types::CapWindow;

/// Tolerance for float comparisons against a cap.
const CAP_EPSILON: f64 = 1e-9;

/// Result of a reservation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// Amount counted; ledger after the reservation
    Reserved(EstablishmentLedger),
    /// Cap would be exceeded; ledger unchanged
    Rejected {
        window: CapWindow,
        current_total: f64,
        cap: f64,
    },
}

#[derive(Debug, Default)]
struct LedgerRow {
    monthly: BTreeMap<u32, f64>,
    annual: f64,
    /// Claim id → (month, amount) already counted
    reservations: HashMap<String, (u32, f64)>,
}

impl LedgerRow {
    fn snapshot(&self, submitter_ref: &str, period: Period) -> EstablishmentLedger {
        let mut ledger = EstablishmentLedger::empty(submitter_ref, period);
        ledger.self_reported_monthly_total = self.monthly.get(&period.month).copied().unwrap_or(0.0);
        ledger.self_reported_annual_total = self.annual;
        ledger
    }
}

/// Enforces monthly and annual caps on self-reported amounts.
///
/// The only writer of ledger totals.
pub struct CumulativeLimitGuard {
    limits: LimitsConfig,
    rows: DashMap<(String, i32), Arc<Mutex<LedgerRow>>>,
}

impl CumulativeLimitGuard {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            limits,
            rows: DashMap::new(),
        }
    }

    fn row(&self, submitter_ref: &str, year: i32) -> Arc<Mutex<LedgerRow>> {
        // Clone the Arc so the DashMap shard lock is released before awaiting.
        self.rows
            .entry((submitter_ref.to_string(), year))
            .or_default()
            .value()
            .clone()
    }

    /// Check both caps and count `amount` for `claim_id`.
    ///
    /// Reserving again for a claim id that is already counted returns the
    /// current ledger without counting it twice.
    pub async fn reserve(
        &self,
        submitter_ref: &str,
        period: Period,
        claim_id: &str,
        amount: f64,
    ) -> Reservation {
        let row = self.row(submitter_ref, period.year);
        let mut row = row.lock().await;

        if row.reservations.contains_key(claim_id) {
            debug!(
                claim_id = %claim_id,
                submitter = %submitter_ref,
                "Reservation already held for claim"
            );
            return Reservation::Reserved(row.snapshot(submitter_ref, period));
        }

        let monthly = row.monthly.get(&period.month).copied().unwrap_or(0.0);
        if monthly + amount > self.limits.monthly_cap_kg + CAP_EPSILON {
            warn!(
                claim_id = %claim_id,
                submitter = %submitter_ref,
                period = %period,
                current_total = monthly,
                requested = amount,
                cap = self.limits.monthly_cap_kg,
                "Monthly self-reported cap exceeded"
            );
            return Reservation::Rejected {
                window: CapWindow::Monthly,
                current_total: monthly,
                cap: self.limits.monthly_cap_kg,
            };
        }
        if row.annual + amount > self.limits.annual_cap_kg + CAP_EPSILON {
            warn!(
                claim_id = %claim_id,
                submitter = %submitter_ref,
                year = period.year,
                current_total = row.annual,
                requested = amount,
                cap = self.limits.annual_cap_kg,
                "Annual self-reported cap exceeded"
            );
            return Reservation::Rejected {
                window: CapWindow::Annual,
                current_total: row.annual,
                cap: self.limits.annual_cap_kg,
            };
        }

        *row.monthly.entry(period.month).or_insert(0.0) += amount;
        row.annual += amount;
        row.reservations
            .insert(claim_id.to_string(), (period.month, amount));

        let ledger = row.snapshot(submitter_ref, period);
        info!(
            claim_id = %claim_id,
            submitter = %submitter_ref,
            period = %period,
            monthly_total = ledger.self_reported_monthly_total,
            annual_total = ledger.self_reported_annual_total,
            "Self-reported amount reserved"
        );
        Reservation::Reserved(ledger)
    }

    /// Current totals for a submitter and period.
    pub async fn snapshot(&self, submitter_ref: &str, period: Period) -> EstablishmentLedger {
        let row = match self.rows.get(&(submitter_ref.to_string(), period.year)) {
            Some(row) => row.value().clone(),
            None => return EstablishmentLedger::empty(submitter_ref, period),
        };
        let row = row.lock().await;
        row.snapshot(submitter_ref, period)
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CumulativeLimitGuard {
        CumulativeLimitGuard::new(LimitsConfig::default())
    }

    #[tokio::test]
    async fn test_reserve_accumulates() {
        let guard = guard();
        let period = Period::new(2025, 3);
        guard.reserve("farm-1", period, "c1", 200.0).await;
        let result = guard.reserve("farm-1", period, "c2", 250.0).await;

        match result {
            Reservation::Reserved(ledger) => {
                assert_eq!(ledger.month_key, "2025-03");
                assert_eq!(ledger.self_reported_monthly_total, 450.0);
                assert_eq!(ledger.self_reported_annual_total, 450.0);
            }
            other => panic!("expected reservation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_monthly_cap_rejects_without_change() {
        let guard = guard();
        let period = Period::new(2025, 3);
        guard.reserve("farm-1", period, "c1", 480.0).await;

        let result = guard.reserve("farm-1", period, "c2", 40.0).await;
        assert_eq!(
            result,
            Reservation::Rejected {
                window: CapWindow::Monthly,
                current_total: 480.0,
                cap: 500.0,
            }
        );

        let ledger = guard.snapshot("farm-1", period).await;
        assert_eq!(ledger.self_reported_monthly_total, 480.0);
        assert_eq!(ledger.self_reported_annual_total, 480.0);

        // Exactly at the cap is allowed.
        assert!(matches!(
            guard.reserve("farm-1", period, "c3", 20.0).await,
            Reservation::Reserved(_)
        ));
    }

    #[tokio::test]
    async fn test_annual_cap() {
        let guard = guard();
        for month in 1..=10 {
            let result = guard
                .reserve("farm-1", Period::new(2025, month), &format!("c{}", month), 500.0)
                .await;
            assert!(matches!(result, Reservation::Reserved(_)));
        }

        let result = guard.reserve("farm-1", Period::new(2025, 11), "c11", 1.0).await;
        assert!(matches!(
            result,
            Reservation::Rejected {
                window: CapWindow::Annual,
                ..
            }
        ));

        // A new year starts from zero.
        assert!(matches!(
            guard.reserve("farm-1", Period::new(2026, 1), "c12", 1.0).await,
            Reservation::Reserved(_)
        ));
    }

    #[tokio::test]
    async fn test_same_claim_counted_once() {
        let guard = guard();
        let period = Period::new(2025, 6);
        guard.reserve("farm-1", period, "c1", 100.0).await;
        guard.reserve("farm-1", period, "c1", 100.0).await;

        let ledger = guard.snapshot("farm-1", period).await;
        assert_eq!(ledger.self_reported_monthly_total, 100.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_exceed_cap() {
        let guard = Arc::new(guard());
        let period = Period::new(2025, 3);

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let guard = Arc::clone(&guard);
                tokio::spawn(async move {
                    guard
                        .reserve("farm-1", period, &format!("claim-{}", i), 30.0)
                        .await
                })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let reserved = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Reservation::Reserved(_))))
            .count();

        assert_eq!(reserved, 16);
        let ledger = guard.snapshot("farm-1", period).await;
        assert_eq!(ledger.self_reported_monthly_total, 480.0);
    }
}
