//! Counter reconciliation - recompute the ledger from the donation tables
//!
//! Manual allocation leaves the counters stale on purpose (it only sets
//! `recalc_needed`). This pass rebuilds the authoritative totals:
//!
//!   paid_total    = sum of approved paid-type pledges + approved payments
//!   pledged_total = sum of approved pledged-type pledges
//!
//! and overwrites the singleton row, reporting how far the stored totals had
//! drifted. Runs on demand; there is no background scheduler.

use diesel::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::db::models::CounterSnapshot;
use crate::db::{audit, counters, donations, AdminContext, GridDb};
use crate::error::GridError;

/// Outcome of one reconciliation pass. Drift is recomputed minus stored;
/// a missing previous row counts as all zeroes.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub previous: Option<CounterSnapshot>,
    pub current: CounterSnapshot,
    pub paid_drift: f64,
    pub pledged_drift: f64,
    pub grand_drift: f64,
}

impl ReconcileReport {
    pub fn in_sync(&self) -> bool {
        self.paid_drift == 0.0 && self.pledged_drift == 0.0
    }
}

fn reconcile_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
) -> Result<ReconcileReport, GridError> {
    let previous = counters::get_counters(conn)?;

    let paid = donations::sum_approved_paid(conn)?;
    let pledged = donations::sum_approved_pledged(conn)?;
    let current = counters::overwrite_totals(conn, paid, pledged)?;

    let before = previous.as_ref().map(serde_json::to_value).transpose()?;
    let after = serde_json::to_value(&current)?;
    audit::record(
        conn,
        ctx,
        audit::entities::COUNTERS,
        "1",
        audit::actions::RECONCILE,
        before.as_ref(),
        Some(&after),
    )?;

    let (prev_paid, prev_pledged, prev_grand) = previous
        .as_ref()
        .map(|p| (p.paid_total, p.pledged_total, p.grand_total))
        .unwrap_or((0.0, 0.0, 0.0));

    Ok(ReconcileReport {
        paid_drift: current.paid_total - prev_paid,
        pledged_drift: current.pledged_total - prev_pledged,
        grand_drift: current.grand_total - prev_grand,
        previous,
        current,
    })
}

/// Reconciliation engine over a shared database
pub struct Reconciler {
    db: GridDb,
}

impl Reconciler {
    pub fn new(db: GridDb) -> Self {
        Self { db }
    }

    /// Recompute the counters from the donation tables, in one transaction.
    pub fn reconcile(&self, ctx: &AdminContext) -> Result<ReconcileReport, GridError> {
        let mut conn = self.db.conn()?;
        let report = conn.immediate_transaction(|conn| reconcile_tx(conn, ctx))?;
        info!(
            paid = report.current.paid_total,
            pledged = report.current.pledged_total,
            grand_drift = report.grand_drift,
            "Reconciled counters"
        );
        Ok(report)
    }
}
