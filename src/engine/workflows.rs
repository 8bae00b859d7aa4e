//! Donation approval workflows - approve, undo, amount edits
//!
//! These are the operations that move money between the donation tables and
//! the counter ledger. Approval assigns caller-selected cells and applies a
//! positive delta; undo reverts the status, applies the negative delta and
//! hands the cell cleanup to the deallocation engine. Every workflow runs in
//! one write-locking transaction, so a failure anywhere rolls back the
//! donation flip, the cell changes, the counter delta and the audit rows
//! together.
//!
//! Delta bucketing: a pledge's `donation_type` selects whether its amount
//! counts as paid or pledged money. Payments always count as paid.

use diesel::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::cell_id::CellId;
use crate::db::models::{
    approval_status, batch_types, cell_status, donation_types, GridCell, Payment, Pledge,
};
use crate::db::{audit, batches, cells, counters, donations, AdminContext, GridDb};
use crate::engine::deallocation::{self, DeallocationResult};
use crate::error::GridError;

/// Which donation table an id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationKind {
    Pledge,
    Payment,
}

/// A pledge or payment row, for callers that handle either
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Donation {
    Pledge(Pledge),
    Payment(Payment),
}

impl Donation {
    pub fn amount(&self) -> f64 {
        match self {
            Donation::Pledge(p) => p.amount,
            Donation::Payment(p) => p.amount,
        }
    }
}

/// Split an amount into (paid_delta, pledged_delta) by donation type.
fn bucket_delta(donation_type: &str, amount: f64) -> (f64, f64) {
    if donation_type == donation_types::PAID {
        (amount, 0.0)
    } else {
        (0.0, amount)
    }
}

// ============================================================================
// Transaction-level Operations
// ============================================================================

fn approve_pledge_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    pledge_id: i64,
    cell_ids: &[String],
) -> Result<Vec<GridCell>, GridError> {
    let pledge = donations::require_pledge(conn, pledge_id)?;
    if pledge.status != approval_status::PENDING {
        return Err(GridError::InvalidState(format!(
            "Pledge {} is not pending (status: {})",
            pledge_id, pledge.status
        )));
    }
    let approved = donations::set_pledge_status(conn, pledge_id, approval_status::APPROVED)?;

    let target_status = if pledge.donation_type == donation_types::PAID {
        cell_status::PAID
    } else {
        cell_status::PLEDGED
    };
    let assigned = assign_selection(
        conn,
        ctx,
        cell_ids,
        target_status,
        &pledge.donor_name,
        pledge.amount,
        Some(pledge_id),
        None,
        batch_types::PLEDGE_UPDATE,
    )?;

    let (paid_delta, pledged_delta) = bucket_delta(&pledge.donation_type, pledge.amount);
    counters::apply_delta(conn, paid_delta, pledged_delta)?;

    let before = serde_json::to_value(&pledge)?;
    let after = serde_json::to_value(&approved)?;
    audit::record(
        conn,
        ctx,
        audit::entities::PLEDGE,
        &pledge_id.to_string(),
        audit::actions::APPROVE,
        Some(&before),
        Some(&after),
    )?;

    Ok(assigned)
}

fn approve_payment_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    payment_id: i64,
    cell_ids: &[String],
) -> Result<Vec<GridCell>, GridError> {
    let payment = donations::require_payment(conn, payment_id)?;
    if payment.status != approval_status::PENDING {
        return Err(GridError::InvalidState(format!(
            "Payment {} is not pending (status: {})",
            payment_id, payment.status
        )));
    }
    let approved = donations::set_payment_status(conn, payment_id, approval_status::APPROVED)?;

    let assigned = assign_selection(
        conn,
        ctx,
        cell_ids,
        cell_status::PAID,
        &payment.donor_name,
        payment.amount,
        None,
        Some(payment_id),
        batch_types::PAYMENT_UPDATE,
    )?;

    counters::apply_delta(conn, payment.amount, 0.0)?;

    let before = serde_json::to_value(&payment)?;
    let after = serde_json::to_value(&approved)?;
    audit::record(
        conn,
        ctx,
        audit::entities::PAYMENT,
        &payment_id.to_string(),
        audit::actions::APPROVE,
        Some(&before),
        Some(&after),
    )?;

    Ok(assigned)
}

/// Assign the selected cells and, for multi-cell selections, group them under
/// a new approved batch. Cells are taken in ascending id order regardless of
/// the order the caller listed them. Only atomic cells are assignable;
/// composite ids are rejected before any cell is touched.
#[allow(clippy::too_many_arguments)]
fn assign_selection(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    cell_ids: &[String],
    status: &str,
    donor_name: &str,
    amount: f64,
    pledge_id: Option<i64>,
    payment_id: Option<i64>,
    batch_type: &str,
) -> Result<Vec<GridCell>, GridError> {
    let mut ids: Vec<String> = cell_ids.to_vec();
    ids.sort();
    ids.dedup();

    for cell_id in &ids {
        let parsed = CellId::parse(cell_id)?;
        if !parsed.is_atomic() {
            return Err(GridError::InvalidInput(format!(
                "Cell {} is not an atomic cell; composite types are display-only",
                cell_id
            )));
        }
    }

    let mut assigned = Vec::with_capacity(ids.len());
    for cell_id in &ids {
        let before = cells::get_cell(conn, cell_id)?
            .ok_or_else(|| GridError::CellNotFound(cell_id.clone()))?;
        let after =
            cells::assign_cell(conn, cell_id, status, donor_name, amount, pledge_id, payment_id)?;

        let before_json = serde_json::to_value(&before)?;
        let after_json = serde_json::to_value(&after)?;
        audit::record(
            conn,
            ctx,
            audit::entities::GRID_CELL,
            cell_id,
            audit::actions::ALLOCATE,
            Some(&before_json),
            Some(&after_json),
        )?;
        assigned.push(after);
    }

    if assigned.len() > 1 {
        let batch = batches::create_batch(
            conn,
            &batches::CreateBatchInput {
                batch_type: batch_type.to_string(),
                approval_status: approval_status::APPROVED.to_string(),
                original_amount: amount,
                additional_amount: 0.0,
                cell_ids: ids.iter().cloned().collect(),
                allocated_area: assigned.iter().map(|c| c.area_size).sum(),
            },
        )?;
        cells::link_cells_to_batch(conn, &ids, batch.id)?;
        for cell in &mut assigned {
            cell.allocation_batch_id = Some(batch.id);
        }
    }

    Ok(assigned)
}

fn undo_pledge_approval_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    pledge_id: i64,
) -> Result<Vec<String>, GridError> {
    let pledge = donations::require_pledge(conn, pledge_id)?;
    if pledge.status != approval_status::APPROVED {
        return Err(GridError::InvalidState(format!(
            "Pledge {} is not approved (status: {})",
            pledge_id, pledge.status
        )));
    }
    let reverted = donations::set_pledge_status(conn, pledge_id, approval_status::PENDING)?;

    let (paid_delta, pledged_delta) = bucket_delta(&pledge.donation_type, -pledge.amount);
    counters::apply_delta(conn, paid_delta, pledged_delta)?;

    let freed = deallocation::deallocate_pledge_tx(conn, ctx, pledge_id)?;

    let before = serde_json::to_value(&pledge)?;
    let after = serde_json::to_value(&reverted)?;
    audit::record(
        conn,
        ctx,
        audit::entities::PLEDGE,
        &pledge_id.to_string(),
        audit::actions::UNDO_APPROVAL,
        Some(&before),
        Some(&after),
    )?;

    Ok(freed)
}

fn undo_payment_approval_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    payment_id: i64,
) -> Result<Vec<String>, GridError> {
    let payment = donations::require_payment(conn, payment_id)?;
    if payment.status != approval_status::APPROVED {
        return Err(GridError::InvalidState(format!(
            "Payment {} is not approved (status: {})",
            payment_id, payment.status
        )));
    }
    let reverted = donations::set_payment_status(conn, payment_id, approval_status::PENDING)?;

    counters::apply_delta(conn, -payment.amount, 0.0)?;

    let freed = deallocation::deallocate_payment_tx(conn, ctx, payment_id)?;

    let before = serde_json::to_value(&payment)?;
    let after = serde_json::to_value(&reverted)?;
    audit::record(
        conn,
        ctx,
        audit::entities::PAYMENT,
        &payment_id.to_string(),
        audit::actions::UNDO_APPROVAL,
        Some(&before),
        Some(&after),
    )?;

    Ok(freed)
}

fn edit_amount_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    kind: DonationKind,
    id: i64,
    new_amount: f64,
) -> Result<Donation, GridError> {
    if new_amount <= 0.0 {
        return Err(GridError::InvalidInput(format!(
            "Amount must be positive: {}",
            new_amount
        )));
    }

    match kind {
        DonationKind::Pledge => {
            let pledge = donations::require_pledge(conn, id)?;
            if pledge.status != approval_status::APPROVED {
                return Err(GridError::InvalidState(format!(
                    "Pledge {} is not approved (status: {})",
                    id, pledge.status
                )));
            }
            let (paid_delta, pledged_delta) =
                bucket_delta(&pledge.donation_type, new_amount - pledge.amount);
            counters::apply_delta(conn, paid_delta, pledged_delta)?;
            let updated = donations::set_pledge_amount(conn, id, new_amount)?;

            let before = serde_json::to_value(&pledge)?;
            let after = serde_json::to_value(&updated)?;
            audit::record(
                conn,
                ctx,
                audit::entities::PLEDGE,
                &id.to_string(),
                audit::actions::EDIT_AMOUNT,
                Some(&before),
                Some(&after),
            )?;
            Ok(Donation::Pledge(updated))
        }
        DonationKind::Payment => {
            let payment = donations::require_payment(conn, id)?;
            if payment.status != approval_status::APPROVED {
                return Err(GridError::InvalidState(format!(
                    "Payment {} is not approved (status: {})",
                    id, payment.status
                )));
            }
            counters::apply_delta(conn, new_amount - payment.amount, 0.0)?;
            let updated = donations::set_payment_amount(conn, id, new_amount)?;

            let before = serde_json::to_value(&payment)?;
            let after = serde_json::to_value(&updated)?;
            audit::record(
                conn,
                ctx,
                audit::entities::PAYMENT,
                &id.to_string(),
                audit::actions::EDIT_AMOUNT,
                Some(&before),
                Some(&after),
            )?;
            Ok(Donation::Payment(updated))
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Donation workflow engine over a shared database
pub struct Workflows {
    db: GridDb,
}

impl Workflows {
    pub fn new(db: GridDb) -> Self {
        Self { db }
    }

    /// Approve a pending pledge and assign its cells.
    ///
    /// The cell list was selected by the caller and may be empty. A selection
    /// of more than one cell is grouped under a new batch.
    pub fn approve_pledge(
        &self,
        ctx: &AdminContext,
        pledge_id: i64,
        cell_ids: &[String],
    ) -> Result<Vec<GridCell>, GridError> {
        let mut conn = self.db.conn()?;
        let assigned =
            conn.immediate_transaction(|conn| approve_pledge_tx(conn, ctx, pledge_id, cell_ids))?;
        info!(pledge_id, cells = assigned.len(), "Approved pledge");
        Ok(assigned)
    }

    /// Approve a pending payment and assign its cells.
    pub fn approve_payment(
        &self,
        ctx: &AdminContext,
        payment_id: i64,
        cell_ids: &[String],
    ) -> Result<Vec<GridCell>, GridError> {
        let mut conn = self.db.conn()?;
        let assigned = conn
            .immediate_transaction(|conn| approve_payment_tx(conn, ctx, payment_id, cell_ids))?;
        info!(payment_id, cells = assigned.len(), "Approved payment");
        Ok(assigned)
    }

    /// Revert an approved pledge to pending: negative counter delta, full
    /// cell deallocation, audit trail.
    ///
    /// Failures roll the transaction back and are reported in the result
    /// shape, never as partial state.
    pub fn undo_pledge_approval(
        &self,
        ctx: &AdminContext,
        pledge_id: i64,
    ) -> Result<DeallocationResult, GridError> {
        let mut conn = self.db.conn()?;
        let outcome =
            conn.immediate_transaction(|conn| undo_pledge_approval_tx(conn, ctx, pledge_id));

        match outcome {
            Ok(freed) => {
                info!(pledge_id, count = freed.len(), "Undid pledge approval");
                Ok(DeallocationResult::succeeded(freed))
            }
            Err(e) => Ok(DeallocationResult::failed(&e)),
        }
    }

    /// Revert an approved payment to pending.
    pub fn undo_payment_approval(
        &self,
        ctx: &AdminContext,
        payment_id: i64,
    ) -> Result<DeallocationResult, GridError> {
        let mut conn = self.db.conn()?;
        let outcome =
            conn.immediate_transaction(|conn| undo_payment_approval_tx(conn, ctx, payment_id));

        match outcome {
            Ok(freed) => {
                info!(payment_id, count = freed.len(), "Undid payment approval");
                Ok(DeallocationResult::succeeded(freed))
            }
            Err(e) => Ok(DeallocationResult::failed(&e)),
        }
    }

    /// Change the amount of an approved donation. Counters absorb the signed
    /// difference; assigned cells are left untouched.
    pub fn edit_approved_amount(
        &self,
        ctx: &AdminContext,
        kind: DonationKind,
        id: i64,
        new_amount: f64,
    ) -> Result<Donation, GridError> {
        let mut conn = self.db.conn()?;
        let updated =
            conn.immediate_transaction(|conn| edit_amount_tx(conn, ctx, kind, id, new_amount))?;
        info!(id, new_amount, "Edited approved donation amount");
        Ok(updated)
    }
}
