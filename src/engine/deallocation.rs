//! Deallocation engine - frees every cell tied to a pledge or payment
//!
//! Used by the undo/edit workflows and exposed directly for admin cleanup.
//! Both entry points are idempotent in intent: a second call on an
//! already-free donation reports zero cells freed, not an error, so admin
//! retries after a timeout are safe.

use diesel::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::db::{audit, batches, cells, AdminContext, GridDb};
use crate::db::models::GridCell;
use crate::error::GridError;

/// Outcome of a deallocation, as surfaced to the admin
#[derive(Debug, Clone, Serialize)]
pub struct DeallocationResult {
    pub success: bool,
    pub deallocated_cells: Vec<String>,
    pub deallocated_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeallocationResult {
    pub(crate) fn succeeded(deallocated_cells: Vec<String>) -> Self {
        Self {
            deallocated_count: deallocated_cells.len(),
            deallocated_cells,
            success: true,
            error: None,
        }
    }

    pub(crate) fn failed(err: &GridError) -> Self {
        Self {
            success: false,
            deallocated_cells: vec![],
            deallocated_count: 0,
            error: Some(err.to_string()),
        }
    }
}

// ============================================================================
// Transaction-level Operations
// ============================================================================

/// Free all cells referencing a pledge. Composable inside a caller-owned
/// transaction; any error must abort that transaction.
pub fn deallocate_pledge_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    pledge_id: i64,
) -> Result<Vec<String>, GridError> {
    let found = cells::find_cells_for_pledge(conn, pledge_id)?;
    free_found_cells(conn, ctx, found)
}

/// Free all cells referencing a payment. Composable inside a caller-owned
/// transaction; any error must abort that transaction.
pub fn deallocate_payment_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    payment_id: i64,
) -> Result<Vec<String>, GridError> {
    let found = cells::find_cells_for_payment(conn, payment_id)?;
    free_found_cells(conn, ctx, found)
}

/// Shrink batch aggregates, free the cells, audit one row per cell.
///
/// An empty `found` is the already-clean case and returns Ok with no cells.
fn free_found_cells(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    found: Vec<GridCell>,
) -> Result<Vec<String>, GridError> {
    if found.is_empty() {
        return Ok(vec![]);
    }

    // Shrink every touched batch aggregate before the cells go away
    for cell in &found {
        if let Some(batch_id) = cell.allocation_batch_id {
            batches::shrink_batch(conn, batch_id, &cell.cell_id).map_err(|e| {
                GridError::Deallocation(format!(
                    "shrinking batch {} for cell {}: {}",
                    batch_id, cell.cell_id, e
                ))
            })?;
        }
    }

    let ids: Vec<String> = found.iter().map(|c| c.cell_id.clone()).collect();
    let freed = cells::free_cells(conn, &ids)
        .map_err(|e| GridError::Deallocation(format!("freeing cells: {}", e)))?;

    for fc in &freed.cells {
        let before = serde_json::to_value(&fc.before)?;
        let after = serde_json::to_value(&fc.after)?;
        audit::record(
            conn,
            ctx,
            audit::entities::GRID_CELL,
            &fc.before.cell_id,
            audit::actions::DEALLOCATE,
            Some(&before),
            Some(&after),
        )?;
    }

    Ok(freed.cell_ids())
}

// ============================================================================
// Engine
// ============================================================================

/// Deallocation engine over a shared database
pub struct DeallocationEngine {
    db: GridDb,
}

impl DeallocationEngine {
    pub fn new(db: GridDb) -> Self {
        Self { db }
    }

    /// Free every cell tied to a pledge, in one transaction.
    ///
    /// Failures roll the transaction back and are reported in the result
    /// shape, never as partial state.
    pub fn deallocate_pledge(
        &self,
        ctx: &AdminContext,
        pledge_id: i64,
    ) -> Result<DeallocationResult, GridError> {
        let mut conn = self.db.conn()?;
        let outcome =
            conn.immediate_transaction(|conn| deallocate_pledge_tx(conn, ctx, pledge_id));

        match outcome {
            Ok(freed) => {
                info!(pledge_id, count = freed.len(), "Deallocated cells for pledge");
                Ok(DeallocationResult::succeeded(freed))
            }
            Err(e) => Ok(DeallocationResult::failed(&e)),
        }
    }

    /// Free every cell tied to a payment, in one transaction.
    pub fn deallocate_payment(
        &self,
        ctx: &AdminContext,
        payment_id: i64,
    ) -> Result<DeallocationResult, GridError> {
        let mut conn = self.db.conn()?;
        let outcome =
            conn.immediate_transaction(|conn| deallocate_payment_tx(conn, ctx, payment_id));

        match outcome {
            Ok(freed) => {
                info!(payment_id, count = freed.len(), "Deallocated cells for payment");
                Ok(DeallocationResult::succeeded(freed))
            }
            Err(e) => Ok(DeallocationResult::failed(&e)),
        }
    }
}
