//! Manual allocation - direct admin surgery on single cells
//!
//! Bypasses the donation workflow entirely, so no trustworthy counter delta
//! exists: both operations set `recalc_needed` and leave the totals to the
//! reconciliation pass.
//!
//! Only atomic cells are operated on. Larger cell types are display-only
//! compositions; the box/position numbering over atomic cells is derived at
//! read time (`CellId::box_number` / `position_in_box`) and never stored.

use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;

use crate::cell_id::CellId;
use crate::db::models::{cell_status, GridCell};
use crate::db::{audit, batches, cells, counters, AdminContext, GridDb};
use crate::error::GridError;

/// Input for a manual single-cell allocation
#[derive(Debug, Clone, Deserialize)]
pub struct AllocateCellInput {
    pub cell_id: String,
    pub donor_name: String,
    pub amount: f64,
    /// Target status: pledged, paid or blocked
    pub status: String,
    #[serde(default)]
    pub pledge_id: Option<i64>,
    #[serde(default)]
    pub payment_id: Option<i64>,
}

// ============================================================================
// Transaction-level Operations
// ============================================================================

/// Allocate one available atomic cell. Composable inside a caller-owned
/// transaction.
pub fn allocate_cell_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    input: &AllocateCellInput,
) -> Result<GridCell, GridError> {
    let parsed = CellId::parse(&input.cell_id)?;
    if !parsed.is_atomic() {
        return Err(GridError::InvalidInput(format!(
            "Cell {} is not an atomic cell; composite types are display-only",
            input.cell_id
        )));
    }

    let before = cells::get_cell(conn, &input.cell_id)?
        .ok_or_else(|| GridError::CellNotFound(input.cell_id.clone()))?;

    let updated = cells::assign_cell(
        conn,
        &input.cell_id,
        &input.status,
        &input.donor_name,
        input.amount,
        input.pledge_id,
        input.payment_id,
    )?;

    counters::mark_recalc_needed(conn)?;

    let before_json = serde_json::to_value(&before)?;
    let after_json = serde_json::to_value(&updated)?;
    audit::record(
        conn,
        ctx,
        audit::entities::GRID_CELL,
        &input.cell_id,
        audit::actions::ALLOCATE,
        Some(&before_json),
        Some(&after_json),
    )?;

    Ok(updated)
}

/// Free one occupied cell, shrinking its batch first if it has one.
/// Composable inside a caller-owned transaction.
///
/// Unlike the deallocation engine this is not idempotent: an explicit admin
/// action on an already-available cell is a mistake and fails
/// `CellNotAllocated`.
pub fn unallocate_cell_tx(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    cell_id: &str,
) -> Result<GridCell, GridError> {
    let cell = cells::get_cell(conn, cell_id)?
        .ok_or_else(|| GridError::CellNotFound(cell_id.to_string()))?;

    if cell.status == cell_status::AVAILABLE {
        return Err(GridError::CellNotAllocated(cell_id.to_string()));
    }

    if let Some(batch_id) = cell.allocation_batch_id {
        batches::shrink_batch(conn, batch_id, cell_id)?;
    }

    let freed = cells::free_cells(conn, &[cell_id.to_string()])?;

    counters::mark_recalc_needed(conn)?;

    let fc = &freed.cells[0];
    let before_json = serde_json::to_value(&fc.before)?;
    let after_json = serde_json::to_value(&fc.after)?;
    audit::record(
        conn,
        ctx,
        audit::entities::GRID_CELL,
        cell_id,
        audit::actions::UNALLOCATE,
        Some(&before_json),
        Some(&after_json),
    )?;

    Ok(fc.after.clone())
}

// ============================================================================
// Engine
// ============================================================================

/// Manual allocation engine over a shared database
pub struct ManualAllocation {
    db: GridDb,
}

impl ManualAllocation {
    pub fn new(db: GridDb) -> Self {
        Self { db }
    }

    /// Allocate one cell directly, in one transaction
    pub fn allocate_cell(
        &self,
        ctx: &AdminContext,
        input: &AllocateCellInput,
    ) -> Result<GridCell, GridError> {
        let mut conn = self.db.conn()?;
        let cell = conn.immediate_transaction(|conn| allocate_cell_tx(conn, ctx, input))?;
        info!(cell_id = %cell.cell_id, status = %cell.status, "Manually allocated cell");
        Ok(cell)
    }

    /// Free one cell directly, in one transaction
    pub fn unallocate_cell(
        &self,
        ctx: &AdminContext,
        cell_id: &str,
    ) -> Result<GridCell, GridError> {
        let mut conn = self.db.conn()?;
        let cell = conn.immediate_transaction(|conn| unallocate_cell_tx(conn, ctx, cell_id))?;
        info!(cell_id = %cell.cell_id, "Manually unallocated cell");
        Ok(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_id::cell_types;
    use crate::config::RectangleSpec;
    use crate::db::models::{approval_status, batch_types};

    fn setup() -> (GridDb, AdminContext) {
        let db = GridDb::open_in_memory().expect("Failed to open in-memory db");
        let mut conn = db.conn().unwrap();
        cells::bulk_seed_cells(
            &mut conn,
            &[
                RectangleSpec {
                    rectangle: "B".to_string(),
                    cell_type: cell_types::ATOMIC.to_string(),
                    count: 12,
                },
                RectangleSpec {
                    rectangle: "C".to_string(),
                    cell_type: cell_types::ONE_BY_ONE.to_string(),
                    count: 2,
                },
            ],
        )
        .unwrap();
        (db, AdminContext::admin_panel(7))
    }

    fn input(cell_id: &str, status: &str, pledge_id: Option<i64>, payment_id: Option<i64>) -> AllocateCellInput {
        AllocateCellInput {
            cell_id: cell_id.to_string(),
            donor_name: "Jane Doe".to_string(),
            amount: 100.0,
            status: status.to_string(),
            pledge_id,
            payment_id,
        }
    }

    #[test]
    fn test_allocate_cell_sets_all_fields_and_flags_recalc() {
        let (db, ctx) = setup();
        let manual = ManualAllocation::new(db.clone());

        let cell = manual
            .allocate_cell(&ctx, &input("B0505-0010", cell_status::PLEDGED, Some(77), None))
            .unwrap();
        assert_eq!(cell.status, cell_status::PLEDGED);
        assert_eq!(cell.donor_name.as_deref(), Some("Jane Doe"));
        assert_eq!(cell.amount, Some(100.0));
        assert_eq!(cell.pledge_id, Some(77));
        assert!(cell.assigned_date.is_some());

        let mut conn = db.conn().unwrap();
        let snap = counters::get_counters(&mut conn).unwrap().unwrap();
        assert_eq!(snap.recalc_needed, 1);

        let trail = audit::list_for_entity(&mut conn, audit::entities::GRID_CELL, "B0505-0010").unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, audit::actions::ALLOCATE);
        assert_eq!(trail[0].user_id, 7);
    }

    #[test]
    fn test_allocate_rejects_composite_cells() {
        let (db, ctx) = setup();
        let manual = ManualAllocation::new(db.clone());

        let err = manual
            .allocate_cell(&ctx, &input("C1010-0001", cell_status::PAID, None, Some(3)))
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidInput(_)));
    }

    #[test]
    fn test_allocate_rejects_occupied_and_unknown_cells() {
        let (db, ctx) = setup();
        let manual = ManualAllocation::new(db.clone());

        manual
            .allocate_cell(&ctx, &input("B0505-0001", cell_status::BLOCKED, Some(1), None))
            .unwrap();
        let occupied = manual
            .allocate_cell(&ctx, &input("B0505-0001", cell_status::PAID, None, Some(2)))
            .unwrap_err();
        assert!(matches!(occupied, GridError::CellNotAvailable(_)));

        let unknown = manual
            .allocate_cell(&ctx, &input("B0505-9999", cell_status::PAID, None, Some(2)))
            .unwrap_err();
        assert!(matches!(unknown, GridError::CellNotFound(_)));
    }

    #[test]
    fn test_unallocate_frees_cell_and_flags_recalc() {
        let (db, ctx) = setup();
        let manual = ManualAllocation::new(db.clone());

        manual
            .allocate_cell(&ctx, &input("B0505-0002", cell_status::PAID, None, Some(11)))
            .unwrap();
        let freed = manual.unallocate_cell(&ctx, "B0505-0002").unwrap();
        assert_eq!(freed.status, cell_status::AVAILABLE);
        assert_eq!(freed.payment_id, None);
        assert_eq!(freed.donor_name, None);

        let mut conn = db.conn().unwrap();
        let trail = audit::list_for_entity(&mut conn, audit::entities::GRID_CELL, "B0505-0002").unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[1].action, audit::actions::UNALLOCATE);
    }

    #[test]
    fn test_unallocate_available_cell_fails() {
        let (db, ctx) = setup();
        let manual = ManualAllocation::new(db.clone());

        let err = manual.unallocate_cell(&ctx, "B0505-0003").unwrap_err();
        assert!(matches!(err, GridError::CellNotAllocated(_)));

        // And the failed attempt must leave no audit trace
        let mut conn = db.conn().unwrap();
        let trail = audit::list_for_entity(&mut conn, audit::entities::GRID_CELL, "B0505-0003").unwrap();
        assert!(trail.is_empty());
    }

    #[test]
    fn test_unallocate_shrinks_owning_batch() {
        let (db, ctx) = setup();
        let manual = ManualAllocation::new(db.clone());

        let batch_id = {
            let mut conn = db.conn().unwrap();
            let ids = ["B0505-0005", "B0505-0006", "B0505-0007", "B0505-0008"];
            for id in ids {
                cells::assign_cell(&mut conn, id, cell_status::PLEDGED, "Donor", 25.0, Some(4), None)
                    .unwrap();
            }
            let batch = batches::create_batch(
                &mut conn,
                &batches::CreateBatchInput {
                    batch_type: batch_types::PLEDGE_UPDATE.to_string(),
                    approval_status: approval_status::APPROVED.to_string(),
                    original_amount: 100.0,
                    additional_amount: 0.0,
                    cell_ids: ids.iter().map(|s| s.to_string()).collect(),
                    allocated_area: 1.0,
                },
            )
            .unwrap();
            cells::link_cells_to_batch(
                &mut conn,
                &ids.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
                batch.id,
            )
            .unwrap();
            batch.id
        };

        manual.unallocate_cell(&ctx, "B0505-0006").unwrap();

        let mut conn = db.conn().unwrap();
        let batch = batches::get_batch(&mut conn, batch_id).unwrap();
        assert_eq!(batch.allocated_cell_count, 3);
        assert_eq!(batch.allocated_area, 0.75);
        assert!(!batch.allocated_cell_ids.contains("B0505-0006"));
    }
}
