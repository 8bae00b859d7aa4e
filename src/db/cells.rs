//! Grid cell operations
//!
//! Cells are seeded once and never deleted, only recycled through
//! available -> {pledged|paid|blocked} -> available. `cell_id` therefore
//! stays a stable reference for audit history across reallocations.
//!
//! All functions take `&mut SqliteConnection` so the engine layer can
//! compose them inside one transaction.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::grid_cells;
use super::models::{cell_status, current_timestamp, GridCell, NewGridCell};
use crate::cell_id::{cell_types, rectangles, CellId};
use crate::config::RectangleSpec;
use crate::error::GridError;

// ============================================================================
// Query Types
// ============================================================================

/// Query parameters for listing cells
#[derive(Debug, Clone, Deserialize)]
pub struct CellQuery {
    #[serde(default)]
    pub rectangle: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for CellQuery {
    /// Same defaults as the deserialized form.
    fn default() -> Self {
        Self {
            rectangle: None,
            status: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn default_limit() -> i64 {
    100
}

/// One freed cell with its before/after snapshots for audit
#[derive(Debug, Clone, Serialize)]
pub struct FreedCell {
    pub before: GridCell,
    pub after: GridCell,
}

/// Result of freeing a set of cells
#[derive(Debug, Clone, Serialize)]
pub struct FreedCells {
    pub cells: Vec<FreedCell>,
}

impl FreedCells {
    /// Cell ids that were freed, in the order they were processed
    pub fn cell_ids(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.before.cell_id.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.cells.len()
    }
}

/// Result of seeding the grid
#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub inserted: u64,
    pub skipped: u64,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get a cell by id
pub fn get_cell(
    conn: &mut SqliteConnection,
    cell_id: &str,
) -> Result<Option<GridCell>, GridError> {
    grid_cells::table
        .filter(grid_cells::cell_id.eq(cell_id))
        .first(conn)
        .optional()
        .map_err(|e| GridError::Internal(format!("Cell query failed: {}", e)))
}

/// All cells currently referencing a pledge, ascending cell_id order
pub fn find_cells_for_pledge(
    conn: &mut SqliteConnection,
    pledge_id: i64,
) -> Result<Vec<GridCell>, GridError> {
    grid_cells::table
        .filter(grid_cells::pledge_id.eq(pledge_id))
        .order(grid_cells::cell_id.asc())
        .load(conn)
        .map_err(|e| GridError::Internal(format!("Cell query failed: {}", e)))
}

/// All cells currently referencing a payment, ascending cell_id order
pub fn find_cells_for_payment(
    conn: &mut SqliteConnection,
    payment_id: i64,
) -> Result<Vec<GridCell>, GridError> {
    grid_cells::table
        .filter(grid_cells::payment_id.eq(payment_id))
        .order(grid_cells::cell_id.asc())
        .load(conn)
        .map_err(|e| GridError::Internal(format!("Cell query failed: {}", e)))
}

/// List cells with filters
pub fn list_cells(
    conn: &mut SqliteConnection,
    query: &CellQuery,
) -> Result<Vec<GridCell>, GridError> {
    let mut base_query = grid_cells::table.into_boxed();

    if let Some(ref rectangle) = query.rectangle {
        base_query = base_query.filter(grid_cells::rectangle_id.eq(rectangle));
    }

    if let Some(ref status) = query.status {
        base_query = base_query.filter(grid_cells::status.eq(status));
    }

    base_query
        .order(grid_cells::cell_id.asc())
        .limit(query.limit)
        .offset(query.offset)
        .load(conn)
        .map_err(|e| GridError::Internal(format!("Cell query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Assign an available cell to a donation.
///
/// Exactly one of `pledge_id`/`payment_id` must be given; every occupied
/// cell carries exactly one donation reference, blocked cells included.
pub fn assign_cell(
    conn: &mut SqliteConnection,
    cell_id: &str,
    status: &str,
    donor_name: &str,
    amount: f64,
    pledge_id: Option<i64>,
    payment_id: Option<i64>,
) -> Result<GridCell, GridError> {
    if !cell_status::OCCUPIED.contains(&status) {
        return Err(GridError::InvalidInput(format!(
            "Invalid target status: {} (expected one of {:?})",
            status,
            cell_status::OCCUPIED
        )));
    }
    if pledge_id.is_some() == payment_id.is_some() {
        return Err(GridError::InvalidInput(
            "Exactly one of pledge_id/payment_id must be given".to_string(),
        ));
    }

    let cell = get_cell(conn, cell_id)?.ok_or_else(|| GridError::CellNotFound(cell_id.to_string()))?;
    if cell.status != cell_status::AVAILABLE {
        return Err(GridError::CellNotAvailable(cell_id.to_string()));
    }

    let now = current_timestamp();
    diesel::update(grid_cells::table.filter(grid_cells::cell_id.eq(cell_id)))
        .set((
            grid_cells::status.eq(status),
            grid_cells::pledge_id.eq(pledge_id),
            grid_cells::payment_id.eq(payment_id),
            grid_cells::donor_name.eq(donor_name),
            grid_cells::amount.eq(amount),
            grid_cells::assigned_date.eq(&now),
        ))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Cell update failed: {}", e)))?;

    get_cell(conn, cell_id)?.ok_or_else(|| GridError::CellNotFound(cell_id.to_string()))
}

/// Free a set of cells back to available, capturing before/after snapshots.
///
/// Duplicate ids in the input collapse to one; each cell is freed and
/// snapshotted once. Fails `CellNotFound` if any id does not exist, before
/// touching anything; the enclosing transaction must see all-or-nothing.
/// Cells are updated in ascending cell_id order for deterministic audit
/// output.
pub fn free_cells(
    conn: &mut SqliteConnection,
    cell_ids: &[String],
) -> Result<FreedCells, GridError> {
    let mut wanted = cell_ids.to_vec();
    wanted.sort();
    wanted.dedup();

    if wanted.is_empty() {
        return Ok(FreedCells { cells: vec![] });
    }

    let found: Vec<GridCell> = grid_cells::table
        .filter(grid_cells::cell_id.eq_any(&wanted))
        .order(grid_cells::cell_id.asc())
        .load(conn)
        .map_err(|e| GridError::Internal(format!("Cell query failed: {}", e)))?;

    if found.len() != wanted.len() {
        let missing: Vec<&str> = wanted
            .iter()
            .filter(|id| !found.iter().any(|c| &c.cell_id == *id))
            .map(|id| id.as_str())
            .collect();
        return Err(GridError::CellNotFound(missing.join(", ")));
    }

    let mut freed = Vec::with_capacity(found.len());
    for before in found {
        diesel::update(grid_cells::table.filter(grid_cells::cell_id.eq(&before.cell_id)))
            .set((
                grid_cells::status.eq(cell_status::AVAILABLE),
                grid_cells::pledge_id.eq(None::<i64>),
                grid_cells::payment_id.eq(None::<i64>),
                grid_cells::allocation_batch_id.eq(None::<i64>),
                grid_cells::donor_name.eq(None::<String>),
                grid_cells::amount.eq(None::<f64>),
                grid_cells::assigned_date.eq(None::<String>),
            ))
            .execute(conn)
            .map_err(|e| GridError::Internal(format!("Cell update failed: {}", e)))?;

        let mut after = before.clone();
        after.status = cell_status::AVAILABLE.to_string();
        after.pledge_id = None;
        after.payment_id = None;
        after.allocation_batch_id = None;
        after.donor_name = None;
        after.amount = None;
        after.assigned_date = None;

        freed.push(FreedCell { before, after });
    }

    Ok(FreedCells { cells: freed })
}

/// Point a set of occupied cells at an allocation batch
pub fn link_cells_to_batch(
    conn: &mut SqliteConnection,
    cell_ids: &[String],
    batch_id: i64,
) -> Result<(), GridError> {
    if cell_ids.is_empty() {
        return Ok(());
    }

    let updated = diesel::update(grid_cells::table.filter(grid_cells::cell_id.eq_any(cell_ids)))
        .set(grid_cells::allocation_batch_id.eq(batch_id))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Cell update failed: {}", e)))?;

    if updated != cell_ids.len() {
        return Err(GridError::CellNotFound(format!(
            "expected {} cells for batch {}, updated {}",
            cell_ids.len(),
            batch_id,
            updated
        )));
    }

    Ok(())
}

// ============================================================================
// Seeding
// ============================================================================

/// Seed the grid from a configured layout.
///
/// Additive and idempotent: cells that already exist are skipped, their
/// state untouched. cell_ids are derived as `<rectangle><type>-<seq>`
/// with seq running 1..=count per layout entry.
pub fn bulk_seed_cells(
    conn: &mut SqliteConnection,
    layout: &[RectangleSpec],
) -> Result<SeedReport, GridError> {
    // Validate the whole layout before inserting anything
    for spec in layout {
        if !rectangles::is_valid(&spec.rectangle) {
            return Err(GridError::InvalidInput(format!(
                "Invalid rectangle in layout: {}",
                spec.rectangle
            )));
        }
        if !cell_types::is_valid(&spec.cell_type) {
            return Err(GridError::InvalidInput(format!(
                "Invalid cell type in layout: {}",
                spec.cell_type
            )));
        }
        if spec.count == 0 || spec.count > 9999 {
            return Err(GridError::InvalidInput(format!(
                "Invalid cell count for rectangle {}: {}",
                spec.rectangle, spec.count
            )));
        }
    }

    let mut inserted = 0u64;
    let mut skipped = 0u64;

    conn.transaction(|conn| {
        for spec in layout {
            let area = cell_types::area_of(&spec.cell_type).unwrap_or(0.0);

            for seq in 1..=spec.count {
                let id = CellId::new(&spec.rectangle, &spec.cell_type, seq)?;
                let code = id.to_string();

                let new_cell = NewGridCell {
                    cell_id: &code,
                    rectangle_id: &spec.rectangle,
                    cell_type: &spec.cell_type,
                    area_size: area,
                    status: cell_status::AVAILABLE,
                };

                let rows = diesel::insert_or_ignore_into(grid_cells::table)
                    .values(&new_cell)
                    .execute(conn)
                    .map_err(|e| GridError::Internal(format!("Cell insert failed: {}", e)))?;

                if rows == 1 {
                    inserted += 1;
                } else {
                    skipped += 1;
                }
            }
        }

        Ok(SeedReport { inserted, skipped })
    })
}
