//! Allocation batch operations
//!
//! A batch groups cells allocated together as one financial event (e.g. a
//! top-up on an existing pledge). The batch row carries an ordered set of
//! cell ids as JSON plus count/area mirrors; this module keeps all three in
//! step when cells are removed.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::allocation_batches;
use super::last_insert_rowid;
use super::models::{approval_status, batch_types, current_timestamp, AllocationBatch, NewAllocationBatch};
use crate::error::GridError;

// ============================================================================
// CellIdSet
// ============================================================================

/// Ordered set of cell ids.
///
/// Insertion order is preserved; duplicates are rejected; removal keeps the
/// relative order of the remainder. Equality is element-wise and ordered.
/// Persisted as a JSON array of cell codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellIdSet(Vec<String>);

impl CellIdSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse from the JSON column value
    pub fn from_json(json: &str) -> Result<Self, GridError> {
        serde_json::from_str(json)
            .map_err(|e| GridError::Internal(format!("Invalid cell id list: {}", e)))
    }

    /// Serialize for the JSON column
    pub fn to_json(&self) -> Result<String, GridError> {
        serde_json::to_string(self)
            .map_err(|e| GridError::Internal(format!("Failed to encode cell id list: {}", e)))
    }

    /// Append a cell id if not already present; returns whether it was added
    pub fn insert(&mut self, cell_id: impl Into<String>) -> bool {
        let cell_id = cell_id.into();
        if self.0.contains(&cell_id) {
            return false;
        }
        self.0.push(cell_id);
        true
    }

    /// Remove a cell id, preserving the order of the remainder;
    /// returns whether it was present
    pub fn remove(&mut self, cell_id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|id| id != cell_id);
        self.0.len() != before
    }

    pub fn contains(&self, cell_id: &str) -> bool {
        self.0.iter().any(|id| id == cell_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for CellIdSet {
    /// Builds the set preserving first occurrence of each id
    fn from(ids: Vec<String>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }
}

impl FromIterator<String> for CellIdSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

// ============================================================================
// Query Types
// ============================================================================

/// Input for creating a batch
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBatchInput {
    pub batch_type: String,
    #[serde(default = "default_approval_status")]
    pub approval_status: String,
    #[serde(default)]
    pub original_amount: f64,
    #[serde(default)]
    pub additional_amount: f64,
    pub cell_ids: CellIdSet,
    /// Summed area of the member cells at creation time
    pub allocated_area: f64,
}

fn default_approval_status() -> String {
    approval_status::PENDING.to_string()
}

// ============================================================================
// Operations
// ============================================================================

/// Get a batch by id
pub fn get_batch(conn: &mut SqliteConnection, batch_id: i64) -> Result<AllocationBatch, GridError> {
    allocation_batches::table
        .filter(allocation_batches::id.eq(batch_id))
        .first(conn)
        .optional()
        .map_err(|e| GridError::Internal(format!("Batch query failed: {}", e)))?
        .ok_or(GridError::BatchNotFound(batch_id))
}

/// Create a batch
pub fn create_batch(
    conn: &mut SqliteConnection,
    input: &CreateBatchInput,
) -> Result<AllocationBatch, GridError> {
    if !batch_types::is_valid(&input.batch_type) {
        return Err(GridError::InvalidInput(format!(
            "Invalid batch type: {}",
            input.batch_type
        )));
    }
    if !approval_status::is_valid(&input.approval_status) {
        return Err(GridError::InvalidInput(format!(
            "Invalid approval status: {}",
            input.approval_status
        )));
    }

    let cell_ids_json = input.cell_ids.to_json()?;
    let new_batch = NewAllocationBatch {
        batch_type: &input.batch_type,
        approval_status: &input.approval_status,
        original_amount: input.original_amount,
        additional_amount: input.additional_amount,
        total_amount: input.original_amount + input.additional_amount,
        allocated_cell_ids: &cell_ids_json,
        allocated_cell_count: input.cell_ids.len() as i32,
        allocated_area: input.allocated_area,
    };

    diesel::insert_into(allocation_batches::table)
        .values(&new_batch)
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Batch insert failed: {}", e)))?;

    let batch_id: i64 = diesel::select(last_insert_rowid())
        .get_result(conn)
        .map_err(|e| GridError::Internal(format!("Batch id fetch failed: {}", e)))?;

    get_batch(conn, batch_id)
}

/// Remove one cell from a batch's aggregate.
///
/// Only acts on approved batches; an unapproved batch's aggregate is not
/// load-bearing and is left untouched. The new area is re-derived
/// proportionally from the old aggregate, not re-summed from cell rows:
/// `new_area = new_count * (old_area / max(1, old_count))`. Batches hold
/// uniformly-sized cells, which keeps the proportional form exact.
pub fn shrink_batch(
    conn: &mut SqliteConnection,
    batch_id: i64,
    removed_cell_id: &str,
) -> Result<AllocationBatch, GridError> {
    let batch = get_batch(conn, batch_id)?;

    if batch.approval_status != approval_status::APPROVED {
        return Ok(batch);
    }

    let mut cell_ids = CellIdSet::from_json(&batch.allocated_cell_ids)?;
    cell_ids.remove(removed_cell_id);

    let new_count = cell_ids.len() as i32;
    let new_area =
        new_count as f64 * (batch.allocated_area / std::cmp::max(1, batch.allocated_cell_count) as f64);
    let cell_ids_json = cell_ids.to_json()?;

    diesel::update(allocation_batches::table.filter(allocation_batches::id.eq(batch_id)))
        .set((
            allocation_batches::allocated_cell_ids.eq(&cell_ids_json),
            allocation_batches::allocated_cell_count.eq(new_count),
            allocation_batches::allocated_area.eq(new_area),
            allocation_batches::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Batch update failed: {}", e)))?;

    get_batch(conn, batch_id)
}
