//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! SQLite has no native booleans or timestamps: flags are INTEGER 0/1,
//! timestamps are ISO 8601 TEXT.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Status Constants
// ============================================================================

/// Grid cell statuses
pub mod cell_status {
    pub const AVAILABLE: &str = "available";
    pub const PLEDGED: &str = "pledged";
    pub const PAID: &str = "paid";
    pub const BLOCKED: &str = "blocked";

    /// All cell statuses
    pub const ALL: [&str; 4] = [AVAILABLE, PLEDGED, PAID, BLOCKED];

    /// Statuses an occupied cell can carry (everything except available)
    pub const OCCUPIED: [&str; 3] = [PLEDGED, PAID, BLOCKED];

    /// Check if a cell status is valid
    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }
}

/// Allocation batch types
pub mod batch_types {
    pub const PLEDGE_UPDATE: &str = "pledge_update";
    pub const PAYMENT_UPDATE: &str = "payment_update";
    pub const BATCH: &str = "batch";

    pub const ALL: [&str; 3] = [PLEDGE_UPDATE, PAYMENT_UPDATE, BATCH];

    /// Check if a batch type is valid
    pub fn is_valid(batch_type: &str) -> bool {
        ALL.contains(&batch_type)
    }
}

/// Approval statuses shared by donations and batches
pub mod approval_status {
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";

    pub const ALL: [&str; 2] = [PENDING, APPROVED];

    /// Check if an approval status is valid
    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }
}

/// Pledge donation types, selecting the counter bucket
pub mod donation_types {
    pub const PAID: &str = "paid";
    pub const PLEDGED: &str = "pledged";

    pub const ALL: [&str; 2] = [PAID, PLEDGED];

    /// Check if a donation type is valid
    pub fn is_valid(donation_type: &str) -> bool {
        ALL.contains(&donation_type)
    }
}

// ============================================================================
// Grid Cell Models
// ============================================================================

/// Grid cell row from SELECT query
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = grid_cells)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GridCell {
    pub cell_id: String,
    pub rectangle_id: String,
    pub cell_type: String,
    pub area_size: f64,
    pub status: String,
    pub pledge_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub allocation_batch_id: Option<i64>,
    pub donor_name: Option<String>,
    pub amount: Option<f64>,
    pub assigned_date: Option<String>,
}

/// New grid cell for INSERT (seeding only; cells start available)
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = grid_cells)]
pub struct NewGridCell<'a> {
    pub cell_id: &'a str,
    pub rectangle_id: &'a str,
    pub cell_type: &'a str,
    pub area_size: f64,
    pub status: &'a str,
}

// ============================================================================
// Allocation Batch Models
// ============================================================================

/// Allocation batch row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = allocation_batches)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AllocationBatch {
    pub id: i64,
    pub batch_type: String,
    pub approval_status: String,
    pub original_amount: f64,
    pub additional_amount: f64,
    pub total_amount: f64,
    pub allocated_cell_ids: String,
    pub allocated_cell_count: i32,
    pub allocated_area: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// New allocation batch for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = allocation_batches)]
pub struct NewAllocationBatch<'a> {
    pub batch_type: &'a str,
    pub approval_status: &'a str,
    pub original_amount: f64,
    pub additional_amount: f64,
    pub total_amount: f64,
    pub allocated_cell_ids: &'a str,
    pub allocated_cell_count: i32,
    pub allocated_area: f64,
}

// ============================================================================
// Counter Models
// ============================================================================

/// The counters singleton row; also the snapshot returned to callers
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = counters)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CounterSnapshot {
    pub id: i32,
    pub paid_total: f64,
    pub pledged_total: f64,
    pub grand_total: f64,
    pub version: i64,
    pub recalc_needed: i32,
}

// ============================================================================
// Audit Models
// ============================================================================

/// Audit log row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = audit_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AuditLog {
    pub id: i64,
    pub user_id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub before_json: Option<String>,
    pub after_json: Option<String>,
    pub source: String,
    pub created_at: String,
}

/// New audit log entry for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct NewAuditLog<'a> {
    pub user_id: i64,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub action: &'a str,
    pub before_json: Option<&'a str>,
    pub after_json: Option<&'a str>,
    pub source: &'a str,
}

// ============================================================================
// Donation Models
// ============================================================================

/// Pledge row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = pledges)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Pledge {
    pub id: i64,
    pub donor_name: String,
    pub amount: f64,
    pub donation_type: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// New pledge for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pledges)]
pub struct NewPledge<'a> {
    pub donor_name: &'a str,
    pub amount: f64,
    pub donation_type: &'a str,
    pub status: &'a str,
}

/// Payment row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = payments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Payment {
    pub id: i64,
    pub pledge_id: Option<i64>,
    pub donor_name: String,
    pub amount: f64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// New payment for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct NewPayment<'a> {
    pub pledge_id: Option<i64>,
    pub donor_name: &'a str,
    pub amount: f64,
    pub status: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_constants() {
        assert!(cell_status::is_valid("available"));
        assert!(cell_status::is_valid("blocked"));
        assert!(!cell_status::is_valid("reserved"));
        assert!(!cell_status::OCCUPIED.contains(&cell_status::AVAILABLE));

        assert!(batch_types::is_valid("pledge_update"));
        assert!(!batch_types::is_valid("refund"));

        assert!(approval_status::is_valid("approved"));
        assert!(!approval_status::is_valid("rejected"));

        assert!(donation_types::is_valid("paid"));
        assert!(!donation_types::is_valid("promised"));
    }

    #[test]
    fn test_current_timestamp_format() {
        let ts = current_timestamp();
        // 2024-01-01T00:00:00Z
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
    }
}
