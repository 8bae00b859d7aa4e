//! Audit trail operations
//!
//! Append-only: this module exposes no update or delete. The engine only
//! ever writes; the read helpers exist for the admin audit view and tests.
//! Snapshots are opaque JSON decided by the calling component.

use diesel::prelude::*;

use super::context::AdminContext;
use super::diesel_schema::audit_logs;
use super::models::{AuditLog, NewAuditLog};
use crate::error::GridError;

/// Entity types recorded in the trail
pub mod entities {
    pub const GRID_CELL: &str = "grid_cell";
    pub const ALLOCATION_BATCH: &str = "allocation_batch";
    pub const PLEDGE: &str = "pledge";
    pub const PAYMENT: &str = "payment";
    pub const COUNTERS: &str = "counters";
}

/// Actions recorded in the trail
pub mod actions {
    pub const ALLOCATE: &str = "allocate";
    pub const UNALLOCATE: &str = "unallocate";
    pub const DEALLOCATE: &str = "deallocate";
    pub const APPROVE: &str = "approve";
    pub const UNDO_APPROVAL: &str = "undo_approval";
    pub const EDIT_AMOUNT: &str = "edit_amount";
    pub const RECONCILE: &str = "reconcile";
}

/// Append one audit row with before/after snapshots
pub fn record(
    conn: &mut SqliteConnection,
    ctx: &AdminContext,
    entity_type: &str,
    entity_id: &str,
    action: &str,
    before: Option<&serde_json::Value>,
    after: Option<&serde_json::Value>,
) -> Result<(), GridError> {
    let before_json = before.map(serde_json::to_string).transpose()?;
    let after_json = after.map(serde_json::to_string).transpose()?;

    let entry = NewAuditLog {
        user_id: ctx.user_id,
        entity_type,
        entity_id,
        action,
        before_json: before_json.as_deref(),
        after_json: after_json.as_deref(),
        source: &ctx.source,
    };

    diesel::insert_into(audit_logs::table)
        .values(&entry)
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Audit insert failed: {}", e)))?;

    Ok(())
}

/// Most recent entries, newest first
pub fn recent(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<AuditLog>, GridError> {
    audit_logs::table
        .order(audit_logs::id.desc())
        .limit(limit)
        .load(conn)
        .map_err(|e| GridError::Internal(format!("Audit query failed: {}", e)))
}

/// Full history for one entity, oldest first
pub fn list_for_entity(
    conn: &mut SqliteConnection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<AuditLog>, GridError> {
    audit_logs::table
        .filter(audit_logs::entity_type.eq(entity_type))
        .filter(audit_logs::entity_id.eq(entity_id))
        .order(audit_logs::id.asc())
        .load(conn)
        .map_err(|e| GridError::Internal(format!("Audit query failed: {}", e)))
}
