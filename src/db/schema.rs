//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use tracing::info;

use crate::error::GridError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), GridError> {
    // Check current schema version
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = diesel::sql_types::Integer)]
    version: i32,
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, GridError> {
    // Create schema_version table if it doesn't exist
    diesel::sql_query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(conn)
        .map_err(|e| {
            GridError::Internal(format!("Failed to create schema_version table: {}", e))
        })?;

    let row: Option<VersionRow> = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result(conn)
        .optional()
        .map_err(|e| GridError::Internal(format!("Failed to read schema_version: {}", e)))?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

/// Set schema version
fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), GridError> {
    diesel::sql_query("DELETE FROM schema_version")
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<diesel::sql_types::Integer, _>(version)
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &mut SqliteConnection) -> Result<(), GridError> {
    conn.batch_execute(GRID_SCHEMA)
        .map_err(|e| GridError::Internal(format!("Failed to create grid tables: {}", e)))?;

    conn.batch_execute(LEDGER_SCHEMA)
        .map_err(|e| GridError::Internal(format!("Failed to create ledger tables: {}", e)))?;

    conn.batch_execute(DONATIONS_SCHEMA)
        .map_err(|e| GridError::Internal(format!("Failed to create donation tables: {}", e)))?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| GridError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), GridError> {
    // Add migration steps here as schema evolves
    match from_version {
        // Example: 1 -> 2 migration would go here
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Batches and cells schema
const GRID_SCHEMA: &str = r#"
-- A group of cells allocated together as one financial event.
-- allocated_cell_ids holds an ordered JSON array of cell codes;
-- allocated_cell_count and allocated_area mirror it.
CREATE TABLE IF NOT EXISTS allocation_batches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_type TEXT NOT NULL,
    approval_status TEXT NOT NULL DEFAULT 'pending',
    original_amount REAL NOT NULL DEFAULT 0,
    additional_amount REAL NOT NULL DEFAULT 0,
    total_amount REAL NOT NULL DEFAULT 0,
    allocated_cell_ids TEXT NOT NULL DEFAULT '[]',
    allocated_cell_count INTEGER NOT NULL DEFAULT 0,
    allocated_area REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Physical floor cells, seeded once and recycled forever.
-- cell_id encodes rectangle + type + sequence, e.g. A0505-0001.
-- No FK on pledge_id/payment_id: manual allocation may reference
-- donation ids with no local row.
CREATE TABLE IF NOT EXISTS grid_cells (
    cell_id TEXT PRIMARY KEY NOT NULL,
    rectangle_id TEXT NOT NULL,
    cell_type TEXT NOT NULL,
    area_size REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'available',
    pledge_id INTEGER,
    payment_id INTEGER,
    allocation_batch_id INTEGER REFERENCES allocation_batches(id),
    donor_name TEXT,
    amount REAL,
    assigned_date TEXT
);
"#;

/// Counters and audit schema
const LEDGER_SCHEMA: &str = r#"
-- Singleton running totals, updated only via atomic deltas
CREATE TABLE IF NOT EXISTS counters (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    paid_total REAL NOT NULL DEFAULT 0,
    pledged_total REAL NOT NULL DEFAULT 0,
    grand_total REAL NOT NULL DEFAULT 0,
    version INTEGER NOT NULL DEFAULT 0,
    recalc_needed INTEGER NOT NULL DEFAULT 0
);

-- Append-only audit trail. Rows are never updated or deleted.
CREATE TABLE IF NOT EXISTS audit_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    action TEXT NOT NULL,
    before_json TEXT,
    after_json TEXT,
    source TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Donation rows the undo/edit workflows and reconciliation act on
const DONATIONS_SCHEMA: &str = r#"
-- Pledges. donation_type selects the counter bucket (paid or pledged).
CREATE TABLE IF NOT EXISTS pledges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    donor_name TEXT NOT NULL,
    amount REAL NOT NULL,
    donation_type TEXT NOT NULL DEFAULT 'pledged',
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Payments, optionally made against a pledge. Always counted as paid.
CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pledge_id INTEGER,
    donor_name TEXT NOT NULL,
    amount REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Indexes for the hot lookups
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_grid_cells_pledge ON grid_cells(pledge_id);
CREATE INDEX IF NOT EXISTS idx_grid_cells_payment ON grid_cells(payment_id);
CREATE INDEX IF NOT EXISTS idx_grid_cells_status ON grid_cells(status);
CREATE INDEX IF NOT EXISTS idx_grid_cells_batch ON grid_cells(allocation_batch_id);
CREATE INDEX IF NOT EXISTS idx_audit_logs_entity ON audit_logs(entity_type, entity_id);
"#;
