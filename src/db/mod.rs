//! SQLite database module for the floor grid
//!
//! All grid state lives in one SQLite file behind an r2d2 pool. Repository
//! functions take `&mut SqliteConnection` so callers can compose them inside
//! a single transaction; the engine layer owns transaction boundaries.
//!
//! ## Tables
//!
//! - `grid_cells` - physical floor cells and their allocation state
//! - `allocation_batches` - aggregates for cells allocated as one event
//! - `counters` - singleton paid/pledged/grand running totals
//! - `audit_logs` - append-only mutation trail with before/after snapshots
//! - `pledges` / `payments` - donation rows the workflows act on

pub mod audit;
pub mod batches;
pub mod cells;
pub mod context;
pub mod counters;
pub mod diesel_schema;
pub mod donations;
pub mod models;
pub mod schema;

use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use tracing::{debug, info};

use crate::error::GridError;
use models::cell_status;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

diesel::define_sql_function! {
    /// Rowid of the most recent successful INSERT on this connection
    fn last_insert_rowid() -> BigInt;
}

/// Per-connection PRAGMAs, applied by the pool on checkout
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout_ms: u32,
}

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionPragmas
{
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; \
             PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled handle to the grid database
#[derive(Clone)]
pub struct GridDb {
    pool: DbPool,
}

impl GridDb {
    /// Open or create the grid database at the given path
    pub fn open(db_path: &Path, busy_timeout_ms: u32) -> Result<Self, GridError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening grid database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(8)
            .connection_customizer(Box::new(ConnectionPragmas { busy_timeout_ms }))
            .build(manager)
            .map_err(|e| GridError::Internal(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, GridError> {
        debug!("Opening in-memory grid database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        // Pool of one: every checkout sees the same in-memory database
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(ConnectionPragmas {
                busy_timeout_ms: 5000,
            }))
            .build(manager)
            .map_err(|e| GridError::Internal(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), GridError> {
        let mut conn = self.conn()?;
        schema::init_schema(&mut conn)?;
        Ok(())
    }

    /// Check out a pooled connection
    pub fn conn(&self) -> Result<DbConn, GridError> {
        self.pool
            .get()
            .map_err(|e| GridError::Internal(format!("Failed to get connection: {}", e)))
    }

    /// Get occupancy statistics for the status view
    pub fn stats(&self) -> Result<DbStats, GridError> {
        use diesel_schema::{allocation_batches, audit_logs, grid_cells};

        let mut conn = self.conn()?;

        let count_with_status = |conn: &mut SqliteConnection, status: &str| -> Result<i64, GridError> {
            grid_cells::table
                .filter(grid_cells::status.eq(status))
                .count()
                .get_result(conn)
                .map_err(|e| GridError::Internal(format!("Cell count query failed: {}", e)))
        };

        let total_cells: i64 = grid_cells::table
            .count()
            .get_result(&mut conn)
            .map_err(|e| GridError::Internal(format!("Cell count query failed: {}", e)))?;
        let available_cells = count_with_status(&mut conn, cell_status::AVAILABLE)?;
        let pledged_cells = count_with_status(&mut conn, cell_status::PLEDGED)?;
        let paid_cells = count_with_status(&mut conn, cell_status::PAID)?;
        let blocked_cells = count_with_status(&mut conn, cell_status::BLOCKED)?;

        let batch_count: i64 = allocation_batches::table
            .count()
            .get_result(&mut conn)
            .map_err(|e| GridError::Internal(format!("Batch count query failed: {}", e)))?;

        let audit_entries: i64 = audit_logs::table
            .count()
            .get_result(&mut conn)
            .map_err(|e| GridError::Internal(format!("Audit count query failed: {}", e)))?;

        Ok(DbStats {
            total_cells: total_cells as u64,
            available_cells: available_cells as u64,
            pledged_cells: pledged_cells as u64,
            paid_cells: paid_cells as u64,
            blocked_cells: blocked_cells as u64,
            batch_count: batch_count as u64,
            audit_entries: audit_entries as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub total_cells: u64,
    pub available_cells: u64,
    pub pledged_cells: u64,
    pub paid_cells: u64,
    pub blocked_cells: u64,
    pub batch_count: u64,
    pub audit_entries: u64,
}

// Re-exports
pub use context::AdminContext;
