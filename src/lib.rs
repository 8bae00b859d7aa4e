//! Floorgrid - floor grid allocation engine for donation campaigns
//!
//! Tracks a hall floor divided into rectangles of small cells that donors
//! sponsor through pledges and payments. The engine owns the authoritative
//! state: which cell belongs to which donation, the running money counters,
//! and an append-only audit trail of every admin action.
//!
//! ## Architecture
//!
//! - **Repository layer** (`db::*`): one module per table over Diesel/SQLite
//! - **Engine layer** (`engine::*`): multi-table workflows, each inside one
//!   write-locking transaction
//! - **CLI** (`floorgrid` binary): admin surface over the engine
//!
//! ## Cell Ids
//!
//! ```text
//! A0505-0001
//! │└┬─┘ └┬─┘
//! │ │    └── sequence within the rectangle (0001-9999)
//! │ └─────── cell type as WWHH in decimetres (0505 = 0.5m x 0.5m)
//! └───────── rectangle letter (A-G)
//! ```
//!
//! Only atomic 0505 cells are allocated; larger types are display
//! compositions. Four consecutive atomic cells form one display box.
//!
//! ## Data Layout
//!
//! ```text
//! ~/.local/share/floorgrid/
//! ├── floorgrid.db   # SQLite: grid_cells, allocation_batches, counters,
//! │                  #         audit_logs, pledges, payments
//! └── config.toml    # Floor layout and database tuning
//! ```

pub mod cell_id;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;

// Re-exports
pub use cell_id::CellId;
pub use config::Config;
pub use db::{AdminContext, GridDb};
pub use engine::{
    AllocateCellInput, DeallocationEngine, DeallocationResult, Engine, ManualAllocation,
    ReconcileReport, Reconciler, Workflows,
};
pub use error::GridError;
