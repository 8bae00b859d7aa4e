//! Engine layer for the floor grid
//!
//! The engines own transaction boundaries and orchestration across the
//! repository modules. Each public operation runs inside one immediate
//! (write-locking) transaction covering everything it touches: donation
//! status, cells, batch aggregates, counters and audit rows change together
//! or not at all.
//!
//! ## Architecture
//!
//! ```text
//! Admin surface (CLI / callers)
//!     ↓
//! Engine layer (transactions, orchestration)
//!     ↓
//! Repository layer (db/*.rs)
//!     ↓
//! SQLite database
//! ```

pub mod deallocation;
pub mod manual;
pub mod reconcile;
pub mod workflows;

// Re-exports
pub use deallocation::{DeallocationEngine, DeallocationResult};
pub use manual::{AllocateCellInput, ManualAllocation};
pub use reconcile::{Reconciler, ReconcileReport};
pub use workflows::{Donation, DonationKind, Workflows};

use crate::db::GridDb;

/// Engine container for dependency injection
///
/// Holds all engines over one shared connection pool.
pub struct Engine {
    pub deallocation: DeallocationEngine,
    pub manual: ManualAllocation,
    pub workflows: Workflows,
    pub reconciler: Reconciler,
}

impl Engine {
    /// Create all engines over a shared database
    pub fn new(db: GridDb) -> Self {
        Self {
            deallocation: DeallocationEngine::new(db.clone()),
            manual: ManualAllocation::new(db.clone()),
            workflows: Workflows::new(db.clone()),
            reconciler: Reconciler::new(db),
        }
    }
}
