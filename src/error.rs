//! Error types for floorgrid

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Cell not found: {0}")]
    CellNotFound(String),

    #[error("Cell not available: {0}")]
    CellNotAvailable(String),

    #[error("Cell not allocated: {0}")]
    CellNotAllocated(String),

    #[error("Allocation batch not found: {0}")]
    BatchNotFound(i64),

    #[error("{kind} not found: {id}")]
    DonationNotFound { kind: &'static str, id: i64 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Floor deallocation failed: {0}")]
    Deallocation(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
