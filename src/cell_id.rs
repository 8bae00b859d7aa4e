//! Cell code parsing and formatting
//!
//! Every grid cell is identified by a stable human-readable code:
//! `<rectangle:1 letter><cell type:4 digits>-<sequence:4 digits>`,
//! e.g. `A0505-0001` = rectangle A, 0.5x0.5 type, sequence 1.
//!
//! The encoding is load-bearing: sequence ordering and cell type are parsed
//! back out of it by the admin views, so it must round-trip exactly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GridError;

// ============================================================================
// Rectangle Constants
// ============================================================================

/// Named floor regions
pub mod rectangles {
    pub const ALL: [&str; 7] = ["A", "B", "C", "D", "E", "F", "G"];

    /// Check if a rectangle id is valid
    pub fn is_valid(rectangle: &str) -> bool {
        ALL.contains(&rectangle)
    }
}

// ============================================================================
// Cell Type Constants
// ============================================================================

/// Physical cell sizes, encoded as `WWHH` in decimetres x 10
/// (`05` = 0.5m, `10` = 1.0m, `20` = 2.0m).
pub mod cell_types {
    /// The atomic unit. All larger types are display-only compositions of
    /// 4 or more atomic cells and are never mutated directly by the engine.
    pub const ATOMIC: &str = "0505";
    pub const ONE_BY_ONE: &str = "1010";
    pub const ONE_BY_TWO: &str = "1020";
    pub const TWO_BY_TWO: &str = "2020";

    pub const ALL: [&str; 4] = [ATOMIC, ONE_BY_ONE, ONE_BY_TWO, TWO_BY_TWO];

    /// Check if a cell type code is one of the seeded sizes
    pub fn is_valid(code: &str) -> bool {
        ALL.contains(&code)
    }

    /// Area in square metres derived from the code, or None if the code is
    /// not four ASCII digits. `0505` -> 0.25, `1010` -> 1.0, `2020` -> 4.0.
    pub fn area_of(code: &str) -> Option<f64> {
        if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let width: f64 = code[0..2].parse::<u32>().ok()? as f64 / 10.0;
        let height: f64 = code[2..4].parse::<u32>().ok()? as f64 / 10.0;
        Some(width * height)
    }
}

// ============================================================================
// CellId
// ============================================================================

/// Parsed form of a cell code.
///
/// Construct via [`CellId::parse`] or [`CellId::new`]; `Display` renders the
/// canonical code back, bit for bit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId {
    /// Rectangle letter, `A`..`G`
    pub rectangle: String,
    /// Four-digit cell type code, e.g. `0505`
    pub type_code: String,
    /// One-based sequence within (rectangle, type), 1..=9999
    pub sequence: u32,
}

impl CellId {
    /// Build a cell id from validated parts.
    pub fn new(rectangle: &str, type_code: &str, sequence: u32) -> Result<Self, GridError> {
        if !rectangles::is_valid(rectangle) {
            return Err(GridError::InvalidInput(format!(
                "Invalid rectangle: {}. Valid rectangles: {:?}",
                rectangle,
                rectangles::ALL
            )));
        }
        if !cell_types::is_valid(type_code) {
            return Err(GridError::InvalidInput(format!(
                "Invalid cell type: {}. Valid types: {:?}",
                type_code,
                cell_types::ALL
            )));
        }
        if sequence == 0 || sequence > 9999 {
            return Err(GridError::InvalidInput(format!(
                "Sequence out of range: {} (expected 1..=9999)",
                sequence
            )));
        }
        Ok(Self {
            rectangle: rectangle.to_string(),
            type_code: type_code.to_string(),
            sequence,
        })
    }

    /// Parse a canonical cell code like `A0505-0001`.
    pub fn parse(code: &str) -> Result<Self, GridError> {
        let bytes = code.as_bytes();
        // 1 letter + 4 digits + '-' + 4 digits
        if bytes.len() != 10 || !code.is_ascii() || bytes[5] != b'-' {
            return Err(GridError::InvalidInput(format!(
                "Malformed cell code: {} (expected <rect><tttt>-<ssss>)",
                code
            )));
        }
        let rectangle = &code[0..1];
        let type_code = &code[1..5];
        let sequence: u32 = code[6..10]
            .parse()
            .map_err(|_| GridError::InvalidInput(format!("Malformed cell sequence: {}", code)))?;

        Self::new(rectangle, type_code, sequence)
    }

    /// Area in square metres for this cell's type.
    pub fn area(&self) -> f64 {
        // type_code was validated against cell_types::ALL on construction
        cell_types::area_of(&self.type_code).unwrap_or(0.0)
    }

    /// True for the atomic 0.5x0.5 type, the only type the engine mutates.
    pub fn is_atomic(&self) -> bool {
        self.type_code == cell_types::ATOMIC
    }

    /// Display-side box grouping: 4 consecutive atomic cells form one box.
    /// Purely derived, never stored.
    pub fn box_number(&self) -> u32 {
        (self.sequence - 1) / 4 + 1
    }

    /// One-based position of this cell within its box (1..=4).
    pub fn position_in_box(&self) -> u32 {
        (self.sequence - 1) % 4 + 1
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}-{:04}", self.rectangle, self.type_code, self.sequence)
    }
}
