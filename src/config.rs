//! Configuration for floorgrid

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cell_id::{cell_types, rectangles};

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("floorgrid")
}

/// One seeded run of cells: a rectangle gets `count` cells of one type,
/// numbered 1..=count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectangleSpec {
    /// Rectangle letter, `A`..`G`
    pub rectangle: String,

    /// Cell type code for this run
    #[serde(default = "default_cell_type")]
    pub cell_type: String,

    /// Number of cells to seed
    #[serde(default = "default_cell_count")]
    pub count: u32,
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the grid database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,

    /// Floor layout seeded by `init`. Reseeding is additive: cells that
    /// already exist are left untouched.
    #[serde(default = "default_layout")]
    pub layout: Vec<RectangleSpec>,
}

fn default_cell_type() -> String {
    cell_types::ATOMIC.to_string()
}

fn default_cell_count() -> u32 {
    400
}

fn default_busy_timeout() -> u32 {
    5000
}

fn default_layout() -> Vec<RectangleSpec> {
    rectangles::ALL
        .iter()
        .map(|r| RectangleSpec {
            rectangle: r.to_string(),
            cell_type: default_cell_type(),
            count: default_cell_count(),
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            busy_timeout_ms: default_busy_timeout(),
            layout: default_layout(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get grid database path
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("floorgrid.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
