//! Admin context for attributed database operations
//!
//! Every mutating operation is performed by some admin through some surface;
//! both are recorded on the audit rows the operation appends.

/// Admin context passed to all mutating operations for audit attribution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdminContext {
    /// Acting admin user id
    pub user_id: i64,
    /// Surface the action came through, e.g. `cli`, `admin_panel`
    pub source: String,
}

impl AdminContext {
    /// Create a new admin context
    pub fn new(user_id: i64, source: impl Into<String>) -> Self {
        Self {
            user_id,
            source: source.into(),
        }
    }

    /// Context for actions driven from the command line
    pub fn cli(user_id: i64) -> Self {
        Self::new(user_id, "cli")
    }

    /// Context for actions driven from the admin panel
    pub fn admin_panel(user_id: i64) -> Self {
        Self::new(user_id, "admin_panel")
    }
}

impl std::fmt::Display for AdminContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AdminContext({} via {})", self.user_id, self.source)
    }
}
