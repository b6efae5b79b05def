use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod log_entry;
pub mod monitor_config;
pub mod tracked_app;

// Re-exports for convenience
pub use log_entry::*;
pub use monitor_config::*;
pub use tracked_app::*;

/// Lifecycle of a tracked app's storefront listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum AppStatus {
    #[sqlx(rename = "active")]
    Active,
    #[sqlx(rename = "removed")]
    Removed,
    #[sqlx(rename = "notified")]
    Notified,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Active => "active",
            AppStatus::Removed => "removed",
            AppStatus::Notified => "notified",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum LogSeverity {
    #[sqlx(rename = "info")]
    Info,
    #[sqlx(rename = "success")]
    Success,
    #[sqlx(rename = "warning")]
    Warning,
    #[sqlx(rename = "error")]
    Error,
}

// Identifier for a single notification dispatch attempt
pub fn generate_dispatch_id() -> String {
    Uuid::new_v4().simple().to_string()
}
