use async_trait::async_trait;

use crate::models::{AppStatus, LogEntry, MonitorConfig, NewLogEntry, TrackedApp};
use crate::utils::error::Result;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Durable records of tracked apps.
#[async_trait]
pub trait AppStore: Send + Sync {
    async fn insert_app(&self, app: &TrackedApp) -> Result<()>;
    async fn get_app(&self, id: &str) -> Result<Option<TrackedApp>>;
    /// Newest first.
    async fn list_apps(&self) -> Result<Vec<TrackedApp>>;
    /// Oldest check first, so the most overdue apps lead a batch.
    async fn list_apps_with_status(&self, statuses: &[AppStatus]) -> Result<Vec<TrackedApp>>;
    async fn update_app(&self, app: &TrackedApp) -> Result<()>;
    /// Returns false when no app had this id.
    async fn delete_app(&self, id: &str) -> Result<bool>;
    async fn count_apps(&self) -> Result<i64>;
    async fn count_apps_with_status(&self, statuses: &[AppStatus]) -> Result<i64>;
    async fn total_notifications(&self) -> Result<i64>;
}

/// The monitoring settings singleton.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Loads the config, creating the default row if it does not exist yet.
    async fn get_or_create_config(&self) -> Result<MonitorConfig>;
    async fn save_config(&self, config: &MonitorConfig) -> Result<()>;
}

/// Append-only event log.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry>;
    async fn latest(&self) -> Result<Option<LogEntry>>;
    /// Most recent first.
    async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>>;
}
