pub mod app_manager;
pub mod config;
pub mod models;
pub mod monitor;
pub mod pacing;
pub mod plugins;
pub mod scheduler;
pub mod scraper;
pub mod status;
pub mod store;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use app_manager::{AppManager, MonitorStats};
pub use config::AppConfig;
pub use monitor::{MonitorService, TickSummary};
pub use scheduler::{MonitorScheduler, TickRunner};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
