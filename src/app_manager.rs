use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{
    AppStatus, ConfigUpdate, LogEntry, MonitorConfig, NewLogEntry, NewTrackedApp, TrackedApp,
};
use crate::monitor::{CheckReport, MonitorService};
use crate::plugins::traits::NotificationResult;
use crate::store::{AppStore, AuditLog, ConfigStore};
use crate::utils::error::{AppError, Result};
use validator::Validate;

pub const DEFAULT_LOG_LIMIT: i64 = 50;
pub const MAX_LOG_LIMIT: i64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorStats {
    pub total_apps: i64,
    pub active_apps: i64,
    /// Removed and notified apps together.
    pub removed_apps: i64,
    pub notifications_sent: i64,
    pub last_check: Option<DateTime<Utc>>,
}

/// Operations behind the HTTP API.
pub struct AppManager {
    apps: Arc<dyn AppStore>,
    configs: Arc<dyn ConfigStore>,
    audit: Arc<dyn AuditLog>,
    monitor: Arc<MonitorService>,
    storefront_host: String,
}

impl AppManager {
    pub fn new(
        apps: Arc<dyn AppStore>,
        configs: Arc<dyn ConfigStore>,
        audit: Arc<dyn AuditLog>,
        monitor: Arc<MonitorService>,
        storefront_host: impl Into<String>,
    ) -> Self {
        Self {
            apps,
            configs,
            audit,
            monitor,
            storefront_host: storefront_host.into(),
        }
    }

    pub async fn list_apps(&self) -> Result<Vec<TrackedApp>> {
        self.apps.list_apps().await
    }

    pub async fn get_app(&self, id: &str) -> Result<TrackedApp> {
        self.apps
            .get_app(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("app {}", id)))
    }

    pub async fn add_app(&self, request: NewTrackedApp) -> Result<TrackedApp> {
        let request = NewTrackedApp {
            id: request.id.trim().to_string(),
            url: request.url.trim().to_string(),
        };
        request.validate_for(&self.storefront_host)?;

        if self.apps.get_app(&request.id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "app {} is already being monitored",
                request.id
            )));
        }

        let app = TrackedApp::new(request);
        self.apps.insert_app(&app).await?;

        tracing::info!(app_id = %app.id, url = %app.source_url, "Started monitoring app");
        self.record_event(NewLogEntry::info(format!("Added app {} to monitoring", app.id)))
            .await;
        Ok(app)
    }

    pub async fn remove_app(&self, id: &str) -> Result<()> {
        let _guard = self.monitor.lock_app(id).await;
        if !self.apps.delete_app(id).await? {
            return Err(AppError::not_found(format!("app {}", id)));
        }

        tracing::info!(app_id = %id, "Stopped monitoring app");
        self.record_event(NewLogEntry::info(format!("Removed app {} from monitoring", id)))
            .await;
        Ok(())
    }

    /// Checks one app immediately, whatever its status or due time.
    pub async fn check_now(&self, id: &str) -> Result<CheckReport> {
        tracing::info!(app_id = %id, "Running manual check");
        self.monitor.check_app(id).await
    }

    pub async fn reactivate_app(&self, id: &str) -> Result<TrackedApp> {
        let _guard = self.monitor.lock_app(id).await;
        let mut app = self.get_app(id).await?;
        let previous = app.status;

        if app.reactivate() {
            self.apps.update_app(&app).await?;
            tracing::info!(app_id = %id, previous = %previous, "App reactivated");
            self.record_event(NewLogEntry::info(format!(
                "App {} reactivated (was {})",
                id, previous
            )))
            .await;
        }
        Ok(app)
    }

    pub async fn get_config(&self) -> Result<MonitorConfig> {
        self.configs.get_or_create_config().await
    }

    pub async fn update_config(&self, update: ConfigUpdate) -> Result<MonitorConfig> {
        update.validate()?;

        let mut config = self.configs.get_or_create_config().await?;
        config.apply(update);
        self.configs.save_config(&config).await?;

        tracing::info!(
            channel_configured = config.credentials().is_some(),
            check_interval_seconds = config.check_interval_seconds,
            "Configuration updated"
        );
        self.record_event(NewLogEntry::success("Configuration updated"))
            .await;
        Ok(config)
    }

    pub async fn send_test_notification(&self) -> Result<NotificationResult> {
        self.monitor.send_test_notification().await
    }

    pub async fn stats(&self) -> Result<MonitorStats> {
        let total_apps = self.apps.count_apps().await?;
        let active_apps = self.apps.count_apps_with_status(&[AppStatus::Active]).await?;
        let removed_apps = self
            .apps
            .count_apps_with_status(&[AppStatus::Removed, AppStatus::Notified])
            .await?;
        let notifications_sent = self.apps.total_notifications().await?;
        let last_check = self.audit.latest().await?.map(|entry| entry.timestamp);

        Ok(MonitorStats {
            total_apps,
            active_apps,
            removed_apps,
            notifications_sent,
            last_check,
        })
    }

    pub async fn recent_logs(&self, limit: Option<i64>) -> Result<Vec<LogEntry>> {
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT);
        if !(1..=MAX_LOG_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LOG_LIMIT
            )));
        }
        self.audit.recent(limit).await
    }

    async fn record_event(&self, entry: NewLogEntry) {
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!(error = %e, "Failed to append audit log entry");
        }
    }
}
