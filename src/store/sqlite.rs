use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use super::{AppStore, AuditLog, ConfigStore};
use crate::config::DatabaseConfig;
use crate::models::{
    AppStatus, LogEntry, MonitorConfig, NewLogEntry, TrackedApp, DEFAULT_CHECK_INTERVAL_SECONDS,
};
use crate::utils::error::{AppError, Result};

const APP_COLUMNS: &str = "id, source_url, status, last_checked_at, check_count, notified_at, \
                           notification_count, last_dispatch_id, created_at";

/// SQLite-backed implementation of every store trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        if !is_memory_url(&config.url) {
            if let Some(parent) = options.clone().get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let mut pool_options =
            SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(config.acquire_timeout));

        // Every connection to an in-memory database sees its own empty database
        pool_options = if is_memory_url(&config.url) {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(url = %redact_url(&config.url), "Connected to database");
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout: 5,
        })
        .await
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

fn push_status_list<'a>(builder: &mut QueryBuilder<'a, Sqlite>, statuses: &'a [AppStatus]) {
    builder.push(" WHERE status IN (");
    let mut separated = builder.separated(", ");
    for status in statuses {
        separated.push_bind(status.as_str());
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl AppStore for SqliteStore {
    async fn insert_app(&self, app: &TrackedApp) -> Result<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO tracked_apps ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            APP_COLUMNS
        ))
        .bind(&app.id)
        .bind(&app.source_url)
        .bind(app.status)
        .bind(app.last_checked_at)
        .bind(app.check_count)
        .bind(app.notified_at)
        .bind(app.notification_count)
        .bind(&app.last_dispatch_id)
        .bind(app.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict(format!("app {} is already monitored", app.id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_app(&self, id: &str) -> Result<Option<TrackedApp>> {
        let app = sqlx::query_as::<_, TrackedApp>(&format!(
            "SELECT {} FROM tracked_apps WHERE id = ?",
            APP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(app)
    }

    async fn list_apps(&self) -> Result<Vec<TrackedApp>> {
        let apps = sqlx::query_as::<_, TrackedApp>(&format!(
            "SELECT {} FROM tracked_apps ORDER BY created_at DESC, rowid DESC",
            APP_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(apps)
    }

    async fn list_apps_with_status(&self, statuses: &[AppStatus]) -> Result<Vec<TrackedApp>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM tracked_apps",
            APP_COLUMNS
        ));
        push_status_list(&mut builder, statuses);
        builder.push(" ORDER BY last_checked_at ASC, rowid ASC");

        let apps = builder
            .build_query_as::<TrackedApp>()
            .fetch_all(&self.pool)
            .await?;
        Ok(apps)
    }

    async fn update_app(&self, app: &TrackedApp) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tracked_apps
            SET source_url = ?,
                status = ?,
                last_checked_at = ?,
                check_count = ?,
                notified_at = ?,
                notification_count = ?,
                last_dispatch_id = ?
            WHERE id = ?
            "#,
        )
        .bind(&app.source_url)
        .bind(app.status)
        .bind(app.last_checked_at)
        .bind(app.check_count)
        .bind(app.notified_at)
        .bind(app.notification_count)
        .bind(&app.last_dispatch_id)
        .bind(&app.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("app {}", app.id)));
        }
        Ok(())
    }

    async fn delete_app(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracked_apps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_apps(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tracked_apps")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_apps_with_status(&self, statuses: &[AppStatus]) -> Result<i64> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tracked_apps");
        push_status_list(&mut builder, statuses);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn total_notifications(&self) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(notification_count), 0) FROM tracked_apps",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get_or_create_config(&self) -> Result<MonitorConfig> {
        sqlx::query(
            r#"
            INSERT INTO monitor_config (id, check_interval_seconds, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(DEFAULT_CHECK_INTERVAL_SECONDS)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let config = sqlx::query_as::<_, MonitorConfig>(
            r#"
            SELECT telegram_bot_token, telegram_chat_id, check_interval_seconds, updated_at
            FROM monitor_config
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(config)
    }

    async fn save_config(&self, config: &MonitorConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO monitor_config (id, telegram_bot_token, telegram_chat_id, check_interval_seconds, updated_at)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                telegram_bot_token = excluded.telegram_bot_token,
                telegram_chat_id = excluded.telegram_chat_id,
                check_interval_seconds = excluded.check_interval_seconds,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.telegram_bot_token)
        .bind(&config.telegram_chat_id)
        .bind(config.check_interval_seconds)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditLog for SqliteStore {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let timestamp = Utc::now();
        let result =
            sqlx::query("INSERT INTO audit_log (message, severity, timestamp) VALUES (?, ?, ?)")
                .bind(&entry.message)
                .bind(entry.severity)
                .bind(timestamp)
                .execute(&self.pool)
                .await?;

        Ok(LogEntry {
            id: result.last_insert_rowid(),
            message: entry.message,
            severity: entry.severity,
            timestamp,
        })
    }

    async fn latest(&self) -> Result<Option<LogEntry>> {
        let entry = sqlx::query_as::<_, LogEntry>(
            "SELECT id, message, severity, timestamp FROM audit_log ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let entries = sqlx::query_as::<_, LogEntry>(
            "SELECT id, message, severity, timestamp FROM audit_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
