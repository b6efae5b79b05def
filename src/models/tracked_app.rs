use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::Validate;

use crate::models::AppStatus;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct TrackedApp {
    pub id: String,
    pub source_url: String,
    pub status: AppStatus,

    // Check bookkeeping
    pub last_checked_at: DateTime<Utc>,
    pub check_count: i64,

    // Alerting
    pub notified_at: Option<DateTime<Utc>>,
    pub notification_count: i64,
    pub last_dispatch_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTrackedApp {
    #[serde(alias = "appId")]
    #[validate(length(min = 1, max = 255, message = "app id must be 1-255 characters"))]
    pub id: String,
    #[serde(alias = "appUrl")]
    #[validate(url(message = "url must be a valid absolute URL"))]
    pub url: String,
}

impl NewTrackedApp {
    /// Validates the payload and checks that the URL points at the storefront host
    /// (or one of its subdomains).
    pub fn validate_for(&self, storefront_host: &str) -> Result<Url> {
        self.validate()?;

        if self.id.trim().is_empty() || self.id.chars().any(char::is_whitespace) {
            return Err(AppError::Validation("app id must not contain whitespace".into()));
        }

        let url = Url::parse(&self.url)
            .map_err(|e| AppError::Validation(format!("invalid url: {}", e)))?;

        let on_storefront = url.host_str().is_some_and(|host| {
            host.eq_ignore_ascii_case(storefront_host)
                || host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", storefront_host.to_ascii_lowercase()))
        });

        if !on_storefront {
            return Err(AppError::Validation(format!(
                "url must point to {}",
                storefront_host
            )));
        }

        Ok(url)
    }
}

impl TrackedApp {
    pub fn new(new_app: NewTrackedApp) -> Self {
        Self::new_at(new_app, Utc::now())
    }

    pub fn new_at(new_app: NewTrackedApp, now: DateTime<Utc>) -> Self {
        Self {
            id: new_app.id.trim().to_string(),
            source_url: new_app.url,
            status: AppStatus::Active,
            last_checked_at: now,
            check_count: 0,
            notified_at: None,
            notification_count: 0,
            last_dispatch_id: None,
            created_at: now,
        }
    }

    /// Due when at least `interval` has elapsed since the last completed check.
    pub fn is_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        now.signed_duration_since(self.last_checked_at) >= interval
    }

    /// Candidates for scheduled checks: active apps, and removed apps whose alert is
    /// still pending.
    pub fn is_monitored(&self) -> bool {
        matches!(self.status, AppStatus::Active | AppStatus::Removed)
    }
}
