use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChannelCredentials, TrackedApp};
use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    /// An app disappeared from the storefront.
    Removal {
        app_id: String,
        source_url: String,
        dispatch_id: String,
    },
    /// Canned message confirming the channel works.
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub occurred_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn removal(app: &TrackedApp, dispatch_id: &str, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::Removal {
                app_id: app.id.clone(),
                source_url: app.source_url.clone(),
                dispatch_id: dispatch_id.to_string(),
            },
            occurred_at,
        }
    }

    pub fn test(occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::Test,
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Trait for implementing alert channels.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;

    /// Delivers the event. Transport failures are errors; a channel that answered
    /// but refused the message yields `success: false`.
    async fn notify(
        &self,
        credentials: &ChannelCredentials,
        event: &NotificationEvent,
    ) -> Result<NotificationResult>;
}

/// Renders `dd/mm/YYYY HH:MM:SS UTC±hh:mm` in the given offset.
pub fn format_local_timestamp(at: DateTime<Utc>, offset_minutes: i32) -> String {
    let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix());
    let local = at.with_timezone(&offset);

    let sign = if offset_minutes < 0 { '-' } else { '+' };
    let abs = offset_minutes.unsigned_abs();
    format!(
        "{} UTC{}{:02}:{:02}",
        local.format("%d/%m/%Y %H:%M:%S"),
        sign,
        abs / 60,
        abs % 60
    )
}
