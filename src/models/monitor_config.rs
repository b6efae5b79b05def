use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

pub const DEFAULT_CHECK_INTERVAL_SECONDS: i64 = 60;

/// Persisted monitoring settings. A single row, created lazily on first read.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct MonitorConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub check_interval_seconds: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ConfigUpdate {
    #[serde(default, alias = "telegramBotToken")]
    pub bot_token: Option<String>,
    #[serde(default, alias = "telegramChatId")]
    pub chat_id: Option<String>,
    #[serde(default, alias = "checkInterval")]
    #[validate(range(min = 10, max = 86400, message = "check interval must be 10-86400 seconds"))]
    pub check_interval_seconds: Option<i64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            check_interval_seconds: DEFAULT_CHECK_INTERVAL_SECONDS,
            updated_at: Utc::now(),
        }
    }
}

impl MonitorConfig {
    /// Both credentials must be present and non-blank.
    pub fn credentials(&self) -> Option<ChannelCredentials> {
        let bot_token = self.telegram_bot_token.as_deref().map(str::trim)?;
        let chat_id = self.telegram_chat_id.as_deref().map(str::trim)?;
        if bot_token.is_empty() || chat_id.is_empty() {
            return None;
        }
        Some(ChannelCredentials {
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    pub fn check_interval(&self) -> Duration {
        if self.check_interval_seconds > 0 {
            Duration::seconds(self.check_interval_seconds)
        } else {
            Duration::seconds(DEFAULT_CHECK_INTERVAL_SECONDS)
        }
    }

    /// Provided fields overwrite the stored ones; a blank credential clears it.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(token) = update.bot_token {
            self.telegram_bot_token = non_blank(token);
        }
        if let Some(chat_id) = update.chat_id {
            self.telegram_chat_id = non_blank(chat_id);
        }
        if let Some(interval) = update.check_interval_seconds {
            self.check_interval_seconds = interval;
        }
        self.updated_at = Utc::now();
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
