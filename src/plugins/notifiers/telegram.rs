use crate::config::NotificationsConfig;
use crate::models::ChannelCredentials;
use crate::plugins::traits::{
    format_local_timestamp, NotificationEvent, NotificationKind, NotificationResult, NotifierPlugin,
};
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
    result: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
}

/// Sends alerts through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    timezone_offset_minutes: i32,
}

impl TelegramNotifier {
    pub fn new(config: &NotificationsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(TelegramNotifier {
            client,
            api_base: config.telegram_api_base.trim_end_matches('/').to_string(),
            timezone_offset_minutes: config.timezone_offset_minutes,
        })
    }

    fn send_message_url(&self, bot_token: &str) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, bot_token)
    }

    /// Message body in Telegram's HTML parse mode.
    pub fn format_message(&self, event: &NotificationEvent) -> String {
        let timestamp = format_local_timestamp(event.occurred_at, self.timezone_offset_minutes);

        match &event.kind {
            NotificationKind::Removal {
                app_id, source_url, ..
            } => format!(
                "🚨 <b>ALERT!</b> App <code>{id}</code> has been removed from the store!\n\n\
                 📱 Package ID: <code>{id}</code>\n\
                 🔗 URL: {url}\n\n\
                 ⏰ Time: {ts}\n\n\
                 Please review this app for further action.",
                id = escape_html(app_id),
                url = escape_html(source_url),
                ts = timestamp,
            ),
            NotificationKind::Test => format!(
                "✅ Test notification from Delist Watcher!\n\n\
                 The bot is configured and ready to alert you when a monitored app is removed from the store.\n\n\
                 ⏰ Time: {}",
                timestamp
            ),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
impl NotifierPlugin for TelegramNotifier {
    fn name(&self) -> &str {
        "Telegram Notifier"
    }

    fn plugin_type(&self) -> &str {
        "telegram"
    }

    async fn notify(
        &self,
        credentials: &ChannelCredentials,
        event: &NotificationEvent,
    ) -> Result<NotificationResult> {
        let payload = json!({
            "chat_id": credentials.chat_id,
            "text": self.format_message(event),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        // The bot token is part of the URL, keep it out of error messages
        let response = self
            .client
            .post(self.send_message_url(&credentials.bot_token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Notify(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Notify(e.without_url().to_string()))?;

        let parsed: Option<TelegramResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(TelegramResponse {
                ok: true, result, ..
            }) if status.is_success() => Ok(NotificationResult::delivered(
                result.map(|m| m.message_id.to_string()),
            )),
            Some(TelegramResponse { description, .. }) => {
                Ok(NotificationResult::rejected(format!(
                    "Telegram API responded with HTTP {}: {}",
                    status,
                    description.unwrap_or_else(|| "no description".to_string())
                )))
            }
            None => Ok(NotificationResult::rejected(format!(
                "Telegram API responded with HTTP {} and an unreadable body",
                status
            ))),
        }
    }
}
