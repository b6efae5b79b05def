use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::LogSeverity;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct LogEntry {
    pub id: i64,
    pub message: String,
    pub severity: LogSeverity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLogEntry {
    pub message: String,
    pub severity: LogSeverity,
}

impl NewLogEntry {
    pub fn new(severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Error, message)
    }
}
