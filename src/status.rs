//! Page classification and the per-app status state machine.
//!
//! A check produces a [`Classification`]; applying it to a [`TrackedApp`] yields a
//! [`Transition`] telling the monitor what (if anything) to do next. The status gate
//! here is what keeps removal alerts to at most one per disappearance.

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::models::{AppStatus, TrackedApp};

pub const DEFAULT_NOT_FOUND_TITLE: &str = "Not Found";

/// Outcome of a single check attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Classification {
    Present,
    NotFound,
    FetchFailed { error: String },
}

impl Classification {
    pub fn fetch_failed(error: impl Into<String>) -> Self {
        Classification::FetchFailed {
            error: error.into(),
        }
    }

    /// Present and NotFound are completed checks; FetchFailed is not.
    pub fn is_completed(&self) -> bool {
        !matches!(self, Classification::FetchFailed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Present => "present",
            Classification::NotFound => "not_found",
            Classification::FetchFailed { .. } => "fetch_failed",
        }
    }
}

/// What applying a classification did to an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// Still listed, nothing changed.
    Unchanged,
    /// Listed again after being removed or notified; the app is active and re-armed.
    Reappeared { previous: AppStatus },
    /// The app is removed and its alert has not been delivered yet.
    AlertRequired { first_detection: bool },
    /// Still missing and the alert for this disappearance was already delivered.
    AlreadyNotified,
    /// The check did not complete; the app was left untouched.
    Incomplete { error: String },
}

/// Extracts the document title with inner whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document.select(&selector).next()?;
    let text = title.text().collect::<Vec<_>>().join(" ");
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(normalized)
}

/// Classifies a fetched storefront page. A page counts as delisted only when its
/// normalized title is exactly `not_found_title`.
pub fn classify_page(html: &str, not_found_title: &str) -> Classification {
    match extract_title(html) {
        Some(title) if title == not_found_title.trim() => Classification::NotFound,
        _ => Classification::Present,
    }
}

impl TrackedApp {
    pub fn apply_classification(
        &mut self,
        classification: &Classification,
        now: DateTime<Utc>,
    ) -> Transition {
        let listed = match classification {
            Classification::FetchFailed { error } => {
                return Transition::Incomplete {
                    error: error.clone(),
                };
            }
            Classification::Present => true,
            Classification::NotFound => false,
        };

        self.record_completed_check(now);

        match (listed, self.status) {
            (true, AppStatus::Active) => Transition::Unchanged,
            (true, previous) => {
                self.status = AppStatus::Active;
                self.notified_at = None;
                Transition::Reappeared { previous }
            }
            (false, AppStatus::Active) => {
                self.status = AppStatus::Removed;
                Transition::AlertRequired {
                    first_detection: true,
                }
            }
            (false, AppStatus::Removed) => Transition::AlertRequired {
                first_detection: false,
            },
            (false, AppStatus::Notified) => Transition::AlreadyNotified,
        }
    }

    /// Records a delivered removal alert. Only a removed app can be marked; returns
    /// false (and changes nothing) otherwise.
    pub fn mark_notified(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != AppStatus::Removed {
            return false;
        }
        self.status = AppStatus::Notified;
        self.notified_at = Some(now);
        self.notification_count += 1;
        true
    }

    /// Manual reactivation: back to active, alert state cleared.
    pub fn reactivate(&mut self) -> bool {
        if self.status == AppStatus::Active {
            return false;
        }
        self.status = AppStatus::Active;
        self.notified_at = None;
        true
    }

    fn record_completed_check(&mut self, now: DateTime<Utc>) {
        self.last_checked_at = self.last_checked_at.max(now);
        self.check_count += 1;
    }
}
