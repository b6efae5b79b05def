//! The monitoring engine: picks due apps, checks them one at a time at a paced rate,
//! applies the status state machine and dispatches removal alerts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{generate_dispatch_id, AppStatus, NewLogEntry, TrackedApp};
use crate::pacing::{CheckQueue, Pacer};
use crate::plugins::traits::{NotificationEvent, NotificationResult, NotifierPlugin};
use crate::scraper::StatusFetcher;
use crate::status::{Classification, Transition};
use crate::store::{AppStore, AuditLog, ConfigStore};
use crate::utils::error::{AppError, Result};

/// Statuses the scheduler keeps checking. Notified apps are left alone so a
/// disappearance is only ever alerted once.
pub const MONITORED_STATUSES: [AppStatus; 2] = [AppStatus::Active, AppStatus::Removed];

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AlertOutcome {
    Sent { dispatch_id: String },
    Failed { dispatch_id: Option<String>, error: String },
    ChannelNotConfigured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub app_id: String,
    pub classification: Classification,
    pub transition: Transition,
    pub alert: Option<AlertOutcome>,
    pub app: TrackedApp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickSummary {
    pub due: usize,
    pub deferred: usize,
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub alerts_sent: usize,
}

impl TickSummary {
    fn record(&mut self, report: &CheckReport) {
        if report.classification.is_completed() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        if matches!(report.alert, Some(AlertOutcome::Sent { .. })) {
            self.alerts_sent += 1;
        }
    }
}

/// Apps that are monitored and whose last completed check is at least `interval` old.
pub fn select_due(
    candidates: Vec<TrackedApp>,
    now: DateTime<Utc>,
    interval: Duration,
) -> Vec<TrackedApp> {
    candidates
        .into_iter()
        .filter(|app| app.is_monitored() && app.is_due(now, interval))
        .collect()
}

pub struct MonitorService {
    apps: Arc<dyn AppStore>,
    configs: Arc<dyn ConfigStore>,
    audit: Arc<dyn AuditLog>,
    fetcher: Arc<dyn StatusFetcher>,
    notifier: Arc<dyn NotifierPlugin>,
    pacer: Arc<dyn Pacer>,
    max_batch_size: usize,
    app_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MonitorService {
    pub fn new(
        apps: Arc<dyn AppStore>,
        configs: Arc<dyn ConfigStore>,
        audit: Arc<dyn AuditLog>,
        fetcher: Arc<dyn StatusFetcher>,
        notifier: Arc<dyn NotifierPlugin>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            apps,
            configs,
            audit,
            fetcher,
            notifier,
            pacer,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            app_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    pub async fn run_tick(&self) -> Result<TickSummary> {
        self.run_tick_at(Utc::now()).await
    }

    /// One monitoring pass, with `now` used for due selection.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let config = self.configs.get_or_create_config().await?;
        let candidates = self.apps.list_apps_with_status(&MONITORED_STATUSES).await?;
        let due = select_due(candidates, now, config.check_interval());

        if due.is_empty() {
            tracing::debug!("No apps due for a check");
            return Ok(TickSummary::default());
        }

        let mut queue = CheckQueue::new(due, self.max_batch_size);
        let mut summary = TickSummary {
            due: queue.len() + queue.deferred(),
            deferred: queue.deferred(),
            ..Default::default()
        };

        if summary.deferred > 0 {
            tracing::warn!(
                deferred = summary.deferred,
                max_batch_size = self.max_batch_size,
                "Due apps exceed the batch limit, deferring the rest to a later tick"
            );
        }

        tracing::info!(count = queue.len(), "Starting storefront checks");
        self.record_event(NewLogEntry::info(format!(
            "Starting check of {} due apps",
            queue.len()
        )))
        .await;

        let interval = config.check_interval();
        while let Some(app) = queue.next_paced(self.pacer.as_ref()).await {
            let app_id = app.id;

            match self.check_if_due(&app_id, now, interval).await {
                Ok(Some(report)) => {
                    summary.checked += 1;
                    summary.record(&report);
                }
                Ok(None) => {}
                Err(e) => {
                    summary.checked += 1;
                    summary.failed += 1;
                    tracing::error!(app_id = %app_id, error = %e, "Failed to record check result");
                    self.record_event(NewLogEntry::error(format!(
                        "Failed to record check for app {}: {}",
                        app_id, e
                    )))
                    .await;
                }
            }
        }

        tracing::info!(
            checked = summary.checked,
            completed = summary.completed,
            failed = summary.failed,
            alerts_sent = summary.alerts_sent,
            "Finished storefront checks"
        );
        self.record_event(NewLogEntry::success(format!(
            "Finished checking {} apps ({} completed, {} failed)",
            summary.checked, summary.completed, summary.failed
        )))
        .await;

        Ok(summary)
    }

    /// Checks one app now, whatever its status or due time, and persists the result.
    /// A failed fetch is audited and leaves the stored app untouched.
    pub async fn check_app(&self, app_id: &str) -> Result<CheckReport> {
        let _guard = self.lock_app(app_id).await;
        let app = self.load_app(app_id).await?;
        self.check_locked(app).await
    }

    /// Tick path: re-reads the app under its lock and skips it when it was deleted,
    /// notified or checked since the batch was selected.
    async fn check_if_due(
        &self,
        app_id: &str,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Result<Option<CheckReport>> {
        let _guard = self.lock_app(app_id).await;
        let Some(app) = self.apps.get_app(app_id).await? else {
            tracing::debug!(app_id = %app_id, "App was deleted, skipping");
            return Ok(None);
        };
        if !(app.is_monitored() && app.is_due(now, interval)) {
            tracing::debug!(app_id = %app_id, status = %app.status, "App no longer due, skipping");
            return Ok(None);
        }
        self.check_locked(app).await.map(Some)
    }

    /// Serializes checks and manual state changes of one app. Hold the guard across
    /// the whole read-modify-write.
    pub async fn lock_app(&self, app_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.app_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(app_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn load_app(&self, app_id: &str) -> Result<TrackedApp> {
        self.apps
            .get_app(app_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("app {}", app_id)))
    }

    async fn check_locked(&self, mut app: TrackedApp) -> Result<CheckReport> {
        let classification = self.fetcher.fetch_status(&app.source_url).await;
        let now = Utc::now();
        let transition = app.apply_classification(&classification, now);

        metrics::counter!("storefront_checks_total", "outcome" => classification.label())
            .increment(1);

        if let Transition::Incomplete { error } = &transition {
            tracing::warn!(app_id = %app.id, error = %error, "Storefront check failed");
            self.record_event(NewLogEntry::error(format!(
                "Failed to check app {}: {}",
                app.id, error
            )))
            .await;

            return Ok(CheckReport {
                app_id: app.id.clone(),
                classification,
                transition,
                alert: None,
                app,
            });
        }

        let alert = match &transition {
            Transition::AlertRequired { first_detection } => {
                if *first_detection {
                    tracing::warn!(app_id = %app.id, url = %app.source_url, "App removed from the store");
                } else {
                    tracing::info!(app_id = %app.id, "Retrying pending removal alert");
                }
                Some(self.dispatch_removal_alert(&mut app, now).await)
            }
            _ => None,
        };

        // Saved before anything else is awaited so a delivered alert is never forgotten
        self.apps.update_app(&app).await?;

        match &transition {
            Transition::Unchanged => {
                tracing::debug!(app_id = %app.id, "App is still listed");
            }
            Transition::Reappeared { previous } => {
                tracing::info!(app_id = %app.id, previous = %previous, "App is listed again");
                self.record_event(NewLogEntry::info(format!(
                    "App {} is listed on the store again (was {})",
                    app.id, previous
                )))
                .await;
            }
            Transition::AlreadyNotified => {
                tracing::debug!(app_id = %app.id, "App still removed, alert already sent");
            }
            Transition::AlertRequired { .. } | Transition::Incomplete { .. } => {}
        }
        if let Some(outcome) = &alert {
            self.audit_alert(&app, outcome).await;
        }

        Ok(CheckReport {
            app_id: app.id.clone(),
            classification,
            transition,
            alert,
            app,
        })
    }

    /// Sends the removal alert for an app in the removed state. Failures are swallowed;
    /// the app then stays removed so the next due check retries.
    async fn dispatch_removal_alert(&self, app: &mut TrackedApp, now: DateTime<Utc>) -> AlertOutcome {
        // Credentials are read fresh for every dispatch
        let config = match self.configs.get_or_create_config().await {
            Ok(config) => config,
            Err(e) => {
                return alert_failed(app, None, format!("could not load notification settings: {}", e));
            }
        };

        let Some(credentials) = config.credentials() else {
            tracing::warn!(app_id = %app.id, "Notification channel is not configured, alert postponed");
            metrics::counter!("removal_alerts_total", "result" => "not_configured").increment(1);
            return AlertOutcome::ChannelNotConfigured;
        };

        let dispatch_id = generate_dispatch_id();
        app.last_dispatch_id = Some(dispatch_id.clone());
        let event = NotificationEvent::removal(app, &dispatch_id, now);

        match self.notifier.notify(&credentials, &event).await {
            Ok(result) if result.success => {
                app.mark_notified(now);
                tracing::info!(
                    app_id = %app.id,
                    dispatch_id = %dispatch_id,
                    message_id = ?result.message_id,
                    "Removal alert sent"
                );
                metrics::counter!("removal_alerts_total", "result" => "sent").increment(1);
                AlertOutcome::Sent { dispatch_id }
            }
            Ok(result) => {
                let error = result
                    .error
                    .unwrap_or_else(|| "notification was rejected".to_string());
                alert_failed(app, Some(dispatch_id), error)
            }
            Err(e) => alert_failed(app, Some(dispatch_id), e.to_string()),
        }
    }

    async fn audit_alert(&self, app: &TrackedApp, outcome: &AlertOutcome) {
        let entry = match outcome {
            AlertOutcome::Sent { .. } => NewLogEntry::warning(format!(
                "Notification sent: app {} was removed from the store",
                app.id
            )),
            AlertOutcome::Failed { error, .. } => NewLogEntry::error(format!(
                "Failed to send notification for app {}: {}",
                app.id, error
            )),
            AlertOutcome::ChannelNotConfigured => NewLogEntry::warning(format!(
                "App {} was removed from the store but the notification channel is not configured",
                app.id
            )),
        };
        self.record_event(entry).await;
    }

    /// Sends the canned test message through the configured channel.
    pub async fn send_test_notification(&self) -> Result<NotificationResult> {
        let config = self.configs.get_or_create_config().await?;
        let credentials = config.credentials().ok_or(AppError::ConfigMissing)?;

        let outcome = self
            .notifier
            .notify(&credentials, &NotificationEvent::test(Utc::now()))
            .await
            .and_then(|result| {
                if result.success {
                    Ok(result)
                } else {
                    Err(AppError::Notify(
                        result
                            .error
                            .unwrap_or_else(|| "notification was rejected".to_string()),
                    ))
                }
            });

        match outcome {
            Ok(result) => {
                self.record_event(NewLogEntry::success("Test notification sent"))
                    .await;
                Ok(result)
            }
            Err(e) => {
                tracing::error!(error = %e, "Test notification failed");
                self.record_event(NewLogEntry::error(format!(
                    "Failed to send test notification: {}",
                    e
                )))
                .await;
                Err(e)
            }
        }
    }

    async fn record_event(&self, entry: NewLogEntry) {
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!(error = %e, "Failed to append audit log entry");
        }
    }
}

fn alert_failed(app: &TrackedApp, dispatch_id: Option<String>, error: String) -> AlertOutcome {
    tracing::error!(app_id = %app.id, dispatch_id = ?dispatch_id, error = %error, "Removal alert failed");
    metrics::counter!("removal_alerts_total", "result" => "failed").increment(1);
    AlertOutcome::Failed { dispatch_id, error }
}
