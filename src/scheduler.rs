use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::models::NewLogEntry;
use crate::monitor::{MonitorService, TickSummary};
use crate::store::AuditLog;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TickOutcome {
    Completed { summary: TickSummary },
    /// A previous tick was still running.
    Skipped,
    TimedOut,
    Failed { error: String },
}

impl TickOutcome {
    fn label(&self) -> &'static str {
        match self {
            TickOutcome::Completed { .. } => "completed",
            TickOutcome::Skipped => "skipped",
            TickOutcome::TimedOut => "timed_out",
            TickOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_ticks: u64,
    pub completed_ticks: u64,
    pub skipped_ticks: u64,
    pub failed_ticks: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_summary: Option<TickSummary>,
    pub last_error: Option<String>,
    pub uptime_seconds: u64,
}

/// Runs monitoring ticks one at a time, each bounded by a deadline.
#[derive(Clone)]
pub struct TickRunner {
    monitor: Arc<MonitorService>,
    audit: Arc<dyn AuditLog>,
    guard: Arc<Mutex<()>>,
    stats: Arc<RwLock<SchedulerStats>>,
    deadline: Duration,
    started_at: DateTime<Utc>,
}

impl TickRunner {
    pub fn new(monitor: Arc<MonitorService>, audit: Arc<dyn AuditLog>, deadline: Duration) -> Self {
        Self {
            monitor,
            audit,
            guard: Arc::new(Mutex::new(())),
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            deadline,
            started_at: Utc::now(),
        }
    }

    pub async fn stats(&self) -> SchedulerStats {
        let mut stats = self.stats.read().await.clone();
        let uptime = Utc::now().signed_duration_since(self.started_at);
        stats.uptime_seconds = uptime.num_seconds().max(0) as u64;
        stats
    }

    pub async fn execute_tick(&self) -> TickOutcome {
        // Never run two ticks concurrently
        let Ok(_running) = self.guard.try_lock() else {
            tracing::warn!("Previous monitoring tick still running, skipping this one");
            let outcome = TickOutcome::Skipped;
            self.record(&outcome, None).await;
            return outcome;
        };

        let start_time = tokio::time::Instant::now();
        tracing::debug!("Starting scheduled monitoring tick");

        let outcome = match tokio::time::timeout(self.deadline, self.monitor.run_tick()).await {
            Ok(Ok(summary)) => {
                if summary.checked > 0 {
                    tracing::info!(
                        checked = summary.checked,
                        alerts_sent = summary.alerts_sent,
                        "Monitoring tick completed"
                    );
                }
                TickOutcome::Completed { summary }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Monitoring tick failed");
                self.record_event(NewLogEntry::error(format!("Scheduled check failed: {}", e)))
                    .await;
                TickOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                tracing::error!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Monitoring tick exceeded its deadline and was cancelled"
                );
                self.record_event(NewLogEntry::error(format!(
                    "Scheduled check exceeded its {}s deadline and was cancelled",
                    self.deadline.as_secs_f64()
                )))
                .await;
                TickOutcome::TimedOut
            }
        };

        self.record(&outcome, Some(start_time.elapsed())).await;
        outcome
    }

    async fn record(&self, outcome: &TickOutcome, elapsed: Option<Duration>) {
        metrics::counter!("monitor_ticks_total", "result" => outcome.label()).increment(1);

        let mut stats = self.stats.write().await;
        stats.total_ticks += 1;
        match outcome {
            TickOutcome::Skipped => {
                stats.skipped_ticks += 1;
                return;
            }
            TickOutcome::Completed { summary } => {
                stats.completed_ticks += 1;
                stats.last_summary = Some(summary.clone());
                stats.last_error = None;
            }
            TickOutcome::TimedOut => {
                stats.failed_ticks += 1;
                stats.last_error = Some("tick deadline exceeded".to_string());
            }
            TickOutcome::Failed { error } => {
                stats.failed_ticks += 1;
                stats.last_error = Some(error.clone());
            }
        }
        stats.last_run = Some(Utc::now());
        stats.last_duration_ms = elapsed.map(|d| d.as_millis() as u64);
    }

    async fn record_event(&self, entry: NewLogEntry) {
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!(error = %e, "Failed to append audit log entry");
        }
    }
}

/// Drives [`TickRunner`] on a fixed interval.
pub struct MonitorScheduler {
    scheduler: JobScheduler,
    runner: TickRunner,
    config: SchedulerConfig,
    job_id: Option<Uuid>,
}

impl MonitorScheduler {
    pub async fn new(runner: TickRunner, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            runner,
            config,
            job_id: None,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let interval = Duration::from_secs(self.config.tick_interval_seconds.max(1));
        let runner = self.runner.clone();

        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            let runner = runner.clone();
            Box::pin(async move {
                runner.execute_tick().await;
            })
        })?;

        self.job_id = Some(self.scheduler.add(job).await?);
        self.scheduler.start().await?;

        tracing::info!(
            interval_seconds = interval.as_secs(),
            deadline_seconds = self.config.tick_deadline_seconds,
            "Monitor scheduler started"
        );
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(job_id) = self.job_id.take() {
            self.scheduler.remove(&job_id).await?;
        }
        self.scheduler.shutdown().await?;
        tracing::info!("Monitor scheduler shutdown");
        Ok(())
    }
}
