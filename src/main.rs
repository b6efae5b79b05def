use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use delist_watcher::config::{AppConfig, LoggingConfig};
use delist_watcher::pacing::FixedDelayPacer;
use delist_watcher::plugins::notifiers::TelegramNotifier;
use delist_watcher::scraper::StorefrontFetcher;
use delist_watcher::store::SqliteStore;
use delist_watcher::web::{self, AppState};
use delist_watcher::{AppManager, MonitorScheduler, MonitorService, TickRunner};

#[derive(Parser)]
#[command(name = "delist-watcher", version, about = "Alerts when monitored apps disappear from the store")]
struct Cli {
    /// Path to a config file (extension optional)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Overrides the HTTP port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the monitoring scheduler (default)
    Serve,
    /// Run a single monitoring pass and exit
    Tick,
}

fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.filter))?;

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("delist-watcher")
                .filename_suffix("log")
                .build(directory)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (
                Some(fmt::layer().with_writer(non_blocking).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    Ok(guard)
}

struct Services {
    monitor: Arc<MonitorService>,
    manager: Arc<AppManager>,
    store: Arc<SqliteStore>,
}

async fn build_services(config: &AppConfig) -> Result<Services> {
    let store = Arc::new(
        SqliteStore::connect(&config.database)
            .await
            .context("failed to open the database")?,
    );
    let fetcher = Arc::new(StorefrontFetcher::new(config.fetcher.clone())?);
    let notifier = Arc::new(TelegramNotifier::new(&config.notifications)?);
    let pacer = Arc::new(FixedDelayPacer::from_millis(config.scheduler.pacing_delay_ms));

    let monitor = Arc::new(
        MonitorService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            fetcher,
            notifier,
            pacer,
        )
        .with_max_batch_size(config.scheduler.max_batch_size),
    );

    let manager = Arc::new(AppManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        monitor.clone(),
        config.fetcher.storefront_host.clone(),
    ));

    Ok(Services {
        monitor,
        manager,
        store,
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

async fn serve(config: AppConfig) -> Result<()> {
    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("failed to start the Prometheus exporter")?;
        tracing::info!(port = config.metrics.port, "Metrics exporter listening");
    }

    let services = build_services(&config).await?;

    let runner = TickRunner::new(
        services.monitor.clone(),
        services.store.clone(),
        Duration::from_secs(config.scheduler.tick_deadline_seconds),
    );
    let mut scheduler = MonitorScheduler::new(runner.clone(), config.scheduler.clone()).await?;
    scheduler.start().await?;

    let state = AppState {
        manager: services.manager,
        config: config.clone(),
        scheduler: Some(runner),
    };
    let result = web::serve(&config, state, shutdown_signal()).await;

    scheduler.shutdown().await?;
    result
}

async fn run_once(config: AppConfig) -> Result<()> {
    let services = build_services(&config).await?;
    let deadline = Duration::from_secs(config.scheduler.tick_deadline_seconds);

    let summary = tokio::time::timeout(deadline, services.monitor.run_tick())
        .await
        .context("monitoring pass exceeded its deadline")??;

    tracing::info!(
        due = summary.due,
        checked = summary.checked,
        completed = summary.completed,
        failed = summary.failed,
        alerts_sent = summary.alerts_sent,
        "Monitoring pass finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let _guard = init_tracing(&config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Delist Watcher");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await?,
        Command::Tick => run_once(config).await?,
    }

    tracing::info!("Shutting down...");
    Ok(())
}
