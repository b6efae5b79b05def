use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::app_manager::AppManager;
use crate::config::AppConfig;
use crate::scheduler::TickRunner;

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use handlers::{
    check_app_now, create_app, delete_app, get_config, get_stats, health_check, list_apps,
    list_logs, reactivate_app, test_notify, update_config,
};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AppManager>,
    pub config: AppConfig,
    /// Absent when no scheduler runs in this process.
    pub scheduler: Option<TickRunner>,
}

pub fn create_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout.max(1));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(axum_middleware::from_fn(middleware::request_logging))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/apps", get(list_apps).post(create_app))
        .route("/apps/:id", delete(delete_app))
        .route("/apps/:id/check", post(check_app_now))
        .route("/apps/:id/reactivate", post(reactivate_app))
        .route("/config", get(get_config).post(update_config))
        .route("/test-notify", post(test_notify))
        .route("/stats", get(get_stats))
        .route("/logs", get(list_logs))
}

pub async fn serve<F>(config: &AppConfig, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await?;

    tracing::info!(
        "Server starting on {}:{}",
        config.server.host,
        config.server.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
