use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiResponse, AppState, HealthResponse, HttpError};
use crate::app_manager::MonitorStats;
use crate::models::{ConfigUpdate, LogEntry, MonitorConfig, NewTrackedApp, TrackedApp};
use crate::monitor::CheckReport;
use crate::plugins::traits::NotificationResult;

type ApiResult<T> = Result<Json<ApiResponse<T>>, HttpError>;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut health = HealthResponse::healthy();
    if let Some(runner) = &state.scheduler {
        health = health.with_scheduler(runner.stats().await);
    }
    Json(health)
}

// Tracked apps
pub async fn list_apps(State(state): State<AppState>) -> ApiResult<Vec<TrackedApp>> {
    let apps = state.manager.list_apps().await?;
    let count = apps.len();
    Ok(Json(ApiResponse::success_with_meta(
        apps,
        json!({ "count": count }),
    )))
}

pub async fn create_app(
    State(state): State<AppState>,
    payload: Result<Json<NewTrackedApp>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<TrackedApp>>), HttpError> {
    let Json(request) = payload?;

    let app = state.manager.add_app(request).await.map_err(|e| {
        tracing::warn!(error = %e, "Rejected new app");
        HttpError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(app))))
}

pub async fn delete_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.manager.remove_app(&id).await?;
    Ok(Json(ApiResponse::success(json!({ "id": id, "deleted": true }))))
}

pub async fn check_app_now(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CheckReport> {
    let report = state.manager.check_now(&id).await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn reactivate_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TrackedApp> {
    let app = state.manager.reactivate_app(&id).await?;
    Ok(Json(ApiResponse::success(app)))
}

// Configuration
pub async fn get_config(State(state): State<AppState>) -> ApiResult<MonitorConfig> {
    let config = state.manager.get_config().await?;
    Ok(Json(ApiResponse::success(config)))
}

pub async fn update_config(
    State(state): State<AppState>,
    payload: Result<Json<ConfigUpdate>, JsonRejection>,
) -> ApiResult<MonitorConfig> {
    let Json(update) = payload?;
    let config = state.manager.update_config(update).await?;
    Ok(Json(ApiResponse::success(config)))
}

pub async fn test_notify(State(state): State<AppState>) -> ApiResult<NotificationResult> {
    let result = state.manager.send_test_notification().await?;
    Ok(Json(ApiResponse::success(result)))
}

// Reporting
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<MonitorStats> {
    let stats = state.manager.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Vec<LogEntry>> {
    let logs = state.manager.recent_logs(query.limit).await?;
    Ok(Json(ApiResponse::success(logs)))
}
