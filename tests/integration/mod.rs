// Integration tests for Delist Watcher
// These tests wire the real fetcher, notifier and SQLite store together, with
// wiremock standing in for the storefront relay and the Telegram Bot API.

pub mod api_tests;
pub mod monitoring_flow_tests;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use delist_watcher::{
    config::AppConfig,
    pacing::CountingPacer,
    plugins::notifiers::TelegramNotifier,
    scraper::StorefrontFetcher,
    store::SqliteStore,
    web::{create_router, AppState},
    AppManager, MonitorService,
};

pub const BOT_TOKEN: &str = "123456:TEST";
pub const CHAT_ID: &str = "-1001234";

pub struct TestContext {
    pub app: Router,
    pub store: Arc<SqliteStore>,
    pub monitor: Arc<MonitorService>,
    pub pacer: Arc<CountingPacer>,
    pub relay: MockServer,
    pub telegram: MockServer,
}

/// Test configuration pointing every outbound call at the mock servers
pub fn get_test_config(relay: &MockServer, telegram: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.fetcher.relay_url = format!("{}/raw?url=", relay.uri());
    config.fetcher.request_timeout_seconds = 5;
    config.fetcher.user_agent = "DelistWatcher-Test/1.0".to_string();
    config.notifications.telegram_api_base = telegram.uri();
    config.notifications.request_timeout_seconds = 5;
    config.scheduler.pacing_delay_ms = 0;
    config
}

pub async fn create_test_context() -> anyhow::Result<TestContext> {
    let relay = MockServer::start().await;
    let telegram = MockServer::start().await;
    let config = get_test_config(&relay, &telegram);

    let store = Arc::new(SqliteStore::connect(&config.database).await?);
    let pacer = Arc::new(CountingPacer::new());
    let monitor = Arc::new(MonitorService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(StorefrontFetcher::new(config.fetcher.clone())?),
        Arc::new(TelegramNotifier::new(&config.notifications)?),
        pacer.clone(),
    ));
    let manager = Arc::new(AppManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        monitor.clone(),
        config.fetcher.storefront_host.clone(),
    ));

    let app = create_router(AppState {
        manager,
        config,
        scheduler: None,
    });

    Ok(TestContext {
        app,
        store,
        monitor,
        pacer,
        relay,
        telegram,
    })
}

pub fn storefront_url(app_id: &str) -> String {
    format!("https://play.google.com/store/apps/details?id={}", app_id)
}

/// Helper to make HTTP requests to the test app, returning status and JSON body
pub async fn make_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> anyhow::Result<(StatusCode, Value)> {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let request = request.body(match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    })?;

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, json))
}

pub async fn configure_channel(ctx: &TestContext) -> anyhow::Result<()> {
    let (status, _) = make_request(
        &ctx.app,
        Method::POST,
        "/api/config",
        Some(serde_json::json!({
            "telegramBotToken": BOT_TOKEN,
            "telegramChatId": CHAT_ID
        })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK, "config update failed: {}", status);
    Ok(())
}

/// Makes the relay answer for `app_id` with a page carrying `title`
pub async fn mount_listing(ctx: &TestContext, app_id: &str, title: &str) {
    Mock::given(method("GET"))
        .and(path("/raw"))
        .and(query_param("url", storefront_url(app_id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><head><title>{}</title></head><body></body></html>",
            title
        )))
        .mount(&ctx.relay)
        .await;
}

pub async fn mount_telegram_ok(ctx: &TestContext) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", BOT_TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": { "message_id": 1 }
        })))
        .mount(&ctx.telegram)
        .await;
}

/// Pretends an app was last checked `seconds` ago
pub async fn backdate_check(ctx: &TestContext, app_id: &str, seconds: i64) -> anyhow::Result<()> {
    use delist_watcher::store::AppStore;

    let mut app = ctx
        .store
        .get_app(app_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("app {} missing", app_id))?;
    app.last_checked_at = chrono::Utc::now() - chrono::Duration::seconds(seconds);
    ctx.store.update_app(&app).await?;
    Ok(())
}
