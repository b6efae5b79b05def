use super::*;
use serde_json::json;

async fn add_app(ctx: &TestContext, app_id: &str) -> anyhow::Result<()> {
    let (status, _) = make_request(
        &ctx.app,
        Method::POST,
        "/api/apps",
        Some(json!({ "id": app_id, "url": storefront_url(app_id) })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "create failed: {}", status);
    Ok(())
}

async fn app_json(ctx: &TestContext, app_id: &str) -> anyhow::Result<Value> {
    let (_, body) = make_request(&ctx.app, Method::GET, "/api/apps", None).await?;
    body["data"]
        .as_array()
        .and_then(|apps| apps.iter().find(|a| a["id"] == app_id).cloned())
        .ok_or_else(|| anyhow::anyhow!("app {} not listed", app_id))
}

async fn log_messages(ctx: &TestContext) -> anyhow::Result<Vec<(String, String)>> {
    let (_, body) = make_request(&ctx.app, Method::GET, "/api/logs?limit=500", None).await?;
    Ok(body["data"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|e| {
                    (
                        e["severity"].as_str().unwrap_or_default().to_string(),
                        e["message"].as_str().unwrap_or_default().to_string(),
                    )
                })
                .collect()
        })
        .unwrap_or_default())
}

#[tokio::test]
async fn test_delisted_app_alerts_exactly_once() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    configure_channel(&ctx).await?;
    add_app(&ctx, "com.example.app").await?;
    backdate_check(&ctx, "com.example.app", 90).await?;
    mount_listing(&ctx, "com.example.app", "Not Found").await;
    mount_telegram_ok(&ctx).await;

    let summary = ctx.monitor.run_tick().await?;
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.alerts_sent, 1);

    let app = app_json(&ctx, "com.example.app").await?;
    assert_eq!(app["status"], "notified");
    assert!(!app["notified_at"].is_null());
    assert_eq!(app["check_count"], 1);

    let requests = ctx.telegram.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    let sent: Value = serde_json::from_slice(&requests[0].body)?;
    let text = sent["text"].as_str().unwrap_or_default();
    assert!(text.contains("com.example.app"));
    assert!(text.contains(&storefront_url("com.example.app")));

    let logs = log_messages(&ctx).await?;
    assert!(logs
        .iter()
        .any(|(severity, message)| severity == "warning" && message.contains("Notification sent")));

    // Even once due again the notified app is not re-alerted
    ctx.monitor
        .run_tick_at(chrono::Utc::now() + chrono::Duration::minutes(10))
        .await?;
    assert_eq!(
        ctx.telegram.received_requests().await.unwrap_or_default().len(),
        1
    );

    let (_, stats) = make_request(&ctx.app, Method::GET, "/api/stats", None).await?;
    assert_eq!(stats["data"]["removed_apps"], 1);
    assert_eq!(stats["data"]["notifications_sent"], 1);
    Ok(())
}

#[tokio::test]
async fn test_listed_app_stays_active() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    add_app(&ctx, "com.example.app").await?;
    backdate_check(&ctx, "com.example.app", 90).await?;
    mount_listing(&ctx, "com.example.app", "Example App - Apps on Google Play").await;

    ctx.monitor.run_tick().await?;

    let app = app_json(&ctx, "com.example.app").await?;
    assert_eq!(app["status"], "active");
    assert_eq!(app["check_count"], 1);
    assert!(ctx.telegram.received_requests().await.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_relay_outage_is_retried_next_tick() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    add_app(&ctx, "com.example.app").await?;
    backdate_check(&ctx, "com.example.app", 90).await?;
    Mock::given(method("GET"))
        .and(path("/raw"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&ctx.relay)
        .await;
    mount_listing(&ctx, "com.example.app", "Example App").await;

    let summary = ctx.monitor.run_tick().await?;
    assert_eq!(summary.failed, 1);

    let app = app_json(&ctx, "com.example.app").await?;
    assert_eq!(app["check_count"], 0);
    assert_eq!(app["status"], "active");

    let logs = log_messages(&ctx).await?;
    assert!(logs.iter().any(|(severity, message)| {
        severity == "error" && message.contains("Failed to check app com.example.app")
    }));

    // Still due, and the relay has recovered
    let summary = ctx.monitor.run_tick().await?;
    assert_eq!(summary.completed, 1);
    assert_eq!(app_json(&ctx, "com.example.app").await?["check_count"], 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_alert_is_retried() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    configure_channel(&ctx).await?;
    add_app(&ctx, "com.example.app").await?;
    backdate_check(&ctx, "com.example.app", 90).await?;
    mount_listing(&ctx, "com.example.app", "Not Found").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&ctx.telegram)
        .await;
    mount_telegram_ok(&ctx).await;

    ctx.monitor.run_tick().await?;
    let app = app_json(&ctx, "com.example.app").await?;
    assert_eq!(app["status"], "removed");
    assert!(app["notified_at"].is_null());

    backdate_check(&ctx, "com.example.app", 90).await?;
    let summary = ctx.monitor.run_tick().await?;
    assert_eq!(summary.alerts_sent, 1);

    let app = app_json(&ctx, "com.example.app").await?;
    assert_eq!(app["status"], "notified");
    assert_eq!(app["notification_count"], 1);
    assert_eq!(
        ctx.telegram.received_requests().await.unwrap_or_default().len(),
        2
    );
    Ok(())
}

#[tokio::test]
async fn test_due_apps_are_paced() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    for id in ["com.example.a", "com.example.b", "com.example.c", "com.example.fresh"] {
        add_app(&ctx, id).await?;
        mount_listing(&ctx, id, "Listed").await;
    }
    for id in ["com.example.a", "com.example.b", "com.example.c"] {
        backdate_check(&ctx, id, 120).await?;
    }

    let summary = ctx.monitor.run_tick().await?;

    assert_eq!(summary.checked, 3);
    assert_eq!(ctx.pacer.pauses(), 2);
    assert_eq!(ctx.relay.received_requests().await.unwrap_or_default().len(), 3);
    assert_eq!(app_json(&ctx, "com.example.fresh").await?["check_count"], 0);

    let logs = log_messages(&ctx).await?;
    assert_eq!(
        logs.iter().filter(|(_, m)| m.starts_with("Starting check")).count(),
        1
    );
    assert_eq!(
        logs.iter().filter(|(_, m)| m.starts_with("Finished checking")).count(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn test_manual_check_and_reactivation() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    configure_channel(&ctx).await?;
    mount_telegram_ok(&ctx).await;
    add_app(&ctx, "com.example.app").await?;
    Mock::given(method("GET"))
        .and(path("/raw"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<title>Not Found</title>"),
        )
        .mount(&ctx.relay)
        .await;

    // Not due yet, the manual check runs anyway
    let (status, body) = make_request(
        &ctx.app,
        Method::POST,
        "/api/apps/com.example.app/check",
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["classification"]["outcome"], "not_found");
    assert_eq!(body["data"]["app"]["status"], "notified");

    let (status, body) = make_request(
        &ctx.app,
        Method::POST,
        "/api/apps/com.example.app/reactivate",
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");
    assert!(body["data"]["notified_at"].is_null());

    let (status, _) = make_request(
        &ctx.app,
        Method::POST,
        "/api/apps/com.example.missing/check",
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
