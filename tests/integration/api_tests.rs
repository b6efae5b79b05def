use super::*;
use serde_json::json;

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;

    let (status, body) = make_request(&ctx.app, Method::GET, "/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_app_crud_operations() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;

    // 1. Empty to begin with
    let (status, body) = make_request(&ctx.app, Method::GET, "/api/apps", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));

    // 2. Create, using the camelCase aliases
    let (status, body) = make_request(
        &ctx.app,
        Method::POST,
        "/api/apps",
        Some(json!({ "appId": "com.example.app", "appUrl": storefront_url("com.example.app") })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["id"], "com.example.app");
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["check_count"], 0);
    assert!(body["data"]["notified_at"].is_null());

    // 3. Listed, newest first
    make_request(
        &ctx.app,
        Method::POST,
        "/api/apps",
        Some(json!({ "id": "com.example.second", "url": storefront_url("com.example.second") })),
    )
    .await?;
    let (_, body) = make_request(&ctx.app, Method::GET, "/api/apps", None).await?;
    assert_eq!(body["data"][0]["id"], "com.example.second");
    assert_eq!(body["meta"]["count"], 2);

    // 4. Delete
    let (status, body) =
        make_request(&ctx.app, Method::DELETE, "/api/apps/com.example.app", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], true);

    let (status, body) =
        make_request(&ctx.app, Method::DELETE, "/api/apps/com.example.app", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn test_create_app_validation() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;

    let cases = [
        json!({ "id": "com.example.app", "url": "https://example.com/store/apps/details?id=x" }),
        json!({ "id": "com.example.app", "url": "not a url" }),
        json!({ "id": "", "url": storefront_url("com.example.app") }),
        json!({ "id": "com.example.app" }),
    ];

    for payload in cases {
        let (status, body) =
            make_request(&ctx.app, Method::POST, "/api/apps", Some(payload.clone())).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {}", payload);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    let (_, body) = make_request(&ctx.app, Method::GET, "/api/apps", None).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_app_is_conflict() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    let payload = json!({ "id": "com.example.app", "url": storefront_url("com.example.app") });

    let (status, _) =
        make_request(&ctx.app, Method::POST, "/api/apps", Some(payload.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = make_request(&ctx.app, Method::POST, "/api/apps", Some(payload)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
    Ok(())
}

#[tokio::test]
async fn test_config_roundtrip() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;

    // Created with defaults on first read
    let (status, body) = make_request(&ctx.app, Method::GET, "/api/config", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["check_interval_seconds"], 60);
    assert!(body["data"]["telegram_bot_token"].is_null());

    let (status, body) = make_request(
        &ctx.app,
        Method::POST,
        "/api/config",
        Some(json!({
            "telegramBotToken": BOT_TOKEN,
            "telegramChatId": CHAT_ID,
            "check_interval_seconds": 120
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["telegram_chat_id"], CHAT_ID);
    assert_eq!(body["data"]["check_interval_seconds"], 120);

    let (_, body) = make_request(&ctx.app, Method::GET, "/api/config", None).await?;
    assert_eq!(body["data"]["telegram_bot_token"], BOT_TOKEN);

    let (status, _) = make_request(
        &ctx.app,
        Method::POST,
        "/api/config",
        Some(json!({ "check_interval_seconds": 1 })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_test_notify_without_config() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;

    let (status, body) = make_request(&ctx.app, Method::POST, "/api/test-notify", None).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CONFIG_MISSING");
    assert!(ctx.telegram.received_requests().await.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_test_notify_delivers() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    configure_channel(&ctx).await?;
    mount_telegram_ok(&ctx).await;

    let (status, body) = make_request(&ctx.app, Method::POST, "/api/test-notify", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success"], true);

    let requests = ctx.telegram.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    let sent: Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(sent["chat_id"], CHAT_ID);
    Ok(())
}

#[tokio::test]
async fn test_test_notify_failure_is_bad_gateway() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    configure_channel(&ctx).await?;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        })))
        .mount(&ctx.telegram)
        .await;

    let (status, body) = make_request(&ctx.app, Method::POST, "/api/test-notify", None).await?;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"]["message"]
        .as_str()
        .is_some_and(|m| m.contains("Unauthorized")));
    Ok(())
}

#[tokio::test]
async fn test_stats_and_logs() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;

    let (_, body) = make_request(&ctx.app, Method::GET, "/api/stats", None).await?;
    assert_eq!(body["data"]["total_apps"], 0);
    assert!(body["data"]["last_check"].is_null());

    for id in ["com.example.a", "com.example.b"] {
        make_request(
            &ctx.app,
            Method::POST,
            "/api/apps",
            Some(json!({ "id": id, "url": storefront_url(id) })),
        )
        .await?;
    }

    let (status, body) = make_request(&ctx.app, Method::GET, "/api/stats", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_apps"], 2);
    assert_eq!(body["data"]["active_apps"], 2);
    assert_eq!(body["data"]["removed_apps"], 0);
    assert_eq!(body["data"]["notifications_sent"], 0);
    assert!(!body["data"]["last_check"].is_null());

    let (status, body) = make_request(&ctx.app, Method::GET, "/api/logs?limit=1", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert!(body["data"][0]["message"]
        .as_str()
        .is_some_and(|m| m.contains("com.example.b")));

    let (status, _) = make_request(&ctx.app, Method::GET, "/api/logs?limit=1000", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
