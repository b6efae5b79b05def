use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use std::time::Instant;

/// Request logging middleware
pub async fn request_logging(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = extract_client_ip(request.headers());

    tracing::debug!(
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Request started"
    );

    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(method = %method, uri = %uri, status = %status, duration_ms, "Request completed");
    } else if status.is_client_error() {
        tracing::warn!(method = %method, uri = %uri, status = %status, duration_ms, "Request completed");
    } else {
        tracing::info!(method = %method, uri = %uri, status = %status, duration_ms, "Request completed");
    }

    response
}

fn extract_client_ip(headers: &HeaderMap) -> String {
    let ip_headers = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

    for header_name in &ip_headers {
        if let Some(value) = headers.get(*header_name).and_then(|v| v.to_str().ok()) {
            // First hop of a comma-separated chain
            let ip = value.split(',').next().unwrap_or(value).trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    "unknown".to_string()
}
