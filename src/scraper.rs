use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::{Duration, Instant};
use url::form_urlencoded;

use crate::config::FetcherConfig;
use crate::status::{classify_page, Classification};
use crate::utils::error::Result;

/// Retrieves a storefront listing and classifies it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, url: &str) -> Classification;
}

/// Fetches storefront pages through an HTTP relay.
#[derive(Clone)]
pub struct StorefrontFetcher {
    client: Client,
    config: FetcherConfig,
}

impl StorefrontFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn relay_url_for(&self, target: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(target.as_bytes()).collect();
        format!("{}{}", self.config.relay_url, encoded)
    }

    async fn fetch_page(&self, url: &str) -> std::result::Result<String, String> {
        let response = self
            .client
            .get(self.relay_url_for(url))
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| describe_request_error(&e))?;

        let status = response.status();
        // Relays may pass the storefront's own 404 page through unchanged
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(format!("relay responded with HTTP {}", status));
        }

        response.text().await.map_err(|e| describe_request_error(&e))
    }
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}

#[async_trait]
impl StatusFetcher for StorefrontFetcher {
    async fn fetch_status(&self, url: &str) -> Classification {
        let start_time = Instant::now();

        let classification = match self.fetch_page(url).await {
            Ok(html) => classify_page(&html, &self.config.not_found_title),
            Err(error) => Classification::FetchFailed { error },
        };

        tracing::debug!(
            url = %url,
            outcome = classification.label(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Fetched storefront page"
        );
        classification
    }
}
