// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::ClientConfig;

/// Create a configured asynchronous HTTP client with its own cookie jar.
///
/// A fresh client means a fresh session; callers drop the old one on logout.
pub fn create_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .cookie_store(true)
        .build()?;
    Ok(client)
}

/// Fetch a page and return its body, failing on HTTP error statuses.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::upstream(url, format!("HTTP {status}")));
    }
    Ok(response.text().await?)
}
