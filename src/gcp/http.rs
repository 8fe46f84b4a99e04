//! HTTP utilities for GCP REST API calls
//!
//! Responses are classified into [`BackendError`] variants here, and
//! rate-limited requests are retried with exponential backoff, so the
//! repositories above only see final outcomes.

use crate::remote::error::BackendError;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Retries for throttled requests before giving up
pub const DEFAULT_MAX_RETRIES: u32 = 5;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Extract `error.message` from a GCP error body, if present
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_default()
}

/// Map an HTTP status to a backend error
pub fn classify_status(status: StatusCode, body: &str) -> BackendError {
    let message = error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::AccessDenied { message },
        StatusCode::NOT_FOUND => BackendError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => BackendError::Throttled,
        _ => BackendError::Unknown(format!("API request failed: {} {}", status, message).trim_end().to_string()),
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
    max_retries: u32,
    initial_backoff: Duration,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(concat!("driftscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Unknown(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    pub fn with_retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Make a GET request to a GCP API, retrying throttled responses
    pub async fn get(&self, url: &str, token: &str) -> Result<Value, BackendError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            tracing::debug!("GET {} (attempt {})", url, attempt + 1);

            let response = self
                .client
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| BackendError::Unknown(format!("Failed to send request: {}", e)))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| BackendError::Unknown(format!("Failed to read response body: {}", e)))?;

            if status.is_success() {
                if body.is_empty() {
                    return Ok(Value::Null);
                }
                return serde_json::from_str(&body).map_err(|e| {
                    BackendError::Unknown(format!("Failed to parse response JSON: {}", e))
                });
            }

            if is_retryable(status) && attempt < self.max_retries {
                attempt += 1;
                tracing::warn!("{} returned {}, retrying in {:?}", url, status, backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }

            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));

            return match classify_status(status, &body) {
                BackendError::Throttled => Err(BackendError::Unknown(format!(
                    "Rate limit still exceeded after {} retries",
                    self.max_retries
                ))),
                other => Err(other),
            };
        }
    }
}
