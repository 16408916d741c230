//! HTTP transport for the checkout API
//!
//! The gateway reports most failures in-band: the HTTP exchange succeeds and
//! the JSON body carries an `errorMessage`. Both transports here turn such
//! bodies into [`BkashError::Gateway`] so callers only ever see typed results
//! or errors.

use crate::{BkashError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Capability the client needs from an HTTP stack
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET and return the parsed JSON body
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Value>;

    /// Issue a POST with a JSON body (`{}` when `payload` is `None`) and return the parsed JSON body
    async fn post(&self, url: &str, payload: Option<Value>, headers: &HeaderMap) -> Result<Value>;
}

/// [`Transport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Underlying HTTP client
    client: Client,
    /// Hard timeout for POST requests
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new transport with the given POST timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| BkashError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Create a transport around an existing `reqwest` client
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// POST timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Value> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .headers(merge_headers(headers))
            .send()
            .await?;

        let body = response.text().await?;
        parse_body(&body)
    }

    async fn post(&self, url: &str, payload: Option<Value>, headers: &HeaderMap) -> Result<Value> {
        debug!(url, "POST");
        let payload = payload.unwrap_or_else(|| json!({}));

        // reqwest drops the connection when the request future times out
        let response = self
            .client
            .post(url)
            .headers(merge_headers(headers))
            .body(serde_json::to_vec(&payload)?)
            .timeout(self.timeout)
            .send()
            .await
            .inspect_err(|e| {
                if e.is_timeout() {
                    warn!(url, timeout = ?self.timeout, "request timed out");
                }
            })?;

        let body = response.text().await?;
        parse_body(&body)
    }
}

/// JSON content headers overlaid with the caller's headers; caller values win
fn merge_headers(headers: &HeaderMap) -> HeaderMap {
    let mut merged = HeaderMap::new();
    merged.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    merged.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (name, value) in headers {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// Parse a response body and surface in-band gateway errors
pub(crate) fn parse_body(body: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body)?;
    check_error_message(value)
}

/// Fail with [`BkashError::Gateway`] when the body carries an `errorMessage`
fn check_error_message(value: Value) -> Result<Value> {
    if let Some(message) = value.get("errorMessage") {
        let message = match message {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let code = value.get("errorCode").map(|c| match c {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        warn!(error_code = ?code, "gateway returned an error: {}", message);
        return Err(BkashError::Gateway { message, code });
    }
    Ok(value)
}
