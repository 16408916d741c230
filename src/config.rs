//! Gateway credentials and client tunables

use crate::token::refresh_window;
use crate::{BkashError, Result};
use reqwest::header::HeaderValue;
use std::env;
use std::time::Duration;
use url::Url;

/// Default timeout applied to POST requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Age in seconds after which a bearer token is refreshed before use.
/// The gateway expires tokens after roughly an hour.
pub const TOKEN_REFRESH_AFTER_SECS: u64 = 3500;

/// Environment variable holding the gateway base URL
pub const ENV_BASE_URL: &str = "BKASH_BASEURL";
/// Environment variable holding the app key
pub const ENV_API_KEY: &str = "BKASH_API_KEY";
/// Environment variable holding the app secret
pub const ENV_API_SECRET: &str = "BKASH_API_SECRET";
/// Environment variable holding the merchant username
pub const ENV_USERNAME: &str = "BKASH_USERNAME";
/// Environment variable holding the merchant password
pub const ENV_PASSWORD: &str = "BKASH_PASSWORD";

/// Credentials and settings for a bKash checkout merchant account
#[derive(Clone)]
pub struct BkashConfig {
    /// Base URL of the checkout API, e.g. `https://checkout.sandbox.bka.sh/v1.2.0-beta`
    pub base_url: String,
    /// App key, sent as `x-app-key` and in token requests
    pub app_key: String,
    /// App secret, sent only in token requests
    pub app_secret: String,
    /// Merchant username for token requests
    pub username: String,
    /// Merchant password for token requests
    pub password: String,
    /// Hard timeout for POST requests
    pub timeout: Duration,
    /// Token age at which it is refreshed
    pub token_refresh_after: Duration,
}

impl std::fmt::Debug for BkashConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BkashConfig")
            .field("base_url", &self.base_url)
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("token_refresh_after", &self.token_refresh_after)
            .finish()
    }
}

impl BkashConfig {
    /// Create a new config with default timeout and refresh window
    pub fn new(
        base_url: impl Into<String>,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            username: username.into(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
            token_refresh_after: Duration::from_secs(TOKEN_REFRESH_AFTER_SECS),
        }
    }

    /// Read the credentials from the `BKASH_*` environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self::new(
            require_env(ENV_BASE_URL)?,
            require_env(ENV_API_KEY)?,
            require_env(ENV_API_SECRET)?,
            require_env(ENV_USERNAME)?,
            require_env(ENV_PASSWORD)?,
        );
        config.validate()?;
        Ok(config)
    }

    /// Set the POST request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the token age at which a refresh is triggered
    pub fn with_token_refresh_after(mut self, after: Duration) -> Self {
        self.token_refresh_after = after;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(BkashError::config("Invalid BaseURL provided"));
        }
        if self.app_key.trim().is_empty() {
            return Err(BkashError::config("Invalid API Key provided"));
        }
        if self.app_secret.trim().is_empty() {
            return Err(BkashError::config("Invalid API secret provided"));
        }
        if self.username.trim().is_empty() {
            return Err(BkashError::config("Invalid API username provided"));
        }
        if self.password.trim().is_empty() {
            return Err(BkashError::config("Invalid API password provided"));
        }

        let url = Url::parse(&self.base_url)
            .map_err(|e| BkashError::config(format!("Invalid BaseURL provided: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(BkashError::config(
                "BaseURL must start with http:// or https://",
            ));
        }

        for (name, value) in [
            ("API Key", &self.app_key),
            ("API username", &self.username),
            ("API password", &self.password),
        ] {
            HeaderValue::from_str(value).map_err(|_| {
                BkashError::config(format!("{} contains characters not allowed in a header", name))
            })?;
        }

        if self.timeout.is_zero() {
            return Err(BkashError::config("Request timeout must be greater than zero"));
        }
        if self.token_refresh_after.is_zero() {
            return Err(BkashError::config(
                "Token refresh window must be greater than zero",
            ));
        }
        refresh_window(self.token_refresh_after)?;

        Ok(())
    }

    /// Join an endpoint path onto the base URL
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| BkashError::config(format!("Missing environment variable {}", name)))
}
