//! Bearer token lifecycle
//!
//! The gateway issues an `id_token` valid for about an hour together with a
//! `refresh_token`. [`TokenManager`] grants a token lazily on first use, hands
//! out the cached token while it is younger than the refresh window, and swaps
//! in a refreshed token once it goes stale.
//!
//! The state sits behind an async mutex held for the whole grant or refresh
//! exchange, so callers that find a stale token queue behind the single
//! in-flight refresh and reuse its result. A failed exchange returns before
//! the state is touched; the next call simply tries again.

use crate::clock::Clock;
use crate::config::BkashConfig;
use crate::transport::Transport;
use crate::types::{decode, TokenFailure, TokenResponse};
use crate::{BkashError, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Token grant endpoint
pub const TOKEN_GRANT_PATH: &str = "/checkout/token/grant";
/// Token refresh endpoint
pub const TOKEN_REFRESH_PATH: &str = "/checkout/token/refresh";

const INVALID_CREDENTIALS: &str = "Invalid API Credentials Provided";

/// Headers attached to every authenticated checkout call
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    /// Raw `id_token`, sent as `authorization`
    pub authorization: String,
    /// App key, sent as `x-app-key`
    pub app_key: String,
}

impl std::fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHeaders")
            .field("authorization", &"<redacted>")
            .field("app_key", &self.app_key)
            .finish()
    }
}

impl AuthHeaders {
    /// Convert into a header map ready for a request
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(&self.authorization)
            .map_err(|_| BkashError::protocol("Token contains characters not allowed in a header"))?;
        let key = HeaderValue::from_str(&self.app_key)
            .map_err(|_| BkashError::config("API Key contains characters not allowed in a header"))?;
        headers.insert("authorization", token);
        headers.insert("x-app-key", key);
        Ok(headers)
    }
}

#[derive(Debug, Clone)]
struct TokenState {
    id_token: String,
    refresh_token: String,
    issued_at: DateTime<Utc>,
}

impl TokenState {
    fn is_stale(&self, now: DateTime<Utc>, refresh_after: chrono::Duration) -> bool {
        now.signed_duration_since(self.issued_at) >= refresh_after
    }
}

/// Token age at which a refresh is due, as a signed chrono duration
pub(crate) fn refresh_window(after: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(after)
        .map_err(|_| BkashError::config("Token refresh window is too large"))
}

/// Owns the bearer token for one merchant account
pub struct TokenManager {
    config: Arc<BkashConfig>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    state: Mutex<Option<TokenState>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a manager with no token; the first call to [`auth_headers`](Self::auth_headers) grants one
    pub fn new(
        config: Arc<BkashConfig>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            transport,
            clock,
            state: Mutex::new(None),
        }
    }

    /// Headers carrying a currently valid token, granting or refreshing it first when needed
    pub async fn auth_headers(&self) -> Result<AuthHeaders> {
        let refresh_after = refresh_window(self.config.token_refresh_after)?;
        let mut state = self.state.lock().await;

        let refresh_token = match state.as_ref() {
            None => None,
            Some(current) if !current.is_stale(self.clock.now(), refresh_after) => {
                debug!("reusing cached token");
                return Ok(self.headers_for(current));
            }
            Some(current) => Some(current.refresh_token.clone()),
        };

        let fresh = match refresh_token {
            None => self.grant().await?,
            Some(refresh_token) => self.refresh(&refresh_token).await?,
        };
        let headers = self.headers_for(&fresh);
        *state = Some(fresh);
        Ok(headers)
    }

    fn headers_for(&self, state: &TokenState) -> AuthHeaders {
        AuthHeaders {
            authorization: state.id_token.clone(),
            app_key: self.config.app_key.clone(),
        }
    }

    async fn grant(&self) -> Result<TokenState> {
        info!("requesting token grant");
        let body = self
            .transport
            .post(
                &self.config.endpoint(TOKEN_GRANT_PATH),
                Some(json!({
                    "app_key": self.config.app_key,
                    "app_secret": self.config.app_secret,
                })),
                &self.credential_headers()?,
            )
            .await?;

        let failure = TokenFailure::from_body(&body);
        if let Some(msg) = failure.message() {
            warn!("token grant rejected: {}", msg);
            return Err(BkashError::authentication(msg));
        }
        if failure.is_fail_status() {
            warn!("token grant rejected without a message");
            return Err(BkashError::authentication(INVALID_CREDENTIALS));
        }

        self.issue(decode("token/grant", body)?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenState> {
        info!("refreshing stale token");
        let body = self
            .transport
            .post(
                &self.config.endpoint(TOKEN_REFRESH_PATH),
                Some(json!({
                    "app_key": self.config.app_key,
                    "app_secret": self.config.app_secret,
                    "refresh_token": refresh_token,
                })),
                &self.credential_headers()?,
            )
            .await?;

        let failure = TokenFailure::from_body(&body);
        if let Some(msg) = failure.message() {
            warn!("token refresh rejected: {}", msg);
            return Err(BkashError::authentication(msg));
        }

        self.issue(decode("token/refresh", body)?)
    }

    fn issue(&self, response: TokenResponse) -> Result<TokenState> {
        if response.id_token.is_empty() {
            return Err(BkashError::protocol("Token response carried an empty id_token"));
        }
        Ok(TokenState {
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            issued_at: self.clock.now(),
        })
    }

    fn credential_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("username", &self.config.username),
            ("password", &self.config.password),
        ] {
            let value = HeaderValue::from_str(value).map_err(|_| {
                BkashError::config(format!("API {} contains characters not allowed in a header", name))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{token, ManualClock, ScriptedTransport};

    fn manager() -> (TokenManager, Arc<ScriptedTransport>, Arc<ManualClock>) {
        manager_with(Duration::from_secs(3500))
    }

    fn manager_with(
        refresh_after: Duration,
    ) -> (TokenManager, Arc<ScriptedTransport>, Arc<ManualClock>) {
        let config = Arc::new(
            BkashConfig::new(
                "https://checkout.sandbox.bka.sh/v1.2.0-beta",
                "app-key",
                "app-secret",
                "user",
                "pass",
            )
            .with_token_refresh_after(refresh_after),
        );
        let transport = Arc::new(ScriptedTransport::default());
        let clock = Arc::new(ManualClock::new());
        let manager = TokenManager::new(config, transport.clone(), clock.clone());
        (manager, transport, clock)
    }

    #[tokio::test]
    async fn test_first_call_grants_token() {
        let (manager, transport, _clock) = manager();
        transport.push(token("id-1", "refresh-1"));

        let headers = manager.auth_headers().await.unwrap();
        assert_eq!(headers.authorization, "id-1");
        assert_eq!(headers.app_key, "app-key");

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let grant = &calls[0];
        assert_eq!(grant.method, "POST");
        assert!(grant.url.ends_with("/checkout/token/grant"));
        assert_eq!(
            grant.payload.as_ref().unwrap(),
            &json!({"app_key": "app-key", "app_secret": "app-secret"})
        );
        assert_eq!(grant.headers["username"], "user");
        assert_eq!(grant.headers["password"], "pass");
    }

    #[tokio::test]
    async fn test_fresh_token_is_reused_without_network() {
        let (manager, transport, clock) = manager();
        transport.push(token("id-1", "refresh-1"));

        manager.auth_headers().await.unwrap();
        clock.advance(3000);
        let headers = manager.auth_headers().await.unwrap();

        assert_eq!(headers.authorization, "id-1");
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_token_is_refreshed_once() {
        let (manager, transport, clock) = manager();
        transport.push(token("id-1", "refresh-1"));
        transport.push(token("id-2", "refresh-2"));

        manager.auth_headers().await.unwrap();
        clock.advance(3600);
        let headers = manager.auth_headers().await.unwrap();
        assert_eq!(headers.authorization, "id-2");

        // the refreshed token is fresh again
        let again = manager.auth_headers().await.unwrap();
        assert_eq!(again.authorization, "id-2");

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].url.ends_with("/checkout/token/refresh"));
        assert_eq!(calls[1].payload.as_ref().unwrap()["refresh_token"], "refresh-1");
    }

    #[tokio::test]
    async fn test_refresh_boundary_is_inclusive() {
        let (manager, transport, clock) = manager();
        transport.push(token("id-1", "refresh-1"));
        transport.push(token("id-2", "refresh-2"));

        manager.auth_headers().await.unwrap();
        clock.advance(3499);
        assert_eq!(manager.auth_headers().await.unwrap().authorization, "id-1");
        clock.advance(1);
        assert_eq!(manager.auth_headers().await.unwrap().authorization, "id-2");
    }

    #[tokio::test]
    async fn test_grant_failure_carries_gateway_message() {
        let (manager, transport, _clock) = manager();
        transport.push(Ok(json!({"status": "fail", "msg": "Invalid app_key"})));

        match manager.auth_headers().await {
            Err(BkashError::Authentication { message }) => assert_eq!(message, "Invalid app_key"),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_grant_fail_status_without_message() {
        let (manager, transport, _clock) = manager();
        transport.push(Ok(json!({"status": "fail"})));

        match manager.auth_headers().await {
            Err(BkashError::Authentication { message }) => assert_eq!(message, INVALID_CREDENTIALS),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_grant_failure_with_numeric_status() {
        let (manager, transport, _clock) = manager();
        transport.push(Ok(json!({"status": 401, "msg": "Invalid app_secret"})));

        match manager.auth_headers().await {
            Err(BkashError::Authentication { message }) => assert_eq!(message, "Invalid app_secret"),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_failure_with_numeric_status() {
        let (manager, transport, clock) = manager();
        transport.push(token("id-1", "refresh-1"));
        transport.push(Ok(json!({"status": 401, "msg": "Invalid refresh token"})));

        manager.auth_headers().await.unwrap();
        clock.advance(3600);

        match manager.auth_headers().await {
            Err(BkashError::Authentication { message }) => {
                assert_eq!(message, "Invalid refresh token")
            }
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_long_refresh_window_never_refreshes() {
        let (manager, transport, clock) = manager_with(Duration::from_secs(100 * 365 * 24 * 3600));
        transport.push(token("id-1", "refresh-1"));

        manager.auth_headers().await.unwrap();
        clock.advance(3600);
        assert_eq!(manager.auth_headers().await.unwrap().authorization, "id-1");
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_refresh_window_is_config_error() {
        let (manager, transport, _clock) = manager_with(Duration::from_secs(u64::MAX));
        transport.push(token("id-1", "refresh-1"));

        assert!(matches!(
            manager.auth_headers().await,
            Err(BkashError::Config { .. })
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_token() {
        let (manager, transport, clock) = manager();
        transport.push(token("id-1", "refresh-1"));
        transport.push(Ok(json!({"status": "401", "msg": "Invalid refresh token"})));
        transport.push(token("id-2", "refresh-2"));

        manager.auth_headers().await.unwrap();
        clock.advance(3600);

        let err = manager.auth_headers().await.unwrap_err();
        assert!(matches!(err, BkashError::Authentication { .. }));

        // still stale, so the next call retries the refresh with the original refresh token
        let headers = manager.auth_headers().await.unwrap();
        assert_eq!(headers.authorization, "id-2");

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].payload.as_ref().unwrap()["refresh_token"], "refresh-1");
    }

    #[tokio::test]
    async fn test_failed_grant_is_retryable() {
        let (manager, transport, _clock) = manager();
        transport.push(Err(BkashError::transport("connection reset")));
        transport.push(token("id-1", "refresh-1"));

        assert!(manager.auth_headers().await.is_err());
        assert_eq!(manager.auth_headers().await.unwrap().authorization, "id-1");
    }

    #[tokio::test]
    async fn test_token_without_id_is_protocol_error() {
        let (manager, transport, _clock) = manager();
        transport.push(Ok(json!({"refresh_token": "refresh-1"})));

        assert!(matches!(
            manager.auth_headers().await,
            Err(BkashError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_stale_callers_share_one_refresh() {
        let (manager, transport, clock) = manager();
        transport.push(token("id-1", "refresh-1"));
        transport.push(token("id-2", "refresh-2"));

        manager.auth_headers().await.unwrap();
        clock.advance(3600);

        let (a, b) = tokio::join!(manager.auth_headers(), manager.auth_headers());
        assert_eq!(a.unwrap().authorization, "id-2");
        assert_eq!(b.unwrap().authorization, "id-2");
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_auth_headers_map() {
        let headers = AuthHeaders {
            authorization: "id-1".to_string(),
            app_key: "app-key".to_string(),
        };
        let map = headers.to_header_map().unwrap();
        assert_eq!(map["authorization"], "id-1");
        assert_eq!(map["x-app-key"], "app-key");
        assert!(!format!("{:?}", headers).contains("id-1"));
    }
}
