//! Checkout gateway client

use crate::clock::{Clock, SystemClock};
use crate::config::BkashConfig;
use crate::token::TokenManager;
use crate::transport::{HttpTransport, Transport};
use crate::types::*;
use crate::{BkashError, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::HeaderMap;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Payment creation endpoint
pub const PAYMENT_CREATE_PATH: &str = "/checkout/payment/create";
/// Payment execution endpoint, followed by the payment ID
pub const PAYMENT_EXECUTE_PATH: &str = "/checkout/payment/execute";
/// Payment query endpoint, followed by the payment or transaction ID
pub const PAYMENT_QUERY_PATH: &str = "/checkout/payment/query";
/// Refund endpoint, also used for refund status
pub const PAYMENT_REFUND_PATH: &str = "/checkout/payment/refund";

/// Characters escaped when an identifier is placed in a path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Client for the bKash tokenized checkout API
///
/// Clones are cheap and share the same bearer token.
///
/// ```no_run
/// use bkash::{BkashClient, BkashConfig, CreatePaymentRequest, Intent};
/// use rust_decimal::Decimal;
///
/// # async fn run() -> bkash::Result<()> {
/// let client = BkashClient::new(BkashConfig::new(
///     "https://checkout.sandbox.bka.sh/v1.2.0-beta",
///     "abcdxx2369",
///     "bkashSup3rS3cRet",
///     "bkashTest",
///     "bkashPassword1",
/// ))?;
///
/// let payment = client
///     .create_payment(&CreatePaymentRequest::new(
///         Decimal::new(1000, 0),
///         "ORD1020069",
///         Intent::Sale,
///     ))
///     .await?;
/// let executed = client.execute_payment(&payment.payment_id).await?;
/// println!("{} {}", executed.trx_id, executed.transaction_status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BkashClient {
    config: Arc<BkashConfig>,
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenManager>,
}

impl std::fmt::Debug for BkashClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BkashClient")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl BkashClient {
    /// Create a client that talks to the gateway over HTTP
    pub fn new(config: BkashConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.timeout)?;
        Ok(Self::assemble(config, Arc::new(transport), Arc::new(SystemClock)))
    }

    /// Create a client from the `BKASH_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(BkashConfig::from_env()?)
    }

    /// Create a client on top of a custom transport
    pub fn with_transport(config: BkashConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, transport, Arc::new(SystemClock)))
    }

    /// Replace the clock used to age tokens. Any cached token is dropped.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        let tokens = TokenManager::new(self.config.clone(), self.transport.clone(), clock);
        Self {
            tokens: Arc::new(tokens),
            ..self
        }
    }

    fn assemble(config: BkashConfig, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let config = Arc::new(config);
        let tokens = TokenManager::new(config.clone(), transport.clone(), clock);
        Self {
            config,
            transport,
            tokens: Arc::new(tokens),
        }
    }

    /// Get the client configuration
    pub fn config(&self) -> &BkashConfig {
        &self.config
    }

    /// Start a payment
    #[instrument(skip_all, fields(order_id = %request.order_id, intent = %request.intent))]
    pub async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreatePaymentResponse> {
        request.validate()?;
        let headers = self.auth_headers().await?;
        let payload = serde_json::to_value(request.to_payload())?;
        let body = self
            .transport
            .post(&self.config.endpoint(PAYMENT_CREATE_PATH), Some(payload), &headers)
            .await?;
        decode("payment/create", body)
    }

    /// Execute a payment after the customer has authorized it in the bKash flow
    ///
    /// Failures the library can name (gateway errors, rejected tokens, malformed
    /// responses) are returned as-is. Anything else, such as a network failure or
    /// a request timeout, becomes [`BkashError::ExecutePaymentTimeout`]: the
    /// request may have reached the gateway, so the payment should be queried.
    #[instrument(skip(self))]
    pub async fn execute_payment(&self, payment_id: &str) -> Result<ExecutePaymentResponse> {
        require_non_empty("paymentID", payment_id)?;
        self.send_execute(payment_id).await.map_err(|e| {
            if e.is_transport_failure() {
                warn!("execute payment failed: {}", e);
                BkashError::ExecutePaymentTimeout
            } else {
                e
            }
        })
    }

    async fn send_execute(&self, payment_id: &str) -> Result<ExecutePaymentResponse> {
        let headers = self.auth_headers().await?;
        let body = self
            .transport
            .post(&self.id_url(PAYMENT_EXECUTE_PATH, payment_id), None, &headers)
            .await?;
        decode("payment/execute", body)
    }

    /// Query the current state of a payment
    #[instrument(skip(self))]
    pub async fn query_payment(&self, payment_id: &str) -> Result<QueryPaymentResponse> {
        require_non_empty("paymentID", payment_id)?;
        let headers = self.auth_headers().await?;
        let body = self
            .transport
            .get(&self.id_url(PAYMENT_QUERY_PATH, payment_id), &headers)
            .await?;
        decode("payment/query", body)
    }

    /// Look up a transaction by its transaction ID
    #[instrument(skip(self))]
    pub async fn search_transaction(&self, trx_id: &str) -> Result<SearchTransactionResponse> {
        require_non_empty("trxID", trx_id)?;
        let headers = self.auth_headers().await?;
        let body = self
            .transport
            .get(&self.id_url(PAYMENT_QUERY_PATH, trx_id), &headers)
            .await?;
        decode("transaction search", body)
    }

    /// Refund a completed transaction, fully or partially
    #[instrument(skip_all, fields(payment_id = %refund.payment_id, trx_id = %refund.trx_id))]
    pub async fn refund_transaction(&self, refund: &RefundRequest) -> Result<RefundResponse> {
        refund.validate()?;
        let headers = self.auth_headers().await?;
        let body = self
            .transport
            .post(
                &self.config.endpoint(PAYMENT_REFUND_PATH),
                Some(serde_json::to_value(refund)?),
                &headers,
            )
            .await?;
        decode("payment/refund", body)
    }

    /// Check the status of a refund
    #[instrument(skip(self))]
    pub async fn refund_status(&self, trx_id: &str, payment_id: &str) -> Result<RefundStatusResponse> {
        require_non_empty("trxID", trx_id)?;
        require_non_empty("paymentID", payment_id)?;
        let headers = self.auth_headers().await?;
        let payload = RefundStatusPayload { payment_id, trx_id };
        let body = self
            .transport
            .post(
                &self.config.endpoint(PAYMENT_REFUND_PATH),
                Some(serde_json::to_value(&payload)?),
                &headers,
            )
            .await?;
        decode("refund status", body)
    }

    async fn auth_headers(&self) -> Result<HeaderMap> {
        self.tokens.auth_headers().await?.to_header_map()
    }

    fn id_url(&self, path: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.config.endpoint(path),
            utf8_percent_encode(id, PATH_SEGMENT)
        )
    }
}
