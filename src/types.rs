//! Request payloads and response types for the checkout API

use crate::{BkashError, Result};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Currency used for every checkout payment
pub const CURRENCY: &str = "BDT";

/// Payment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Immediate capture
    Sale,
    /// Reserve now, capture later
    Authorization,
}

impl Intent {
    /// Wire representation of the intent
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Sale => "sale",
            Intent::Authorization => "authorization",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = BkashError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sale" => Ok(Intent::Sale),
            "authorization" => Ok(Intent::Authorization),
            other => Err(BkashError::validation(format!("Unknown intent: {}", other))),
        }
    }
}

/// Details needed to start a payment
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePaymentRequest {
    /// Amount to charge, must be positive
    pub amount: Decimal,
    /// Merchant order identifier, sent as `merchantInvoiceNumber`
    pub order_id: String,
    /// Payment mode
    pub intent: Intent,
    /// Free-form merchant data attached to the payment
    pub merchant_association_info: Option<String>,
}

impl CreatePaymentRequest {
    /// Create a new payment request
    pub fn new(amount: Decimal, order_id: impl Into<String>, intent: Intent) -> Self {
        Self {
            amount,
            order_id: order_id.into(),
            intent,
            merchant_association_info: None,
        }
    }

    /// Attach merchant association info
    pub fn with_merchant_association_info(mut self, info: impl Into<String>) -> Self {
        self.merchant_association_info = Some(info.into());
        self
    }

    /// Check the caller-supplied fields
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(BkashError::validation("Amount must be greater than zero"));
        }
        require_non_empty("orderID", &self.order_id)
    }

    pub(crate) fn to_payload(&self) -> CreatePaymentPayload<'_> {
        CreatePaymentPayload {
            amount: self.amount.normalize().to_string(),
            currency: CURRENCY,
            intent: self.intent,
            merchant_invoice_number: &self.order_id,
            merchant_association_info: self.merchant_association_info.as_deref().unwrap_or(""),
        }
    }
}

/// Wire body of `payment/create`
#[derive(Debug, Serialize)]
pub(crate) struct CreatePaymentPayload<'a> {
    amount: String,
    currency: &'static str,
    intent: Intent,
    #[serde(rename = "merchantInvoiceNumber")]
    merchant_invoice_number: &'a str,
    #[serde(rename = "merchantAssociationInfo")]
    merchant_association_info: &'a str,
}

/// Refund of a completed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Payment to refund
    #[serde(rename = "paymentID")]
    pub payment_id: String,
    /// Refund amount as a decimal string with at most two fractional digits, e.g. `"25.69"`
    pub amount: String,
    /// Transaction to refund
    #[serde(rename = "trxID")]
    pub trx_id: String,
    /// Product SKU being refunded
    pub sku: String,
}

impl RefundRequest {
    /// Create a new refund request
    pub fn new(
        payment_id: impl Into<String>,
        amount: impl Into<String>,
        trx_id: impl Into<String>,
        sku: impl Into<String>,
    ) -> Self {
        Self {
            payment_id: payment_id.into(),
            amount: amount.into(),
            trx_id: trx_id.into(),
            sku: sku.into(),
        }
    }

    /// Check that every field is present and the amount is well formed
    pub fn validate(&self) -> Result<()> {
        require_non_empty("paymentID", &self.payment_id)?;
        require_non_empty("amount", &self.amount)?;
        require_non_empty("trxID", &self.trx_id)?;
        require_non_empty("sku", &self.sku)?;

        let amount = Decimal::from_str(&self.amount).map_err(|_| {
            BkashError::validation(format!("Invalid refund amount: {}", self.amount))
        })?;
        if amount.is_sign_negative() {
            return Err(BkashError::validation("Refund amount must not be negative"));
        }
        if amount.scale() > 2 {
            return Err(BkashError::validation(
                "Refund amount must not have more than two decimal places",
            ));
        }
        Ok(())
    }
}

/// Wire body of a refund status query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct RefundStatusPayload<'a> {
    #[serde(rename = "paymentID")]
    pub payment_id: &'a str,
    #[serde(rename = "trxID")]
    pub trx_id: &'a str,
}

/// Successful token grant or refresh
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for authenticated calls
    pub id_token: String,
    /// Token used to obtain the next bearer token
    pub refresh_token: String,
    /// Lifetime reported by the gateway, in seconds
    #[serde(default, deserialize_with = "string_or_number")]
    pub expires_in: Option<String>,
    /// Token type reported by the gateway
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Response of `payment/create`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    #[serde(rename = "paymentID")]
    pub payment_id: String,
    pub create_time: String,
    #[serde(default)]
    pub org_logo: Option<String>,
    #[serde(default)]
    pub org_name: Option<String>,
    pub transaction_status: String,
    pub amount: String,
    pub currency: String,
    pub intent: String,
    pub merchant_invoice_number: String,
}

/// Response of `payment/execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePaymentResponse {
    #[serde(rename = "paymentID")]
    pub payment_id: String,
    pub create_time: String,
    pub update_time: String,
    #[serde(rename = "trxID")]
    pub trx_id: String,
    pub transaction_status: String,
    pub amount: String,
    pub currency: String,
    pub intent: String,
    pub merchant_invoice_number: String,
}

/// Response of `payment/query`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPaymentResponse {
    #[serde(rename = "paymentID")]
    pub payment_id: String,
    pub create_time: String,
    #[serde(default)]
    pub update_time: Option<String>,
    /// Absent until the payment has been executed
    #[serde(rename = "trxID", default)]
    pub trx_id: Option<String>,
    pub transaction_status: String,
    pub amount: String,
    pub currency: String,
    pub intent: String,
    pub merchant_invoice_number: String,
    #[serde(default)]
    pub refund_amount: Option<String>,
}

/// Response of a transaction search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTransactionResponse {
    #[serde(rename = "trxID")]
    pub trx_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub customer_msisdn: Option<String>,
    #[serde(default)]
    pub initiation_time: Option<String>,
    #[serde(default)]
    pub completed_time: Option<String>,
    #[serde(default)]
    pub organization_short_code: Option<String>,
    #[serde(default)]
    pub transaction_reference: Option<String>,
}

/// Response of a refund
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    #[serde(rename = "originalTrxID")]
    pub original_trx_id: String,
    #[serde(rename = "refundTrxID")]
    pub refund_trx_id: String,
    pub transaction_status: String,
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub charge: Option<String>,
    pub completed_time: String,
}

/// Response of a refund status query; same shape as a refund
pub type RefundStatusResponse = RefundResponse;

/// Failure body returned by the token endpoints
///
/// Read loosely from the raw body: the gateway is not consistent about the
/// JSON types of `status` and `msg`, so any non-empty value counts.
#[derive(Debug, Clone, Default)]
pub(crate) struct TokenFailure {
    pub status: Option<String>,
    pub msg: Option<String>,
}

impl TokenFailure {
    pub fn from_body(body: &Value) -> Self {
        Self {
            status: body.get("status").and_then(present_text),
            msg: body.get("msg").and_then(present_text),
        }
    }

    /// Both `status` and `msg` present means the gateway refused the request
    pub fn message(&self) -> Option<&str> {
        match (&self.status, &self.msg) {
            (Some(_), Some(msg)) => Some(msg),
            _ => None,
        }
    }

    pub fn is_fail_status(&self) -> bool {
        self.status.as_deref() == Some("fail")
    }
}

/// Text of a field that counts as set: not null, false, zero or empty
fn present_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// Decode a gateway body into the endpoint's response type
pub(crate) fn decode<T: DeserializeOwned>(endpoint: &str, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| {
        BkashError::protocol(format!("Unexpected {} response: {}", endpoint, e))
    })
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BkashError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
