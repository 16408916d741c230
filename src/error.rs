//! Error types for the bkash library

use thiserror::Error;

/// Result type alias for bkash operations
pub type Result<T> = std::result::Result<T, BkashError>;

/// Message returned when an execute-payment call fails for a reason outside the library.
pub const EXECUTE_TIMEOUT_MESSAGE: &str =
    "Timeout of 30 Seconds Exceeded While Executing Payment, Please Query the Payment";

/// Main error type for bkash operations
#[derive(Error, Debug)]
pub enum BkashError {
    /// Invalid or missing construction input
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Caller supplied an empty or malformed argument
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Token grant or refresh was rejected by the gateway
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The gateway answered with an `errorMessage` body
    #[error("Gateway error: {message}")]
    Gateway {
        message: String,
        code: Option<String>,
    },

    /// The gateway answered with a body that does not match the endpoint's shape
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Execute payment failed without a known cause; the payment state must be queried
    #[error("{}", EXECUTE_TIMEOUT_MESSAGE)]
    ExecutePaymentTimeout,

    /// HTTP client error, including request timeouts
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure reported by a custom transport implementation
    #[error("Transport error: {message}")]
    Transport { message: String },
}

impl BkashError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a gateway error without an error code
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway {
            message: message.into(),
            code: None,
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Whether the error came from below the library (network, body parsing, custom transport)
    /// rather than from one of the library's own checks.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Json(_) | Self::Transport { .. })
    }

    /// Whether the error is a request timeout raised by the HTTP client
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout(),
            Self::ExecutePaymentTimeout => true,
            _ => false,
        }
    }
}
