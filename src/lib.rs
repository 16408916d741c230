//! # bkash - checkout gateway client
//!
//! An async client for the bKash tokenized checkout REST API. It creates,
//! executes and queries payments, searches transactions and issues refunds,
//! while keeping the gateway's bearer token alive behind the scenes.
//!
//! Every failure is reported as a [`BkashError`], including the in-band
//! `errorMessage` bodies the gateway uses instead of HTTP status codes.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod token;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use client::BkashClient;
pub use clock::{Clock, SystemClock};
pub use config::BkashConfig;
pub use error::{BkashError, Result};
pub use token::{AuthHeaders, TokenManager};
pub use transport::{HttpTransport, Transport};
pub use types::*;

/// Current version of the bkash library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
