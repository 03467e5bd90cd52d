//! Error types for the wallet engine.
//!
//! `WalletError` is the single error type crossing the crate boundary. The
//! variants map one-to-one onto the outcomes callers must distinguish:
//! user-visible failures (insufficient funds, quota exhausted), inbound
//! channel rejections (bad signature, unknown order), and transient
//! infrastructure failures (write conflicts, gateway outages).

use rust_decimal::Decimal;

/// The error type for all wallet, gateway, and quota operations.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Malformed or semantically invalid input (e.g. non-positive amount,
    /// unparseable webhook payload). No state was mutated.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// HMAC signature mismatch on an inbound payload. No state was mutated.
    #[error("Invalid payload signature")]
    Signature,

    /// The referenced record does not exist. For webhook lookups this is
    /// surfaced rather than swallowed so the gateway retries delivery.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A debit would take the balance below zero. No write was performed.
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    /// The quota denied consumption. `reason` says why: missing, expired,
    /// or fully consumed.
    #[error("Quota denied ({reason}): {used} of {allowed} used")]
    QuotaExhausted {
        used: u32,
        allowed: u32,
        reason: crate::quota::DenyReason,
    },

    /// The outbound call to the payment gateway failed during checkout
    /// creation. The pending transaction is cancelled, never left ambiguous.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// An atomic write collided with a concurrent writer and the bounded
    /// retry budget was exhausted. Transient; the caller may retry.
    #[error("Concurrent modification of {resource} exceeded retry budget")]
    ConcurrencyConflict { resource: String },

    /// A transaction status transition that the monotonic lifecycle forbids.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Invalid engine configuration, detected at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing store failed to commit a write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalletError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for failures caused by the caller's input or entitlements.
    /// These map to 4xx at the HTTP tier.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Signature
                | Self::NotFound(_)
                | Self::InsufficientFunds { .. }
                | Self::QuotaExhausted { .. }
                | Self::InvalidTransition { .. }
        )
    }

    /// True for transient failures where a retry may succeed. Insufficient
    /// funds and exhausted quotas are final until the user acts.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::GatewayUnavailable(_)
        )
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WalletError>;

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            WalletError::Validation(format!("JSON error: {}", err))
        } else {
            WalletError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WalletError::GatewayUnavailable("request timed out".to_string())
        } else if err.is_connect() {
            WalletError::GatewayUnavailable(format!("connection error: {}", err))
        } else {
            WalletError::GatewayUnavailable(format!("request error: {}", err))
        }
    }
}
