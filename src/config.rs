//! Gateway configuration.
//!
//! Secrets are wrapped in `secrecy::SecretString` so they never leak through
//! `Debug` output or serialized logs. `validate()` runs at construction time
//! so a missing merchant id or secret fails at startup instead of silently
//! failing every signature check at runtime.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Result, WalletError};

/// Which gateway environment requests are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Live,
    Test,
}

impl GatewayMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Live => "live",
            GatewayMode::Test => "test",
        }
    }
}

/// Configuration for the payment gateway integration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Merchant identifier assigned by the gateway.
    pub merchant_id: String,
    /// API key used to sign checkout hashes.
    pub api_key: SecretString,
    /// Secret used to verify inbound webhook signatures.
    pub webhook_secret: SecretString,
    /// Base URL of the hosted checkout page.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Where the gateway redirects the customer after payment.
    pub merchant_redirect_url: String,
    /// Optional redirect for failed payments.
    #[serde(default)]
    pub failure_redirect_url: Option<String>,
    /// Default currency for new wallets and checkouts.
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_mode")]
    pub mode: GatewayMode,
    /// Timeout for outbound gateway calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://checkout.kashier.io".to_string()
}

fn default_currency() -> String {
    "EGP".to_string()
}

fn default_mode() -> GatewayMode {
    GatewayMode::Test
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl GatewayConfig {
    /// Checks the config is usable. Call once at startup.
    pub fn validate(&self) -> Result<()> {
        if self.merchant_id.trim().is_empty() {
            return Err(WalletError::config("merchant_id must not be empty"));
        }
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(WalletError::config("api_key must not be empty"));
        }
        if self.webhook_secret.expose_secret().trim().is_empty() {
            return Err(WalletError::config("webhook_secret must not be empty"));
        }
        if self.merchant_redirect_url.trim().is_empty() {
            return Err(WalletError::config(
                "merchant_redirect_url must not be empty",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(WalletError::config(
                "request_timeout_secs must be at least 1",
            ));
        }
        Ok(())
    }
}
