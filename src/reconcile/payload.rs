//! Inbound gateway callback payload.

use serde::{Deserialize, Serialize};

/// Fields delivered by the gateway on both the server-to-server webhook and
/// the customer redirect callback. Amount stays a literal string; it takes
/// part in signature verification exactly as received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub payment_status: String,
    #[serde(default)]
    pub card_data_token: Option<String>,
    #[serde(default)]
    pub masked_card: Option<String>,
    /// Our order id, generated at checkout creation.
    pub merchant_order_id: String,
    /// The gateway's own order id.
    pub order_id: String,
    #[serde(default)]
    pub card_brand: Option<String>,
    pub order_reference: String,
    pub transaction_id: String,
    pub amount: String,
    pub currency: String,
    pub signature: String,
}

/// Payment status as reported by the gateway.
///
/// Unknown codes are carried verbatim rather than collapsed into a known
/// state; the worker acknowledges them without acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Captured,
    Failed,
    Declined,
    Other(String),
}

impl GatewayStatus {
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "SUCCESS" => Self::Success,
            "CAPTURED" => Self::Captured,
            "FAILED" => Self::Failed,
            "DECLINED" => Self::Declined,
            _ => Self::Other(status.to_string()),
        }
    }

    /// Whether this status means the money arrived.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Success | Self::Captured)
    }

    /// Whether this status means the payment definitively did not happen.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed | Self::Declined)
    }
}
