//! Checkout order creation and payment URL assembly.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use url::Url;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{Result, WalletError};
use crate::ledger::{
    Transaction, TransactionLedger, TransactionOptions, TransactionStatus, TransactionType,
};
use crate::store::WalletStore;

use super::signature::generate_hash;

/// An order to be paid on the gateway's hosted checkout page.
///
/// `amount` is the literal string that appears in both the checkout hash
/// and the payment URL; it is fixed at order creation and never
/// re-formatted afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOrder {
    pub merchant_order_id: String,
    pub amount: String,
    pub currency: String,
    pub display: Option<String>,
    pub failure_redirect: Option<String>,
    pub redirect_method: Option<String>,
    pub allowed_methods: Option<String>,
    pub default_method: Option<String>,
    pub brand_color: Option<String>,
    pub meta_data: Option<String>,
}

impl CheckoutOrder {
    #[must_use]
    pub fn new(
        merchant_order_id: impl Into<String>,
        amount: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            merchant_order_id: merchant_order_id.into(),
            amount: amount.into(),
            currency: currency.into(),
            display: None,
            failure_redirect: None,
            redirect_method: None,
            allowed_methods: None,
            default_method: None,
            brand_color: None,
            meta_data: None,
        }
    }
}

/// Build the hosted-checkout redirect URL.
///
/// Required parameters are always present; optional ones are appended only
/// when set, so the same order always produces the same URL.
pub fn build_payment_url(order: &CheckoutOrder, hash: &str, config: &GatewayConfig) -> Result<Url> {
    let mut url = Url::parse(&config.base_url)
        .map_err(|e| WalletError::config(format!("invalid gateway base_url: {}", e)))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("merchantId", &config.merchant_id)
            .append_pair("orderId", &order.merchant_order_id)
            .append_pair("amount", &order.amount)
            .append_pair("currency", &order.currency)
            .append_pair("hash", hash)
            .append_pair("merchantRedirect", &config.merchant_redirect_url)
            .append_pair("mode", config.mode.as_str());

        let optionals = [
            ("display", &order.display),
            ("failureRedirect", &order.failure_redirect),
            ("redirectMethod", &order.redirect_method),
            ("allowedMethods", &order.allowed_methods),
            ("defaultMethod", &order.default_method),
            ("brandColor", &order.brand_color),
            ("metaData", &order.meta_data),
        ];
        for (key, value) in optionals {
            if let Some(value) = value {
                query.append_pair(key, value);
            }
        }
    }

    Ok(url)
}

/// Client for the gateway's server-side API.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Register an order with the gateway before redirecting the customer.
    async fn register_order(&self, order: &CheckoutOrder) -> Result<()>;
}

/// HTTP client against the real gateway API.
pub struct LiveGatewayClient {
    http: reqwest::Client,
    api_url: String,
    api_key: secrecy::SecretString,
}

impl LiveGatewayClient {
    pub fn new(api_url: impl Into<String>, config: &GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| WalletError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl GatewayClient for LiveGatewayClient {
    async fn register_order(&self, order: &CheckoutOrder) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/orders", self.api_url))
            .header("Authorization", self.api_key.expose_secret())
            .json(&serde_json::json!({
                "merchantOrderId": order.merchant_order_id,
                "amount": order.amount,
                "currency": order.currency,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WalletError::GatewayUnavailable(format!(
                "order registration returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// The redirect handed back to the web tier after a deposit is initiated.
#[derive(Debug, Clone)]
pub struct CheckoutRedirect {
    pub transaction_id: String,
    pub url: Url,
}

/// Orchestrates deposit initiation: pending transaction, order
/// registration, hash, redirect URL.
pub struct CheckoutFlow<S: WalletStore, C: GatewayClient> {
    ledger: TransactionLedger<S>,
    client: C,
    config: GatewayConfig,
}

impl<S: WalletStore, C: GatewayClient> CheckoutFlow<S, C> {
    pub fn new(ledger: TransactionLedger<S>, client: C, config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ledger,
            client,
            config,
        })
    }

    /// Start a wallet deposit.
    ///
    /// Creates the pending transaction, registers the order with the
    /// gateway, and returns the signed checkout URL. If registration fails
    /// the pending transaction is cancelled before the error surfaces, so
    /// no record is left that could later be mistaken for a live checkout.
    pub async fn begin_deposit(
        &self,
        user_id: &str,
        amount: Decimal,
        payment_method: &str,
    ) -> Result<CheckoutRedirect> {
        // The gateway is signed and charged with the two-decimal string, so
        // the ledger amount must be exactly representable in it.
        let amount_str = literal_amount(amount).ok_or_else(|| {
            WalletError::validation(format!(
                "deposit amount {} has sub-cent precision",
                amount
            ))
        })?;
        let order_id = format!("ord_{}", Uuid::new_v4().simple());

        let tx = self
            .ledger
            .create_transaction(
                user_id,
                TransactionType::Deposit,
                amount,
                payment_method,
                Some("wallet deposit"),
                TransactionOptions {
                    reference_id: Some(order_id.clone()),
                    reference_type: Some("gateway_order".to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let order = CheckoutOrder::new(&order_id, &amount_str, &self.config.currency);

        if let Err(err) = self.client.register_order(&order).await {
            tracing::warn!(
                transaction_id = %tx.id,
                order_id = %order_id,
                error = %err,
                "order registration failed, cancelling pending deposit"
            );
            self.ledger
                .update_transaction_status(
                    &tx.id,
                    TransactionStatus::Cancelled,
                    Some(&err.to_string()),
                )
                .await?;
            return Err(err);
        }

        let hash = generate_hash(
            &self.config.merchant_id,
            &order_id,
            &amount_str,
            &self.config.currency,
            self.config.api_key.expose_secret(),
        );
        let mut order = order;
        order.failure_redirect = self.config.failure_redirect_url.clone();
        let url = build_payment_url(&order, &hash, &self.config)?;

        tracing::info!(
            transaction_id = %tx.id,
            order_id = %order_id,
            user_id = %user_id,
            amount = %amount_str,
            "deposit checkout created"
        );
        Ok(CheckoutRedirect {
            transaction_id: tx.id,
            url,
        })
    }

    /// The pending transaction created for an order, if any.
    pub async fn pending_deposit(&self, order_id: &str) -> Result<Option<Transaction>> {
        match self.ledger.get_transaction_by_reference(order_id).await? {
            crate::ledger::ReferenceLookup::Found(tx) => Ok(Some(tx)),
            crate::ledger::ReferenceLookup::NotFound => Ok(None),
        }
    }
}

// Two decimal places, fixed at order creation. `None` when the amount
// cannot be expressed in two decimals without rounding.
fn literal_amount(amount: Decimal) -> Option<String> {
    let mut scaled = amount;
    scaled.rescale(2);
    if scaled != amount {
        return None;
    }
    Some(scaled.to_string())
}

/// Mock gateway client for testing.
#[cfg(any(test, feature = "test-store"))]
pub mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records registered orders and can be told to fail.
    #[derive(Default, Clone)]
    pub struct MockGatewayClient {
        orders: Arc<Mutex<Vec<CheckoutOrder>>>,
        fail: Arc<AtomicBool>,
    }

    impl MockGatewayClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent `register_order` calls fail.
        pub fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        /// Orders registered so far.
        pub fn registered_orders(&self) -> Vec<CheckoutOrder> {
            self.orders.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GatewayClient for MockGatewayClient {
        async fn register_order(&self, order: &CheckoutOrder) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(WalletError::GatewayUnavailable(
                    "mock gateway set to fail".to_string(),
                ));
            }
            self.orders.lock().unwrap().push(order.clone());
            Ok(())
        }
    }
}
