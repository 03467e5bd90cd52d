//! wallet-engine - wallet ledger, gateway reconciliation, and quota
//! enforcement for SaaS applications.
//!
//! The engine is the component layer behind a web tier: it owns balances,
//! the transaction lifecycle, payment-gateway signature handling, and
//! per-user consumption quotas. It deliberately carries no HTTP routes of
//! its own.
//!
//! # Components
//!
//! - **Ledger**: [`TransactionLedger`] is the only thing that moves money.
//!   Every balance change lands atomically with its transaction record.
//! - **Gateway**: checkout hash generation, payment URL assembly, and
//!   order registration against the hosted checkout page.
//! - **Reconciliation**: [`ReconciliationWorker`] applies signed webhook
//!   deliveries to the ledger; the customer redirect callback is read-only.
//! - **Quota**: [`QuotaConsumer`] enforces CV-creation allowances under
//!   concurrency.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wallet_engine::{CheckoutFlow, GatewayConfig, LiveGatewayClient, TransactionLedger};
//!
//! # async fn run(
//! #     store: impl wallet_engine::WalletStore + Clone,
//! #     config: GatewayConfig,
//! # ) -> wallet_engine::Result<()> {
//! wallet_engine::init_tracing();
//!
//! let client = LiveGatewayClient::new("https://api.kashier.io", &config)?;
//! let flow = CheckoutFlow::new(TransactionLedger::new(store), client, config)?;
//!
//! let amount = "50.00".parse::<rust_decimal::Decimal>().unwrap();
//! let redirect = flow.begin_deposit("user-1", amount, "card").await?;
//! println!("send the customer to {}", redirect.url);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod gateway;
pub mod ledger;
pub mod quota;
pub mod reconcile;
pub mod store;

// Re-exports for public API
pub use config::{GatewayConfig, GatewayMode};
pub use error::{Result, WalletError};
pub use gateway::{
    build_payment_url, generate_hash, sign_webhook_payload, validate_signature, CheckoutFlow,
    CheckoutOrder, CheckoutRedirect, GatewayClient, LiveGatewayClient,
};
pub use ledger::{
    ReferenceLookup, Transaction, TransactionLedger, TransactionOptions, TransactionStatus,
    TransactionType, WalletAccount,
};
pub use quota::{ConsumeOutcome, CvQuota, DenyReason, QuotaConsumer, QuotaPlan};
pub use reconcile::{
    GatewayStatus, ReconciliationWorker, RedirectView, WebhookOutcome, WebhookPayload,
};
pub use store::WalletStore;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults.
///
/// Call once early in your application, before handling any traffic.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "wallet_engine=debug")
/// - `WALLET_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("WALLET_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
