//! Deposit checkout flow scenarios.

use rust_decimal_macros::dec;
use secrecy::SecretString;
use wallet_engine::gateway::MockGatewayClient;
use wallet_engine::store::test::InMemoryWalletStore;
use wallet_engine::{
    generate_hash, CheckoutFlow, GatewayConfig, GatewayMode, TransactionLedger, TransactionStatus,
    WalletError,
};

const API_KEY: &str = "secret-api-key";

fn config() -> GatewayConfig {
    GatewayConfig {
        merchant_id: "MID-100".to_string(),
        api_key: SecretString::new(API_KEY.to_string()),
        webhook_secret: SecretString::new("webhook-secret".to_string()),
        base_url: "https://checkout.kashier.io".to_string(),
        merchant_redirect_url: "https://app.example.com/wallet/verify".to_string(),
        failure_redirect_url: Some("https://app.example.com/wallet/failed".to_string()),
        currency: "EGP".to_string(),
        mode: GatewayMode::Test,
        request_timeout_secs: 15,
    }
}

fn flow(
    store: InMemoryWalletStore,
    client: MockGatewayClient,
) -> CheckoutFlow<InMemoryWalletStore, MockGatewayClient> {
    CheckoutFlow::new(TransactionLedger::new(store), client, config()).unwrap()
}

fn query_param(url: &url::Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.to_string())
}

#[tokio::test]
async fn begin_deposit_creates_pending_transaction_and_signed_url() {
    let store = InMemoryWalletStore::new();
    let client = MockGatewayClient::new();
    let flow = flow(store.clone(), client.clone());

    let redirect = flow.begin_deposit("u1", dec!(250.00), "card").await.unwrap();

    // Pending transaction, no balance movement.
    let ledger = TransactionLedger::new(store);
    assert_eq!(ledger.balance("u1").await.unwrap(), dec!(0));
    let history = ledger.history("u1").await.unwrap();
    assert_eq!(history.len(), 1);
    let tx = &history[0];
    assert_eq!(tx.id, redirect.transaction_id);
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.reference_type.as_deref(), Some("gateway_order"));
    let order_id = tx.reference_id.clone().unwrap();

    // Order was registered with the gateway, with the literal amount.
    let orders = client.registered_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].merchant_order_id, order_id);
    assert_eq!(orders[0].amount, "250.00");

    // URL carries the required params and the matching checkout hash.
    assert_eq!(
        query_param(&redirect.url, "orderId").as_deref(),
        Some(order_id.as_str())
    );
    assert_eq!(query_param(&redirect.url, "amount").as_deref(), Some("250.00"));
    assert_eq!(query_param(&redirect.url, "currency").as_deref(), Some("EGP"));
    assert_eq!(query_param(&redirect.url, "mode").as_deref(), Some("test"));
    assert_eq!(
        query_param(&redirect.url, "failureRedirect").as_deref(),
        Some("https://app.example.com/wallet/failed")
    );
    let expected_hash = generate_hash("MID-100", &order_id, "250.00", "EGP", API_KEY);
    assert_eq!(query_param(&redirect.url, "hash"), Some(expected_hash));

    // The order id round-trips back to the pending transaction.
    let pending = flow.pending_deposit(&order_id).await.unwrap().unwrap();
    assert_eq!(pending.id, redirect.transaction_id);
    assert!(flow.pending_deposit("ord_other").await.unwrap().is_none());
}

#[tokio::test]
async fn whole_amounts_are_signed_with_two_decimals() {
    let store = InMemoryWalletStore::new();
    let client = MockGatewayClient::new();
    let flow = flow(store, client.clone());

    let redirect = flow.begin_deposit("u1", dec!(50), "card").await.unwrap();
    assert_eq!(query_param(&redirect.url, "amount").as_deref(), Some("50.00"));
    assert_eq!(client.registered_orders()[0].amount, "50.00");
}

#[tokio::test]
async fn gateway_outage_cancels_the_pending_transaction() {
    let store = InMemoryWalletStore::new();
    let client = MockGatewayClient::new();
    client.set_failing(true);
    let flow = flow(store.clone(), client);

    let err = flow.begin_deposit("u1", dec!(50.00), "card").await.unwrap_err();
    assert!(matches!(err, WalletError::GatewayUnavailable(_)));

    // The record is cancelled, not left looking like a live checkout.
    let ledger = TransactionLedger::new(store);
    let history = ledger.history("u1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TransactionStatus::Cancelled);
    assert!(history[0].error_message.is_some());
    assert_eq!(ledger.balance("u1").await.unwrap(), dec!(0));
}

#[tokio::test]
async fn non_positive_deposit_is_rejected() {
    let store = InMemoryWalletStore::new();
    let client = MockGatewayClient::new();
    let flow = flow(store, client.clone());

    let err = flow.begin_deposit("u1", dec!(0), "card").await.unwrap_err();
    assert!(matches!(err, WalletError::Validation(_)));
    assert!(client.registered_orders().is_empty());
}

#[tokio::test]
async fn sub_cent_deposit_is_rejected_before_any_write() {
    let store = InMemoryWalletStore::new();
    let client = MockGatewayClient::new();
    let flow = flow(store.clone(), client.clone());

    // 10.005 would sign as "10.01" while the ledger held 10.005.
    let err = flow
        .begin_deposit("u1", dec!(10.005), "card")
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Validation(_)));

    assert!(client.registered_orders().is_empty());
    let ledger = TransactionLedger::new(store);
    assert!(ledger.history("u1").await.unwrap().is_empty());
}

#[test]
fn misconfigured_secrets_fail_at_construction() {
    let mut bad = config();
    bad.api_key = SecretString::new(String::new());
    let result = CheckoutFlow::new(
        TransactionLedger::new(InMemoryWalletStore::new()),
        MockGatewayClient::new(),
        bad,
    );
    assert!(matches!(result, Err(WalletError::Config(_))));
}
