//! Payment gateway adapter: checkout hashing, signature validation, and
//! hosted-checkout order creation.

mod checkout;
mod signature;

pub use checkout::{
    build_payment_url, CheckoutFlow, CheckoutOrder, CheckoutRedirect, GatewayClient,
    LiveGatewayClient,
};
pub use signature::{generate_hash, sign_webhook_payload, validate_signature};

#[cfg(any(test, feature = "test-store"))]
pub use checkout::test::MockGatewayClient;
