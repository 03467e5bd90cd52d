//! Checkout hash generation and webhook signature validation.
//!
//! Both directions are HMAC-SHA256 over a canonical string, hex-encoded.
//! The canonical strings are fixed by the gateway's protocol and built from
//! the literal field values as received; no reformatting, no re-parsing of
//! amounts.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::reconcile::WebhookPayload;

type HmacSha256 = Hmac<Sha256>;

/// Compute the checkout hash for a hosted-payment-page order.
///
/// The signed string is the literal path
/// `/?payment={merchantId}.{orderId}.{amount}.{currency}`. The amount must
/// be the exact string that will appear in the checkout URL.
#[must_use]
pub fn generate_hash(
    merchant_id: &str,
    order_id: &str,
    amount: &str,
    currency: &str,
    api_key: &str,
) -> String {
    let path = format!(
        "/?payment={}.{}.{}.{}",
        merchant_id, order_id, amount, currency
    );
    compute_hmac_hex(path.as_bytes(), api_key.as_bytes())
}

/// Verify the signature on an inbound webhook or redirect payload.
///
/// The canonical string is the payload's fields as `key=value` pairs joined
/// by `&`, in the gateway's fixed order, with missing optional fields as
/// empty strings. Comparison is constant-time over the decoded digests.
/// Malformed input (bad hex, empty signature) is simply invalid, never an
/// error.
#[must_use]
pub fn validate_signature(payload: &WebhookPayload, secret: &str) -> bool {
    let provided = match hex::decode(&payload.signature) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => {
            tracing::debug!("failed to decode webhook signature");
            return false;
        }
    };

    let expected = compute_hmac(canonical_query(payload).as_bytes(), secret.as_bytes());
    constant_time_compare(&provided, &expected)
}

/// Sign a payload the way the gateway does. Used by tests and the mock
/// gateway to produce valid inbound payloads.
#[must_use]
pub fn sign_webhook_payload(payload: &WebhookPayload, secret: &str) -> String {
    compute_hmac_hex(canonical_query(payload).as_bytes(), secret.as_bytes())
}

// Field order is part of the gateway protocol and must not change.
fn canonical_query(payload: &WebhookPayload) -> String {
    let opt = |field: &Option<String>| field.as_deref().unwrap_or("").to_string();
    [
        format!("paymentStatus={}", payload.payment_status),
        format!("cardDataToken={}", opt(&payload.card_data_token)),
        format!("maskedCard={}", opt(&payload.masked_card)),
        format!("merchantOrderId={}", payload.merchant_order_id),
        format!("orderId={}", payload.order_id),
        format!("cardBrand={}", opt(&payload.card_brand)),
        format!("orderReference={}", payload.order_reference),
        format!("transactionId={}", payload.transaction_id),
        format!("amount={}", payload.amount),
        format!("currency={}", payload.currency),
    ]
    .join("&")
}

fn compute_hmac(message: &[u8], key: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn compute_hmac_hex(message: &[u8], key: &[u8]) -> String {
    hex::encode(compute_hmac(message, key))
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
