//! Webhook and redirect reconciliation.
//!
//! The POST webhook is the only channel that finalizes money movement. The
//! GET redirect is advisory: the customer's browser carried it here, so it
//! is never trusted to mutate anything, valid signature or not.

use secrecy::{ExposeSecret, SecretString};

use crate::config::GatewayConfig;
use crate::error::{Result, WalletError};
use crate::gateway::validate_signature;
use crate::ledger::{ReferenceLookup, TransactionLedger, TransactionStatus};
use crate::store::WalletStore;

use super::payload::{GatewayStatus, WebhookPayload};

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The deposit was applied to the wallet.
    Completed,
    /// The transaction was marked failed. No money moved.
    MarkedFailed,
    /// A replay of an already-settled delivery. No money moved.
    AlreadyProcessed,
    /// No transaction matches the order. Nothing was written; the gateway
    /// will retry delivery.
    NotFound,
    /// Acknowledged but not acted on (unknown status, or a transaction the
    /// lifecycle no longer allows to move).
    Ignored,
    /// Signature verification failed. Nothing was written.
    Rejected,
}

/// What the redirect callback shows the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectView {
    /// The callback's signature did not verify.
    Invalid,
    /// No transaction matches the order.
    NotFound,
    /// The transaction's current state, as last settled by the webhook.
    Found {
        transaction_id: String,
        status: TransactionStatus,
    },
}

/// Applies gateway callbacks to the ledger.
pub struct ReconciliationWorker<S: WalletStore> {
    ledger: TransactionLedger<S>,
    webhook_secret: SecretString,
}

impl<S: WalletStore> ReconciliationWorker<S> {
    #[must_use]
    pub fn new(ledger: TransactionLedger<S>, config: &GatewayConfig) -> Self {
        Self {
            ledger,
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Process a server-to-server webhook delivery.
    ///
    /// Verifies the signature before touching anything, then routes on the
    /// gateway's payment status. Replays are absorbed: completing an
    /// already-completed transaction moves no money.
    pub async fn handle_webhook(&self, payload: &WebhookPayload) -> Result<WebhookOutcome> {
        if !validate_signature(payload, self.webhook_secret.expose_secret()) {
            tracing::warn!(
                merchant_order_id = %payload.merchant_order_id,
                "webhook signature rejected"
            );
            return Ok(WebhookOutcome::Rejected);
        }

        let tx = match self
            .ledger
            .get_transaction_by_reference(&payload.merchant_order_id)
            .await?
        {
            ReferenceLookup::Found(tx) => tx,
            ReferenceLookup::NotFound => {
                tracing::warn!(
                    merchant_order_id = %payload.merchant_order_id,
                    "webhook for unknown order"
                );
                return Ok(WebhookOutcome::NotFound);
            }
        };

        let status = GatewayStatus::parse(&payload.payment_status);
        if status.is_paid() {
            if tx.status == TransactionStatus::Completed {
                tracing::debug!(
                    transaction_id = %tx.id,
                    "webhook replay for completed transaction"
                );
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
            match self
                .ledger
                .complete_transaction(&tx.id, Some(&payload.transaction_id))
                .await
            {
                Ok(_) => Ok(WebhookOutcome::Completed),
                Err(WalletError::InvalidTransition { from, to }) => {
                    tracing::warn!(
                        transaction_id = %tx.id,
                        from = %from,
                        to = %to,
                        "success webhook for transaction the lifecycle cannot move"
                    );
                    Ok(WebhookOutcome::Ignored)
                }
                Err(err) => Err(err),
            }
        } else if status.is_failed() {
            if tx.status == TransactionStatus::Failed {
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
            match self
                .ledger
                .update_transaction_status(
                    &tx.id,
                    TransactionStatus::Failed,
                    Some(&format!("gateway reported {}", payload.payment_status)),
                )
                .await
            {
                Ok(_) => Ok(WebhookOutcome::MarkedFailed),
                Err(WalletError::InvalidTransition { from, to }) => {
                    tracing::warn!(
                        transaction_id = %tx.id,
                        from = %from,
                        to = %to,
                        "failure webhook for transaction the lifecycle cannot move"
                    );
                    Ok(WebhookOutcome::Ignored)
                }
                Err(err) => Err(err),
            }
        } else {
            tracing::info!(
                transaction_id = %tx.id,
                payment_status = %payload.payment_status,
                "webhook with unhandled payment status acknowledged"
            );
            Ok(WebhookOutcome::Ignored)
        }
    }

    /// Process the customer redirect callback. Read-only: reports the
    /// transaction's current state and writes nothing, whatever the payload
    /// claims.
    pub async fn handle_redirect(&self, payload: &WebhookPayload) -> Result<RedirectView> {
        if !validate_signature(payload, self.webhook_secret.expose_secret()) {
            tracing::warn!(
                merchant_order_id = %payload.merchant_order_id,
                "redirect signature rejected"
            );
            return Ok(RedirectView::Invalid);
        }

        match self
            .ledger
            .get_transaction_by_reference(&payload.merchant_order_id)
            .await?
        {
            ReferenceLookup::Found(tx) => Ok(RedirectView::Found {
                transaction_id: tx.id,
                status: tx.status,
            }),
            ReferenceLookup::NotFound => Ok(RedirectView::NotFound),
        }
    }
}
