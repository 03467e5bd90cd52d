//! Transaction ledger operations.
//!
//! `TransactionLedger` is the only component that mutates balances. Every
//! money movement happens inside `WalletStore::commit_completion`, so a
//! balance change and the transaction's status flip land together or not at
//! all. Conflicting writers are handled with a bounded optimistic-retry
//! loop.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::{Result, WalletError};
use crate::store::{unix_now, WalletStore};

use super::account::WalletAccount;
use super::transaction::{Direction, Transaction, TransactionStatus, TransactionType};

/// Maximum number of retries for optimistic locking conflicts.
const MAX_RETRIES: u32 = 3;

/// Optional fields for a new transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub gateway_ref: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Result of looking a transaction up by its external reference.
///
/// Absence is modelled explicitly; callers that find a transaction still
/// inspect its status themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceLookup {
    NotFound,
    Found(Transaction),
}

/// Wallet ledger operations over an injected store.
pub struct TransactionLedger<S: WalletStore> {
    store: S,
}

impl<S: WalletStore> TransactionLedger<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record a new pending transaction. Never touches the balance.
    pub async fn create_transaction(
        &self,
        user_id: &str,
        tx_type: TransactionType,
        amount: Decimal,
        payment_method: &str,
        description: Option<&str>,
        opts: TransactionOptions,
    ) -> Result<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::validation(format!(
                "transaction amount must be positive, got {}",
                amount
            )));
        }

        let currency = match self.store.get_account(user_id).await? {
            Some(account) => account.currency,
            None => "EGP".to_string(),
        };

        let mut tx = Transaction::new(user_id, tx_type, amount, currency, payment_method);
        tx.description = description.map(str::to_string);
        tx.reference_id = opts.reference_id;
        tx.reference_type = opts.reference_type;
        tx.gateway_ref = opts.gateway_ref;
        if let Some(metadata) = opts.metadata {
            tx.metadata = metadata;
        }

        self.store.insert_transaction(&tx).await?;
        tracing::info!(
            transaction_id = %tx.id,
            user_id = %user_id,
            tx_type = %tx_type,
            amount = %amount,
            "transaction created"
        );
        Ok(tx)
    }

    /// Apply a transaction's amount to the wallet and mark it completed.
    ///
    /// Idempotent: completing an already-completed transaction returns the
    /// recorded result without moving the balance again. A debit that would
    /// go negative marks the transaction failed and returns
    /// `InsufficientFunds`.
    pub async fn complete_transaction(
        &self,
        id: &str,
        gateway_ref: Option<&str>,
    ) -> Result<Transaction> {
        for attempt in 0..MAX_RETRIES {
            let tx = self
                .store
                .get_transaction(id)
                .await?
                .ok_or_else(|| WalletError::not_found(format!("transaction {}", id)))?;

            if tx.status == TransactionStatus::Completed {
                tracing::debug!(transaction_id = %id, "already completed, replay ignored");
                return Ok(tx);
            }
            if !tx.status.can_transition_to(TransactionStatus::Completed) {
                return Err(WalletError::InvalidTransition {
                    from: tx.status.to_string(),
                    to: TransactionStatus::Completed.to_string(),
                });
            }

            let account = match self.store.get_account(&tx.user_id).await? {
                Some(account) => account,
                None => WalletAccount::new(&tx.user_id, &tx.currency),
            };
            let expected_version = account.version;

            let mut updated_account = account.clone();
            match tx.tx_type.direction() {
                Direction::Credit => {
                    updated_account.balance += tx.amount;
                    updated_account.total_deposited += tx.amount;
                }
                Direction::Debit => {
                    if !account.can_afford(tx.amount) {
                        self.mark_failed(&tx, "insufficient funds").await?;
                        return Err(WalletError::InsufficientFunds {
                            balance: account.balance,
                            requested: tx.amount,
                        });
                    }
                    updated_account.balance -= tx.amount;
                    updated_account.total_spent += tx.amount;
                }
            }
            updated_account.updated_at = unix_now();
            updated_account.version = expected_version + 1;

            let mut completed = tx.clone();
            completed.status = TransactionStatus::Completed;
            completed.balance_before = Some(account.balance);
            completed.balance_after = Some(updated_account.balance);
            completed.completed_at = Some(unix_now());
            if let Some(gateway_ref) = gateway_ref {
                completed.gateway_ref = Some(gateway_ref.to_string());
            }
            completed.version = tx.version + 1;

            if self
                .store
                .commit_completion(&updated_account, expected_version, &completed, tx.version)
                .await?
            {
                tracing::info!(
                    transaction_id = %id,
                    user_id = %tx.user_id,
                    amount = %tx.amount,
                    balance_after = %updated_account.balance,
                    "transaction completed"
                );
                return Ok(completed);
            }

            tracing::debug!(
                transaction_id = %id,
                attempt = attempt + 1,
                "account version conflict, retrying"
            );
            backoff(attempt).await;
        }

        Err(WalletError::ConcurrencyConflict {
            resource: format!("transaction:{}", id),
        })
    }

    /// Move a transaction to a non-monetary status (`Processing`, `Failed`,
    /// `Cancelled`). Never mutates the balance.
    ///
    /// The write is conditional on the transaction's version, so a status
    /// flip racing a concurrent completion re-reads instead of overwriting
    /// the settled record; after the re-read the lifecycle check decides.
    pub async fn update_transaction_status(
        &self,
        id: &str,
        status: TransactionStatus,
        details: Option<&str>,
    ) -> Result<Transaction> {
        for attempt in 0..MAX_RETRIES {
            let tx = self
                .store
                .get_transaction(id)
                .await?
                .ok_or_else(|| WalletError::not_found(format!("transaction {}", id)))?;

            if tx.status == status {
                return Ok(tx);
            }
            if !tx.status.can_transition_to(status) {
                return Err(WalletError::InvalidTransition {
                    from: tx.status.to_string(),
                    to: status.to_string(),
                });
            }

            let mut updated = tx.clone();
            updated.status = status;
            updated.version = tx.version + 1;
            match status {
                TransactionStatus::Failed | TransactionStatus::Cancelled => {
                    updated.failed_at = Some(unix_now());
                    updated.error_message = details.map(str::to_string);
                }
                _ => {}
            }

            if self
                .store
                .compare_and_update_transaction(&updated, tx.version)
                .await?
            {
                tracing::info!(
                    transaction_id = %id,
                    from = %tx.status,
                    to = %status,
                    "transaction status updated"
                );
                return Ok(updated);
            }

            tracing::debug!(
                transaction_id = %id,
                attempt = attempt + 1,
                "transaction version conflict, retrying"
            );
            backoff(attempt).await;
        }

        Err(WalletError::ConcurrencyConflict {
            resource: format!("transaction:{}", id),
        })
    }

    /// Look a transaction up by external reference id.
    pub async fn get_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<ReferenceLookup> {
        match self.store.get_transaction_by_reference(reference_id).await? {
            Some(tx) => Ok(ReferenceLookup::Found(tx)),
            None => Ok(ReferenceLookup::NotFound),
        }
    }

    /// Debit the wallet synchronously in one atomic unit.
    ///
    /// Either the check passes and the debit lands together with its ledger
    /// entry, or nothing is written at all.
    pub async fn deduct_from_wallet(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::validation(format!(
                "deduction amount must be positive, got {}",
                amount
            )));
        }

        for attempt in 0..MAX_RETRIES {
            let account = self.store.get_account(user_id).await?.ok_or_else(|| {
                WalletError::InsufficientFunds {
                    balance: Decimal::ZERO,
                    requested: amount,
                }
            })?;

            if !account.can_afford(amount) {
                return Err(WalletError::InsufficientFunds {
                    balance: account.balance,
                    requested: amount,
                });
            }

            let expected_version = account.version;
            let mut updated_account = account.clone();
            updated_account.balance -= amount;
            updated_account.total_spent += amount;
            updated_account.updated_at = unix_now();
            updated_account.version = expected_version + 1;

            let mut tx = Transaction::new(
                user_id,
                TransactionType::Payment,
                amount,
                &account.currency,
                "wallet",
            );
            tx.description = Some(description.to_string());
            tx.reference_id = reference_id.map(str::to_string);
            tx.status = TransactionStatus::Completed;
            tx.balance_before = Some(account.balance);
            tx.balance_after = Some(updated_account.balance);
            tx.completed_at = Some(unix_now());

            if self
                .store
                .commit_completion(&updated_account, expected_version, &tx, 0)
                .await?
            {
                tracing::info!(
                    transaction_id = %tx.id,
                    user_id = %user_id,
                    amount = %amount,
                    balance_after = %updated_account.balance,
                    "wallet debited"
                );
                return Ok(tx);
            }

            tracing::debug!(
                user_id = %user_id,
                attempt = attempt + 1,
                "account version conflict, retrying"
            );
            backoff(attempt).await;
        }

        Err(WalletError::ConcurrencyConflict {
            resource: format!("account:{}", user_id),
        })
    }

    /// Credit a completed transaction's amount back and flip it to
    /// `Refunded`, in one atomic unit. Idempotent: refunding an
    /// already-refunded transaction returns the recorded refund entry.
    ///
    /// The original's status is re-checked on every attempt and the commit
    /// is conditional on its version, so two racing refunds can only credit
    /// once: the loser re-reads the original as refunded and returns the
    /// winner's entry.
    pub async fn refund_transaction(&self, id: &str, reason: &str) -> Result<Transaction> {
        for attempt in 0..MAX_RETRIES {
            let original = self
                .store
                .get_transaction(id)
                .await?
                .ok_or_else(|| WalletError::not_found(format!("transaction {}", id)))?;

            if original.status == TransactionStatus::Refunded {
                if let Some(refund) = self.store.get_transaction_by_reference(id).await? {
                    tracing::debug!(transaction_id = %id, "already refunded, replay ignored");
                    return Ok(refund);
                }
                return Err(WalletError::internal(format!(
                    "transaction {} is refunded but its refund entry is missing",
                    id
                )));
            }
            if !original
                .status
                .can_transition_to(TransactionStatus::Refunded)
            {
                return Err(WalletError::InvalidTransition {
                    from: original.status.to_string(),
                    to: TransactionStatus::Refunded.to_string(),
                });
            }

            let account = match self.store.get_account(&original.user_id).await? {
                Some(account) => account,
                None => WalletAccount::new(&original.user_id, &original.currency),
            };
            let expected_version = account.version;

            let mut updated_account = account.clone();
            updated_account.balance += original.amount;
            updated_account.total_deposited += original.amount;
            updated_account.updated_at = unix_now();
            updated_account.version = expected_version + 1;

            let mut refund = Transaction::new(
                &original.user_id,
                TransactionType::Refund,
                original.amount,
                &original.currency,
                &original.payment_method,
            );
            refund.description = Some(reason.to_string());
            refund.reference_id = Some(original.id.clone());
            refund.reference_type = Some("refund_of".to_string());
            refund.status = TransactionStatus::Completed;
            refund.balance_before = Some(account.balance);
            refund.balance_after = Some(updated_account.balance);
            refund.completed_at = Some(unix_now());

            let mut refunded = original.clone();
            refunded.status = TransactionStatus::Refunded;
            refunded.version = original.version + 1;

            if self
                .store
                .commit_refund(
                    &updated_account,
                    expected_version,
                    &refund,
                    &refunded,
                    original.version,
                )
                .await?
            {
                tracing::info!(
                    transaction_id = %id,
                    refund_id = %refund.id,
                    amount = %original.amount,
                    "transaction refunded"
                );
                return Ok(refund);
            }

            tracing::debug!(
                transaction_id = %id,
                attempt = attempt + 1,
                "refund version conflict, retrying"
            );
            backoff(attempt).await;
        }

        Err(WalletError::ConcurrencyConflict {
            resource: format!("transaction:{}", id),
        })
    }

    /// Current balance, zero when no account exists yet.
    pub async fn balance(&self, user_id: &str) -> Result<Decimal> {
        Ok(self
            .store
            .get_account(user_id)
            .await?
            .map(|account| account.balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// The full account record, if one exists.
    pub async fn account(&self, user_id: &str) -> Result<Option<WalletAccount>> {
        self.store.get_account(user_id).await
    }

    /// The user's transactions, newest first.
    pub async fn history(&self, user_id: &str) -> Result<Vec<Transaction>> {
        self.store.list_transactions(user_id).await
    }

    async fn mark_failed(&self, tx: &Transaction, message: &str) -> Result<()> {
        let mut failed = tx.clone();
        failed.status = TransactionStatus::Failed;
        failed.failed_at = Some(unix_now());
        failed.error_message = Some(message.to_string());
        failed.version = tx.version + 1;
        if !self
            .store
            .compare_and_update_transaction(&failed, tx.version)
            .await?
        {
            // Someone else moved the transaction; their write stands.
            tracing::debug!(
                transaction_id = %tx.id,
                "transaction changed concurrently, failure mark skipped"
            );
            return Ok(());
        }
        tracing::warn!(
            transaction_id = %tx.id,
            user_id = %tx.user_id,
            reason = message,
            "transaction failed"
        );
        Ok(())
    }
}

async fn backoff(attempt: u32) {
    tokio::time::sleep(Duration::from_millis(10 << attempt)).await;
}
