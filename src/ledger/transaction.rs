//! Wallet transaction record and its lifecycle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a transaction does to the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

/// Kind of wallet transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Payment,
    Refund,
    Bonus,
    Cashback,
}

impl TransactionType {
    /// Whether this type credits or debits the wallet.
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            Self::Deposit | Self::Refund | Self::Bonus | Self::Cashback => Direction::Credit,
            Self::Withdrawal | Self::Payment => Direction::Debit,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Payment => "payment",
            Self::Refund => "refund",
            Self::Bonus => "bonus",
            Self::Cashback => "cashback",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction status. The lifecycle is one-directional:
/// `pending -> processing -> {completed, failed, cancelled}`, with
/// `completed -> refunded` as the only exit from a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl TransactionStatus {
    /// Whether this status ends the lifecycle (refund excepted).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Refunded
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match self {
            Self::Pending => matches!(
                next,
                Self::Processing | Self::Completed | Self::Failed | Self::Cancelled
            ),
            Self::Processing => {
                matches!(next, Self::Completed | Self::Failed | Self::Cancelled)
            }
            Self::Completed => next == Self::Refunded,
            Self::Failed | Self::Cancelled | Self::Refunded => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single ledger entry.
///
/// `balance_before` / `balance_after` are written exactly once, at the
/// moment the balance moves, so a completed record is a self-contained
/// audit line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    /// Always positive; `tx_type.direction()` gives the sign.
    pub amount: Decimal,
    pub currency: String,
    /// How the money moved (e.g., "card", "wallet").
    pub payment_method: String,
    /// Raw gateway transaction reference, if any.
    pub gateway_ref: Option<String>,
    /// External correlation id (e.g., the gateway order id).
    pub reference_id: Option<String>,
    /// What `reference_id` refers to (e.g., "gateway_order").
    pub reference_type: Option<String>,
    pub description: Option<String>,
    pub balance_before: Option<Decimal>,
    pub balance_after: Option<Decimal>,
    pub metadata: serde_json::Value,
    pub created_at: u64,
    pub completed_at: Option<u64>,
    pub failed_at: Option<u64>,
    pub error_message: Option<String>,
    /// Optimistic-locking version.
    pub version: u64,
}

impl Transaction {
    /// Create a new pending transaction.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        tx_type: TransactionType,
        amount: Decimal,
        currency: impl Into<String>,
        payment_method: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("txn_{}", Uuid::new_v4().simple()),
            user_id: user_id.into(),
            tx_type,
            status: TransactionStatus::Pending,
            amount,
            currency: currency.into(),
            payment_method: payment_method.into(),
            gateway_ref: None,
            reference_id: None,
            reference_type: None,
            description: None,
            balance_before: None,
            balance_after: None,
            metadata: serde_json::json!({}),
            created_at: crate::store::unix_now(),
            completed_at: None,
            failed_at: None,
            error_message: None,
            version: 0,
        }
    }
}
