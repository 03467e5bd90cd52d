//! Wallet account record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A user's wallet balance and lifetime totals.
///
/// Created lazily on the first transaction that touches the wallet. The
/// balance never goes below zero; `total_deposited` and `total_spent` only
/// ever grow. `version` is the optimistic-locking token bumped on every
/// write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletAccount {
    /// Owner of the wallet.
    pub user_id: String,
    /// Current spendable balance.
    pub balance: Decimal,
    /// Currency code (e.g., "EGP").
    pub currency: String,
    /// Lifetime sum of credited amounts.
    pub total_deposited: Decimal,
    /// Lifetime sum of debited amounts.
    pub total_spent: Decimal,
    /// Last updated timestamp (Unix seconds).
    pub updated_at: u64,
    /// Optimistic-locking version.
    pub version: u64,
}

impl WalletAccount {
    /// Create a fresh zero-balance account.
    #[must_use]
    pub fn new(user_id: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            balance: Decimal::ZERO,
            currency: currency.into(),
            total_deposited: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            updated_at: crate::store::unix_now(),
            version: 0,
        }
    }

    /// Whether the balance covers `amount`.
    #[must_use]
    pub fn can_afford(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}
