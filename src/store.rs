//! Storage trait for wallet data.
//!
//! Implement `WalletStore` to persist wallet state to your database. An
//! in-memory implementation is provided for testing behind the
//! `test-store` feature.
//!
//! Every stored record carries a `version` counter bumped by the writer;
//! the `compare_and_*` methods and the commit methods compare against it so
//! concurrent writers cannot silently overwrite each other.

use async_trait::async_trait;

use crate::error::Result;
use crate::ledger::{Transaction, WalletAccount};
use crate::quota::CvQuota;

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Trait for storing wallet accounts, transactions, and quotas.
///
/// # Atomicity contract
///
/// `compare_and_save_account`, `compare_and_update_transaction`,
/// `compare_and_save_quota`, `commit_completion`, and `commit_refund` MUST
/// be atomic compare-and-swap operations. In SQL that means
/// `UPDATE ... WHERE version = $expected` (and for the commit methods, all
/// writes inside one database transaction). For records not yet stored, an
/// expected version of 0 means "create". Returning `Ok(false)` on a version
/// mismatch is how callers learn to re-read and retry; on `Ok(false)`
/// nothing may have been written.
#[async_trait]
pub trait WalletStore: Send + Sync {
    // Accounts

    /// Get a wallet account by owner.
    async fn get_account(&self, user_id: &str) -> Result<Option<WalletAccount>>;

    /// Save/overwrite a wallet account.
    async fn save_account(&self, account: &WalletAccount) -> Result<()>;

    /// Save the account only if its stored version equals `expected_version`.
    ///
    /// Returns `Ok(true)` if the save landed, `Ok(false)` on version mismatch.
    async fn compare_and_save_account(
        &self,
        account: &WalletAccount,
        expected_version: u64,
    ) -> Result<bool>;

    // Transactions

    /// Insert a new transaction record.
    async fn insert_transaction(&self, tx: &Transaction) -> Result<()>;

    /// Get a transaction by id.
    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>>;

    /// Get a transaction by its external reference id (e.g., gateway order id).
    async fn get_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Transaction>>;

    /// Overwrite the transaction only if its stored version equals
    /// `expected_version`.
    async fn compare_and_update_transaction(
        &self,
        tx: &Transaction,
        expected_version: u64,
    ) -> Result<bool>;

    /// List a user's transactions, newest first.
    async fn list_transactions(&self, user_id: &str) -> Result<Vec<Transaction>>;

    /// Write the new account state and the transaction's terminal fields as
    /// one atomic unit, conditional on both records' expected versions.
    ///
    /// This is the only way a balance change and a status flip can land
    /// together. The transaction check means a concurrent status write (a
    /// failure webhook racing a success webhook) surfaces as a conflict
    /// instead of being overwritten. Returns `Ok(false)` if either version
    /// did not match; in that case neither record was written.
    async fn commit_completion(
        &self,
        account: &WalletAccount,
        expected_account_version: u64,
        tx: &Transaction,
        expected_tx_version: u64,
    ) -> Result<bool>;

    /// Write the credited account, the refund entry, and the original
    /// transaction's flip to refunded as one atomic unit, conditional on
    /// the account's and the original's expected versions.
    ///
    /// The condition on the original is what makes a refund single-shot:
    /// two racing refunds both read the original as completed, but only one
    /// can win this write.
    async fn commit_refund(
        &self,
        account: &WalletAccount,
        expected_account_version: u64,
        refund: &Transaction,
        original: &Transaction,
        expected_original_version: u64,
    ) -> Result<bool>;

    // Quotas

    /// Get a user's quota record.
    async fn get_quota(&self, user_id: &str) -> Result<Option<CvQuota>>;

    /// Save/overwrite a quota record.
    async fn save_quota(&self, quota: &CvQuota) -> Result<()>;

    /// Save the quota only if its stored version equals `expected_version`.
    async fn compare_and_save_quota(&self, quota: &CvQuota, expected_version: u64)
        -> Result<bool>;
}

/// In-memory wallet store for testing.
#[cfg(any(test, feature = "test-store"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, RwLock};

    /// In-memory wallet store for testing.
    ///
    /// Wraps data in Arc for cheap cloning. `commit_lock` serializes the
    /// multi-record commit methods so their writes are observed as one
    /// unit, mirroring a database transaction.
    #[derive(Default, Clone)]
    pub struct InMemoryWalletStore {
        inner: Arc<InMemoryWalletStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryWalletStoreInner {
        accounts: RwLock<HashMap<String, WalletAccount>>,
        transactions: RwLock<HashMap<String, Transaction>>,
        // reference_id -> transaction id
        reference_index: RwLock<HashMap<String, String>>,
        quotas: RwLock<HashMap<String, CvQuota>>,
        commit_lock: Mutex<()>,
    }

    impl InMemoryWalletStore {
        /// Create a new in-memory store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Get all transactions (for testing).
        pub fn all_transactions(&self) -> Vec<Transaction> {
            self.inner
                .transactions
                .read()
                .unwrap()
                .values()
                .cloned()
                .collect()
        }

        fn account_version_matches(&self, account: &WalletAccount, expected: u64) -> bool {
            match self.inner.accounts.read().unwrap().get(&account.user_id) {
                Some(current) => current.version == expected,
                None => expected == 0,
            }
        }

        fn transaction_version_matches(&self, id: &str, expected: u64) -> bool {
            match self.inner.transactions.read().unwrap().get(id) {
                Some(current) => current.version == expected,
                None => expected == 0,
            }
        }

        fn write_transaction(&self, tx: &Transaction) {
            if let Some(reference_id) = &tx.reference_id {
                self.inner
                    .reference_index
                    .write()
                    .unwrap()
                    .insert(reference_id.clone(), tx.id.clone());
            }
            self.inner
                .transactions
                .write()
                .unwrap()
                .insert(tx.id.clone(), tx.clone());
        }
    }

    #[async_trait]
    impl WalletStore for InMemoryWalletStore {
        async fn get_account(&self, user_id: &str) -> Result<Option<WalletAccount>> {
            Ok(self.inner.accounts.read().unwrap().get(user_id).cloned())
        }

        async fn save_account(&self, account: &WalletAccount) -> Result<()> {
            self.inner
                .accounts
                .write()
                .unwrap()
                .insert(account.user_id.clone(), account.clone());
            Ok(())
        }

        async fn compare_and_save_account(
            &self,
            account: &WalletAccount,
            expected_version: u64,
        ) -> Result<bool> {
            let _guard = self.inner.commit_lock.lock().unwrap();
            if !self.account_version_matches(account, expected_version) {
                return Ok(false);
            }
            self.inner
                .accounts
                .write()
                .unwrap()
                .insert(account.user_id.clone(), account.clone());
            Ok(true)
        }

        async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
            self.write_transaction(tx);
            Ok(())
        }

        async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
            Ok(self.inner.transactions.read().unwrap().get(id).cloned())
        }

        async fn get_transaction_by_reference(
            &self,
            reference_id: &str,
        ) -> Result<Option<Transaction>> {
            let id = match self.inner.reference_index.read().unwrap().get(reference_id) {
                Some(id) => id.clone(),
                None => return Ok(None),
            };
            Ok(self.inner.transactions.read().unwrap().get(&id).cloned())
        }

        async fn compare_and_update_transaction(
            &self,
            tx: &Transaction,
            expected_version: u64,
        ) -> Result<bool> {
            let _guard = self.inner.commit_lock.lock().unwrap();
            if !self.transaction_version_matches(&tx.id, expected_version) {
                return Ok(false);
            }
            self.write_transaction(tx);
            Ok(true)
        }

        async fn list_transactions(&self, user_id: &str) -> Result<Vec<Transaction>> {
            let transactions = self.inner.transactions.read().unwrap();
            let mut list: Vec<Transaction> = transactions
                .values()
                .filter(|tx| tx.user_id == user_id)
                .cloned()
                .collect();
            list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(list)
        }

        async fn commit_completion(
            &self,
            account: &WalletAccount,
            expected_account_version: u64,
            tx: &Transaction,
            expected_tx_version: u64,
        ) -> Result<bool> {
            let _guard = self.inner.commit_lock.lock().unwrap();
            if !self.account_version_matches(account, expected_account_version)
                || !self.transaction_version_matches(&tx.id, expected_tx_version)
            {
                return Ok(false);
            }
            self.inner
                .accounts
                .write()
                .unwrap()
                .insert(account.user_id.clone(), account.clone());
            self.write_transaction(tx);
            Ok(true)
        }

        async fn commit_refund(
            &self,
            account: &WalletAccount,
            expected_account_version: u64,
            refund: &Transaction,
            original: &Transaction,
            expected_original_version: u64,
        ) -> Result<bool> {
            let _guard = self.inner.commit_lock.lock().unwrap();
            if !self.account_version_matches(account, expected_account_version)
                || !self.transaction_version_matches(&original.id, expected_original_version)
            {
                return Ok(false);
            }
            self.inner
                .accounts
                .write()
                .unwrap()
                .insert(account.user_id.clone(), account.clone());
            self.write_transaction(refund);
            self.write_transaction(original);
            Ok(true)
        }

        async fn get_quota(&self, user_id: &str) -> Result<Option<CvQuota>> {
            Ok(self.inner.quotas.read().unwrap().get(user_id).cloned())
        }

        async fn save_quota(&self, quota: &CvQuota) -> Result<()> {
            self.inner
                .quotas
                .write()
                .unwrap()
                .insert(quota.user_id.clone(), quota.clone());
            Ok(())
        }

        async fn compare_and_save_quota(
            &self,
            quota: &CvQuota,
            expected_version: u64,
        ) -> Result<bool> {
            let mut quotas = self.inner.quotas.write().unwrap();
            if let Some(current) = quotas.get(&quota.user_id) {
                if current.version != expected_version {
                    return Ok(false);
                }
            } else if expected_version != 0 {
                return Ok(false);
            }
            quotas.insert(quota.user_id.clone(), quota.clone());
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::InMemoryWalletStore;
    use super::*;
    use crate::ledger::{TransactionStatus, TransactionType};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_account_cas_rejects_stale_version() {
        let store = InMemoryWalletStore::new();
        let mut account = WalletAccount::new("u1", "EGP");
        account.version = 1;
        store.save_account(&account).await.unwrap();

        let mut stale = account.clone();
        stale.balance = dec!(10.00);
        stale.version = 2;
        // Expected version 0 does not match stored version 1.
        assert!(!store.compare_and_save_account(&stale, 0).await.unwrap());

        assert!(store.compare_and_save_account(&stale, 1).await.unwrap());
        let saved = store.get_account("u1").await.unwrap().unwrap();
        assert_eq!(saved.balance, dec!(10.00));
        assert_eq!(saved.version, 2);
    }

    #[tokio::test]
    async fn test_reference_lookup() {
        let store = InMemoryWalletStore::new();
        let mut tx = Transaction::new("u1", TransactionType::Deposit, dec!(50), "EGP", "card");
        tx.reference_id = Some("ord_abc".to_string());
        tx.reference_type = Some("gateway_order".to_string());
        store.insert_transaction(&tx).await.unwrap();

        let found = store
            .get_transaction_by_reference("ord_abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, tx.id);
        assert!(store
            .get_transaction_by_reference("ord_missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_transaction_cas_rejects_stale_version() {
        let store = InMemoryWalletStore::new();
        let tx = Transaction::new("u1", TransactionType::Deposit, dec!(50), "EGP", "card");
        store.insert_transaction(&tx).await.unwrap();

        let mut first = tx.clone();
        first.status = TransactionStatus::Processing;
        first.version = 1;
        assert!(store
            .compare_and_update_transaction(&first, 0)
            .await
            .unwrap());

        // A writer still holding the version-0 copy loses.
        let mut stale = tx.clone();
        stale.status = TransactionStatus::Failed;
        stale.version = 1;
        assert!(!store
            .compare_and_update_transaction(&stale, 0)
            .await
            .unwrap());
        let stored = store.get_transaction(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Processing);
    }

    #[tokio::test]
    async fn test_commit_completion_is_conditional_on_both_versions() {
        let store = InMemoryWalletStore::new();
        let mut account = WalletAccount::new("u1", "EGP");
        account.version = 1;
        store.save_account(&account).await.unwrap();

        let mut tx = Transaction::new("u1", TransactionType::Deposit, dec!(50), "EGP", "card");
        store.insert_transaction(&tx).await.unwrap();

        account.balance = dec!(50.00);
        account.version = 2;
        tx.status = TransactionStatus::Completed;
        tx.version = 1;

        // Wrong account version: neither record changes.
        assert!(!store.commit_completion(&account, 5, &tx, 0).await.unwrap());
        let stored_tx = store.get_transaction(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored_tx.status, TransactionStatus::Pending);

        // Wrong transaction version: neither record changes.
        assert!(!store.commit_completion(&account, 1, &tx, 7).await.unwrap());
        let stored_account = store.get_account("u1").await.unwrap().unwrap();
        assert_eq!(stored_account.balance, dec!(0));

        assert!(store.commit_completion(&account, 1, &tx, 0).await.unwrap());
        let stored_tx = store.get_transaction(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored_tx.status, TransactionStatus::Completed);
        let stored_account = store.get_account("u1").await.unwrap().unwrap();
        assert_eq!(stored_account.balance, dec!(50.00));
    }

    #[tokio::test]
    async fn test_commit_refund_is_conditional_on_the_original() {
        let store = InMemoryWalletStore::new();
        let mut account = WalletAccount::new("u1", "EGP");
        account.balance = dec!(60.00);
        account.version = 3;
        store.save_account(&account).await.unwrap();

        let mut original =
            Transaction::new("u1", TransactionType::Payment, dec!(40), "EGP", "wallet");
        original.status = TransactionStatus::Completed;
        original.version = 1;
        store.insert_transaction(&original).await.unwrap();

        let mut credited = account.clone();
        credited.balance = dec!(100.00);
        credited.version = 4;
        let refund = Transaction::new("u1", TransactionType::Refund, dec!(40), "EGP", "wallet");
        let mut refunded = original.clone();
        refunded.status = TransactionStatus::Refunded;
        refunded.version = 2;

        assert!(store
            .commit_refund(&credited, 3, &refund, &refunded, 1)
            .await
            .unwrap());

        // A second refund still holding the pre-flip original loses, and
        // the balance is not credited again.
        let mut double_credited = credited.clone();
        double_credited.balance = dec!(140.00);
        double_credited.version = 5;
        let second = Transaction::new("u1", TransactionType::Refund, dec!(40), "EGP", "wallet");
        assert!(!store
            .commit_refund(&double_credited, 4, &second, &refunded, 1)
            .await
            .unwrap());
        let stored_account = store.get_account("u1").await.unwrap().unwrap();
        assert_eq!(stored_account.balance, dec!(100.00));
    }

    #[tokio::test]
    async fn test_list_transactions_newest_first() {
        let store = InMemoryWalletStore::new();
        let mut first = Transaction::new("u1", TransactionType::Deposit, dec!(1), "EGP", "card");
        first.created_at = 100;
        let mut second = Transaction::new("u1", TransactionType::Deposit, dec!(2), "EGP", "card");
        second.created_at = 200;
        let other = Transaction::new("u2", TransactionType::Deposit, dec!(3), "EGP", "card");
        store.insert_transaction(&first).await.unwrap();
        store.insert_transaction(&second).await.unwrap();
        store.insert_transaction(&other).await.unwrap();

        let list = store.list_transactions("u1").await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].id, first.id);
    }
}
