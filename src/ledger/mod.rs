//! Wallet accounts and the transaction ledger.
//!
//! Balances only ever move through [`TransactionLedger`]; the types here
//! enforce the one-directional transaction lifecycle it relies on.

mod account;
mod manager;
mod transaction;

pub use account::WalletAccount;
pub use manager::{ReferenceLookup, TransactionLedger, TransactionOptions};
pub use transaction::{
    Direction, Transaction, TransactionStatus, TransactionType,
};
