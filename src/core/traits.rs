//! Core traits for account storage, the transaction log, and reference
//! generation
//!
//! The posting engine depends on these seams instead of concrete stores so
//! that it can be exercised in isolation: tests wrap the in-memory stores
//! with doubles that inject storage failures or reference collisions, while
//! production wiring passes the real `AccountStore` and `TransactionLedger`
//! handles explicitly. There is no process-wide store state anywhere in the
//! crate.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::core::account_store::AccountLock;
use crate::types::{Account, AccountId, LedgerError, Transaction, TransactionId};

/// Keyed account storage with an exclusive per-account locking primitive
///
/// No business validation lives behind this trait; it is a record store.
/// The engine performs every ownership, status, amount, and balance check
/// itself while holding the lock.
pub trait Accounts: Send + Sync {
    /// Fetch a snapshot of an account
    fn get(&self, account: AccountId) -> Result<Account, LedgerError>;

    /// Acquire the exclusive lock on an account row
    ///
    /// Blocks other lockers of the same account until the returned handle
    /// is dropped; lockers of other accounts are unaffected. The wait is
    /// bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// * `AccountNotFound` if the account does not exist
    /// * `LockTimeout` if the lock was not acquired within the bound
    fn lock_for_update(
        &self,
        account: AccountId,
        timeout: Duration,
    ) -> Result<AccountLock, LedgerError>;

    /// Write the balance through a held lock
    ///
    /// This is the storage write of the posting unit of work, so it is
    /// fallible: a store that loses its backing connection mid-commit
    /// surfaces `StorageUnavailable` here and the engine rolls the unit of
    /// work back.
    fn set_balance(&self, lock: &mut AccountLock, balance: Decimal) -> Result<(), LedgerError>;
}

/// Append-only transaction log with reference-number uniqueness
pub trait TransactionLog: Send + Sync {
    /// Append an entry, enforcing reference uniqueness at insert time
    ///
    /// # Errors
    ///
    /// * `DuplicatePosting` if the reference is already recorded
    /// * `StorageUnavailable` if the store failed mid-append
    fn append(&self, entry: Transaction) -> Result<Transaction, LedgerError>;

    /// Roll back an append whose unit of work did not commit
    ///
    /// Removes the entry and releases its reference reservation. Only ever
    /// called by the unit of work that appended the entry, before it
    /// commits; committed entries are immutable.
    fn retract(&self, id: TransactionId);

    /// Look up an entry by id
    fn get(&self, id: TransactionId) -> Option<Transaction>;

    /// List an account's entries, newest first, up to `limit`
    fn list_by_account(&self, account: AccountId, limit: usize) -> Vec<Transaction>;
}

/// Source of transaction reference numbers
///
/// Generation must be collision-resistant, but uniqueness is still enforced
/// by the log's insert-time constraint; the engine regenerates and retries
/// when a generated reference collides.
pub trait ReferenceSource: Send + Sync {
    /// Produce a candidate reference number for a new posting
    fn transaction_reference(&self) -> String;
}
