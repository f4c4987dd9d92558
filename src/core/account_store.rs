//! Account storage and the per-account locking primitive
//!
//! This module provides the `AccountStore`, a concurrent keyed store of
//! account records. Each record sits behind its own mutex so that posting
//! to one account never blocks posting to another, while two postings to
//! the same account are fully serialized in lock-acquisition order.
//!
//! The store itself performs no posting validation. It offers snapshots,
//! the exclusive `lock_for_update` handle, the balance write used by the
//! posting unit of work, and the account lifecycle operations (open,
//! status changes, removal).

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use rust_decimal::Decimal;

use crate::core::reference::account_number;
use crate::core::traits::Accounts;
use crate::types::{Account, AccountId, AccountStatus, Currency, LedgerError, UserId};

type AccountCell = Arc<Mutex<Account>>;

/// Exclusive handle on a single account row
///
/// Holding the lock serializes every other locker of the same account.
/// The lock is released when the handle is dropped, on every exit path.
/// Reads go through `Deref`; writes only happen through
/// `AccountStore::set_balance` so the update stays part of a unit of work.
pub struct AccountLock {
    guard: ArcMutexGuard<RawMutex, Account>,
}

impl Deref for AccountLock {
    type Target = Account;

    fn deref(&self) -> &Account {
        &self.guard
    }
}

impl std::fmt::Debug for AccountLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountLock")
            .field("account", &self.guard.id)
            .finish()
    }
}

/// Concurrent store of account records
///
/// Accounts live in a `DashMap` keyed by id, each behind its own
/// `parking_lot::Mutex`. The map shard locks are only held for the moment
/// it takes to clone the `Arc` out, so lockers waiting on one account never
/// stall operations on any other.
#[derive(Debug, Default)]
pub struct AccountStore {
    /// Account records by id
    accounts: DashMap<AccountId, AccountCell>,

    /// Account-number uniqueness index
    numbers: DashMap<String, AccountId>,
}

impl AccountStore {
    /// Create an empty store
    pub fn new() -> Self {
        AccountStore {
            accounts: DashMap::new(),
            numbers: DashMap::new(),
        }
    }

    /// Open a new account for `owner`
    ///
    /// The account starts active with a zero balance and a generated,
    /// globally unique account number.
    pub fn open(&self, owner: UserId, currency: Currency) -> Account {
        let id = uuid::Uuid::new_v4();
        let number = loop {
            let candidate = account_number();
            match self.numbers.entry(candidate.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(id);
                    break candidate;
                }
            }
        };

        let account = Account::open(id, owner, number, currency);
        self.accounts.insert(id, Arc::new(Mutex::new(account.clone())));

        tracing::info!(account = %id, owner = %owner, number = %account.number, "account opened");
        account
    }

    /// Fetch a snapshot of an account
    ///
    /// Waits for any in-flight balance write on the row, so the snapshot
    /// always reflects a commit point.
    pub fn get(&self, account: AccountId) -> Result<Account, LedgerError> {
        let cell = self.cell(account)?;
        let snapshot = cell.lock().clone();
        Ok(snapshot)
    }

    /// Fetch a snapshot by account number
    pub fn get_by_number(&self, number: &str) -> Option<Account> {
        let id = self.numbers.get(number).map(|entry| *entry.value())?;
        self.get(id).ok()
    }

    /// Acquire the exclusive lock on an account row with a bounded wait
    ///
    /// # Errors
    ///
    /// * `AccountNotFound` if the account does not exist
    /// * `LockTimeout` if another locker held the row past `timeout`
    pub fn lock_for_update(
        &self,
        account: AccountId,
        timeout: Duration,
    ) -> Result<AccountLock, LedgerError> {
        let cell = self.cell(account)?;
        let guard = cell
            .try_lock_arc_for(timeout)
            .ok_or_else(|| LedgerError::lock_timeout(account, timeout))?;
        Ok(AccountLock { guard })
    }

    /// Write the balance through a held lock
    ///
    /// Valid only while the caller holds the lock handle for the same
    /// logical unit of work. Refreshes `updated_at`.
    pub fn set_balance(
        &self,
        lock: &mut AccountLock,
        balance: Decimal,
    ) -> Result<(), LedgerError> {
        lock.guard.balance = balance;
        lock.guard.updated_at = Utc::now();
        Ok(())
    }

    /// Change an account's lifecycle status
    ///
    /// Active and suspended may swap freely; closing requires a zero
    /// balance; a closed account never transitions again. Same-status
    /// calls on an open account are accepted as no-ops.
    ///
    /// # Errors
    ///
    /// * `AccountNotFound` if the account does not exist
    /// * `Forbidden` if `caller` does not own the account
    /// * `InvalidStatusTransition` when transitioning out of closed
    /// * `AccountNotEmpty` when closing with a non-zero balance
    pub fn update_status(
        &self,
        account: AccountId,
        caller: UserId,
        status: AccountStatus,
    ) -> Result<Account, LedgerError> {
        let cell = self.cell(account)?;
        let mut record = cell.lock();

        if record.owner != caller {
            return Err(LedgerError::forbidden(account, caller));
        }
        if record.status == AccountStatus::Closed {
            return Err(LedgerError::invalid_status_transition(
                account,
                record.status,
                status,
            ));
        }
        if status == AccountStatus::Closed && record.balance != Decimal::ZERO {
            return Err(LedgerError::account_not_empty(account, record.balance));
        }

        record.status = status;
        record.updated_at = Utc::now();

        tracing::info!(account = %account, status = %status, "account status changed");
        Ok(record.clone())
    }

    /// Remove an account record
    ///
    /// Only the owner may remove an account, and only with a zero balance.
    /// The record is flipped to closed before it leaves the map so a locker
    /// that raced this call observes a non-active account instead of
    /// posting against a deleted row. Cascading removal of the account's
    /// ledger entries is the caller layer's concern.
    pub fn remove(&self, account: AccountId, caller: UserId) -> Result<(), LedgerError> {
        let cell = self.cell(account)?;
        let mut record = cell.lock();

        if record.owner != caller {
            return Err(LedgerError::forbidden(account, caller));
        }
        if record.balance != Decimal::ZERO {
            return Err(LedgerError::account_not_empty(account, record.balance));
        }

        record.status = AccountStatus::Closed;
        self.numbers.remove(&record.number);
        self.accounts.remove(&account);

        tracing::info!(account = %account, "account removed");
        Ok(())
    }

    /// Snapshots of all accounts owned by `owner`
    ///
    /// The cells are cloned out of the map before any row is locked so the
    /// iteration never holds a map shard while waiting on a row mutex.
    pub fn list_for_owner(&self, owner: UserId) -> Vec<Account> {
        let cells: Vec<AccountCell> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        cells
            .into_iter()
            .map(|cell| cell.lock().clone())
            .filter(|account| account.owner == owner)
            .collect()
    }

    /// Number of accounts in the store
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the store holds no accounts
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn cell(&self, account: AccountId) -> Result<AccountCell, LedgerError> {
        self.accounts
            .get(&account)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::account_not_found(account))
    }
}

impl Accounts for AccountStore {
    fn get(&self, account: AccountId) -> Result<Account, LedgerError> {
        AccountStore::get(self, account)
    }

    fn lock_for_update(
        &self,
        account: AccountId,
        timeout: Duration,
    ) -> Result<AccountLock, LedgerError> {
        AccountStore::lock_for_update(self, account, timeout)
    }

    fn set_balance(&self, lock: &mut AccountLock, balance: Decimal) -> Result<(), LedgerError> {
        AccountStore::set_balance(self, lock, balance)
    }
}
