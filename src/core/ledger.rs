//! Append-only transaction ledger
//!
//! This module provides the `TransactionLedger`, the store of record for
//! committed postings. Entries are immutable once their unit of work has
//! committed; the ledger only ever grows.
//!
//! # Reference uniqueness
//!
//! The reference number is enforced unique at insert time through the map's
//! entry API, never by a separate lookup before the insert. Two concurrent
//! appends with the same reference therefore cannot both succeed: the first
//! one reserves the reference and the second one gets `DuplicatePosting`,
//! with no window between a check and an insert.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::core::traits::TransactionLog;
use crate::types::{AccountId, LedgerError, Transaction, TransactionId};

/// In-memory append-only ledger of committed postings
///
/// Entries are indexed by id, by reference (the uniqueness constraint), and
/// per account in append order. Appends to the same account arrive under
/// that account's posting lock, so the per-account index order equals the
/// order in which lock acquisition succeeded.
#[derive(Debug, Default)]
pub struct TransactionLedger {
    /// Entries by id
    entries: DashMap<TransactionId, Transaction>,

    /// Reference-number uniqueness index
    references: DashMap<String, TransactionId>,

    /// Per-account entry ids in append order
    by_account: DashMap<AccountId, Vec<TransactionId>>,
}

impl TransactionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        TransactionLedger {
            entries: DashMap::new(),
            references: DashMap::new(),
            by_account: DashMap::new(),
        }
    }

    /// Append an entry
    ///
    /// Atomically reserves the entry's reference number; a reference that
    /// is already recorded rejects the whole append. The returned value is
    /// the persisted entry.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePosting` if the reference number has already been
    /// posted.
    pub fn append(&self, entry: Transaction) -> Result<Transaction, LedgerError> {
        match self.references.entry(entry.reference.clone()) {
            Entry::Occupied(_) => {
                return Err(LedgerError::duplicate_posting(&entry.reference));
            }
            Entry::Vacant(slot) => {
                slot.insert(entry.id);
            }
        }

        self.entries.insert(entry.id, entry.clone());
        self.by_account
            .entry(entry.account)
            .or_default()
            .push(entry.id);

        Ok(entry)
    }

    /// Roll back an uncommitted append
    ///
    /// Removes the entry and releases its reference reservation so the
    /// reference may be reused by a retry. Called only by the unit of work
    /// that appended the entry, while it still holds the account lock;
    /// committed entries are never retracted.
    pub fn retract(&self, id: TransactionId) {
        if let Some((_, entry)) = self.entries.remove(&id) {
            self.references.remove(&entry.reference);
            if let Some(mut ids) = self.by_account.get_mut(&entry.account) {
                ids.retain(|entry_id| *entry_id != id);
            }
        }
    }

    /// Look up an entry by id
    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// List an account's entries, newest first
    ///
    /// Returns at most `limit` entries. Unknown accounts yield an empty
    /// list.
    pub fn list_by_account(&self, account: AccountId, limit: usize) -> Vec<Transaction> {
        let Some(ids) = self.by_account.get(&account) else {
            return Vec::new();
        };
        ids.iter()
            .rev()
            .take(limit)
            .filter_map(|id| self.entries.get(id).map(|entry| entry.value().clone()))
            .collect()
    }

    /// Whether a reference number has been posted
    pub fn contains_reference(&self, reference: &str) -> bool {
        self.references.contains_key(reference)
    }

    /// Number of entries in the ledger
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TransactionLog for TransactionLedger {
    fn append(&self, entry: Transaction) -> Result<Transaction, LedgerError> {
        TransactionLedger::append(self, entry)
    }

    fn retract(&self, id: TransactionId) {
        TransactionLedger::retract(self, id)
    }

    fn get(&self, id: TransactionId) -> Option<Transaction> {
        TransactionLedger::get(self, id)
    }

    fn list_by_account(&self, account: AccountId, limit: usize) -> Vec<Transaction> {
        TransactionLedger::list_by_account(self, account, limit)
    }
}
