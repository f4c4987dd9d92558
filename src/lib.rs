//! Ledger Engine Library
//! # Overview
//!
//! This library implements the transaction-posting core of a financial
//! ledger: accounts with mutable balances, an append-only transaction
//! ledger, and a posting engine that atomically validates, applies, and
//! records monetary movements under concurrent access.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Transaction, PostingRequest, etc.)
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Atomic posting orchestration
//!   - [`core::account_store`] - Account records and per-account locking
//!   - [`core::ledger`] - Append-only transaction log
//!   - [`core::reference`] - Reference-number generation
//!
//! # Guarantees
//!
//! - An account balance always equals the sum of its completed deposits
//!   minus its completed withdrawals, and never goes negative.
//! - Postings to one account are serialized by an exclusive lock in
//!   acquisition order; postings to different accounts run in parallel.
//! - The ledger append and the balance write of one posting commit as a
//!   single unit of work, or neither is observable.
//! - Reference numbers are unique system-wide; resubmitting one is
//!   rejected, never reapplied.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use rust_ledger_engine::{
//!     AccountStore, Currency, PostingEngine, PostingRequest, TransactionKind,
//!     TransactionLedger,
//! };
//!
//! let accounts = Arc::new(AccountStore::new());
//! let ledger = Arc::new(TransactionLedger::new());
//! let engine = PostingEngine::new(Arc::clone(&accounts), Arc::clone(&ledger));
//!
//! let owner = uuid::Uuid::new_v4();
//! let account = accounts.open(owner, Currency::usd());
//!
//! let posted = engine
//!     .post(PostingRequest {
//!         account: account.id,
//!         caller: owner,
//!         kind: TransactionKind::Deposit,
//!         amount: Decimal::new(10000, 2),
//!         currency: Currency::usd(),
//!         description: Some("opening deposit".to_string()),
//!         reference: None,
//!     })
//!     .unwrap();
//!
//! assert_eq!(posted.new_balance, Decimal::new(10000, 2));
//! ```

// Module declarations
pub mod core;
pub mod types;

pub use self::core::traits::{Accounts, ReferenceSource, TransactionLog};
pub use self::core::{
    AccountLock, AccountStore, PostingConfig, PostingEngine, ReferenceGenerator, TransactionLedger,
};
pub use types::{
    Account, AccountId, AccountStatus, Currency, LedgerError, PostedTransaction, PostingRequest,
    Transaction, TransactionId, TransactionKind, TransactionStatus, UserId,
};
