//! Core business logic module
//!
//! This module contains the posting subsystem:
//! - `traits` - Store seams the engine depends on
//! - `engine` - Atomic posting orchestration
//! - `account_store` - Account records and the per-account lock
//! - `ledger` - Append-only transaction log with reference uniqueness
//! - `reference` - Reference and account-number generation

pub mod account_store;
pub mod engine;
pub mod ledger;
pub mod reference;
pub mod traits;

pub use account_store::{AccountLock, AccountStore};
pub use engine::{PostingConfig, PostingEngine};
pub use ledger::TransactionLedger;
pub use reference::ReferenceGenerator;
