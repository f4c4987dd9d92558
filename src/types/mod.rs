//! Types module
//!
//! Contains the data structures used throughout the crate:
//! - `account`: Account record, lifecycle status, currency
//! - `transaction`: Ledger entries, posting requests, receipts
//! - `error`: Error taxonomy for posting and account operations

pub mod account;
pub mod error;
pub mod transaction;

pub use account::{Account, AccountId, AccountStatus, Currency, UserId};
pub use error::LedgerError;
pub use transaction::{
    PostedTransaction, PostingRequest, Transaction, TransactionId, TransactionKind,
    TransactionStatus, MAX_REFERENCE_LEN,
};
