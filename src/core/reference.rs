//! Reference and account-number generation
//!
//! References are the idempotency keys of the ledger: every posting carries
//! one, and the ledger rejects duplicates with a hard constraint at insert
//! time. Identifiers generated here draw on UUID entropy rather than a
//! timestamp plus a small random suffix, which collides under concurrent
//! load; even so, generation is never trusted to be unique on its own. The
//! engine handles a store-level rejection by regenerating and retrying.

use uuid::Uuid;

use crate::core::traits::ReferenceSource;

/// Prefix for transaction reference numbers
pub const TRANSACTION_PREFIX: &str = "TXN";

/// Prefix for account numbers
pub const ACCOUNT_PREFIX: &str = "ACC";

/// Generate a globally unique account number
pub fn account_number() -> String {
    format!("{}-{}", ACCOUNT_PREFIX, Uuid::new_v4().simple())
}

/// Default reference generator backed by UUID v4 entropy
#[derive(Debug, Clone, Default)]
pub struct ReferenceGenerator;

impl ReferenceGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        ReferenceGenerator
    }
}

impl ReferenceSource for ReferenceGenerator {
    fn transaction_reference(&self) -> String {
        format!("{}-{}", TRANSACTION_PREFIX, Uuid::new_v4().simple())
    }
}
