//! Error types for the ledger engine
//!
//! This module defines every error a posting or account operation can
//! surface. Each variant carries enough context to map it to a distinct
//! caller-facing response.
//!
//! # Retry semantics
//!
//! Only `LockTimeout` and `StorageUnavailable` are safe to retry
//! automatically. Every other variant is terminal for that request: the
//! caller must not resubmit it unmodified, and in the `DuplicatePosting`
//! case must not expect a different outcome from the same reference.

use rust_decimal::Decimal;
use thiserror::Error;

use super::account::{AccountId, AccountStatus, Currency, UserId};
use super::transaction::TransactionId;

/// Main error type for the ledger engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The target account does not exist
    #[error("Account {account} not found")]
    AccountNotFound {
        /// The account that was requested
        account: AccountId,
    },

    /// The caller does not own the target account
    ///
    /// Ownership is re-checked inside the engine: a balance mutation must
    /// never be attributable to a caller that does not own the account,
    /// regardless of what the API layer already verified.
    #[error("Caller {caller} does not own account {account}")]
    Forbidden {
        /// The account that was targeted
        account: AccountId,
        /// The caller that was rejected
        caller: UserId,
    },

    /// The account is suspended or closed
    #[error("Account {account} is {status}")]
    AccountNotActive {
        /// The account that was targeted
        account: AccountId,
        /// Its current status
        status: AccountStatus,
    },

    /// The posting amount is zero or negative
    #[error("Invalid posting amount {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// The request currency does not match the account currency
    #[error("Currency {requested} does not match account currency {expected}")]
    CurrencyMismatch {
        /// The account's currency
        expected: Currency,
        /// The currency carried by the request
        requested: Currency,
    },

    /// A withdrawal would take the balance below zero
    #[error(
        "Insufficient balance for account {account}: balance {balance}, requested {requested}"
    )]
    InsufficientBalance {
        /// The account that was targeted
        account: AccountId,
        /// Balance at the time of the attempt
        balance: Decimal,
        /// Requested withdrawal amount
        requested: Decimal,
    },

    /// The reference number has already been posted
    ///
    /// Idempotent rejection: exactly one entry exists for the reference and
    /// resubmitting it will keep producing this error.
    #[error("Duplicate posting for reference {reference}")]
    DuplicatePosting {
        /// The conflicting reference number
        reference: String,
    },

    /// A caller-supplied reference is empty or too long
    #[error("Invalid reference number '{reference}'")]
    InvalidReference {
        /// The rejected reference
        reference: String,
    },

    /// A currency code failed validation
    #[error("Invalid currency code '{code}'")]
    InvalidCurrency {
        /// The rejected code
        code: String,
    },

    /// Checked decimal arithmetic overflowed
    #[error("Arithmetic overflow in {operation} for account {account}")]
    BalanceOverflow {
        /// Operation that would overflow
        operation: String,
        /// The account that was targeted
        account: AccountId,
    },

    /// The account still holds funds and cannot be closed or removed
    #[error("Account {account} still has balance {balance}")]
    AccountNotEmpty {
        /// The account that was targeted
        account: AccountId,
        /// Its remaining balance
        balance: Decimal,
    },

    /// The requested status change is not allowed
    #[error("Cannot change account {account} from {from} to {to}")]
    InvalidStatusTransition {
        /// The account that was targeted
        account: AccountId,
        /// Current status
        from: AccountStatus,
        /// Requested status
        to: AccountStatus,
    },

    /// A ledger entry lookup failed
    #[error("Transaction {transaction} not found")]
    TransactionNotFound {
        /// The entry that was requested
        transaction: TransactionId,
    },

    /// The exclusive account lock could not be acquired within the bound
    ///
    /// Retryable: the request had no effect.
    #[error("Timed out after {waited_ms}ms waiting for lock on account {account}")]
    LockTimeout {
        /// The account whose lock was contended
        account: AccountId,
        /// How long the caller waited
        waited_ms: u128,
    },

    /// The backing store failed mid-operation
    ///
    /// Retryable with a fresh request: the unit of work was rolled back and
    /// nothing was committed.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of the storage failure
        message: String,
    },
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create an AccountNotFound error
    pub fn account_not_found(account: AccountId) -> Self {
        LedgerError::AccountNotFound { account }
    }

    /// Create a Forbidden error
    pub fn forbidden(account: AccountId, caller: UserId) -> Self {
        LedgerError::Forbidden { account, caller }
    }

    /// Create an AccountNotActive error
    pub fn account_not_active(account: AccountId, status: AccountStatus) -> Self {
        LedgerError::AccountNotActive { account, status }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal) -> Self {
        LedgerError::InvalidAmount { amount }
    }

    /// Create a CurrencyMismatch error
    pub fn currency_mismatch(expected: Currency, requested: Currency) -> Self {
        LedgerError::CurrencyMismatch {
            expected,
            requested,
        }
    }

    /// Create an InsufficientBalance error
    pub fn insufficient_balance(account: AccountId, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientBalance {
            account,
            balance,
            requested,
        }
    }

    /// Create a DuplicatePosting error
    pub fn duplicate_posting(reference: &str) -> Self {
        LedgerError::DuplicatePosting {
            reference: reference.to_string(),
        }
    }

    /// Create an InvalidReference error
    pub fn invalid_reference(reference: &str) -> Self {
        LedgerError::InvalidReference {
            reference: reference.to_string(),
        }
    }

    /// Create an InvalidCurrency error
    pub fn invalid_currency(code: &str) -> Self {
        LedgerError::InvalidCurrency {
            code: code.to_string(),
        }
    }

    /// Create a BalanceOverflow error
    pub fn balance_overflow(operation: &str, account: AccountId) -> Self {
        LedgerError::BalanceOverflow {
            operation: operation.to_string(),
            account,
        }
    }

    /// Create an AccountNotEmpty error
    pub fn account_not_empty(account: AccountId, balance: Decimal) -> Self {
        LedgerError::AccountNotEmpty { account, balance }
    }

    /// Create an InvalidStatusTransition error
    pub fn invalid_status_transition(
        account: AccountId,
        from: AccountStatus,
        to: AccountStatus,
    ) -> Self {
        LedgerError::InvalidStatusTransition { account, from, to }
    }

    /// Create a TransactionNotFound error
    pub fn transaction_not_found(transaction: TransactionId) -> Self {
        LedgerError::TransactionNotFound { transaction }
    }

    /// Create a LockTimeout error from the configured wait bound
    pub fn lock_timeout(account: AccountId, waited: std::time::Duration) -> Self {
        LedgerError::LockTimeout {
            account,
            waited_ms: waited.as_millis(),
        }
    }

    /// Create a StorageUnavailable error
    pub fn storage_unavailable(message: &str) -> Self {
        LedgerError::StorageUnavailable {
            message: message.to_string(),
        }
    }

    /// Whether the caller may safely retry the request
    ///
    /// True only for lock timeouts and storage failures; both leave no
    /// partial state behind. Everything else is a terminal rejection of
    /// that specific request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::LockTimeout { .. } | LedgerError::StorageUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    fn id(byte: u8) -> Uuid {
        Uuid::from_bytes([byte; 16])
    }

    #[rstest]
    #[case::account_not_found(
        LedgerError::account_not_found(id(0x11)),
        "Account 11111111-1111-1111-1111-111111111111 not found"
    )]
    #[case::forbidden(
        LedgerError::forbidden(id(0x11), id(0x22)),
        "Caller 22222222-2222-2222-2222-222222222222 does not own account 11111111-1111-1111-1111-111111111111"
    )]
    #[case::not_active(
        LedgerError::account_not_active(id(0x11), AccountStatus::Suspended),
        "Account 11111111-1111-1111-1111-111111111111 is suspended"
    )]
    #[case::invalid_amount(
        LedgerError::invalid_amount(Decimal::new(-100, 2)),
        "Invalid posting amount -1.00"
    )]
    #[case::currency_mismatch(
        LedgerError::currency_mismatch(Currency::usd(), Currency::new("EUR").unwrap()),
        "Currency EUR does not match account currency USD"
    )]
    #[case::insufficient_balance(
        LedgerError::insufficient_balance(id(0x11), Decimal::new(5000, 2), Decimal::new(10000, 2)),
        "Insufficient balance for account 11111111-1111-1111-1111-111111111111: balance 50.00, requested 100.00"
    )]
    #[case::duplicate_posting(
        LedgerError::duplicate_posting("TXN-abc"),
        "Duplicate posting for reference TXN-abc"
    )]
    #[case::storage_unavailable(
        LedgerError::storage_unavailable("connection reset"),
        "Storage unavailable: connection reset"
    )]
    fn error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn lock_timeout_reports_wait_in_millis() {
        let error = LedgerError::lock_timeout(id(0x11), std::time::Duration::from_millis(250));
        assert_eq!(
            error.to_string(),
            "Timed out after 250ms waiting for lock on account 11111111-1111-1111-1111-111111111111"
        );
    }

    #[rstest]
    #[case::lock_timeout(LedgerError::lock_timeout(id(0x11), std::time::Duration::from_secs(5)), true)]
    #[case::storage(LedgerError::storage_unavailable("down"), true)]
    #[case::duplicate(LedgerError::duplicate_posting("TXN-abc"), false)]
    #[case::insufficient(
        LedgerError::insufficient_balance(id(0x11), Decimal::ZERO, Decimal::ONE),
        false
    )]
    #[case::forbidden(LedgerError::forbidden(id(0x11), id(0x22)), false)]
    #[case::not_found(LedgerError::account_not_found(id(0x11)), false)]
    fn retryable_classification(#[case] error: LedgerError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }
}
