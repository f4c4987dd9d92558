//! Transaction-related types for the ledger engine
//!
//! This module defines the ledger entry record, the strongly typed posting
//! request submitted by the caller layer, and the receipt returned by a
//! successful posting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{AccountId, Currency, UserId};

/// Transaction identifier
pub type TransactionId = Uuid;

/// Longest reference number the ledger accepts
///
/// Matches the width of the reference column in the backing schema.
pub const MAX_REFERENCE_LEN: usize = 100;

/// Kinds of monetary movement the engine can post
///
/// Deposits add to the account balance, withdrawals subtract from it. A
/// withdrawal that would take the balance below zero is rejected outright;
/// there is no overdraft and no partial application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Credit funds to an account
    Deposit,
    /// Debit funds from an account; requires sufficient balance
    Withdrawal,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        };
        f.write_str(label)
    }
}

/// Processing status of a ledger entry
///
/// Posting is synchronous, so the engine only ever records completed
/// entries. The pending and failed states exist for wire compatibility with
/// callers that persist entries through an asynchronous pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// An immutable ledger entry
///
/// Once an entry has been committed it is never edited or deleted; the
/// ledger is append-only. The reference number is unique system-wide and is
/// the idempotency key that prevents the same logical movement from being
/// posted twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque unique identifier
    pub id: TransactionId,

    /// The account this entry was posted against
    pub account: AccountId,

    /// Deposit or withdrawal
    pub kind: TransactionKind,

    /// Movement amount; strictly positive
    pub amount: Decimal,

    /// Currency of the movement; always equals the account currency
    pub currency: Currency,

    /// Optional free-text description supplied by the caller
    pub description: Option<String>,

    /// Globally unique reference number (`TXN-` prefixed when generated)
    pub reference: String,

    /// Processing status; completed for every entry this engine writes
    pub status: TransactionStatus,

    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// When the movement was applied to the balance
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Build a completed entry ready for the ledger append
    ///
    /// Creation and processing share one timestamp because posting applies
    /// the movement in the same unit of work that records it.
    pub fn completed(
        account: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        currency: Currency,
        description: Option<String>,
        reference: String,
    ) -> Self {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            account,
            kind,
            amount,
            currency,
            description,
            reference,
            status: TransactionStatus::Completed,
            created_at: now,
            processed_at: Some(now),
        }
    }
}

/// A validated posting request
///
/// Constructed by the caller layer after authentication and request-shape
/// validation. The engine still re-checks ownership, account status, amount,
/// and currency as its own correctness boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingRequest {
    /// Target account
    pub account: AccountId,

    /// The authenticated user making the request
    pub caller: UserId,

    /// Deposit or withdrawal
    pub kind: TransactionKind,

    /// Movement amount; must be strictly positive
    pub amount: Decimal,

    /// Currency of the movement; must match the account
    pub currency: Currency,

    /// Optional free-text description
    pub description: Option<String>,

    /// Caller-supplied idempotency reference; generated when absent
    pub reference: Option<String>,
}

/// Receipt for a committed posting
///
/// Carries the persisted entry together with the balance after the
/// movement. Either the whole posting succeeded and both fields reflect the
/// committed state, or the caller got an error and nothing changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedTransaction {
    /// The committed ledger entry
    pub transaction: Transaction,

    /// Account balance after the movement was applied
    pub new_balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_entry_is_stamped_and_completed() {
        let account = Uuid::new_v4();
        let entry = Transaction::completed(
            account,
            TransactionKind::Deposit,
            Decimal::new(10000, 2),
            Currency::usd(),
            Some("payroll".to_string()),
            "TXN-test".to_string(),
        );

        assert_eq!(entry.account, account);
        assert_eq!(entry.status, TransactionStatus::Completed);
        assert_eq!(entry.processed_at, Some(entry.created_at));
        assert_eq!(entry.reference, "TXN-test");
    }

    #[test]
    fn kind_displays_lowercase() {
        assert_eq!(TransactionKind::Deposit.to_string(), "deposit");
        assert_eq!(TransactionKind::Withdrawal.to_string(), "withdrawal");
    }
}
