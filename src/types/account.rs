//! Account-related types for the ledger engine
//!
//! This module defines the Account record, its lifecycle status, and the
//! validated currency code carried by accounts and ledger entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::LedgerError;

/// Account identifier
pub type AccountId = Uuid;

/// Identifier of the user that owns an account
pub type UserId = Uuid;

/// ISO 4217 alpha-3 currency code
///
/// Validated on construction: exactly three ASCII letters, normalized to
/// upper case. Conversion between currencies is out of scope; the code is
/// only compared for equality when a posting is validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Parse and normalize a currency code
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidCurrency` if the code is not exactly
    /// three ASCII letters.
    pub fn new(code: &str) -> Result<Self, LedgerError> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(LedgerError::invalid_currency(code));
        }
        Ok(Currency(trimmed.to_ascii_uppercase()))
    }

    /// The default currency of the system
    pub fn usd() -> Self {
        Currency("USD".to_string())
    }

    /// The normalized three-letter code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account lifecycle status
///
/// Only active accounts accept postings. Transitions are caller-controlled:
/// active and suspended may swap freely, closing requires a zero balance,
/// and a closed account never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Account accepts deposits and withdrawals
    Active,
    /// Postings are rejected until the account is reactivated
    Suspended,
    /// Terminal state; the account held a zero balance when it was closed
    Closed,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// A single account record
///
/// The balance is a fixed-point decimal and is mutated exclusively by the
/// posting engine while it holds the account's exclusive lock. At every
/// commit point the balance equals the sum of completed deposits minus the
/// sum of completed withdrawals posted against the account, and it is never
/// negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Opaque unique identifier
    pub id: AccountId,

    /// The user that owns this account
    pub owner: UserId,

    /// Stable, globally unique account number (`ACC-` prefixed)
    pub number: String,

    /// Currency all postings against this account must carry
    pub currency: Currency,

    /// Lifecycle status
    pub status: AccountStatus,

    /// Current balance; never negative
    pub balance: Decimal,

    /// When the account was opened
    pub created_at: DateTime<Utc>,

    /// Refreshed on every balance or status change
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a freshly opened account with a zero balance and active status
    pub fn open(id: AccountId, owner: UserId, number: String, currency: Currency) -> Self {
        let now = Utc::now();
        Account {
            id,
            owner,
            number,
            currency,
            status: AccountStatus::Active,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}
