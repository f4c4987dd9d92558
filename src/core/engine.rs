//! Posting engine
//!
//! This module provides the `PostingEngine`, the only writer of account
//! balances. A posting validates the requested movement, applies it to the
//! balance, and records the ledger entry as one atomic unit: either both
//! writes commit or neither is observable afterwards.
//!
//! # Unit of work
//!
//! Every posting runs inside a scoped `UnitOfWork` that owns the exclusive
//! account lock and tracks the ledger append. Dropping the unit of work
//! without committing retracts the append and releases the lock, so
//! rollback runs on every exit path: validation failure, storage failure,
//! and panic alike. A caller that cancels mid-posting therefore never
//! leaves a half-applied state behind.
//!
//! # Ordering
//!
//! Postings to one account are serialized by the account lock; the
//! effective order of balance mutations is the order in which lock
//! acquisition succeeded. Postings to different accounts do not contend.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::core::account_store::{AccountLock, AccountStore};
use crate::core::ledger::TransactionLedger;
use crate::core::reference::ReferenceGenerator;
use crate::core::traits::{Accounts, ReferenceSource, TransactionLog};
use crate::types::{
    AccountId, AccountStatus, LedgerError, PostedTransaction, PostingRequest, Transaction,
    TransactionId, TransactionKind, UserId, MAX_REFERENCE_LEN,
};

/// Tunables for the posting path
#[derive(Debug, Clone)]
pub struct PostingConfig {
    /// Bounded wait for the exclusive account lock
    pub lock_timeout: Duration,

    /// How many generated references to try before surfacing a conflict
    ///
    /// Applies only to system-generated references; a caller-supplied
    /// reference that conflicts is rejected immediately and never retried.
    pub reference_attempts: u32,
}

impl Default for PostingConfig {
    fn default() -> Self {
        PostingConfig {
            lock_timeout: Duration::from_secs(5),
            reference_attempts: 3,
        }
    }
}

/// Scoped unit of work for one posting
///
/// Owns the account lock for its whole lifetime and remembers the ledger
/// append so that dropping without `commit` rolls it back. The lock is
/// released when the unit of work drops, after any rollback.
struct UnitOfWork<'a> {
    ledger: &'a dyn TransactionLog,
    lock: AccountLock,
    appended: Option<TransactionId>,
}

impl<'a> UnitOfWork<'a> {
    fn begin(ledger: &'a dyn TransactionLog, lock: AccountLock) -> Self {
        UnitOfWork {
            ledger,
            lock,
            appended: None,
        }
    }

    /// Mark the unit of work committed; the append is now permanent
    fn commit(mut self) {
        self.appended = None;
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.appended.take() {
            self.ledger.retract(id);
        }
    }
}

/// Orchestrates atomic postings against accounts and the ledger
///
/// The engine re-validates ownership, account status, amount, and currency
/// on every call even though the caller layer has already checked the
/// request shape: a balance mutation must never be attributable to an
/// unauthorized caller. Store handles are injected explicitly, which keeps
/// the engine testable against wrapped stores.
pub struct PostingEngine {
    accounts: Arc<dyn Accounts>,
    ledger: Arc<dyn TransactionLog>,
    references: Arc<dyn ReferenceSource>,
    config: PostingConfig,
}

impl PostingEngine {
    /// Create an engine over the default in-memory stores
    pub fn new(accounts: Arc<AccountStore>, ledger: Arc<TransactionLedger>) -> Self {
        Self::with_parts(
            accounts,
            ledger,
            Arc::new(ReferenceGenerator::new()),
            PostingConfig::default(),
        )
    }

    /// Create an engine from explicit parts
    ///
    /// Used by tests to wrap the stores with fault-injecting doubles or to
    /// pin the reference source and the lock timeout.
    pub fn with_parts(
        accounts: Arc<dyn Accounts>,
        ledger: Arc<dyn TransactionLog>,
        references: Arc<dyn ReferenceSource>,
        config: PostingConfig,
    ) -> Self {
        PostingEngine {
            accounts,
            ledger,
            references,
            config,
        }
    }

    /// Post a monetary movement against an account
    ///
    /// Runs the full posting algorithm as one atomic unit: acquire the
    /// account lock (bounded wait), authorize the caller, validate status,
    /// amount, and currency, compute the new balance, append the completed
    /// ledger entry, and write the balance. On any failure the unit of
    /// work rolls back and the account is untouched.
    ///
    /// Emits one structured event per attempt, success or failure.
    ///
    /// # Errors
    ///
    /// * `AccountNotFound` if the account does not exist
    /// * `LockTimeout` if the account lock stayed contended past the bound
    /// * `Forbidden` if the caller does not own the account
    /// * `AccountNotActive` if the account is suspended or closed
    /// * `InvalidAmount` if the amount is zero or negative
    /// * `CurrencyMismatch` if the request currency differs from the account
    /// * `InsufficientBalance` if a withdrawal would overdraw the account
    /// * `InvalidReference` if a caller-supplied reference is malformed
    /// * `DuplicatePosting` if the reference was already posted
    /// * `StorageUnavailable` if the store failed mid-commit
    pub fn post(&self, request: PostingRequest) -> Result<PostedTransaction, LedgerError> {
        let account = request.account;
        match self.execute(request) {
            Ok(posted) => {
                tracing::info!(
                    account = %account,
                    transaction = %posted.transaction.id,
                    reference = %posted.transaction.reference,
                    kind = %posted.transaction.kind,
                    amount = %posted.transaction.amount,
                    balance = %posted.new_balance,
                    "posting committed"
                );
                Ok(posted)
            }
            Err(error) => {
                tracing::warn!(
                    account = %account,
                    error = %error,
                    retryable = error.is_retryable(),
                    "posting rejected"
                );
                Err(error)
            }
        }
    }

    /// An account's posting history, newest first
    ///
    /// Owner-checked: callers only ever see entries of accounts they own.
    pub fn history(
        &self,
        account: AccountId,
        caller: UserId,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let snapshot = self.accounts.get(account)?;
        if snapshot.owner != caller {
            return Err(LedgerError::forbidden(account, caller));
        }
        Ok(self.ledger.list_by_account(account, limit))
    }

    /// Look up a single ledger entry, owner-checked
    pub fn transaction(
        &self,
        id: TransactionId,
        caller: UserId,
    ) -> Result<Transaction, LedgerError> {
        let entry = self
            .ledger
            .get(id)
            .ok_or_else(|| LedgerError::transaction_not_found(id))?;
        let account = self.accounts.get(entry.account)?;
        if account.owner != caller {
            return Err(LedgerError::forbidden(entry.account, caller));
        }
        Ok(entry)
    }

    fn execute(&self, request: PostingRequest) -> Result<PostedTransaction, LedgerError> {
        let lock = self
            .accounts
            .lock_for_update(request.account, self.config.lock_timeout)?;
        let mut work = UnitOfWork::begin(self.ledger.as_ref(), lock);

        if work.lock.owner != request.caller {
            return Err(LedgerError::forbidden(request.account, request.caller));
        }
        if work.lock.status != AccountStatus::Active {
            return Err(LedgerError::account_not_active(
                request.account,
                work.lock.status,
            ));
        }
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(request.amount));
        }
        if request.currency != work.lock.currency {
            return Err(LedgerError::currency_mismatch(
                work.lock.currency.clone(),
                request.currency,
            ));
        }

        let balance = work.lock.balance;
        let new_balance = match request.kind {
            TransactionKind::Deposit => balance
                .checked_add(request.amount)
                .ok_or_else(|| LedgerError::balance_overflow("deposit", request.account))?,
            TransactionKind::Withdrawal => {
                let next = balance
                    .checked_sub(request.amount)
                    .ok_or_else(|| LedgerError::balance_overflow("withdrawal", request.account))?;
                if next < Decimal::ZERO {
                    return Err(LedgerError::insufficient_balance(
                        request.account,
                        balance,
                        request.amount,
                    ));
                }
                next
            }
        };

        let entry = self.append_entry(&mut work, &request)?;
        self.accounts.set_balance(&mut work.lock, new_balance)?;
        work.commit();

        Ok(PostedTransaction {
            transaction: entry,
            new_balance,
        })
    }

    /// Resolve the reference and append the completed entry
    ///
    /// A caller-supplied reference that conflicts is a terminal
    /// `DuplicatePosting`; a generated one is regenerated and retried up to
    /// the configured bound, since the store constraint is authoritative
    /// and generation is only best-effort unique.
    fn append_entry(
        &self,
        work: &mut UnitOfWork<'_>,
        request: &PostingRequest,
    ) -> Result<Transaction, LedgerError> {
        let (mut reference, caller_supplied) = match request.reference.as_deref() {
            Some(supplied) => {
                let trimmed = supplied.trim();
                if trimmed.is_empty() || trimmed.len() > MAX_REFERENCE_LEN {
                    return Err(LedgerError::invalid_reference(supplied));
                }
                (trimmed.to_string(), true)
            }
            None => (self.references.transaction_reference(), false),
        };

        let mut attempts = 0u32;
        loop {
            let candidate = Transaction::completed(
                request.account,
                request.kind,
                request.amount,
                work.lock.currency.clone(),
                request.description.clone(),
                reference.clone(),
            );
            match work.ledger.append(candidate) {
                Ok(entry) => {
                    work.appended = Some(entry.id);
                    return Ok(entry);
                }
                Err(error @ LedgerError::DuplicatePosting { .. }) => {
                    if caller_supplied {
                        return Err(error);
                    }
                    attempts += 1;
                    if attempts >= self.config.reference_attempts {
                        return Err(error);
                    }
                    reference = self.references.transaction_reference();
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Account, Currency};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    fn parts() -> (Arc<AccountStore>, Arc<TransactionLedger>, PostingEngine) {
        let accounts = Arc::new(AccountStore::new());
        let ledger = Arc::new(TransactionLedger::new());
        let engine = PostingEngine::new(Arc::clone(&accounts), Arc::clone(&ledger));
        (accounts, ledger, engine)
    }

    fn request(account: &Account, kind: TransactionKind, cents: i64) -> PostingRequest {
        PostingRequest {
            account: account.id,
            caller: account.owner,
            kind,
            amount: Decimal::new(cents, 2),
            currency: account.currency.clone(),
            description: None,
            reference: None,
        }
    }

    #[test]
    fn deposit_then_withdrawal_round_trip() {
        let (accounts, ledger, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        let deposit = engine
            .post(request(&account, TransactionKind::Deposit, 10000))
            .unwrap();
        assert_eq!(deposit.new_balance, Decimal::new(10000, 2));

        let withdrawal = engine
            .post(request(&account, TransactionKind::Withdrawal, 4000))
            .unwrap();
        assert_eq!(withdrawal.new_balance, Decimal::new(6000, 2));

        let snapshot = accounts.get(account.id).unwrap();
        assert_eq!(snapshot.balance, Decimal::new(6000, 2));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn withdrawal_of_exact_balance_leaves_zero() {
        let (accounts, _, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        engine
            .post(request(&account, TransactionKind::Deposit, 5000))
            .unwrap();
        let posted = engine
            .post(request(&account, TransactionKind::Withdrawal, 5000))
            .unwrap();

        assert_eq!(posted.new_balance, Decimal::ZERO);
        assert_eq!(accounts.get(account.id).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn withdrawal_one_cent_over_balance_is_rejected() {
        let (accounts, ledger, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        engine
            .post(request(&account, TransactionKind::Deposit, 5000))
            .unwrap();
        let result = engine.post(request(&account, TransactionKind::Withdrawal, 5001));

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(
            accounts.get(account.id).unwrap().balance,
            Decimal::new(5000, 2)
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn foreign_caller_is_forbidden_with_zero_state_change() {
        let (accounts, ledger, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        let mut foreign = request(&account, TransactionKind::Deposit, 10000);
        foreign.caller = Uuid::new_v4();

        assert!(matches!(
            engine.post(foreign),
            Err(LedgerError::Forbidden { .. })
        ));
        assert_eq!(accounts.get(account.id).unwrap().balance, Decimal::ZERO);
        assert!(ledger.is_empty());
    }

    #[test]
    fn suspended_account_rejects_postings() {
        let (accounts, _, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());
        accounts
            .update_status(account.id, account.owner, AccountStatus::Suspended)
            .unwrap();

        let result = engine.post(request(&account, TransactionKind::Deposit, 10000));

        assert!(matches!(
            result,
            Err(LedgerError::AccountNotActive {
                status: AccountStatus::Suspended,
                ..
            })
        ));
    }

    #[test]
    fn closed_account_rejects_postings() {
        let (accounts, _, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());
        accounts
            .update_status(account.id, account.owner, AccountStatus::Closed)
            .unwrap();

        let result = engine.post(request(&account, TransactionKind::Deposit, 10000));

        assert!(matches!(
            result,
            Err(LedgerError::AccountNotActive {
                status: AccountStatus::Closed,
                ..
            })
        ));
    }

    #[test]
    fn zero_and_negative_amounts_are_invalid() {
        let (accounts, _, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        for cents in [0, -100] {
            let result = engine.post(request(&account, TransactionKind::Deposit, cents));
            assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
        }
        assert_eq!(accounts.get(account.id).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn currency_mismatch_is_rejected() {
        let (accounts, _, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        let mut mismatched = request(&account, TransactionKind::Deposit, 10000);
        mismatched.currency = Currency::new("EUR").unwrap();

        assert!(matches!(
            engine.post(mismatched),
            Err(LedgerError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn unknown_account_is_not_found() {
        let (_, _, engine) = parts();

        let result = engine.post(PostingRequest {
            account: Uuid::new_v4(),
            caller: Uuid::new_v4(),
            kind: TransactionKind::Deposit,
            amount: Decimal::new(10000, 2),
            currency: Currency::usd(),
            description: None,
            reference: None,
        });

        assert!(matches!(result, Err(LedgerError::AccountNotFound { .. })));
    }

    #[test]
    fn duplicate_caller_reference_posts_exactly_once() {
        let (accounts, ledger, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        let mut first = request(&account, TransactionKind::Deposit, 10000);
        first.reference = Some("TXN-idempotent".to_string());
        let mut second = first.clone();
        second.description = Some("resubmission".to_string());

        engine.post(first).unwrap();
        let result = engine.post(second);

        assert!(matches!(
            result,
            Err(LedgerError::DuplicatePosting { .. })
        ));
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            accounts.get(account.id).unwrap().balance,
            Decimal::new(10000, 2)
        );
    }

    #[test]
    fn malformed_caller_references_are_rejected() {
        let (accounts, ledger, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        let too_long = "x".repeat(MAX_REFERENCE_LEN + 1);
        for bad in ["", "   ", too_long.as_str()] {
            let mut bad_request = request(&account, TransactionKind::Deposit, 10000);
            bad_request.reference = Some(bad.to_string());
            assert!(matches!(
                engine.post(bad_request),
                Err(LedgerError::InvalidReference { .. })
            ));
        }
        assert!(ledger.is_empty());
    }

    /// Reference source that replays a scripted sequence before falling
    /// back to unique values
    struct ScriptedReferences {
        scripted: Mutex<Vec<String>>,
        fallback: ReferenceGenerator,
    }

    impl ScriptedReferences {
        fn new(scripted: Vec<&str>) -> Self {
            ScriptedReferences {
                scripted: Mutex::new(scripted.into_iter().rev().map(String::from).collect()),
                fallback: ReferenceGenerator::new(),
            }
        }
    }

    impl ReferenceSource for ScriptedReferences {
        fn transaction_reference(&self) -> String {
            self.scripted
                .lock()
                .pop()
                .unwrap_or_else(|| self.fallback.transaction_reference())
        }
    }

    #[test]
    fn generated_reference_collision_retries_generation() {
        let accounts = Arc::new(AccountStore::new());
        let ledger = Arc::new(TransactionLedger::new());
        let engine = PostingEngine::with_parts(
            Arc::clone(&accounts) as Arc<dyn Accounts>,
            Arc::clone(&ledger) as Arc<dyn TransactionLog>,
            Arc::new(ScriptedReferences::new(vec!["TXN-taken", "TXN-fresh"])),
            PostingConfig::default(),
        );
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        // Occupy the first scripted reference through a caller-supplied post
        let mut seed = request(&account, TransactionKind::Deposit, 100);
        seed.reference = Some("TXN-taken".to_string());
        engine.post(seed).unwrap();

        // The generated reference collides once, then the retry lands
        let posted = engine
            .post(request(&account, TransactionKind::Deposit, 200))
            .unwrap();
        assert_eq!(posted.transaction.reference, "TXN-fresh");
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn generated_reference_conflicts_exhaust_after_bounded_attempts() {
        let accounts = Arc::new(AccountStore::new());
        let ledger = Arc::new(TransactionLedger::new());
        let engine = PostingEngine::with_parts(
            Arc::clone(&accounts) as Arc<dyn Accounts>,
            Arc::clone(&ledger) as Arc<dyn TransactionLog>,
            Arc::new(ScriptedReferences::new(vec![
                "TXN-taken",
                "TXN-taken",
                "TXN-taken",
            ])),
            PostingConfig {
                reference_attempts: 3,
                ..PostingConfig::default()
            },
        );
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        let mut seed = request(&account, TransactionKind::Deposit, 100);
        seed.reference = Some("TXN-taken".to_string());
        engine.post(seed).unwrap();

        let result = engine.post(request(&account, TransactionKind::Deposit, 200));
        assert!(matches!(
            result,
            Err(LedgerError::DuplicatePosting { .. })
        ));
        assert_eq!(ledger.len(), 1);
    }

    /// Account-store double whose balance writes can be failed on demand
    struct FlakyAccounts {
        inner: Arc<AccountStore>,
        fail_writes: AtomicBool,
    }

    impl FlakyAccounts {
        fn new(inner: Arc<AccountStore>) -> Self {
            FlakyAccounts {
                inner,
                fail_writes: AtomicBool::new(false),
            }
        }
    }

    impl Accounts for FlakyAccounts {
        fn get(&self, account: AccountId) -> Result<Account, LedgerError> {
            self.inner.get(account)
        }

        fn lock_for_update(
            &self,
            account: AccountId,
            timeout: Duration,
        ) -> Result<AccountLock, LedgerError> {
            self.inner.lock_for_update(account, timeout)
        }

        fn set_balance(
            &self,
            lock: &mut AccountLock,
            balance: Decimal,
        ) -> Result<(), LedgerError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(LedgerError::storage_unavailable("simulated commit failure"));
            }
            self.inner.set_balance(lock, balance)
        }
    }

    #[test]
    fn commit_failure_after_append_rolls_everything_back() {
        let store = Arc::new(AccountStore::new());
        let ledger = Arc::new(TransactionLedger::new());
        let flaky = Arc::new(FlakyAccounts::new(Arc::clone(&store)));
        let engine = PostingEngine::with_parts(
            Arc::clone(&flaky) as Arc<dyn Accounts>,
            Arc::clone(&ledger) as Arc<dyn TransactionLog>,
            Arc::new(ReferenceGenerator::new()),
            PostingConfig::default(),
        );
        let account = store.open(Uuid::new_v4(), Currency::usd());

        flaky.fail_writes.store(true, Ordering::SeqCst);
        let mut doomed = request(&account, TransactionKind::Deposit, 10000);
        doomed.reference = Some("TXN-atomic".to_string());
        let result = engine.post(doomed.clone());

        // The failure is surfaced as retryable and neither write is visible
        let error = result.unwrap_err();
        assert!(matches!(error, LedgerError::StorageUnavailable { .. }));
        assert!(error.is_retryable());
        assert!(ledger.is_empty());
        assert!(!ledger.contains_reference("TXN-atomic"));
        assert_eq!(store.get(account.id).unwrap().balance, Decimal::ZERO);

        // The rolled-back reference is free for the retry
        flaky.fail_writes.store(false, Ordering::SeqCst);
        let posted = engine.post(doomed).unwrap();
        assert_eq!(posted.transaction.reference, "TXN-atomic");
        assert_eq!(posted.new_balance, Decimal::new(10000, 2));
    }

    #[test]
    fn contended_lock_times_out_as_retryable() {
        let accounts = Arc::new(AccountStore::new());
        let ledger = Arc::new(TransactionLedger::new());
        let engine = PostingEngine::with_parts(
            Arc::clone(&accounts) as Arc<dyn Accounts>,
            Arc::clone(&ledger) as Arc<dyn TransactionLog>,
            Arc::new(ReferenceGenerator::new()),
            PostingConfig {
                lock_timeout: Duration::from_millis(30),
                ..PostingConfig::default()
            },
        );
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        let held = accounts
            .lock_for_update(account.id, Duration::from_secs(1))
            .unwrap();
        let result = engine.post(request(&account, TransactionKind::Deposit, 10000));
        drop(held);

        let error = result.unwrap_err();
        assert!(matches!(error, LedgerError::LockTimeout { .. }));
        assert!(error.is_retryable());
        assert!(ledger.is_empty());

        // And the posting succeeds once the lock is free again
        engine
            .post(request(&account, TransactionKind::Deposit, 10000))
            .unwrap();
    }

    #[test]
    fn history_is_owner_checked_and_newest_first() {
        let (accounts, _, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        engine
            .post(request(&account, TransactionKind::Deposit, 10000))
            .unwrap();
        engine
            .post(request(&account, TransactionKind::Withdrawal, 2500))
            .unwrap();

        let history = engine.history(account.id, account.owner, 100).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TransactionKind::Withdrawal);
        assert_eq!(history[1].kind, TransactionKind::Deposit);

        assert!(matches!(
            engine.history(account.id, Uuid::new_v4(), 100),
            Err(LedgerError::Forbidden { .. })
        ));
    }

    #[test]
    fn transaction_lookup_is_owner_checked() {
        let (accounts, _, engine) = parts();
        let account = accounts.open(Uuid::new_v4(), Currency::usd());

        let posted = engine
            .post(request(&account, TransactionKind::Deposit, 10000))
            .unwrap();

        let found = engine
            .transaction(posted.transaction.id, account.owner)
            .unwrap();
        assert_eq!(found, posted.transaction);

        assert!(matches!(
            engine.transaction(posted.transaction.id, Uuid::new_v4()),
            Err(LedgerError::Forbidden { .. })
        ));
        assert!(matches!(
            engine.transaction(Uuid::new_v4(), account.owner),
            Err(LedgerError::TransactionNotFound { .. })
        ));
    }
}
