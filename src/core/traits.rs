//! Core traits for the ledger store and its atomic unit of work
//!
//! The movement engine, beneficiary directory and statement projector are all
//! written against these traits so that any backend offering row-level locking
//! and all-or-nothing commits can stand in for the in-memory store.

use crate::types::{
    Account, AccountId, AccountStatus, Beneficiary, BeneficiaryId, LedgerError, NewAccount,
    NewBeneficiary, OwnerId, Transaction, TransactionId, TransactionStatus, TransactionType,
    TransactionUid, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Ordering of query results by `initiated_at`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Filter specification for transaction history
///
/// Every field is optional; an empty query matches the whole ledger. The store
/// translates it into whatever lookup the backend uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionQuery {
    /// Match transactions touching any of these accounts (empty: all)
    pub accounts: Vec<AccountId>,

    /// Match transactions whose other side is this account
    pub counterparty: Option<AccountId>,

    pub tx_type: Option<TransactionType>,

    pub status: Option<TransactionStatus>,

    /// Inclusive lower bound on `initiated_at`
    pub since: Option<DateTime<Utc>>,

    /// Inclusive upper bound on `initiated_at`
    pub until: Option<DateTime<Utc>>,

    pub order: SortOrder,

    /// Page size; `None` returns every match after `offset`
    pub limit: Option<usize>,

    pub offset: usize,
}

impl TransactionQuery {
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            accounts: vec![account_id],
            ..Self::default()
        }
    }

    pub fn with_type(mut self, tx_type: TransactionType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_counterparty(mut self, account_id: AccountId) -> Self {
        self.counterparty = Some(account_id);
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn ordered(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Whether `txn` satisfies every filter (pagination aside)
    pub fn matches(&self, txn: &Transaction) -> bool {
        if !self.accounts.is_empty() && !self.accounts.iter().any(|id| txn.touches(*id)) {
            return false;
        }
        if self.counterparty.is_some_and(|id| !txn.touches(id)) {
            return false;
        }
        if self.tx_type.is_some_and(|t| t != txn.tx_type) {
            return false;
        }
        if self.status.is_some_and(|s| s != txn.status) {
            return false;
        }
        if self.since.is_some_and(|since| txn.initiated_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| txn.initiated_at > until) {
            return false;
        }
        true
    }

    /// Sort matches and cut the requested page out of them
    pub fn paginate(&self, mut matches: Vec<Transaction>) -> Vec<Transaction> {
        matches.sort_by(|a, b| {
            (a.initiated_at, a.transaction_id).cmp(&(b.initiated_at, b.transaction_id))
        });
        if self.order == SortOrder::Descending {
            matches.reverse();
        }
        let page = matches.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        }
    }
}

/// Transactional handle passed to [`LedgerStore::with_atomic_unit`]
///
/// Everything written through the handle becomes visible only when the unit
/// commits. Dropping the handle without committing discards every write.
pub trait UnitOfWork {
    /// Acquire row locks on `ids` in ascending order
    ///
    /// Waits at most the store's lock timeout per row and fails with
    /// `Contention` otherwise. Locking an id lower than one already held by
    /// this unit is rejected, so two units can never wait on each other.
    fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<(), LedgerError>;

    /// Current (staged) state of a locked account
    fn account(&self, id: AccountId) -> Result<Account, LedgerError>;

    /// Add `delta` to a locked account's balances
    ///
    /// # Arguments
    ///
    /// * `id` - Locked account to modify
    /// * `delta` - Signed change; negative for debits
    /// * `expected_min_balance` - Floor the resulting balance must not cross (normally zero)
    ///
    /// # Returns
    ///
    /// * `Ok(Account)` - The staged account after the change
    /// * `Err(LedgerError::InsufficientFunds)` - If the floor would be crossed
    /// * `Err(LedgerError::ArithmeticOverflow)` - If the balance would overflow
    fn apply_balance_delta(
        &mut self,
        id: AccountId,
        delta: Decimal,
        expected_min_balance: Decimal,
    ) -> Result<Account, LedgerError>;

    /// Change a locked account's status
    fn set_status(&mut self, id: AccountId, status: AccountStatus) -> Result<Account, LedgerError>;

    /// Stage a new transaction and assign its sequence number
    ///
    /// Every account the transaction references must be locked by this unit.
    /// Fails with `DuplicateRequest` if the idempotency key is already taken.
    fn insert_transaction(&mut self, txn: Transaction) -> Result<TransactionId, LedgerError>;

    /// Move a staged transaction out of `pending`
    fn finalize_transaction(
        &mut self,
        uid: &TransactionUid,
        status: TransactionStatus,
        reason: Option<String>,
    ) -> Result<Transaction, LedgerError>;

    /// Look up a transaction, staged writes of this unit included
    fn find_transaction(&self, uid: &TransactionUid) -> Result<Option<Transaction>, LedgerError>;
}

/// Durable keyed storage for accounts, transactions and beneficiaries
///
/// Single-row reads never observe a partially committed unit: they either see
/// the state before the unit or after it.
pub trait LedgerStore: Send + Sync {
    /// Get an account by internal id
    fn get_account(&self, id: AccountId) -> Result<Account, LedgerError>;

    /// Get an account by its normalized external number
    fn get_account_by_number(&self, number: &str) -> Result<Account, LedgerError>;

    /// Snapshot of every account, ordered by id
    fn list_accounts(&self) -> Result<Vec<Account>, LedgerError>;

    fn accounts_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Account>, LedgerError>;

    /// Insert a new active account with zero balances
    ///
    /// Fails with `DuplicateAccountNumber` if the number is taken.
    fn insert_account(
        &self,
        account: NewAccount,
        opened_at: DateTime<Utc>,
    ) -> Result<Account, LedgerError>;

    fn find_transaction(&self, uid: &TransactionUid) -> Result<Option<Transaction>, LedgerError>;

    /// Matching transactions, sorted and paginated per the query
    fn query_transactions(&self, query: &TransactionQuery)
        -> Result<Vec<Transaction>, LedgerError>;

    /// Number of matching transactions, ignoring pagination
    fn count_transactions(&self, query: &TransactionQuery) -> Result<usize, LedgerError>;

    fn get_beneficiary(&self, id: BeneficiaryId) -> Result<Option<Beneficiary>, LedgerError>;

    fn find_beneficiary(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<Option<Beneficiary>, LedgerError>;

    /// Insert a beneficiary; fails with `BeneficiaryExists` if the user already
    /// has a row (active or not) for that account
    fn insert_beneficiary(
        &self,
        beneficiary: NewBeneficiary,
        created_at: DateTime<Utc>,
    ) -> Result<Beneficiary, LedgerError>;

    /// Update a beneficiary using a closure
    ///
    /// The change is written back only if the closure succeeds.
    fn update_beneficiary<F>(&self, id: BeneficiaryId, f: F) -> Result<Beneficiary, LedgerError>
    where
        F: FnOnce(&mut Beneficiary) -> Result<(), LedgerError>;

    fn beneficiaries_for_user(&self, user_id: UserId) -> Result<Vec<Beneficiary>, LedgerError>;

    /// Run `f` against a transactional handle and commit only if it succeeds
    ///
    /// Any error from `f` (or from the commit itself) rolls back every write
    /// made through the handle. Locks are released on every exit path.
    fn with_atomic_unit<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, LedgerError>;
}
