//! In-memory ledger store with row-level locking
//!
//! This module provides `InMemoryLedgerStore`, a thread-safe implementation of
//! [`LedgerStore`] built on concurrent maps, plus the `MemoryUnit` handle used
//! for atomic units of work.
//!
//! # Design
//!
//! ```text
//! InMemoryLedgerStore
//!     ├── accounts:      DashMap<AccountId, Arc<Mutex<Account>>>   (one lock per row)
//!     ├── by_number:     DashMap<AccountNumber, AccountId>         (unique index)
//!     ├── transactions:  DashMap<TransactionUid, Transaction>      (unique idempotency key)
//!     └── beneficiaries: DashMap<BeneficiaryId, Beneficiary>
//!                        + DashMap<(UserId, AccountId), BeneficiaryId>
//! ```
//!
//! A unit of work locks the account rows it touches through `lock_accounts`,
//! in ascending id order, waiting at most `lock_timeout` per row. Writes are
//! staged on copies; on commit the transaction keys are reserved first, then
//! the staged rows are written back through the held locks. Dropping the unit
//! without committing releases the locks and discards every staged write.
//!
//! # Thread Safety
//!
//! Single-row reads take the row lock with the same bounded wait, so a reader
//! sees an account either before or after a unit, never in between.
//! `list_accounts` holds every row lock at once while it copies, so a listing
//! never shows one side of a transfer without the other. Units touching
//! disjoint accounts never wait on each other.

use crate::config::LedgerConfig;
use crate::core::traits::{LedgerStore, TransactionQuery, UnitOfWork};
use crate::types::{
    normalize_account_number, Account, AccountId, AccountNumber, AccountStatus, Beneficiary,
    BeneficiaryId, LedgerError, NewAccount, NewBeneficiary, OwnerId, Transaction, TransactionId,
    TransactionStatus, TransactionUid, UserId,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lock handle on one account row, owned by a unit of work
type RowGuard = ArcMutexGuard<RawMutex, Account>;

/// One account row plus its immutable number, readable without the lock
#[derive(Debug, Clone)]
struct AccountSlot {
    number: AccountNumber,
    row: Arc<Mutex<Account>>,
}

/// Thread-safe in-memory ledger store
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    accounts: DashMap<AccountId, AccountSlot>,
    by_number: DashMap<AccountNumber, AccountId>,
    transactions: DashMap<TransactionUid, Transaction>,
    beneficiaries: DashMap<BeneficiaryId, Beneficiary>,
    beneficiary_index: DashMap<(UserId, AccountId), BeneficiaryId>,
    next_account_id: AtomicU64,
    next_transaction_id: AtomicU64,
    next_beneficiary_id: AtomicU64,

    /// Longest wait for a single row lock before `Contention`
    lock_timeout: Duration,
}

impl InMemoryLedgerStore {
    /// Create an empty store
    ///
    /// # Arguments
    ///
    /// * `lock_timeout` - Bounded wait for each account row lock
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            accounts: DashMap::new(),
            by_number: DashMap::new(),
            transactions: DashMap::new(),
            beneficiaries: DashMap::new(),
            beneficiary_index: DashMap::new(),
            next_account_id: AtomicU64::new(0),
            next_transaction_id: AtomicU64::new(0),
            next_beneficiary_id: AtomicU64::new(0),
            lock_timeout,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.lock_timeout)
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Number of committed transactions
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn slot(&self, id: AccountId) -> Result<AccountSlot, LedgerError> {
        self.accounts
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LedgerError::account_not_found(format!("#{}", id)))
    }

    fn read_row(&self, slot: &AccountSlot) -> Result<Account, LedgerError> {
        slot.row
            .try_lock_for(self.lock_timeout)
            .map(|row| row.clone())
            .ok_or_else(|| {
                warn!(account = %slot.number, "Timed out reading account row");
                LedgerError::contention(format!("account {}", slot.number))
            })
    }

    fn scan_transactions(&self, query: &TransactionQuery) -> Vec<Transaction> {
        self.transactions
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let slot = self.slot(id)?;
        self.read_row(&slot)
    }

    fn get_account_by_number(&self, number: &str) -> Result<Account, LedgerError> {
        let number = normalize_account_number(number);
        let id = self
            .by_number
            .get(&number)
            .map(|entry| *entry.value())
            .ok_or_else(|| LedgerError::account_not_found(&number))?;
        self.get_account(id)
    }

    fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut slots: Vec<(AccountId, AccountSlot)> = self
            .accounts
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        slots.sort_by_key(|(id, _)| *id);

        // Every row stays locked until all are copied, taken in the same
        // ascending order units use
        let guards = slots
            .iter()
            .map(|(_, slot)| {
                slot.row.try_lock_arc_for(self.lock_timeout).ok_or_else(|| {
                    warn!(account = %slot.number, "Timed out snapshotting account rows");
                    LedgerError::contention(format!("account {}", slot.number))
                })
            })
            .collect::<Result<Vec<RowGuard>, LedgerError>>()?;

        Ok(guards.iter().map(|guard| Account::clone(guard)).collect())
    }

    fn accounts_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Account>, LedgerError> {
        Ok(self
            .list_accounts()?
            .into_iter()
            .filter(|account| account.owner_id == owner_id)
            .collect())
    }

    fn insert_account(
        &self,
        account: NewAccount,
        opened_at: DateTime<Utc>,
    ) -> Result<Account, LedgerError> {
        let number = normalize_account_number(&account.account_number);
        if number.is_empty() {
            return Err(LedgerError::invalid_operation("account number is empty"));
        }

        let mut created = None;
        let _ = self.by_number.entry(number.clone()).or_insert_with(|| {
            let id = self.next_account_id.fetch_add(1, Ordering::SeqCst) + 1;
            let row = Account::new(
                id,
                number.clone(),
                account.owner_id,
                account.holder_name.clone(),
                account.account_type,
                opened_at,
            );
            self.accounts.insert(
                id,
                AccountSlot {
                    number: number.clone(),
                    row: Arc::new(Mutex::new(row.clone())),
                },
            );
            created = Some(row);
            id
        });

        created.ok_or_else(|| LedgerError::duplicate_account_number(&number))
    }

    fn find_transaction(&self, uid: &TransactionUid) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.transactions.get(uid).map(|entry| entry.value().clone()))
    }

    fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(query.paginate(self.scan_transactions(query)))
    }

    fn count_transactions(&self, query: &TransactionQuery) -> Result<usize, LedgerError> {
        Ok(self
            .transactions
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .count())
    }

    fn get_beneficiary(&self, id: BeneficiaryId) -> Result<Option<Beneficiary>, LedgerError> {
        Ok(self.beneficiaries.get(&id).map(|entry| entry.value().clone()))
    }

    fn find_beneficiary(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<Option<Beneficiary>, LedgerError> {
        let id = self
            .beneficiary_index
            .get(&(user_id, account_id))
            .map(|entry| *entry.value());
        match id {
            Some(id) => self.get_beneficiary(id),
            None => Ok(None),
        }
    }

    fn insert_beneficiary(
        &self,
        beneficiary: NewBeneficiary,
        created_at: DateTime<Utc>,
    ) -> Result<Beneficiary, LedgerError> {
        let key = (beneficiary.user_id, beneficiary.beneficiary_account_id);
        let mut created = None;
        let _ = self.beneficiary_index.entry(key).or_insert_with(|| {
            let id = self.next_beneficiary_id.fetch_add(1, Ordering::SeqCst) + 1;
            let row = Beneficiary {
                beneficiary_id: id,
                user_id: beneficiary.user_id,
                beneficiary_account_id: beneficiary.beneficiary_account_id,
                display_name: beneficiary.display_name.clone(),
                nickname: beneficiary.nickname.clone(),
                is_active: true,
                created_at,
            };
            self.beneficiaries.insert(id, row.clone());
            created = Some(row);
            id
        });

        created.ok_or_else(|| {
            LedgerError::beneficiary_exists(&format!("#{}", beneficiary.beneficiary_account_id))
        })
    }

    fn update_beneficiary<F>(&self, id: BeneficiaryId, f: F) -> Result<Beneficiary, LedgerError>
    where
        F: FnOnce(&mut Beneficiary) -> Result<(), LedgerError>,
    {
        let mut entry = self
            .beneficiaries
            .get_mut(&id)
            .ok_or_else(|| LedgerError::beneficiary_not_found(id))?;

        let mut updated = entry.value().clone();
        f(&mut updated)?;
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }

    fn beneficiaries_for_user(&self, user_id: UserId) -> Result<Vec<Beneficiary>, LedgerError> {
        let mut rows: Vec<Beneficiary> = self
            .beneficiaries
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|b| b.beneficiary_id);
        Ok(rows)
    }

    fn with_atomic_unit<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, LedgerError>,
    {
        let mut unit = MemoryUnit::new(self);
        // An error drops the unit: staged writes vanish and locks are released
        let value = f(&mut unit)?;
        unit.commit()?;
        Ok(value)
    }
}

/// Transactional handle over an [`InMemoryLedgerStore`]
///
/// Holds the row locks it acquired until it is committed or dropped.
pub struct MemoryUnit<'a> {
    store: &'a InMemoryLedgerStore,
    guards: BTreeMap<AccountId, RowGuard>,
    staged_accounts: BTreeMap<AccountId, Account>,
    staged_transactions: Vec<Transaction>,
}

impl<'a> MemoryUnit<'a> {
    fn new(store: &'a InMemoryLedgerStore) -> Self {
        Self {
            store,
            guards: BTreeMap::new(),
            staged_accounts: BTreeMap::new(),
            staged_transactions: Vec::new(),
        }
    }

    fn not_locked(id: AccountId) -> LedgerError {
        LedgerError::invalid_operation(format!("account #{} is not locked by this unit", id))
    }

    /// Publish staged writes
    ///
    /// Every staged row must be locked by this unit. Transaction keys are
    /// reserved before any account row changes, so a key conflict aborts the
    /// unit with nothing applied.
    fn commit(self) -> Result<(), LedgerError> {
        let MemoryUnit {
            store,
            mut guards,
            staged_accounts,
            staged_transactions,
        } = self;

        if let Some(&id) = staged_accounts.keys().find(|id| !guards.contains_key(*id)) {
            return Err(Self::not_locked(id));
        }

        let mut reserved: Vec<TransactionUid> = Vec::with_capacity(staged_transactions.len());
        for txn in staged_transactions {
            let uid = txn.transaction_uid.clone();
            let mut inserted = false;
            let _ = store.transactions.entry(uid.clone()).or_insert_with(|| {
                inserted = true;
                txn
            });

            if !inserted {
                for uid in &reserved {
                    store.transactions.remove(uid);
                }
                debug!(transaction_uid = %uid, "Idempotency key taken at commit, unit aborted");
                return Err(LedgerError::duplicate_request(uid));
            }
            reserved.push(uid);
        }

        for (id, account) in staged_accounts {
            if let Some(guard) = guards.get_mut(&id) {
                **guard = account;
            }
        }

        Ok(())
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<(), LedgerError> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        for id in ids {
            if self.guards.contains_key(&id) {
                continue;
            }
            if let Some((&highest, _)) = self.guards.last_key_value() {
                if highest > id {
                    return Err(LedgerError::invalid_operation(format!(
                        "lock order violated: account #{} requested after #{}",
                        id, highest
                    )));
                }
            }

            let slot = self.store.slot(id)?;
            let guard = slot
                .row
                .try_lock_arc_for(self.store.lock_timeout)
                .ok_or_else(|| {
                    warn!(account = %slot.number, "Timed out waiting for account lock");
                    LedgerError::contention(format!("account {}", slot.number))
                })?;
            self.guards.insert(id, guard);
        }
        Ok(())
    }

    fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        if let Some(staged) = self.staged_accounts.get(&id) {
            return Ok(staged.clone());
        }
        self.guards
            .get(&id)
            .map(|guard| Account::clone(guard))
            .ok_or_else(|| Self::not_locked(id))
    }

    fn apply_balance_delta(
        &mut self,
        id: AccountId,
        delta: Decimal,
        expected_min_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        let mut account = self.account(id)?;
        let operation = if delta.is_sign_negative() { "debit" } else { "credit" };

        let balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.account_number))?;

        if balance < expected_min_balance {
            return Err(LedgerError::insufficient_funds(
                &account.account_number,
                account.available_balance,
                delta.abs(),
            ));
        }

        let available_balance = account
            .available_balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.account_number))?;

        account.balance = balance;
        account.available_balance = available_balance;
        account.last_transaction_at = Some(Utc::now());
        self.staged_accounts.insert(id, account.clone());
        Ok(account)
    }

    fn set_status(&mut self, id: AccountId, status: AccountStatus) -> Result<Account, LedgerError> {
        let mut account = self.account(id)?;
        account.status = status;
        self.staged_accounts.insert(id, account.clone());
        Ok(account)
    }

    fn insert_transaction(&mut self, mut txn: Transaction) -> Result<TransactionId, LedgerError> {
        txn.validate()?;
        for id in [txn.from_account_id, txn.to_account_id].into_iter().flatten() {
            if !self.guards.contains_key(&id) {
                return Err(Self::not_locked(id));
            }
        }
        if self.find_transaction(&txn.transaction_uid)?.is_some() {
            return Err(LedgerError::duplicate_request(&txn.transaction_uid));
        }

        let id = self.store.next_transaction_id.fetch_add(1, Ordering::SeqCst) + 1;
        txn.transaction_id = id;
        self.staged_transactions.push(txn);
        Ok(id)
    }

    fn finalize_transaction(
        &mut self,
        uid: &TransactionUid,
        status: TransactionStatus,
        reason: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let txn = self
            .staged_transactions
            .iter_mut()
            .find(|txn| &txn.transaction_uid == uid)
            .ok_or_else(|| {
                LedgerError::invalid_operation(format!(
                    "transaction {} was not written by this unit",
                    uid
                ))
            })?;
        txn.finalize(status, reason, Utc::now())?;
        Ok(txn.clone())
    }

    fn find_transaction(&self, uid: &TransactionUid) -> Result<Option<Transaction>, LedgerError> {
        if let Some(staged) = self
            .staged_transactions
            .iter()
            .find(|txn| &txn.transaction_uid == uid)
        {
            return Ok(Some(staged.clone()));
        }
        self.store.find_transaction(uid)
    }
}
