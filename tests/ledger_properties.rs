//! Ledger property tests
//!
//! Exercises the engine against the in-memory store under concurrency and
//! injected faults:
//! - Money is conserved and balances never go negative
//! - Replays with one idempotency key move money exactly once
//! - A fault inside the unit of work leaves no trace
//! - Opposite transfers on one pair of accounts never deadlock
//! - Statements reconcile with the current balance
//! - Ledger totals never show a transfer half applied

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use retail_ledger::config::LedgerConfig;
use retail_ledger::core::{
    InMemoryLedgerStore, LedgerStore, MovementEngine, StatementProjector, StatementWindow,
    TransactionQuery, UnitOfWork,
};
use retail_ledger::types::{
    Account, AccountId, AccountRef, AccountStatus, AccountType, Beneficiary, BeneficiaryId,
    Direction, ErrorKind, LedgerError, MovementRequest, NewAccount, NewBeneficiary, OwnerId,
    Payee, Transaction, TransactionId, TransactionStatus, TransactionType, TransactionUid, UserId,
};
use rstest::rstest;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

fn dec(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap()
}

fn ledger() -> MovementEngine<InMemoryLedgerStore> {
    MovementEngine::new(
        Arc::new(InMemoryLedgerStore::default()),
        LedgerConfig::default(),
    )
}

/// Register `number` and fund it through a regular deposit
fn open<S: LedgerStore>(engine: &MovementEngine<S>, number: &str, balance: &str) -> Account {
    let account = engine
        .register_account(
            NewAccount {
                account_number: number.to_string(),
                owner_id: 1,
                holder_name: format!("Holder of {}", number),
                account_type: AccountType::Checking,
            },
            0,
        )
        .unwrap();
    let balance = dec(balance);
    if balance > Decimal::ZERO {
        engine
            .submit(MovementRequest::deposit(AccountRef::Id(account.account_id), balance, 0))
            .unwrap();
    }
    engine.store().get_account(account.account_id).unwrap()
}

fn balance<S: LedgerStore>(engine: &MovementEngine<S>, id: AccountId) -> Decimal {
    engine.store().get_account(id).unwrap().balance
}

/// Store whose units of work fail after a given number of balance deltas
struct FaultyStore {
    inner: Arc<InMemoryLedgerStore>,
    deltas_before_fault: usize,
}

struct FaultyUnit<'a> {
    inner: &'a mut dyn UnitOfWork,
    deltas_left: usize,
}

impl UnitOfWork for FaultyUnit<'_> {
    fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<(), LedgerError> {
        self.inner.lock_accounts(ids)
    }

    fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.inner.account(id)
    }

    fn apply_balance_delta(
        &mut self,
        id: AccountId,
        delta: Decimal,
        expected_min_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        if self.deltas_left == 0 {
            return Err(LedgerError::storage_failure("injected fault"));
        }
        self.deltas_left -= 1;
        self.inner.apply_balance_delta(id, delta, expected_min_balance)
    }

    fn set_status(&mut self, id: AccountId, status: AccountStatus) -> Result<Account, LedgerError> {
        self.inner.set_status(id, status)
    }

    fn insert_transaction(&mut self, txn: Transaction) -> Result<TransactionId, LedgerError> {
        self.inner.insert_transaction(txn)
    }

    fn finalize_transaction(
        &mut self,
        uid: &TransactionUid,
        status: TransactionStatus,
        reason: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        self.inner.finalize_transaction(uid, status, reason)
    }

    fn find_transaction(&self, uid: &TransactionUid) -> Result<Option<Transaction>, LedgerError> {
        self.inner.find_transaction(uid)
    }
}

impl LedgerStore for FaultyStore {
    fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.inner.get_account(id)
    }

    fn get_account_by_number(&self, number: &str) -> Result<Account, LedgerError> {
        self.inner.get_account_by_number(number)
    }

    fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.inner.list_accounts()
    }

    fn accounts_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Account>, LedgerError> {
        self.inner.accounts_for_owner(owner_id)
    }

    fn insert_account(
        &self,
        account: NewAccount,
        opened_at: DateTime<Utc>,
    ) -> Result<Account, LedgerError> {
        self.inner.insert_account(account, opened_at)
    }

    fn find_transaction(&self, uid: &TransactionUid) -> Result<Option<Transaction>, LedgerError> {
        self.inner.find_transaction(uid)
    }

    fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.inner.query_transactions(query)
    }

    fn count_transactions(&self, query: &TransactionQuery) -> Result<usize, LedgerError> {
        self.inner.count_transactions(query)
    }

    fn get_beneficiary(&self, id: BeneficiaryId) -> Result<Option<Beneficiary>, LedgerError> {
        self.inner.get_beneficiary(id)
    }

    fn find_beneficiary(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<Option<Beneficiary>, LedgerError> {
        self.inner.find_beneficiary(user_id, account_id)
    }

    fn insert_beneficiary(
        &self,
        beneficiary: NewBeneficiary,
        created_at: DateTime<Utc>,
    ) -> Result<Beneficiary, LedgerError> {
        self.inner.insert_beneficiary(beneficiary, created_at)
    }

    fn update_beneficiary<F>(&self, id: BeneficiaryId, f: F) -> Result<Beneficiary, LedgerError>
    where
        F: FnOnce(&mut Beneficiary) -> Result<(), LedgerError>,
    {
        self.inner.update_beneficiary(id, f)
    }

    fn beneficiaries_for_user(&self, user_id: UserId) -> Result<Vec<Beneficiary>, LedgerError> {
        self.inner.beneficiaries_for_user(user_id)
    }

    fn with_atomic_unit<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, LedgerError>,
    {
        let deltas_left = self.deltas_before_fault;
        self.inner.with_atomic_unit(|unit| {
            let mut faulty = FaultyUnit {
                inner: unit,
                deltas_left,
            };
            f(&mut faulty)
        })
    }
}

#[test]
fn test_transfer_scenario() {
    let engine = ledger();
    let s = open(&engine, "ACC100", "1000.00");
    let t = open(&engine, "ACC200", "500.00");

    let receipt = engine
        .submit(MovementRequest::transfer(
            AccountRef::number("ACC100"),
            AccountRef::number("ACC200"),
            dec("300.00"),
            1,
        ))
        .unwrap();

    assert_eq!(balance(&engine, s.account_id), dec("700.00"));
    assert_eq!(balance(&engine, t.account_id), dec("800.00"));
    assert_eq!(receipt.balance_of("ACC100").unwrap().balance, dec("700.00"));
    assert_eq!(receipt.balance_of("ACC200").unwrap().balance, dec("800.00"));

    let transfers = engine
        .store()
        .query_transactions(
            &TransactionQuery::for_account(s.account_id).with_type(TransactionType::Transfer),
        )
        .unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].status, TransactionStatus::Completed);
    assert_eq!(transfers[0].amount, dec("300.00"));
    assert!(transfers[0].completed_at.is_some());
}

#[rstest]
#[case::withdrawal(MovementRequest::withdrawal(AccountRef::number("ACC100"), dec("100.00"), 1))]
#[case::payment(MovementRequest::payment(
    AccountRef::number("ACC100"),
    Payee::parse("electric:EL-1"),
    dec("100.00"),
    1
))]
fn test_insufficient_funds_scenario(#[case] request: MovementRequest) {
    let engine = ledger();
    let s = open(&engine, "ACC100", "50.00");
    let before = engine.store().transaction_count();

    let err = engine.submit(request).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert!(err.to_string().contains("ACC100"));
    assert_eq!(balance(&engine, s.account_id), dec("50.00"));
    assert_eq!(engine.store().transaction_count(), before);
}

#[test]
fn test_unknown_destination_scenario() {
    let engine = ledger();
    let s = open(&engine, "ACC100", "50.00");
    let before = engine.store().transaction_count();

    let err = engine
        .submit(MovementRequest::transfer(
            AccountRef::number("ACC100"),
            AccountRef::number("ACC99999999"),
            dec("10.00"),
            1,
        ))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AccountNotFound);
    assert!(err.to_string().contains("ACC99999999"));
    assert_eq!(balance(&engine, s.account_id), dec("50.00"));
    assert_eq!(engine.store().transaction_count(), before);
}

#[test]
fn test_concurrent_transfers_conserve_money() {
    let engine = ledger();
    let accounts: Vec<Account> = (0..6)
        .map(|i| open(&engine, &format!("ACC{}", i), "100.00"))
        .collect();
    let initial_total: Decimal = accounts.iter().map(|a| a.balance).sum();

    thread::scope(|scope| {
        for worker in 0..8u64 {
            let engine = engine.clone();
            let accounts = &accounts;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(worker);
                for _ in 0..200 {
                    let from = rng.gen_range(0..accounts.len());
                    let to = (from + rng.gen_range(1..accounts.len())) % accounts.len();
                    let amount = Decimal::new(rng.gen_range(1..=5000), 2);
                    let result = engine.submit_with_retry(MovementRequest::transfer(
                        AccountRef::Id(accounts[from].account_id),
                        AccountRef::Id(accounts[to].account_id),
                        amount,
                        worker,
                    ));
                    if let Err(err) = result {
                        assert_eq!(err.kind(), ErrorKind::InsufficientFunds, "{}", err);
                    }
                }
            });
        }
    });

    let finals = engine.store().list_accounts().unwrap();
    let final_total: Decimal = finals.iter().map(|a| a.balance).sum();
    assert_eq!(final_total, initial_total);

    for account in &finals {
        assert!(account.balance >= Decimal::ZERO);
        assert_eq!(account.balance, account.available_balance);

        // Every balance is explained by its completed transactions
        let history = engine
            .store()
            .query_transactions(&TransactionQuery::for_account(account.account_id))
            .unwrap();
        let net: Decimal = history
            .iter()
            .filter(|t| t.status == TransactionStatus::Completed)
            .map(|t| match t.direction_for(account.account_id) {
                Some(Direction::Credit) => t.amount,
                Some(Direction::Debit) => -t.amount,
                None => Decimal::ZERO,
            })
            .sum();
        assert_eq!(net, account.balance);
    }
}

#[test]
fn test_concurrent_replay_moves_money_once() {
    let engine = ledger();
    let s = open(&engine, "ACC100", "100.00");
    let t = open(&engine, "ACC200", "0");
    let key = TransactionUid::from_str("client-key-1").unwrap();

    let receipts: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let key = key.clone();
                scope.spawn(move || {
                    engine.submit_with_retry(
                        MovementRequest::transfer(
                            AccountRef::number("ACC100"),
                            AccountRef::number("ACC200"),
                            dec("25.00"),
                            1,
                        )
                        .with_key(key),
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });

    assert_eq!(receipts.iter().filter(|r| !r.replayed).count(), 1);
    let id = receipts[0].transaction.transaction_id;
    assert!(receipts.iter().all(|r| r.transaction.transaction_id == id));
    assert!(receipts
        .iter()
        .all(|r| r.transaction.status == TransactionStatus::Completed));
    assert_eq!(balance(&engine, s.account_id), dec("75.00"));
    assert_eq!(balance(&engine, t.account_id), dec("25.00"));
}

#[rstest]
#[case::before_any_delta(0)]
#[case::between_deltas(1)]
fn test_fault_inside_unit_rolls_back(#[case] deltas_before_fault: usize) {
    let healthy = ledger();
    let s = open(&healthy, "ACC100", "100.00");
    let t = open(&healthy, "ACC200", "10.00");
    let before = healthy.store().transaction_count();

    let faulty = MovementEngine::new(
        Arc::new(FaultyStore {
            inner: Arc::clone(healthy.store()),
            deltas_before_fault,
        }),
        LedgerConfig::default(),
    );
    let key = TransactionUid::from_str("fault-1").unwrap();
    let request = MovementRequest::transfer(
        AccountRef::number("ACC100"),
        AccountRef::number("ACC200"),
        dec("40.00"),
        1,
    )
    .with_key(key.clone());

    let err = faulty.submit(request.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert!(!err.is_retryable());

    assert_eq!(balance(&healthy, s.account_id), dec("100.00"));
    assert_eq!(balance(&healthy, t.account_id), dec("10.00"));
    assert_eq!(healthy.store().transaction_count(), before);
    assert!(healthy.store().find_transaction(&key).unwrap().is_none());

    // The key was never consumed, so the request can still go through
    let receipt = healthy.submit(request).unwrap();
    assert!(!receipt.replayed);
    assert_eq!(balance(&healthy, s.account_id), dec("60.00"));
    assert_eq!(balance(&healthy, t.account_id), dec("50.00"));
}

#[test]
fn test_opposite_transfers_do_not_deadlock() {
    let engine = ledger();
    let a = open(&engine, "ACC100", "1000.00");
    let b = open(&engine, "ACC200", "1000.00");

    thread::scope(|scope| {
        for (from, to) in [("ACC100", "ACC200"), ("ACC200", "ACC100")] {
            let engine = engine.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    engine
                        .submit_with_retry(MovementRequest::transfer(
                            AccountRef::number(from),
                            AccountRef::number(to),
                            dec("1.00"),
                            1,
                        ))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(balance(&engine, a.account_id), dec("1000.00"));
    assert_eq!(balance(&engine, b.account_id), dec("1000.00"));
    assert_eq!(engine.store().transaction_count(), 2 + 400);
}

#[test]
fn test_statement_reconciles_with_balance() {
    let engine = ledger();
    let s = open(&engine, "ACC100", "250.00");
    open(&engine, "ACC200", "40.00");

    let requests = [
        MovementRequest::transfer(AccountRef::number("ACC100"), AccountRef::number("ACC200"), dec("75.25"), 1),
        MovementRequest::deposit(AccountRef::number("ACC100"), dec("19.99"), 1),
        MovementRequest::payment(AccountRef::number("ACC100"), Payee::parse("rent:APT-9"), dec("100"), 1),
        MovementRequest::transfer(AccountRef::number("ACC200"), AccountRef::number("ACC100"), dec("15.00"), 2),
        MovementRequest::withdrawal(AccountRef::number("ACC100"), dec("0.74"), 1),
    ];
    for request in requests {
        engine.submit(request).unwrap();
    }

    let projector = StatementProjector::new(Arc::clone(engine.store()));
    let statement = projector
        .statement(s.account_id, StatementWindow::last_months(1))
        .unwrap();

    let current = balance(&engine, s.account_id);
    assert_eq!(current, dec("109.00"));
    assert_eq!(statement.closing_balance, current);
    assert_eq!(statement.opening_balance, Decimal::ZERO);
    assert_eq!(
        statement.opening_balance + statement.total_credits - statement.total_debits,
        current
    );
    assert_eq!(statement.lines.len(), 6);
    assert_eq!(statement.lines.last().unwrap().running_balance, current);
}

#[test]
fn test_ledger_summary_is_consistent_during_transfers() {
    let engine = ledger();
    let projector = StatementProjector::new(Arc::clone(engine.store()));
    open(&engine, "ACC300", "1000.00");
    open(&engine, "ACC400", "1000.00");

    thread::scope(|scope| {
        for (from, to) in [("ACC300", "ACC400"), ("ACC400", "ACC300")] {
            let engine = engine.clone();
            scope.spawn(move || {
                for _ in 0..500 {
                    engine
                        .submit_with_retry(MovementRequest::transfer(
                            AccountRef::number(from),
                            AccountRef::number(to),
                            dec("1.00"),
                            1,
                        ))
                        .unwrap();
                }
            });
        }

        for _ in 0..500 {
            let summary = projector.ledger_summary().unwrap();
            assert_eq!(summary.total_accounts, 2);
            assert_eq!(summary.total_balance, dec("2000.00"));
        }
    });
}
