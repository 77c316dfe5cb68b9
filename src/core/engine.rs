//! Money movement orchestration
//!
//! This module provides `MovementEngine`, the stateless coordinator that turns
//! movement requests (transfer, deposit, withdrawal, payment) into exactly one
//! committed Transaction plus the matching balance deltas, or into a typed
//! error with no observable state change.
//!
//! # Architecture
//!
//! ```text
//! MovementEngine<S: LedgerStore>
//!     ├── Arc<S>                  (accounts, transactions, row locks)
//!     ├── Arc<dyn AuditSink>      (best-effort events after commit / rejection)
//!     ├── Arc<LedgerConfig>
//!     └── AccountNumberGenerator  (account opening)
//! ```
//!
//! # Processing a movement
//!
//! 1. Replay: an existing transaction with the same idempotency key is
//!    returned as-is, provided the request matches it.
//! 2. Validation against committed state: amount, endpoints, account status,
//!    self-transfer, available funds. Failures here write nothing.
//! 3. One atomic unit: lock every account in ascending id order, re-check
//!    under the locks, insert the transaction as `pending`, apply the debit
//!    and the credit, mark it `completed`, commit.
//! 4. Audit, strictly after the unit returned.
//!
//! The engine keeps no state between requests, so clones can run on any
//! number of threads against the same store.

use crate::config::{truncate_chars, LedgerConfig};
use crate::core::account_number::AccountNumberGenerator;
use crate::core::audit::{AuditEvent, AuditSink, EntityType, TracingAuditSink};
use crate::core::traits::LedgerStore;
use crate::types::{
    Account, AccountBalance, AccountId, AccountRef, AccountStatus, AccountType, BeneficiaryId,
    ErrorKind, LedgerError, MovementReceipt, MovementRequest, NewAccount, OwnerId, Transaction,
    TransactionStatus, TransactionType, TransactionUid, UserId,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause before retry `n` is `n * RETRY_BACKOFF`
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Request to open a new account with a generated number
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAccount {
    pub owner_id: OwnerId,
    pub holder_name: String,
    pub account_type: AccountType,
    /// Posted as an ordinary deposit once the account exists
    pub initial_deposit: Option<Decimal>,
    pub initiated_by: UserId,
}

/// Result of [`MovementEngine::open_account`]
#[derive(Debug, Clone, PartialEq)]
pub struct AccountOpening {
    pub account: Account,
    pub initial_deposit: Option<MovementReceipt>,
}

/// What the atomic unit decided
enum UnitOutcome {
    Committed(Transaction, Vec<Account>),
    Replay(Transaction),
}

/// Stateless money movement coordinator
pub struct MovementEngine<S: LedgerStore> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
    config: Arc<LedgerConfig>,
    numbers: AccountNumberGenerator,
}

impl<S: LedgerStore> Clone for MovementEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            audit: Arc::clone(&self.audit),
            config: Arc::clone(&self.config),
            numbers: self.numbers.clone(),
        }
    }
}

impl<S: LedgerStore> MovementEngine<S> {
    /// Create an engine over `store` that audits through tracing
    ///
    /// # Arguments
    ///
    /// * `store` - Shared ledger store
    /// * `config` - Ledger tunables (amount scale, retries, field lengths)
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        let numbers = AccountNumberGenerator::new(config.account_number.clone());
        Self {
            store,
            audit: Arc::new(TracingAuditSink),
            config: Arc::new(config),
            numbers,
        }
    }

    /// Replace the audit sink
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Look up an account by id or number
    pub fn account(&self, account: &AccountRef) -> Result<Account, LedgerError> {
        let found = match account {
            AccountRef::Id(id) => self.store.get_account(*id),
            AccountRef::Number(number) => self.store.get_account_by_number(number),
        };
        // Never echo internal ids back to the caller
        found.map_err(|err| match err {
            LedgerError::AccountNotFound { .. } => LedgerError::account_not_found(account),
            other => other,
        })
    }

    /// Accounts owned by `owner_id`, optionally only the active ones
    pub fn accounts_for_owner(
        &self,
        owner_id: OwnerId,
        active_only: bool,
    ) -> Result<Vec<Account>, LedgerError> {
        Ok(self
            .store
            .accounts_for_owner(owner_id)?
            .into_iter()
            .filter(|account| !active_only || account.is_active())
            .collect())
    }

    /// Check that `amount` is positive and fits the currency scale
    pub fn validate_amount(&self, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(amount, "must be greater than zero"));
        }
        if amount.normalize().scale() > self.config.currency_scale {
            return Err(LedgerError::invalid_amount(
                amount,
                &format!(
                    "more than {} decimal places",
                    self.config.currency_scale
                ),
            ));
        }
        Ok(())
    }

    /// Execute one movement request
    ///
    /// # Arguments
    ///
    /// * `request` - The movement; a fresh idempotency key is generated when absent
    ///
    /// # Returns
    ///
    /// * `Ok(MovementReceipt)` - The completed transaction and the touched balances;
    ///   `replayed` is set when the key matched an earlier movement
    /// * `Err(LedgerError::InvalidAmount)` - Non-positive or over-precise amount
    /// * `Err(LedgerError::AccountNotFound)` - Unknown account, or destination not active
    /// * `Err(LedgerError::AccountInactive)` - Source frozen or closed
    /// * `Err(LedgerError::InsufficientFunds)` - Source balance below the amount
    /// * `Err(LedgerError::InvalidOperation)` - Self-transfer, endpoints not matching the
    ///   type, or an idempotency key reused for a different request
    /// * `Err(LedgerError::Contention)` - Lock wait exceeded; retry from scratch
    pub fn submit(&self, request: MovementRequest) -> Result<MovementReceipt, LedgerError> {
        let uid = request
            .idempotency_key
            .clone()
            .unwrap_or_else(TransactionUid::generate);

        let result = self.execute(&uid, &request);
        match &result {
            Ok(receipt) if receipt.replayed => {
                debug!(transaction_uid = %uid, "Replayed idempotent request");
            }
            Ok(receipt) => {
                info!(
                    transaction_uid = %uid,
                    tx_type = %request.tx_type,
                    amount = %request.amount,
                    "Movement committed"
                );
                self.audit.record(self.committed_event(&request, receipt));
            }
            Err(err) => {
                match err.kind() {
                    ErrorKind::Contention => {
                        warn!(transaction_uid = %uid, error = %err, "Movement hit contention")
                    }
                    ErrorKind::StorageFailure | ErrorKind::ArithmeticOverflow => {
                        error!(transaction_uid = %uid, error = %err, "Movement failed")
                    }
                    _ => debug!(transaction_uid = %uid, error = %err, "Movement rejected"),
                }
                self.audit.record(self.rejected_event(&uid, &request, err));
            }
        }
        result
    }

    /// Execute a request, re-running it from scratch on `Contention`
    ///
    /// Gives up after `max_retries` retries and returns the last error. The
    /// idempotency key is fixed before the first attempt, so a retry can never
    /// apply the movement twice.
    pub fn submit_with_retry(
        &self,
        mut request: MovementRequest,
    ) -> Result<MovementReceipt, LedgerError> {
        if request.idempotency_key.is_none() {
            request.idempotency_key = Some(TransactionUid::generate());
        }

        let mut attempt = 0;
        loop {
            match self.submit(request.clone()) {
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, max_retries = self.config.max_retries, "Retrying movement");
                    thread::sleep(RETRY_BACKOFF * attempt);
                }
                result => return result,
            }
        }
    }

    /// Transfer to a saved beneficiary of `user_id`
    ///
    /// The beneficiary must be active and owned by the user; otherwise
    /// `BeneficiaryNotFound`.
    pub fn transfer_to_beneficiary(
        &self,
        user_id: UserId,
        beneficiary_id: BeneficiaryId,
        from: impl Into<AccountRef>,
        amount: Decimal,
        idempotency_key: Option<TransactionUid>,
    ) -> Result<MovementReceipt, LedgerError> {
        let beneficiary = self
            .store
            .get_beneficiary(beneficiary_id)?
            .filter(|b| b.user_id == user_id && b.is_active)
            .ok_or_else(|| LedgerError::beneficiary_not_found(beneficiary_id))?;

        let mut request = MovementRequest::transfer(
            from,
            AccountRef::Id(beneficiary.beneficiary_account_id),
            amount,
            user_id,
        )
        .with_description(format!("Transfer to {}", beneficiary.nickname));
        request.idempotency_key = idempotency_key;
        self.submit(request)
    }

    /// Open an account under a freshly generated number
    ///
    /// Number collisions reported by the store are retried up to the configured
    /// attempt limit. The optional initial deposit is posted as a regular
    /// `deposit` transaction after the account exists, so the balance still
    /// only changes through a committed transaction.
    pub fn open_account(&self, request: OpenAccount) -> Result<AccountOpening, LedgerError> {
        if let Some(amount) = request.initial_deposit {
            self.validate_amount(amount)?;
        }

        let mut last_error = None;
        let mut opened = None;
        for attempt in 1..=self.numbers.max_attempts() {
            let candidate = NewAccount {
                account_number: self.numbers.generate(Some(request.owner_id)),
                owner_id: request.owner_id,
                holder_name: request.holder_name.trim().to_string(),
                account_type: request.account_type,
            };
            match self.store.insert_account(candidate, Utc::now()) {
                Ok(account) => {
                    opened = Some(account);
                    break;
                }
                Err(err @ LedgerError::DuplicateAccountNumber { .. }) => {
                    warn!(attempt, error = %err, "Account number collision, regenerating");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let account = match opened {
            Some(account) => account,
            None => {
                return Err(last_error.unwrap_or_else(|| {
                    LedgerError::storage_failure("account number generation exhausted")
                }))
            }
        };
        info!(account = %account.account_number, owner = account.owner_id, "Account opened");
        self.audit.record(
            AuditEvent::new(
                request.initiated_by,
                "OPEN_ACCOUNT",
                EntityType::Account,
                account.account_number.clone(),
            )
            .with_new(account_json(&account)),
        );

        let initial_deposit = match request.initial_deposit {
            Some(amount) => Some(
                self.submit(
                    MovementRequest::deposit(
                        AccountRef::Id(account.account_id),
                        amount,
                        request.initiated_by,
                    )
                    .with_description("Initial deposit"),
                )?,
            ),
            None => None,
        };

        let account = self.store.get_account(account.account_id)?;
        Ok(AccountOpening {
            account,
            initial_deposit,
        })
    }

    /// Register an account under a caller-chosen number
    pub fn register_account(
        &self,
        account: NewAccount,
        initiated_by: UserId,
    ) -> Result<Account, LedgerError> {
        let account = self.store.insert_account(account, Utc::now())?;
        debug!(account = %account.account_number, "Account registered");
        self.audit.record(
            AuditEvent::new(
                initiated_by,
                "OPEN_ACCOUNT",
                EntityType::Account,
                account.account_number.clone(),
            )
            .with_new(account_json(&account)),
        );
        Ok(account)
    }

    /// Move an account between `active`, `frozen` and `closed`
    ///
    /// `closed` is terminal and only reachable with a zero balance.
    pub fn set_account_status(
        &self,
        account: &AccountRef,
        status: AccountStatus,
        initiated_by: UserId,
    ) -> Result<Account, LedgerError> {
        let current = self.account(account)?;
        let id = current.account_id;

        let (previous, updated) = self.store.with_atomic_unit(|unit| {
            unit.lock_accounts(&[id])?;
            let locked = unit.account(id)?;
            if !locked.status.can_transition_to(status) {
                return Err(LedgerError::invalid_operation(format!(
                    "account {} cannot move from {} to {}",
                    locked.account_number, locked.status, status
                )));
            }
            if status == AccountStatus::Closed && !locked.balance.is_zero() {
                return Err(LedgerError::invalid_operation(format!(
                    "account {} still holds {}",
                    locked.account_number, locked.balance
                )));
            }
            let updated = unit.set_status(id, status)?;
            Ok((locked.status, updated))
        })?;

        info!(account = %updated.account_number, from = %previous, to = %status, "Account status changed");
        self.audit.record(
            AuditEvent::new(
                initiated_by,
                "ACCOUNT_STATUS_CHANGE",
                EntityType::Account,
                updated.account_number.clone(),
            )
            .with_old(json!({ "status": previous }))
            .with_new(json!({ "status": status })),
        );
        Ok(updated)
    }

    fn execute(
        &self,
        uid: &TransactionUid,
        request: &MovementRequest,
    ) -> Result<MovementReceipt, LedgerError> {
        if let Some(existing) = self.store.find_transaction(uid)? {
            return self.replay(existing, request);
        }

        self.validate_amount(request.amount)?;
        self.validate_shape(request)?;

        // Destination first: an unknown or inactive destination is reported
        // as not found, whatever the state of the source
        let destination = match &request.to {
            Some(to) => {
                let account = self.account(to)?;
                if !account.is_active() {
                    return Err(LedgerError::account_not_found(&account.account_number));
                }
                Some(account)
            }
            None => None,
        };
        let source = match &request.from {
            Some(from) => Some(self.account(from)?),
            None => None,
        };

        if let (Some(src), Some(dst)) = (&source, &destination) {
            if src.account_id == dst.account_id {
                return Err(LedgerError::invalid_operation(format!(
                    "cannot transfer from account {} to itself",
                    src.account_number
                )));
            }
        }
        if let Some(src) = &source {
            check_source(src, request.amount)?;
        }

        let description = truncate_chars(
            &request.effective_description(),
            self.config.max_description_len,
        );
        let source_id = source.as_ref().map(|a| a.account_id);
        let destination_id = destination.as_ref().map(|a| a.account_id);
        let lock_set: Vec<AccountId> = source_id.into_iter().chain(destination_id).collect();

        let outcome = self.store.with_atomic_unit(|unit| {
            unit.lock_accounts(&lock_set)?;

            // A concurrent request with the same key may have committed while
            // this one waited for the locks
            if let Some(existing) = unit.find_transaction(uid)? {
                return Ok(UnitOutcome::Replay(existing));
            }

            if let Some(id) = source_id {
                check_source(&unit.account(id)?, request.amount)?;
            }
            if let Some(id) = destination_id {
                let dst = unit.account(id)?;
                if !dst.is_active() {
                    return Err(LedgerError::account_not_found(&dst.account_number));
                }
            }

            unit.insert_transaction(Transaction::pending(
                uid.clone(),
                request.tx_type,
                source_id,
                destination_id,
                request.amount,
                description,
                request.initiated_by,
                Utc::now(),
            ))?;

            let mut touched = Vec::with_capacity(2);
            if let Some(id) = source_id {
                touched.push(unit.apply_balance_delta(id, -request.amount, Decimal::ZERO)?);
            }
            if let Some(id) = destination_id {
                touched.push(unit.apply_balance_delta(id, request.amount, Decimal::ZERO)?);
            }

            let completed = unit.finalize_transaction(uid, TransactionStatus::Completed, None)?;
            Ok(UnitOutcome::Committed(completed, touched))
        });

        match outcome {
            Ok(UnitOutcome::Committed(transaction, touched)) => Ok(MovementReceipt {
                transaction,
                balances: touched.iter().map(AccountBalance::from).collect(),
                replayed: false,
            }),
            Ok(UnitOutcome::Replay(existing)) => self.replay(existing, request),
            // Same key committed by a request on other accounts between our
            // check and our commit
            Err(LedgerError::DuplicateRequest { .. }) => match self.store.find_transaction(uid)? {
                Some(existing) => self.replay(existing, request),
                None => Err(LedgerError::contention(format!("transaction {}", uid))),
            },
            Err(err) => Err(err),
        }
    }

    fn validate_shape(&self, request: &MovementRequest) -> Result<(), LedgerError> {
        let tx_type = request.tx_type;
        if tx_type.has_source() != request.from.is_some()
            || tx_type.has_destination() != request.to.is_some()
        {
            return Err(LedgerError::invalid_operation(format!(
                "endpoints do not match a {} request",
                tx_type
            )));
        }
        if (tx_type == TransactionType::Payment) != request.payee.is_some() {
            return Err(LedgerError::invalid_operation(
                "a payee is required for payments and only for payments",
            ));
        }
        Ok(())
    }

    /// Answer a request whose key already has a committed transaction
    fn replay(
        &self,
        existing: Transaction,
        request: &MovementRequest,
    ) -> Result<MovementReceipt, LedgerError> {
        let same_request = existing.tx_type == request.tx_type
            && existing.amount == request.amount
            && self.refers_to(request.from.as_ref(), existing.from_account_id)
            && self.refers_to(request.to.as_ref(), existing.to_account_id);
        if !same_request {
            return Err(LedgerError::invalid_operation(format!(
                "idempotency key {} was already used for a different request",
                existing.transaction_uid
            )));
        }

        let balances = [existing.from_account_id, existing.to_account_id]
            .into_iter()
            .flatten()
            .map(|id| self.store.get_account(id).map(|a| AccountBalance::from(&a)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MovementReceipt {
            transaction: existing,
            balances,
            replayed: true,
        })
    }

    fn refers_to(&self, reference: Option<&AccountRef>, id: Option<AccountId>) -> bool {
        match (reference, id) {
            (None, None) => true,
            (Some(AccountRef::Id(given)), Some(id)) => *given == id,
            (Some(reference @ AccountRef::Number(_)), Some(id)) => self
                .account(reference)
                .map(|a| a.account_id == id)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn committed_event(&self, request: &MovementRequest, receipt: &MovementReceipt) -> AuditEvent {
        let txn = &receipt.transaction;
        AuditEvent::new(
            request.initiated_by,
            txn.tx_type.as_str().to_uppercase(),
            EntityType::Transaction,
            txn.transaction_uid.to_string(),
        )
        .with_new(json!({
            "transaction_id": txn.transaction_id,
            "type": txn.tx_type,
            "amount": txn.amount,
            "status": txn.status,
            "description": txn.description,
            "balances": receipt.balances,
        }))
    }

    fn rejected_event(
        &self,
        uid: &TransactionUid,
        request: &MovementRequest,
        err: &LedgerError,
    ) -> AuditEvent {
        AuditEvent::new(
            request.initiated_by,
            format!("{}_REJECTED", request.tx_type.as_str().to_uppercase()),
            EntityType::Transaction,
            uid.to_string(),
        )
        .with_new(json!({
            "type": request.tx_type,
            "amount": request.amount,
            "from": request.from.as_ref().map(ToString::to_string),
            "to": request.to.as_ref().map(ToString::to_string),
            "error": err.kind(),
            "message": err.to_string(),
        }))
    }
}

/// Source must be active and cover `amount`
fn check_source(source: &Account, amount: Decimal) -> Result<(), LedgerError> {
    if !source.is_active() {
        return Err(LedgerError::account_inactive(
            &source.account_number,
            source.status,
        ));
    }
    if source.available_balance < amount {
        return Err(LedgerError::insufficient_funds(
            &source.account_number,
            source.available_balance,
            amount,
        ));
    }
    Ok(())
}

fn account_json(account: &Account) -> serde_json::Value {
    json!({
        "account_number": account.account_number,
        "owner_id": account.owner_id,
        "type": account.account_type,
        "status": account.status,
        "balance": account.balance,
    })
}
