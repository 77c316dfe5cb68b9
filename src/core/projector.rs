//! Statement and history projections
//!
//! Pure read-side views derived from the immutable transaction log. Nothing
//! here writes to the store.
//!
//! A statement walks *backward* from the account's current balance over every
//! completed transaction since the window start, including the ones after the
//! window end, so windows that close before "now" are still exact.

use crate::core::traits::{LedgerStore, SortOrder, TransactionQuery};
use crate::types::{
    Account, AccountId, AccountNumber, AccountType, Direction, LedgerError, Transaction,
    TransactionStatus,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Time range covered by a statement (inclusive at both ends)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementWindow {
    pub start: DateTime<Utc>,
    /// `None` means "now"
    pub end: Option<DateTime<Utc>>,
}

impl StatementWindow {
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// The last `months` months, counted as 30 days each, ending now
    pub fn last_months(months: u32) -> Self {
        Self {
            start: Utc::now() - Duration::days(30 * i64::from(months)),
            end: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementLine {
    pub transaction: Transaction,
    pub direction: Direction,
    /// Account balance right after this transaction
    pub running_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub account_number: AccountNumber,
    pub holder_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Balance just before the window
    pub opening_balance: Decimal,
    /// Balance at the end of the window
    pub closing_balance: Decimal,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    /// Oldest first
    pub lines: Vec<StatementLine>,
}

/// One page of filtered history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub transactions: Vec<Transaction>,
    /// Matches across all pages
    pub total: usize,
    /// Credits to the queried accounts on this page
    pub total_credits: Decimal,
    /// Debits from the queried accounts on this page
    pub total_debits: Decimal,
    /// Pending transactions on this page
    pub pending_count: usize,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypeSummary {
    pub accounts: usize,
    pub balance: Decimal,
}

/// Ledger-wide totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub total_accounts: usize,
    pub active_accounts: usize,
    pub total_balance: Decimal,
    pub by_type: BTreeMap<AccountType, TypeSummary>,
    pub completed_transactions: usize,
    pub completed_volume: Decimal,
}

/// Read-side projections over a ledger store
pub struct StatementProjector<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> StatementProjector<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Statement of `account_id` over `window`
    ///
    /// The account row is locked while its balance and transactions are read,
    /// so the walk starts from a balance that matches the log exactly.
    ///
    /// # Returns
    ///
    /// * `Ok(Statement)` - Lines oldest first with the balance after each line
    /// * `Err(LedgerError::AccountNotFound)` - If the account does not exist
    /// * `Err(LedgerError::Contention)` - If the account stayed locked too long
    pub fn statement(
        &self,
        account_id: AccountId,
        window: StatementWindow,
    ) -> Result<Statement, LedgerError> {
        let end = window.end.unwrap_or_else(Utc::now);
        if end < window.start {
            return Err(LedgerError::invalid_operation(
                "statement window ends before it starts",
            ));
        }

        let query = TransactionQuery::for_account(account_id)
            .with_status(TransactionStatus::Completed)
            .between(Some(window.start), None)
            .ordered(SortOrder::Descending);

        let (account, newest_first): (Account, Vec<Transaction>) =
            self.store.with_atomic_unit(|unit| {
                unit.lock_accounts(&[account_id])?;
                let account = unit.account(account_id)?;
                let transactions = self.store.query_transactions(&query)?;
                Ok((account, transactions))
            })?;

        let mut balance = account.balance;
        let mut closing_balance = None;
        let mut total_credits = Decimal::ZERO;
        let mut total_debits = Decimal::ZERO;
        let mut lines = Vec::new();

        for txn in newest_first {
            let Some(direction) = txn.direction_for(account_id) else {
                continue;
            };
            let balance_after = balance;
            balance = match direction {
                Direction::Credit => balance - txn.amount,
                Direction::Debit => balance + txn.amount,
            };

            if txn.initiated_at > end {
                continue;
            }
            closing_balance.get_or_insert(balance_after);
            match direction {
                Direction::Credit => total_credits += txn.amount,
                Direction::Debit => total_debits += txn.amount,
            }
            lines.push(StatementLine {
                transaction: txn,
                direction,
                running_balance: balance_after,
            });
        }
        lines.reverse();

        Ok(Statement {
            account_number: account.account_number,
            holder_name: account.holder_name,
            start: window.start,
            end,
            opening_balance: balance,
            // no lines inside the window: the balance never moved in it
            closing_balance: closing_balance.unwrap_or(balance),
            total_credits,
            total_debits,
            lines,
        })
    }

    /// Filtered, paginated transaction history
    pub fn history(&self, query: &TransactionQuery) -> Result<HistoryPage, LedgerError> {
        let transactions = self.store.query_transactions(query)?;
        let total = self.store.count_transactions(query)?;

        let mut total_credits = Decimal::ZERO;
        let mut total_debits = Decimal::ZERO;
        let mut pending_count = 0;
        for txn in &transactions {
            let credited = txn
                .to_account_id
                .is_some_and(|id| query.accounts.is_empty() || query.accounts.contains(&id));
            let debited = txn
                .from_account_id
                .is_some_and(|id| query.accounts.is_empty() || query.accounts.contains(&id));
            if credited {
                total_credits += txn.amount;
            }
            if debited {
                total_debits += txn.amount;
            }
            if txn.status == TransactionStatus::Pending {
                pending_count += 1;
            }
        }

        Ok(HistoryPage {
            transactions,
            total,
            total_credits,
            total_debits,
            pending_count,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Totals across every account and completed transaction
    pub fn ledger_summary(&self) -> Result<LedgerSummary, LedgerError> {
        let mut summary = LedgerSummary::default();
        for account in self.store.list_accounts()? {
            summary.total_accounts += 1;
            if account.is_active() {
                summary.active_accounts += 1;
            }
            summary.total_balance += account.balance;
            let per_type = summary.by_type.entry(account.account_type).or_default();
            per_type.accounts += 1;
            per_type.balance += account.balance;
        }

        let completed = self.store.query_transactions(
            &TransactionQuery::default().with_status(TransactionStatus::Completed),
        )?;
        summary.completed_transactions = completed.len();
        summary.completed_volume = completed.iter().map(|t| t.amount).sum();
        Ok(summary)
    }
}
