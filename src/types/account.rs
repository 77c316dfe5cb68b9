//! Account-related types for the retail ledger
//!
//! This module defines the Account record held by the ledger store together
//! with its identifiers, type and lifecycle status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Internal, stable account identifier assigned by the store
///
/// Also defines the global lock order: accounts are always locked in
/// ascending `AccountId` order.
pub type AccountId = u64;

/// Identifier of the customer owning an account
pub type OwnerId = u64;

/// External, human-facing account number (unique across the ledger)
pub type AccountNumber = String;

/// Kind of account a customer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Checking,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Checking => "checking",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "savings" => Ok(AccountType::Savings),
            "checking" => Ok(AccountType::Checking),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

/// Lifecycle status of an account
///
/// Accounts are never physically deleted; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }

    /// Whether a transition from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: AccountStatus) -> bool {
        match (self, next) {
            (AccountStatus::Closed, _) => false,
            (current, next) => *current != next,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer account state
///
/// `balance` and `available_balance` move in lockstep (no holds are modeled)
/// and `balance` is never negative. Balances only change when a movement
/// commits through the store's atomic unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    /// Internal identifier, never shown to customers
    pub account_id: AccountId,

    /// External account number, e.g. `ACC123456784821042`
    pub account_number: AccountNumber,

    pub owner_id: OwnerId,

    /// Name of the account holder, used as the default beneficiary display name
    pub holder_name: String,

    pub account_type: AccountType,

    /// Ledger balance
    pub balance: Decimal,

    /// Spendable balance; equal to `balance` at rest
    pub available_balance: Decimal,

    pub status: AccountStatus,

    pub opened_at: DateTime<Utc>,

    /// Time of the last committed movement touching this account
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new active account with zero balances
    pub fn new(
        account_id: AccountId,
        account_number: AccountNumber,
        owner_id: OwnerId,
        holder_name: String,
        account_type: AccountType,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Account {
            account_id,
            account_number,
            owner_id,
            holder_name,
            account_type,
            balance: Decimal::ZERO,
            available_balance: Decimal::ZERO,
            status: AccountStatus::Active,
            opened_at,
            last_transaction_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Request to register a new account in the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub account_number: AccountNumber,
    pub owner_id: OwnerId,
    pub holder_name: String,
    pub account_type: AccountType,
}

/// Balance snapshot of one account, returned with movement receipts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account_number: AccountNumber,
    pub balance: Decimal,
    pub available_balance: Decimal,
}

impl From<&Account> for AccountBalance {
    fn from(account: &Account) -> Self {
        AccountBalance {
            account_number: account.account_number.clone(),
            balance: account.balance,
            available_balance: account.available_balance,
        }
    }
}

/// Normalize a customer-entered account number (trim + uppercase)
pub fn normalize_account_number(raw: &str) -> AccountNumber {
    raw.trim().to_uppercase()
}
