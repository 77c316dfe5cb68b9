//! Transaction-related types for the retail ledger
//!
//! This module defines the immutable Transaction record, its type and status,
//! and the externally visible idempotency token.

use super::account::AccountId;
use super::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Internal transaction sequence number assigned by the store
pub type TransactionId = u64;

/// Identifier of the authenticated user initiating a movement
pub type UserId = u64;

/// Longest accepted idempotency token
pub const MAX_UID_LEN: usize = 64;

/// Externally exposed idempotency token (`transaction_uid`)
///
/// Unique across the ledger. Either supplied by the caller or generated as a
/// random v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionUid(String);

impl TransactionUid {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        TransactionUid(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TransactionUid {
    type Err = LedgerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::invalid_operation("idempotency key is empty"));
        }
        if trimmed.len() > MAX_UID_LEN {
            return Err(LedgerError::invalid_operation(format!(
                "idempotency key longer than {} characters",
                MAX_UID_LEN
            )));
        }
        Ok(TransactionUid(trimmed.to_string()))
    }
}

impl fmt::Display for TransactionUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kinds of money movement recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Debit one customer account and credit another
    Transfer,

    /// Credit funds to an account from outside the ledger
    Deposit,

    /// Debit funds from an account to outside the ledger
    Withdrawal,

    /// Debit funds from an account to an external biller
    Payment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Payment => "payment",
        }
    }

    /// Whether this type debits a ledger account
    pub fn has_source(&self) -> bool {
        !matches!(self, TransactionType::Deposit)
    }

    /// Whether this type credits a ledger account
    pub fn has_destination(&self) -> bool {
        matches!(self, TransactionType::Transfer | TransactionType::Deposit)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transfer" => Ok(TransactionType::Transfer),
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "payment" => Ok(TransactionType::Payment),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// Transaction lifecycle: created `Pending`, finalized exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Side of a transaction from one account's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

/// Immutable ledger record of one money movement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// Store-assigned sequence number (0 until inserted)
    pub transaction_id: TransactionId,

    pub transaction_uid: TransactionUid,

    /// Debited account; `None` for deposits
    pub from_account_id: Option<AccountId>,

    /// Credited account; `None` for withdrawals and payments
    pub to_account_id: Option<AccountId>,

    pub tx_type: TransactionType,

    /// Always positive, fixed-point
    pub amount: Decimal,

    pub description: String,

    pub status: TransactionStatus,

    pub initiated_by: UserId,

    pub initiated_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    pub failure_reason: Option<String>,
}

impl Transaction {
    /// Build a pending transaction that still has to be inserted
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        transaction_uid: TransactionUid,
        tx_type: TransactionType,
        from_account_id: Option<AccountId>,
        to_account_id: Option<AccountId>,
        amount: Decimal,
        description: String,
        initiated_by: UserId,
        initiated_at: DateTime<Utc>,
    ) -> Self {
        Transaction {
            transaction_id: 0,
            transaction_uid,
            from_account_id,
            to_account_id,
            tx_type,
            amount,
            description,
            status: TransactionStatus::Pending,
            initiated_by,
            initiated_at,
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Check the record-level invariants before it enters the store
    ///
    /// `amount > 0`, at least one endpoint, and endpoints consistent with
    /// the transaction type.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(
                self.amount,
                "must be greater than zero",
            ));
        }
        if self.from_account_id.is_none() && self.to_account_id.is_none() {
            return Err(LedgerError::invalid_operation(
                "transaction needs a source or a destination account",
            ));
        }
        if self.tx_type.has_source() != self.from_account_id.is_some()
            || self.tx_type.has_destination() != self.to_account_id.is_some()
        {
            return Err(LedgerError::invalid_operation(format!(
                "endpoints do not match a {} transaction",
                self.tx_type
            )));
        }
        Ok(())
    }

    /// Move out of `Pending`; a finalized transaction is frozen forever
    pub fn finalize(
        &mut self,
        status: TransactionStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.status != TransactionStatus::Pending {
            return Err(LedgerError::invalid_operation(format!(
                "transaction {} is already {}",
                self.transaction_uid, self.status
            )));
        }
        if status == TransactionStatus::Pending {
            return Err(LedgerError::invalid_operation(
                "a transaction can only be finalized as completed or failed",
            ));
        }
        self.status = status;
        self.completed_at = Some(at);
        self.failure_reason = reason;
        Ok(())
    }

    pub fn touches(&self, account_id: AccountId) -> bool {
        self.from_account_id == Some(account_id) || self.to_account_id == Some(account_id)
    }

    /// Whether this transaction credits or debits `account_id`
    pub fn direction_for(&self, account_id: AccountId) -> Option<Direction> {
        if self.to_account_id == Some(account_id) {
            Some(Direction::Credit)
        } else if self.from_account_id == Some(account_id) {
            Some(Direction::Debit)
        } else {
            None
        }
    }
}
