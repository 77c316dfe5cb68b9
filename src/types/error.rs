//! Error types for the retail ledger
//!
//! This module defines every error the ledger engine, store, beneficiary
//! directory and CLI pipeline can produce.
//!
//! # Error Categories
//!
//! - **Request errors**: invalid amount, unknown or inactive account, self-transfer,
//!   insufficient funds. Detected before any ledger row is written.
//! - **Concurrency errors**: `Contention` is the only retryable category; the caller
//!   may re-run the whole operation from scratch.
//! - **Storage errors**: unexpected backend faults. Fatal to the request, never
//!   partially applied.
//! - **File errors**: I/O and CSV failures of the replay CLI.
//!
//! Messages name accounts by their external account number, never by the
//! internal id.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Main error type for the ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Amount is zero, negative, too precise or not a number
    #[error("Invalid amount '{amount}': {reason}")]
    InvalidAmount {
        /// The amount as supplied
        amount: String,
        /// Why it was rejected
        reason: String,
    },

    /// No account matches the reference, or the destination is not active
    #[error("Account {account} not found")]
    AccountNotFound {
        /// Account reference as supplied by the caller
        account: String,
    },

    /// Source account exists but cannot move money
    #[error("Account {account} is {status}")]
    AccountInactive {
        account: String,
        /// Current status of the account
        status: String,
    },

    /// Debit would take the balance below zero
    #[error("Insufficient funds in account {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: String,
        available: Decimal,
        requested: Decimal,
    },

    /// Request is structurally invalid (self-transfer, mismatched endpoints, ...)
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// A transaction with this idempotency key already exists
    ///
    /// Not surfaced by the movement engine: it returns the prior outcome instead.
    #[error("Duplicate request {uid}")]
    DuplicateRequest { uid: String },

    /// Transient lock conflict; the whole operation may be retried
    #[error("Contention on {resource}, retry the operation")]
    Contention { resource: String },

    /// Unexpected backend failure; nothing was applied
    #[error("Storage failure: {message}")]
    StorageFailure { message: String },

    /// Account number already taken in the store
    #[error("Account number {number} already exists")]
    DuplicateAccountNumber { number: String },

    /// Balance arithmetic would overflow
    #[error("Arithmetic overflow in {operation} for account {account}")]
    ArithmeticOverflow { operation: String, account: String },

    #[error("Beneficiary {beneficiary} not found")]
    BeneficiaryNotFound { beneficiary: String },

    /// Beneficiary already saved and active for this user
    #[error("Account {account} is already a beneficiary")]
    BeneficiaryExists { account: String },

    /// A user tried to save one of their own accounts as a beneficiary
    #[error("Account {account} belongs to the requesting user")]
    SelfReference { account: String },

    /// I/O error while reading or writing files
    #[error("I/O error: {message}")]
    IoError { message: String },

    /// CSV parsing error
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError { line: Option<u64>, message: String },
}

/// Stable classification of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidAmount,
    AccountNotFound,
    AccountInactive,
    InsufficientFunds,
    InvalidOperation,
    DuplicateRequest,
    Contention,
    StorageFailure,
    DuplicateAccountNumber,
    ArithmeticOverflow,
    BeneficiaryNotFound,
    BeneficiaryExists,
    SelfReference,
    Io,
    Parse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            LedgerError::AccountNotFound { .. } => ErrorKind::AccountNotFound,
            LedgerError::AccountInactive { .. } => ErrorKind::AccountInactive,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            LedgerError::DuplicateRequest { .. } => ErrorKind::DuplicateRequest,
            LedgerError::Contention { .. } => ErrorKind::Contention,
            LedgerError::StorageFailure { .. } => ErrorKind::StorageFailure,
            LedgerError::DuplicateAccountNumber { .. } => ErrorKind::DuplicateAccountNumber,
            LedgerError::ArithmeticOverflow { .. } => ErrorKind::ArithmeticOverflow,
            LedgerError::BeneficiaryNotFound { .. } => ErrorKind::BeneficiaryNotFound,
            LedgerError::BeneficiaryExists { .. } => ErrorKind::BeneficiaryExists,
            LedgerError::SelfReference { .. } => ErrorKind::SelfReference,
            LedgerError::IoError { .. } => ErrorKind::Io,
            LedgerError::ParseError { .. } => ErrorKind::Parse,
        }
    }

    /// Only contention may be retried without changing the request
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Contention { .. })
    }

    pub fn invalid_amount(amount: impl fmt::Display, reason: &str) -> Self {
        LedgerError::InvalidAmount {
            amount: amount.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn account_not_found(account: impl fmt::Display) -> Self {
        LedgerError::AccountNotFound {
            account: account.to_string(),
        }
    }

    pub fn account_inactive(account: &str, status: impl fmt::Display) -> Self {
        LedgerError::AccountInactive {
            account: account.to_string(),
            status: status.to_string(),
        }
    }

    pub fn insufficient_funds(account: &str, available: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            account: account.to_string(),
            available,
            requested,
        }
    }

    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        LedgerError::InvalidOperation {
            reason: reason.into(),
        }
    }

    pub fn duplicate_request(uid: impl fmt::Display) -> Self {
        LedgerError::DuplicateRequest {
            uid: uid.to_string(),
        }
    }

    pub fn contention(resource: impl Into<String>) -> Self {
        LedgerError::Contention {
            resource: resource.into(),
        }
    }

    pub fn storage_failure(message: impl Into<String>) -> Self {
        LedgerError::StorageFailure {
            message: message.into(),
        }
    }

    pub fn duplicate_account_number(number: &str) -> Self {
        LedgerError::DuplicateAccountNumber {
            number: number.to_string(),
        }
    }

    pub fn arithmetic_overflow(operation: &str, account: &str) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            account: account.to_string(),
        }
    }

    pub fn beneficiary_not_found(beneficiary: impl fmt::Display) -> Self {
        LedgerError::BeneficiaryNotFound {
            beneficiary: beneficiary.to_string(),
        }
    }

    pub fn beneficiary_exists(account: &str) -> Self {
        LedgerError::BeneficiaryExists {
            account: account.to_string(),
        }
    }

    pub fn self_reference(account: &str) -> Self {
        LedgerError::SelfReference {
            account: account.to_string(),
        }
    }
}
