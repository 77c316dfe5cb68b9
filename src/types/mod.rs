//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `account`: Account records, identifiers and lifecycle status
//! - `transaction`: Transaction records, idempotency keys and identifiers
//! - `movement`: Movement requests and receipts exchanged with the engine
//! - `beneficiary`: Saved transfer destinations
//! - `error`: Error types for the ledger

pub mod account;
pub mod beneficiary;
pub mod error;
pub mod movement;
pub mod transaction;

pub use account::{
    normalize_account_number, Account, AccountBalance, AccountId, AccountNumber, AccountStatus,
    AccountType, NewAccount, OwnerId,
};
pub use beneficiary::{Beneficiary, BeneficiaryId, BeneficiaryOutcome, NewBeneficiary};
pub use error::{ErrorKind, LedgerError};
pub use movement::{AccountRef, Biller, MovementReceipt, MovementRequest, Payee};
pub use transaction::{
    Direction, Transaction, TransactionId, TransactionStatus, TransactionType, TransactionUid,
    UserId,
};
