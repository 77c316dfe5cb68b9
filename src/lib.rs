//! Retail Ledger Library
//! # Overview
//!
//! This library provides the money movement core of a retail bank: accounts
//! with balances, and transfers, deposits, withdrawals and bill payments that
//! move money atomically, exactly once per idempotency key, without ever
//! driving a balance negative. A CSV replay driver runs the engine with a
//! sync and an async strategy.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, Transaction, MovementRequest, errors)
//! - [`config`] - Ledger tunables
//! - [`core`] - Business logic components:
//!   - [`core::store`] - In-memory store with row locks and units of work
//!   - [`core::engine`] - Movement orchestration and account registry operations
//!   - [`core::projector`] - Statements, history pages and ledger totals
//!   - [`core::beneficiary`] - Saved transfer destinations
//!   - [`core::audit`] - Audit events and sinks
//! - [`io`] - CSV formats and readers
//! - [`strategy`] - Sync and async replay pipelines
//! - [`cli`] - CLI argument parsing
//! - [`telemetry`] - Tracing initialization
//!
//! # Movement Types
//!
//! - **Transfer**: Debit one customer account, credit another
//! - **Deposit**: Credit an account from outside the ledger
//! - **Withdrawal**: Debit an account to outside the ledger
//! - **Payment**: Debit an account towards an external biller
//!
//! # Guarantees
//!
//! - Money only changes through a committed Transaction, and each commit
//!   applies all of its balance changes or none of them
//! - No balance ever goes negative
//! - Resubmitting an idempotency key never moves money twice
//! - Two movements touching the same accounts never deadlock

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod strategy;
pub mod telemetry;
pub mod types;

pub use config::LedgerConfig;
pub use core::{InMemoryLedgerStore, LedgerStore, MovementEngine, StatementProjector};
pub use io::write_accounts_csv;
pub use types::{
    Account, AccountRef, AccountStatus, AccountType, LedgerError, MovementReceipt,
    MovementRequest, Transaction, TransactionStatus, TransactionType, TransactionUid,
};
