//! Core business logic module
//!
//! This module contains the ledger components:
//! - `traits` - Store and unit-of-work abstractions, transaction queries
//! - `store` - In-memory store with row-level locking
//! - `engine` - Money movement orchestration and account registry operations
//! - `account_number` - Account number generation
//! - `beneficiary` - Saved transfer destinations
//! - `projector` - Statements, history pages and ledger totals
//! - `audit` - Audit events and sinks

pub mod account_number;
pub mod audit;
pub mod beneficiary;
pub mod engine;
pub mod projector;
pub mod store;
pub mod traits;

pub use account_number::AccountNumberGenerator;
pub use audit::{AuditEvent, AuditSink, ChannelAuditSink, EntityType, NullAuditSink, TracingAuditSink};
pub use beneficiary::BeneficiaryDirectory;
pub use engine::{AccountOpening, MovementEngine, OpenAccount};
pub use projector::{
    HistoryPage, LedgerSummary, Statement, StatementLine, StatementProjector, StatementWindow,
};
pub use store::{InMemoryLedgerStore, MemoryUnit};
pub use traits::{LedgerStore, SortOrder, TransactionQuery, UnitOfWork};
