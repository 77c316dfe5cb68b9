//! Synchronous processing strategy
//!
//! Single-threaded replay: movements are streamed one row at a time through
//! `SyncReader` and submitted to the `MovementEngine` in file order.
//!
//! # Design
//!
//! The strategy only orchestrates, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Movement execution to `MovementEngine`
//! - CSV output to `csv_format::write_accounts_csv`
//!
//! Memory use is O(accounts + transactions) for the ledger itself; the input
//! file is never loaded whole.

use crate::config::LedgerConfig;
use crate::io::csv_format::MovementCsvRecord;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{
    build_engine, load_accounts, replay_movement, write_balances, ProcessingStrategy,
    ReplayReport,
};
use crate::types::LedgerError;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Synchronous processing strategy
///
/// # Examples
///
/// ```no_run
/// use retail_ledger::config::LedgerConfig;
/// use retail_ledger::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
///
/// let strategy = SyncProcessingStrategy::new(LedgerConfig::default());
/// let mut output = std::io::stdout();
///
/// strategy
///     .process(Some(Path::new("accounts.csv")), Path::new("movements.csv"), &mut output)
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyncProcessingStrategy {
    config: LedgerConfig,
}

impl SyncProcessingStrategy {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    /// Replay the movements sequentially and write final balances
    ///
    /// 1. Builds a fresh in-memory ledger and engine
    /// 2. Loads the accounts fixture, if any
    /// 3. Streams movement rows through the engine in file order
    /// 4. Writes every account's balance to `output`
    fn process(
        &self,
        accounts: Option<&Path>,
        movements: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplayReport, LedgerError> {
        let engine = build_engine(&self.config);
        let mut report = ReplayReport::default();

        if let Some(path) = accounts {
            report.accounts_loaded = load_accounts(&engine, path)?;
        }

        let reader = SyncReader::<MovementCsvRecord>::new(movements)?;
        for row in reader {
            match row {
                Ok(request) => report.record(&replay_movement(&engine, request)),
                Err(e) => warn!(error = %e, "Skipping movement row"),
            }
        }

        write_balances(&engine, output)?;
        info!(?report, "Sync replay finished");
        Ok(report)
    }
}
