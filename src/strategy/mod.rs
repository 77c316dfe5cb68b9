//! Processing strategy module for ledger replay
//!
//! This module defines the Strategy pattern for complete replay pipelines:
//! loading the accounts fixture, reading movements, running them through the
//! [`MovementEngine`] and writing final balances. The implementation
//! (synchronous or asynchronous batch) is selected at runtime.

use crate::cli::StrategyType;
use crate::config::LedgerConfig;
use crate::core::{InMemoryLedgerStore, LedgerStore, MovementEngine};
use crate::io::csv_format::{write_accounts_csv, AccountCsvRecord};
use crate::io::sync_reader::SyncReader;
use crate::types::{AccountRef, LedgerError, MovementReceipt, MovementRequest, UserId};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub mod r#async;
pub mod batch;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use batch::{BatchProcessor, ProcessingResult};
pub use sync::SyncProcessingStrategy;

/// Actor recorded for fixture loading
pub const SYSTEM_ACTOR: UserId = 0;

/// Outcome counts of one replay run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub accounts_loaded: usize,
    pub committed: usize,
    pub replayed: usize,
    pub rejected: usize,
}

impl ReplayReport {
    pub fn record(&mut self, result: &Result<MovementReceipt, LedgerError>) {
        match result {
            Ok(receipt) if receipt.replayed => self.replayed += 1,
            Ok(_) => self.committed += 1,
            Err(_) => self.rejected += 1,
        }
    }
}

/// Processing strategy trait for complete replay pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Replay movements and write the final balances
    ///
    /// # Arguments
    ///
    /// * `accounts` - Optional accounts fixture loaded before any movement
    /// * `movements` - Movements CSV file
    /// * `output` - Writer receiving the balance CSV
    ///
    /// # Returns
    ///
    /// * `Ok(ReplayReport)` when the files were processed; malformed rows and
    ///   rejected movements are logged, counted and skipped
    /// * `Err(LedgerError)` on fatal errors (file not found, output not writable)
    fn process(
        &self,
        accounts: Option<&Path>,
        movements: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplayReport, LedgerError>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - Sync or Async
/// * `config` - Ledger settings shared by both strategies
/// * `batch` - Batch settings for the async strategy (ignored for sync)
pub fn create_strategy(
    strategy_type: StrategyType,
    config: LedgerConfig,
    batch: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(config)),
        StrategyType::Async => Box::new(AsyncProcessingStrategy::new(
            config,
            batch.unwrap_or_default(),
        )),
    }
}

pub(crate) fn build_engine(config: &LedgerConfig) -> MovementEngine<InMemoryLedgerStore> {
    let store = Arc::new(InMemoryLedgerStore::from_config(config));
    MovementEngine::new(store, config.clone())
}

/// Register every account of the fixture, posting opening deposits
///
/// Bad rows and duplicate numbers are logged and skipped.
///
/// # Returns
///
/// The number of accounts registered.
pub(crate) fn load_accounts<S: LedgerStore>(
    engine: &MovementEngine<S>,
    path: &Path,
) -> Result<usize, LedgerError> {
    let mut loaded = 0;
    for row in SyncReader::<AccountCsvRecord>::new(path)? {
        let fixture = match row {
            Ok(fixture) => fixture,
            Err(e) => {
                warn!(error = %e, "Skipping account row");
                continue;
            }
        };
        let account = match engine.register_account(fixture.account, SYSTEM_ACTOR) {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "Skipping account");
                continue;
            }
        };
        loaded += 1;

        if let Some(amount) = fixture.opening_deposit {
            let deposit = MovementRequest::deposit(
                AccountRef::Id(account.account_id),
                amount,
                SYSTEM_ACTOR,
            )
            .with_description("Opening deposit");
            if let Err(e) = engine.submit(deposit) {
                warn!(account = %account.account_number, error = %e, "Opening deposit rejected");
            }
        }
    }
    info!(accounts = loaded, path = %path.display(), "Accounts loaded");
    Ok(loaded)
}

/// Run one movement, retrying on contention, and log a rejection
pub(crate) fn replay_movement<S: LedgerStore>(
    engine: &MovementEngine<S>,
    request: MovementRequest,
) -> Result<MovementReceipt, LedgerError> {
    let result = engine.submit_with_retry(request);
    if let Err(e) = &result {
        warn!(kind = %e.kind(), error = %e, "Movement rejected");
    }
    result
}

pub(crate) fn write_balances<S: LedgerStore>(
    engine: &MovementEngine<S>,
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let accounts = engine.store().list_accounts()?;
    write_accounts_csv(&accounts, engine.config().currency_scale, output)
}
