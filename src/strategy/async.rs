//! Asynchronous batch processing strategy
//!
//! Replays movements in batches on a multi-threaded tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (account partitioning + blocking pool)
//!         └── MovementEngine (shared ledger)
//! ```
//!
//! # Ordering
//!
//! - Batches are processed one after another
//! - Within a batch, movements are grouped so that no two groups share an
//!   account; groups run in parallel, each in file order
//!
//! Every account therefore sees its movements in file order, and the final
//! balances equal those of the sync strategy.

use crate::config::LedgerConfig;
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::MovementCsvRecord;
use crate::strategy::batch::BatchProcessor;
use crate::strategy::{build_engine, load_accounts, write_balances, ProcessingStrategy, ReplayReport};
use crate::types::LedgerError;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Configuration for batch processing
///
/// Controls how movements are batched and how many account groups run at
/// once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of movements per batch
    pub batch_size: usize,
    /// Maximum number of account groups processing concurrently
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig; zero values fall back to the defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = default.batch_size,
                "Invalid batch_size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "Invalid max_concurrent_batches, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch processing strategy
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    ledger: LedgerConfig,
    config: BatchConfig,
}

impl AsyncProcessingStrategy {
    /// Create a new AsyncProcessingStrategy
    ///
    /// # Arguments
    ///
    /// * `ledger` - Ledger settings
    /// * `config` - Batch size and concurrency
    pub fn new(ledger: LedgerConfig, config: BatchConfig) -> Self {
        Self { ledger, config }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Replay movements batch by batch and write final balances
    ///
    /// 1. Creates a tokio multi-threaded runtime
    /// 2. Loads the accounts fixture, if any
    /// 3. Reads movement batches with `AsyncReader`
    /// 4. Runs each batch through the `BatchProcessor` and waits for it
    /// 5. Writes every account's balance to `output`
    fn process(
        &self,
        accounts: Option<&Path>,
        movements: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplayReport, LedgerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .enable_all()
            .build()
            .map_err(|e| LedgerError::IoError {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        runtime.block_on(async {
            let engine = build_engine(&self.ledger);
            let mut report = ReplayReport::default();

            if let Some(path) = accounts {
                report.accounts_loaded = load_accounts(&engine, path)?;
            }

            let file = tokio::fs::File::open(movements)
                .await
                .map_err(|e| LedgerError::IoError {
                    message: format!("Failed to open file '{}': {}", movements.display(), e),
                })?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::<_, MovementCsvRecord>::new(compat_file);

            let processor = BatchProcessor::new(engine.clone(), self.config.max_concurrent_batches);
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                debug!(size = batch.len(), "Processing batch");
                for outcome in processor.process_batch(batch).await {
                    report.record(&outcome.result);
                }
            }

            write_balances(&engine, output)?;
            info!(?report, "Async replay finished");
            Ok(report)
        })
    }
}
