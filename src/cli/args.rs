use crate::config::LedgerConfig;
use crate::strategy::BatchConfig;
use crate::telemetry::LogFormat;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Replay account movements through the retail ledger and print balances
#[derive(Parser, Debug)]
#[command(name = "retail-ledger")]
#[command(about = "Replay account movements through the retail ledger", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing movements
    #[arg(value_name = "MOVEMENTS", help = "Path to the movements CSV file")]
    pub movements_file: PathBuf,

    /// Accounts fixture loaded before the movements
    #[arg(
        long = "accounts",
        value_name = "FILE",
        env = "LEDGER_ACCOUNTS",
        help = "Accounts CSV (account_number,owner,type,holder,opening_deposit)"
    )]
    pub accounts_file: Option<PathBuf>,

    /// Processing strategy used for the replay
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        env = "LEDGER_STRATEGY",
        help = "Processing strategy: 'sync' for sequential or 'async' for batched parallel replay"
    )]
    pub strategy: StrategyType,

    /// Number of movements per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        env = "LEDGER_BATCH_SIZE",
        help = "Number of movements per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of account groups processed concurrently (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        env = "LEDGER_MAX_CONCURRENT",
        help = "Maximum number of account groups processing concurrently (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    #[arg(
        long = "lock-timeout-ms",
        value_name = "MILLIS",
        env = "LEDGER_LOCK_TIMEOUT_MS",
        help = "Longest wait for a single account lock (default: 2000)"
    )]
    pub lock_timeout_ms: Option<u64>,

    #[arg(
        long = "max-retries",
        value_name = "COUNT",
        env = "LEDGER_MAX_RETRIES",
        help = "Retries for a movement that hit lock contention (default: 3)"
    )]
    pub max_retries: Option<u32>,

    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        default_value = "text",
        env = "LEDGER_LOG_FORMAT",
        help = "Log line format on stderr"
    )]
    pub log_format: LogFormat,
}

/// Available processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Build the ledger configuration, overriding defaults with CLI values
    pub fn to_ledger_config(&self) -> LedgerConfig {
        let mut config = LedgerConfig::default();
        if let Some(millis) = self.lock_timeout_ms {
            config = config.with_lock_timeout(Duration::from_millis(millis));
        }
        if let Some(retries) = self.max_retries {
            config = config.with_max_retries(retries);
        }
        config
    }

    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values use the defaults; zero values fall back to the defaults
    /// with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default_strategy(&["program", "movements.csv"], StrategyType::Async)]
    #[case::explicit_sync(&["program", "--strategy", "sync", "movements.csv"], StrategyType::Sync)]
    #[case::explicit_async(&["program", "--strategy", "async", "movements.csv"], StrategyType::Async)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.strategy, expected);
    }

    #[test]
    fn test_accounts_and_log_format() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--accounts",
            "accounts.csv",
            "--log-format",
            "json",
            "movements.csv",
        ])
        .unwrap();

        assert_eq!(parsed.accounts_file, Some(PathBuf::from("accounts.csv")));
        assert_eq!(parsed.movements_file, PathBuf::from("movements.csv"));
        assert_eq!(parsed.log_format, LogFormat::Json);
    }

    #[rstest]
    #[case::defaults(&["program", "movements.csv"], Duration::from_secs(2), 3)]
    #[case::custom(
        &["program", "--lock-timeout-ms", "250", "--max-retries", "0", "movements.csv"],
        Duration::from_millis(250),
        0
    )]
    #[case::zero_timeout_falls_back(
        &["program", "--lock-timeout-ms", "0", "movements.csv"],
        Duration::from_secs(2),
        3
    )]
    fn test_ledger_config_conversion(
        #[case] args: &[&str],
        #[case] lock_timeout: Duration,
        #[case] max_retries: u32,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_ledger_config();
        assert_eq!(config.lock_timeout, lock_timeout);
        assert_eq!(config.max_retries, max_retries);
        assert_eq!(config.currency_scale, 2);
    }

    #[rstest]
    #[case::all_defaults(&["program", "movements.csv"], 1000, num_cpus::get())]
    #[case::custom_batch_size(&["program", "--batch-size", "2000", "movements.csv"], 2000, num_cpus::get())]
    #[case::custom_max_concurrent(&["program", "--max-concurrent", "8", "movements.csv"], 1000, 8)]
    #[case::zero_batch_size(&["program", "--batch-size", "0", "movements.csv"], 1000, num_cpus::get())]
    #[case::zero_max_concurrent(&["program", "--max-concurrent", "0", "movements.csv"], 1000, num_cpus::get())]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_batch_config();
        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_max_concurrent);
    }

    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_strategy(&["program", "--strategy", "invalid", "movements.csv"])]
    #[case::invalid_log_format(&["program", "--log-format", "xml", "movements.csv"])]
    #[case::negative_timeout(&["program", "--lock-timeout-ms", "-5", "movements.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}
