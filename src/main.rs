//! Retail Ledger CLI
//!
//! Replays account movements from a CSV file through the ledger and prints
//! the final balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --accounts accounts.csv movements.csv > balances.csv
//! cargo run -- --strategy sync --accounts accounts.csv movements.csv > balances.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 movements.csv > balances.csv
//! RUST_LOG=audit=info cargo run -- --log-format json --accounts accounts.csv movements.csv
//! ```
//!
//! Logs and audit events go to stderr; stdout only carries the balances CSV.
//!
//! # Exit Codes
//!
//! - 0: Success (rejected movements are logged, not fatal)
//! - 1: Error (file not found, file not readable, output not writable)

use retail_ledger::cli;
use retail_ledger::strategy;
use retail_ledger::telemetry::init_tracing;
use std::process;

fn main() {
    let args = cli::parse_args();
    init_tracing(args.log_format);

    let strategy = {
        let batch = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy, args.to_ledger_config(), batch)
    };

    let mut output = std::io::stdout();
    match strategy.process(
        args.accounts_file.as_deref(),
        &args.movements_file,
        &mut output,
    ) {
        Ok(report) => tracing::info!(
            accounts = report.accounts_loaded,
            committed = report.committed,
            replayed = report.replayed,
            rejected = report.rejected,
            "Replay complete"
        ),
        Err(e) => {
            tracing::error!(error = %e, "Replay failed");
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
