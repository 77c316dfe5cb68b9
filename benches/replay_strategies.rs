//! Benchmark suite for comparing replay strategies
//!
//! Compares the sync and async strategies with the divan benchmarking
//! framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```
//!
//! # Inputs
//!
//! Inputs are generated once per size into temporary files: 100 funded
//! accounts and a mix of transfers, deposits, withdrawals and bill payments.
//! Some withdrawals overdraw on purpose, so rejections are measured as well.

use retail_ledger::cli::StrategyType;
use retail_ledger::config::LedgerConfig;
use retail_ledger::strategy::{create_strategy, BatchConfig};
use std::io::Write;
use tempfile::NamedTempFile;

const ACCOUNTS: usize = 100;

fn main() {
    divan::main();
}

struct Inputs {
    accounts: NamedTempFile,
    movements: NamedTempFile,
}

fn generate(movements: usize) -> Inputs {
    let mut accounts = NamedTempFile::new().expect("Failed to create accounts file");
    writeln!(accounts, "account_number,owner,type,holder,opening_deposit").unwrap();
    for i in 0..ACCOUNTS {
        writeln!(accounts, "ACC{:05},{},checking,Holder {},1000.00", i, i, i).unwrap();
    }

    let mut file = NamedTempFile::new().expect("Failed to create movements file");
    writeln!(file, "type,uid,from,to,amount,initiated_by,description").unwrap();
    for n in 0..movements {
        let a = n % ACCOUNTS;
        let b = (n * 7 + 3) % ACCOUNTS;
        let b = if a == b { (b + 1) % ACCOUNTS } else { b };
        let amount = format!("{}.{:02}", n % 50 + 1, n % 100);
        match n % 4 {
            0 => writeln!(file, "transfer,m-{n},ACC{a:05},ACC{b:05},{amount},{a},").unwrap(),
            1 => writeln!(file, "deposit,m-{n},,ACC{a:05},{amount},{a},").unwrap(),
            2 => writeln!(file, "withdrawal,m-{n},ACC{a:05},,{amount},{a},").unwrap(),
            _ => writeln!(file, "payment,m-{n},ACC{a:05},water:W-{a},{amount},{a},").unwrap(),
        }
    }
    accounts.flush().unwrap();
    file.flush().unwrap();

    Inputs {
        accounts,
        movements: file,
    }
}

fn run(inputs: &Inputs, strategy_type: StrategyType) {
    let batch = matches!(strategy_type, StrategyType::Async).then(BatchConfig::default);
    let strategy = create_strategy(strategy_type, LedgerConfig::default(), batch);
    let mut output = Vec::new();

    strategy
        .process(
            Some(inputs.accounts.path()),
            inputs.movements.path(),
            &mut output,
        )
        .expect("Processing failed");
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn sync_strategy(bencher: divan::Bencher, movements: usize) {
    let inputs = generate(movements);
    bencher.bench_local(|| run(&inputs, StrategyType::Sync));
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn async_strategy(bencher: divan::Bencher, movements: usize) {
    let inputs = generate(movements);
    bencher.bench_local(|| run(&inputs, StrategyType::Async));
}
