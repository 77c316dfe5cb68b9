//! Batch processing with account-based partitioning for the async pipeline
//!
//! A batch of movements is split into groups that share no account. Groups
//! run concurrently; the movements inside a group run sequentially in file
//! order. Two movements touching the same account therefore always execute
//! in file order, and the final balances match a sequential replay.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     ├── MovementEngine  (shared, cloneable)
//!     └── Semaphore       (caps concurrently running groups)
//! ```

use crate::core::{LedgerStore, MovementEngine};
use crate::strategy::replay_movement;
use crate::types::{AccountRef, LedgerError, MovementReceipt, MovementRequest};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::error;

/// Result of processing a single movement
#[derive(Debug)]
pub struct ProcessingResult {
    pub request: MovementRequest,
    pub result: Result<MovementReceipt, LedgerError>,
}

/// Runs batches of movements with account-disjoint parallelism
pub struct BatchProcessor<S: LedgerStore + 'static> {
    engine: MovementEngine<S>,
    permits: Arc<Semaphore>,
}

impl<S: LedgerStore + 'static> Clone for BatchProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            permits: Arc::clone(&self.permits),
        }
    }
}

/// Root of `index` with path halving
fn find(parent: &mut [usize], mut index: usize) -> usize {
    while parent[index] != index {
        parent[index] = parent[parent[index]];
        index = parent[index];
    }
    index
}

/// Partition a batch into groups of movements that share no account
///
/// Movements are linked when they name the same account reference; linked
/// movements end up in one group (union-find over the references). Groups
/// are returned in order of first appearance and keep file order inside.
///
/// # Guarantees
///
/// - Each movement appears in exactly one group
/// - Two groups never name the same account
/// - Movements within a group keep their original order
pub fn partition_by_accounts(batch: Vec<MovementRequest>) -> Vec<Vec<MovementRequest>> {
    let mut parent: Vec<usize> = (0..batch.len()).collect();
    let mut first_seen: HashMap<AccountRef, usize> = HashMap::new();

    for (index, request) in batch.iter().enumerate() {
        for account in request.from.iter().chain(request.to.iter()) {
            match first_seen.entry(account.clone()) {
                Entry::Occupied(entry) => {
                    let root = find(&mut parent, *entry.get());
                    let own = find(&mut parent, index);
                    if root != own {
                        parent[own] = root;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(index);
                }
            }
        }
    }

    let mut groups: Vec<Vec<MovementRequest>> = Vec::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    for (index, request) in batch.into_iter().enumerate() {
        let root = find(&mut parent, index);
        let slot = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(request);
    }
    groups
}

impl<S: LedgerStore + 'static> BatchProcessor<S> {
    /// Create a processor running at most `max_concurrent` groups at once
    pub fn new(engine: MovementEngine<S>, max_concurrent: usize) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Process the movements of one group sequentially, in order
    pub fn process_group(&self, movements: Vec<MovementRequest>) -> Vec<ProcessingResult> {
        movements
            .into_iter()
            .map(|request| {
                let result = replay_movement(&self.engine, request.clone());
                ProcessingResult { request, result }
            })
            .collect()
    }

    /// Process a batch with account-based partitioning
    ///
    /// Each group runs on the blocking pool, since row locks may wait.
    /// Returns once every group has finished; result order across groups is
    /// unspecified.
    pub async fn process_batch(&self, batch: Vec<MovementRequest>) -> Vec<ProcessingResult> {
        let mut tasks = Vec::new();
        for group in partition_by_accounts(batch) {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Batch semaphore closed");
                    break;
                }
            };
            let processor = self.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                processor.process_group(group)
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(group_results) => results.extend(group_results),
                Err(e) => error!(error = %e, "Group task panicked"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::InMemoryLedgerStore;
    use crate::types::{AccountType, NewAccount, Payee};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn transfer(from: &str, to: &str, amount: i64) -> MovementRequest {
        MovementRequest::transfer(
            AccountRef::number(from),
            AccountRef::number(to),
            Decimal::from(amount),
            1,
        )
    }

    fn numbers(group: &[MovementRequest]) -> Vec<String> {
        group
            .iter()
            .map(|r| {
                format!(
                    "{}>{}",
                    r.from.as_ref().map(|a| a.to_string()).unwrap_or_default(),
                    r.to.as_ref().map(|a| a.to_string()).unwrap_or_default()
                )
            })
            .collect()
    }

    #[test]
    fn test_partition_links_shared_accounts() {
        let groups = partition_by_accounts(vec![
            transfer("A", "B", 1),
            transfer("C", "D", 1),
            transfer("B", "E", 1),
            MovementRequest::deposit(AccountRef::number("F"), Decimal::ONE, 1),
            transfer("E", "C", 1),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(numbers(&groups[0]), vec!["A>B", "C>D", "B>E", "E>C"]);
        assert_eq!(numbers(&groups[1]), vec![">F"]);
    }

    #[test]
    fn test_partition_keeps_disjoint_movements_apart() {
        let groups = partition_by_accounts(vec![
            transfer("A", "B", 1),
            transfer("C", "D", 1),
            MovementRequest::payment(AccountRef::number("E"), Payee::parse("water:1"), Decimal::ONE, 1),
        ]);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.len() == 1));
    }

    #[test]
    fn test_partition_empty_batch() {
        assert!(partition_by_accounts(Vec::new()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_process_batch_keeps_per_account_order() {
        let store = Arc::new(InMemoryLedgerStore::default());
        for (number, owner) in [("ACC1", 1), ("ACC2", 2), ("ACC3", 3)] {
            store
                .insert_account(
                    NewAccount {
                        account_number: number.to_string(),
                        owner_id: owner,
                        holder_name: format!("Holder {}", owner),
                        account_type: AccountType::Checking,
                    },
                    Utc::now(),
                )
                .unwrap();
        }
        let engine = MovementEngine::new(Arc::clone(&store), LedgerConfig::default());
        let processor = BatchProcessor::new(engine, 2);

        // The withdrawal only succeeds if it runs after the deposit.
        let results = processor
            .process_batch(vec![
                MovementRequest::deposit(AccountRef::number("ACC1"), Decimal::from(100), 1),
                MovementRequest::deposit(AccountRef::number("ACC3"), Decimal::from(10), 3),
                MovementRequest::withdrawal(AccountRef::number("ACC1"), Decimal::from(60), 1),
                transfer("ACC1", "ACC2", 40),
            ])
            .await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.result.is_ok()));
        assert_eq!(store.get_account_by_number("ACC1").unwrap().balance, Decimal::ZERO);
        assert_eq!(store.get_account_by_number("ACC2").unwrap().balance, Decimal::from(40));
        assert_eq!(store.get_account_by_number("ACC3").unwrap().balance, Decimal::from(10));
    }
}
