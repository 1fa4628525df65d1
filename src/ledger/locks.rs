//! Per-account logical locks.
//!
//! Mutating operations on one account are serialized through its entry here;
//! operations on disjoint accounts proceed in parallel. Two-account
//! operations acquire entries in canonical (lexicographic) order so that
//! opposite-direction transfers over the same pair cannot deadlock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;

use super::error::LedgerError;

/// Guard for exclusive access to one account. Dropping it releases the lock.
pub type AccountGuard = OwnedMutexGuard<()>;

pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
    acquire_timeout: Duration,
}

impl LockTable {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            acquire_timeout,
        }
    }

    /// Acquire exclusive access to one account, waiting at most the
    /// configured bound. On expiry the operation fails with the retryable
    /// [`LedgerError::Contended`] instead of hanging.
    pub async fn acquire(&self, account: &str) -> Result<AccountGuard, LedgerError> {
        let cell = self
            .locks
            .entry(account.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        timeout(self.acquire_timeout, cell.lock_owned())
            .await
            .map_err(|_| LedgerError::Contended(account.to_string()))
    }

    /// Acquire exclusive access to both accounts in canonical order,
    /// regardless of argument order. A self-pair takes a single lock: the
    /// mutex is not reentrant, and the operation nets against one row anyway.
    pub async fn acquire_both(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Vec<AccountGuard>, LedgerError> {
        if a == b {
            return Ok(vec![self.acquire(a).await?]);
        }

        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first_guard = self.acquire(first).await?;
        let second_guard = self.acquire(second).await?;
        Ok(vec![first_guard, second_guard])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_times_out_as_contended() {
        let table = LockTable::new(Duration::from_millis(20));
        let _held = table.acquire("ACC1").await.unwrap();

        let err = table.acquire("ACC1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Contended(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn released_lock_can_be_reacquired() {
        let table = LockTable::new(Duration::from_millis(20));
        drop(table.acquire("ACC1").await.unwrap());
        assert!(table.acquire("ACC1").await.is_ok());
    }

    #[tokio::test]
    async fn disjoint_accounts_do_not_block_each_other() {
        let table = LockTable::new(Duration::from_millis(20));
        let _a = table.acquire("ACC1").await.unwrap();
        assert!(table.acquire("ACC2").await.is_ok());
    }

    #[tokio::test]
    async fn self_pair_takes_a_single_lock() {
        let table = LockTable::new(Duration::from_millis(20));
        let guards = table.acquire_both("ACC1", "ACC1").await.unwrap();
        assert_eq!(guards.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn opposite_order_pairs_do_not_deadlock() {
        let table = Arc::new(LockTable::new(Duration::from_secs(5)));

        let mut tasks = Vec::new();
        for i in 0..4u32 {
            let table = Arc::clone(&table);
            tasks.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let guards = if i % 2 == 0 {
                        table.acquire_both("ACC1", "ACC2").await.unwrap()
                    } else {
                        table.acquire_both("ACC2", "ACC1").await.unwrap()
                    };
                    drop(guards);
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
    }
}
