//! Ledger engine: the only code path that mutates balances.
//!
//! Every operation runs the same shape: validate, lock, mutate, log, commit.
//! Failure at any point restores the pre-operation state before returning.
//! No caller ever observes a debit without its credit, or a mutation without
//! its audit record.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use super::error::LedgerError;
use super::locks::LockTable;
use crate::models::TransactionRecord;
use crate::store::{AccountStore, StoreError};

/// Successful deposit outcome: the committed record id and the balance the
/// credit produced.
#[derive(Debug, Clone, Serialize)]
pub struct DepositReceipt {
    pub tx_id: String,
    pub new_balance: u64,
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn AccountStore>,
    locks: Arc<LockTable>,
}

impl Ledger {
    pub fn new(store: Arc<dyn AccountStore>, lock_timeout: Duration) -> Self {
        Self {
            store,
            locks: Arc::new(LockTable::new(lock_timeout)),
        }
    }

    /// Credit `amount` minor units to `account`.
    pub async fn deposit(
        &self,
        account: &str,
        amount: u64,
    ) -> Result<DepositReceipt, LedgerError> {
        validate_amount(amount)?;
        let store = Arc::clone(&self.store);
        let locks = Arc::clone(&self.locks);
        let account = account.to_string();
        detached(async move { deposit_inner(store, locks, account, amount).await }).await
    }

    /// Debit `amount` minor units from `account`, subject to sufficiency.
    pub async fn withdraw(&self, account: &str, amount: u64) -> Result<String, LedgerError> {
        validate_amount(amount)?;
        let store = Arc::clone(&self.store);
        let locks = Arc::clone(&self.locks);
        let account = account.to_string();
        detached(async move { withdraw_inner(store, locks, account, amount).await }).await
    }

    /// Move `amount` minor units from `from` to `to` as one atomic unit.
    /// Self-transfer is permitted: it nets to zero but still requires
    /// sufficiency and still commits one record.
    pub async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<String, LedgerError> {
        validate_amount(amount)?;
        let store = Arc::clone(&self.store);
        let locks = Arc::clone(&self.locks);
        let from = from.to_string();
        let to = to.to_string();
        detached(async move { transfer_inner(store, locks, from, to, amount).await }).await
    }

    /// Current balance. Takes the account's lock briefly so the value read is
    /// never from inside another operation's critical section.
    pub async fn balance(&self, account: &str) -> Result<u64, LedgerError> {
        let _guard = self.locks.acquire(account).await?;
        let row = self
            .store
            .get_account(account)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .ok_or_else(|| LedgerError::AccountNotFound(account.to_string()))?;
        Ok(row.balance)
    }

    /// Committed records touching the account, most recent first. Read-only;
    /// records are only ever appended after both legs of an operation, so no
    /// lock is needed here.
    pub async fn transactions(
        &self,
        account: &str,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.store
            .get_account(account)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .ok_or_else(|| LedgerError::AccountNotFound(account.to_string()))?;

        self.store
            .records_for_account(account)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }
}

/// Amounts are validated before any lock or store access. Zero is rejected
/// here; negatives never reach the engine (minor units are unsigned), and the
/// i64 ceiling keeps store deltas representable.
fn validate_amount(amount: u64) -> Result<(), LedgerError> {
    if amount == 0 || amount > i64::MAX as u64 {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

/// Run a critical section on a detached task. A caller that disconnects
/// mid-request drops only this await, not the section itself, so an operation
/// that has started mutating always finishes committing or rolling back.
async fn detached<T>(
    section: impl Future<Output = Result<T, LedgerError>> + Send + 'static,
) -> Result<T, LedgerError>
where
    T: Send + 'static,
{
    tokio::spawn(section)
        .await
        .map_err(|e| LedgerError::Storage(format!("ledger task failed: {e}")))?
}

fn map_adjust_err(account: &str, err: StoreError) -> LedgerError {
    match err {
        StoreError::NotFound => LedgerError::AccountNotFound(account.to_string()),
        StoreError::WouldGoNegative => LedgerError::InsufficientFunds(account.to_string()),
        other => LedgerError::Storage(other.to_string()),
    }
}

async fn deposit_inner(
    store: Arc<dyn AccountStore>,
    locks: Arc<LockTable>,
    account: String,
    amount: u64,
) -> Result<DepositReceipt, LedgerError> {
    let _guard = locks.acquire(&account).await?;

    let new_balance = store
        .adjust_balance(&account, amount as i64)
        .await
        .map_err(|e| map_adjust_err(&account, e))?;

    let record = TransactionRecord::deposit(&account, amount);
    if let Err(e) = store.append_record(&record).await {
        // Un-credit before surfacing the failure: no record, no mutation.
        if let Err(undo) = store.adjust_balance(&account, -(amount as i64)).await {
            error!(account = %account, %undo, "deposit rollback failed after append error");
        }
        return Err(LedgerError::Storage(e.to_string()));
    }

    info!(tx_id = %record.tx_id, account = %account, amount, "deposit committed");
    Ok(DepositReceipt {
        tx_id: record.tx_id,
        new_balance,
    })
}

async fn withdraw_inner(
    store: Arc<dyn AccountStore>,
    locks: Arc<LockTable>,
    account: String,
    amount: u64,
) -> Result<String, LedgerError> {
    let _guard = locks.acquire(&account).await?;

    // Sufficiency is decided inside adjust_balance, in the same atomic unit
    // as the write. No earlier read is trusted.
    store
        .adjust_balance(&account, -(amount as i64))
        .await
        .map_err(|e| map_adjust_err(&account, e))?;

    let record = TransactionRecord::withdrawal(&account, amount);
    if let Err(e) = store.append_record(&record).await {
        if let Err(undo) = store.adjust_balance(&account, amount as i64).await {
            error!(account = %account, %undo, "withdraw rollback failed after append error");
        }
        return Err(LedgerError::Storage(e.to_string()));
    }

    info!(tx_id = %record.tx_id, account = %account, amount, "withdrawal committed");
    Ok(record.tx_id)
}

async fn transfer_inner(
    store: Arc<dyn AccountStore>,
    locks: Arc<LockTable>,
    from: String,
    to: String,
    amount: u64,
) -> Result<String, LedgerError> {
    let _guards = locks.acquire_both(&from, &to).await?;

    // Verify the destination up front so the debit below is the only
    // mutation that can need compensating on the happy-path failure modes.
    store
        .get_account(&to)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?
        .ok_or_else(|| LedgerError::AccountNotFound(to.clone()))?;

    store
        .adjust_balance(&from, -(amount as i64))
        .await
        .map_err(|e| map_adjust_err(&from, e))?;

    if let Err(e) = store.adjust_balance(&to, amount as i64).await {
        if let Err(undo) = store.adjust_balance(&from, amount as i64).await {
            error!(from = %from, to = %to, %undo, "transfer rollback failed after credit error");
        }
        return Err(map_adjust_err(&to, e));
    }

    let record = TransactionRecord::transfer(&from, &to, amount);
    if let Err(e) = store.append_record(&record).await {
        if let Err(undo) = store.adjust_balance(&to, -(amount as i64)).await {
            error!(from = %from, to = %to, %undo, "transfer rollback failed (credit leg)");
        }
        if let Err(undo) = store.adjust_balance(&from, amount as i64).await {
            error!(from = %from, to = %to, %undo, "transfer rollback failed (debit leg)");
        }
        return Err(LedgerError::Storage(e.to_string()));
    }

    info!(tx_id = %record.tx_id, from = %from, to = %to, amount, "transfer committed");
    Ok(record.tx_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

    fn ledger_with(accounts: &[(&str, u64)]) -> (Ledger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for (number, balance) in accounts {
            store.insert_account(number, 1, *balance);
        }
        let ledger = Ledger::new(store.clone(), LOCK_TIMEOUT);
        (ledger, store)
    }

    #[tokio::test]
    async fn deposit_credits_and_records() {
        let (ledger, store) = ledger_with(&[("ACC1", 0)]);

        let receipt = ledger.deposit("ACC1", 500).await.unwrap();
        assert_eq!(receipt.new_balance, 500);

        let records = ledger.transactions("ACC1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tx_id, receipt.tx_id);
        assert!(records[0].from_account.is_none());
        assert_eq!(records[0].to_account.as_deref(), Some("ACC1"));
        assert_eq!(records[0].amount, 500);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn deposit_zero_amount_rejected_without_side_effects() {
        let (ledger, store) = ledger_with(&[("ACC1", 100)]);

        let err = ledger.deposit("ACC1", 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount));
        assert_eq!(ledger.balance("ACC1").await.unwrap(), 100);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn deposit_unknown_account() {
        let (ledger, store) = ledger_with(&[]);
        let err = ledger.deposit("ACC404", 100).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn withdraw_entire_balance() {
        let (ledger, _) = ledger_with(&[("ACC1", 10_000)]);

        ledger.withdraw("ACC1", 10_000).await.unwrap();
        assert_eq!(ledger.balance("ACC1").await.unwrap(), 0);

        let records = ledger.transactions("ACC1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].from_account.as_deref(), Some("ACC1"));
        assert!(records[0].to_account.is_none());
        assert_eq!(records[0].amount, 10_000);
    }

    #[tokio::test]
    async fn withdraw_insufficient_leaves_state_untouched() {
        let (ledger, store) = ledger_with(&[("ACC1", 50)]);

        let err = ledger.withdraw("ACC1", 51).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds(_)));
        assert_eq!(ledger.balance("ACC1").await.unwrap(), 50);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn transfer_conserves_total() {
        let (ledger, _) = ledger_with(&[("ACC1", 10_000), ("ACC2", 500)]);

        let tx_id = ledger.transfer("ACC1", "ACC2", 2_500).await.unwrap();
        assert_eq!(ledger.balance("ACC1").await.unwrap(), 7_500);
        assert_eq!(ledger.balance("ACC2").await.unwrap(), 3_000);

        let records = ledger.transactions("ACC2").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tx_id, tx_id);
        assert_eq!(records[0].from_account.as_deref(), Some("ACC1"));
        assert_eq!(records[0].to_account.as_deref(), Some("ACC2"));
    }

    #[tokio::test]
    async fn transfer_insufficient_rolls_back_nothing_visible() {
        // ACC1 holds 100.00, ACC2 empty; moving 150.00 must change nothing
        let (ledger, store) = ledger_with(&[("ACC1", 10_000), ("ACC2", 0)]);

        let err = ledger.transfer("ACC1", "ACC2", 15_000).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds(_)));
        assert_eq!(ledger.balance("ACC1").await.unwrap(), 10_000);
        assert_eq!(ledger.balance("ACC2").await.unwrap(), 0);
        assert!(ledger.transactions("ACC1").await.unwrap().is_empty());
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn transfer_to_unknown_destination_fails_before_debit() {
        let (ledger, store) = ledger_with(&[("ACC1", 1_000)]);

        let err = ledger.transfer("ACC1", "ACC404", 100).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(a) if a == "ACC404"));
        assert_eq!(ledger.balance("ACC1").await.unwrap(), 1_000);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn self_transfer_nets_to_zero_with_one_record() {
        let (ledger, store) = ledger_with(&[("ACC1", 1_000)]);

        ledger.transfer("ACC1", "ACC1", 1_000).await.unwrap();
        assert_eq!(ledger.balance("ACC1").await.unwrap(), 1_000);
        assert_eq!(store.record_count(), 1);

        let records = ledger.transactions("ACC1").await.unwrap();
        assert_eq!(records[0].from_account, records[0].to_account);
    }

    #[tokio::test]
    async fn self_transfer_still_requires_sufficiency() {
        let (ledger, _) = ledger_with(&[("ACC1", 5)]);
        let err = ledger.transfer("ACC1", "ACC1", 10).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds(_)));
        assert_eq!(ledger.balance("ACC1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn reads_are_idempotent() {
        let (ledger, _) = ledger_with(&[("ACC1", 300)]);
        ledger.deposit("ACC1", 200).await.unwrap();

        let b1 = ledger.balance("ACC1").await.unwrap();
        let b2 = ledger.balance("ACC1").await.unwrap();
        assert_eq!(b1, b2);

        let t1 = ledger.transactions("ACC1").await.unwrap();
        let t2 = ledger.transactions("ACC1").await.unwrap();
        assert_eq!(t1.len(), t2.len());
        assert_eq!(t1[0].tx_id, t2[0].tx_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deposits_lose_no_updates() {
        let (ledger, store) = ledger_with(&[("ACC1", 0)]);
        let n = 50u64;

        let tasks: Vec<_> = (0..n)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.deposit("ACC1", 1).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(ledger.balance("ACC1").await.unwrap(), n);
        assert_eq!(store.record_count(), n as usize);

        // All records are distinct
        let records = ledger.transactions("ACC1").await.unwrap();
        let mut ids: Vec<_> = records.iter().map(|r| r.tx_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), n as usize);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn opposing_transfers_complete_and_conserve() {
        let (ledger, _) = ledger_with(&[("ACC1", 10_000), ("ACC2", 10_000)]);

        let mut tasks = Vec::new();
        for i in 0..4u32 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    let result = if i % 2 == 0 {
                        ledger.transfer("ACC1", "ACC2", 7).await
                    } else {
                        ledger.transfer("ACC2", "ACC1", 7).await
                    };
                    // InsufficientFunds is a legal outcome mid-storm
                    if let Err(e) = result {
                        assert!(matches!(e, LedgerError::InsufficientFunds(_)));
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let total = ledger.balance("ACC1").await.unwrap() + ledger.balance("ACC2").await.unwrap();
        assert_eq!(total, 20_000);
    }
}
