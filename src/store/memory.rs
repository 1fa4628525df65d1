//! In-memory store backend.
//!
//! The default runtime backend and the test double for the engine. Per-row
//! atomicity comes from the map's entry locking: `adjust_balance` holds the
//! row's shard lock across the check and the write, so the sufficiency check
//! can never be invalidated by a concurrent adjustment on the same account.

use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{AccountStore, StoreError, UserStore, new_account_number};
use crate::models::{Account, AccountType, TransactionRecord, User, UserId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<String, Account>,
    users: DashMap<UserId, User>,
    users_by_email: DashMap<String, UserId>,
    /// Append-only audit log. Entries are pushed in commit order and never
    /// touched again.
    records: RwLock<Vec<TransactionRecord>>,
    next_user_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_user_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Insert an account with a caller-chosen number and opening balance.
    /// Test/seeding helper; production accounts go through `create_account`.
    pub fn insert_account(&self, account_number: &str, user_id: UserId, balance: u64) {
        self.accounts.insert(
            account_number.to_string(),
            Account {
                account_number: account_number.to_string(),
                user_id,
                account_type: AccountType::Savings,
                balance,
                created_at: Utc::now(),
            },
        );
    }

    /// Total number of audit records across all accounts.
    pub fn record_count(&self) -> usize {
        self.records.read().expect("record log poisoned").len()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(
        &self,
        user_id: UserId,
        account_type: AccountType,
    ) -> Result<Account, StoreError> {
        loop {
            let number = new_account_number();
            match self.accounts.entry(number.clone()) {
                Entry::Occupied(_) => continue, // collision, draw again
                Entry::Vacant(slot) => {
                    let account = Account {
                        account_number: number,
                        user_id,
                        account_type,
                        balance: 0,
                        created_at: Utc::now(),
                    };
                    slot.insert(account.clone());
                    return Ok(account);
                }
            }
        }
    }

    async fn get_account(&self, account_number: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(account_number).map(|a| a.value().clone()))
    }

    async fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.value().clone())
            .collect();
        accounts.sort_by(|a, b| a.account_number.cmp(&b.account_number));
        Ok(accounts)
    }

    async fn adjust_balance(&self, account_number: &str, delta: i64) -> Result<u64, StoreError> {
        let mut account = self
            .accounts
            .get_mut(account_number)
            .ok_or(StoreError::NotFound)?;

        let new_balance = if delta >= 0 {
            account
                .balance
                .checked_add(delta as u64)
                .ok_or(StoreError::BalanceOverflow)?
        } else {
            account
                .balance
                .checked_sub(delta.unsigned_abs())
                .ok_or(StoreError::WouldGoNegative)?
        };

        account.balance = new_balance;
        Ok(new_balance)
    }

    async fn append_record(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .expect("record log poisoned")
            .push(record.clone());
        Ok(())
    }

    async fn records_for_account(
        &self,
        account_number: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let records = self.records.read().expect("record log poisoned");
        Ok(records
            .iter()
            .rev() // append order is commit order, so reverse = most recent first
            .filter(|r| r.touches(account_number))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<UserId, StoreError> {
        match self.users_by_email.entry(email.to_ascii_lowercase()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(email.to_string())),
            Entry::Vacant(slot) => {
                let user_id = self.next_user_id.fetch_add(1, Ordering::SeqCst);
                slot.insert(user_id);
                self.users.insert(
                    user_id,
                    User {
                        user_id,
                        email: email.to_string(),
                        password_hash: password_hash.to_string(),
                        name: None,
                        phone: None,
                        address: None,
                        created_at: Utc::now(),
                    },
                );
                Ok(user_id)
            }
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let id = match self.users_by_email.get(&email.to_ascii_lowercase()) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn user_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        name: Option<&str>,
        phone: Option<&str>,
        address: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut user = self.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        if let Some(name) = name {
            user.name = Some(name.to_string());
        }
        if let Some(phone) = phone {
            user.phone = Some(phone.to_string());
        }
        if let Some(address) = address {
            user.address = Some(address.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn adjust_balance_applies_delta() {
        let store = MemoryStore::new();
        store.insert_account("ACC1", 1, 1_000);

        assert_eq!(store.adjust_balance("ACC1", 500).await.unwrap(), 1_500);
        assert_eq!(store.adjust_balance("ACC1", -1_500).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn adjust_balance_rejects_negative_result() {
        let store = MemoryStore::new();
        store.insert_account("ACC1", 1, 100);

        let err = store.adjust_balance("ACC1", -101).await.unwrap_err();
        assert!(matches!(err, StoreError::WouldGoNegative));

        // Failed adjustment leaves the row untouched
        let account = store.get_account("ACC1").await.unwrap().unwrap();
        assert_eq!(account.balance, 100);
    }

    #[tokio::test]
    async fn adjust_balance_unknown_account() {
        let store = MemoryStore::new();
        let err = store.adjust_balance("ACC404", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn adjust_balance_overflow() {
        let store = MemoryStore::new();
        store.insert_account("ACC1", 1, u64::MAX);
        let err = store.adjust_balance("ACC1", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::BalanceOverflow));
    }

    #[tokio::test]
    async fn records_listed_most_recent_first() {
        let store = MemoryStore::new();
        store.insert_account("ACC1", 1, 0);

        let first = TransactionRecord::deposit("ACC1", 100);
        let second = TransactionRecord::withdrawal("ACC1", 50);
        store.append_record(&first).await.unwrap();
        store.append_record(&second).await.unwrap();

        let records = store.records_for_account("ACC1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tx_id, second.tx_id);
        assert_eq!(records[1].tx_id, first.tx_id);
    }

    #[tokio::test]
    async fn records_filter_by_account() {
        let store = MemoryStore::new();
        store
            .append_record(&TransactionRecord::transfer("ACC1", "ACC2", 10))
            .await
            .unwrap();
        store
            .append_record(&TransactionRecord::deposit("ACC3", 10))
            .await
            .unwrap();

        assert_eq!(store.records_for_account("ACC1").await.unwrap().len(), 1);
        assert_eq!(store.records_for_account("ACC2").await.unwrap().len(), 1);
        assert_eq!(store.records_for_account("ACC4").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn created_accounts_start_empty_with_unique_numbers() {
        let store = MemoryStore::new();
        let a = store.create_account(7, AccountType::Savings).await.unwrap();
        let b = store.create_account(7, AccountType::Checking).await.unwrap();

        assert_ne!(a.account_number, b.account_number);
        assert_eq!(a.balance, 0);
        assert_eq!(store.accounts_for_user(7).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.create_user("a@example.com", "hash").await.unwrap();
        let err = store
            .create_user("A@Example.com", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn profile_update_is_partial() {
        let store = MemoryStore::new();
        let id = store.create_user("a@example.com", "hash").await.unwrap();

        store
            .update_profile(id, Some("Asha"), None, Some("12 Hill Rd"))
            .await
            .unwrap();
        store
            .update_profile(id, None, Some("555-0101"), None)
            .await
            .unwrap();

        let user = store.user_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.name.as_deref(), Some("Asha"));
        assert_eq!(user.phone.as_deref(), Some("555-0101"));
        assert_eq!(user.address.as_deref(), Some("12 Hill Rd"));
    }
}
