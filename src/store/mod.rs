//! Storage layer: typed repository traits over account rows, user rows and
//! the append-only transaction log.
//!
//! The ledger engine is storage-agnostic: it only sees [`AccountStore`].
//! Two backends implement the traits, an in-memory one (default, also the
//! test double) and a SQLite one.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

use crate::models::{Account, AccountType, TransactionRecord, User, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    /// The conditional balance update failed: applying the delta would take
    /// the balance below zero. The check and the write are indivisible.
    #[error("balance adjustment would go negative")]
    WouldGoNegative,

    #[error("balance adjustment would overflow")]
    BalanceOverflow,

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for account rows and the transaction log.
///
/// `adjust_balance` is the contract the engine's correctness rests on: a
/// single atomic read-modify-write per account, re-validating sufficiency
/// inside the same unit that performs the write.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create an account with balance 0 and a freshly generated number.
    async fn create_account(
        &self,
        user_id: UserId,
        account_type: AccountType,
    ) -> Result<Account, StoreError>;

    async fn get_account(&self, account_number: &str) -> Result<Option<Account>, StoreError>;

    async fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, StoreError>;

    /// Apply `delta` (positive or negative minor units) to the account's
    /// balance as one atomic read-modify-write. Returns the new balance.
    ///
    /// Errors: `NotFound` for an unknown account, `WouldGoNegative` when a
    /// negative delta exceeds the current balance, `BalanceOverflow` when a
    /// positive delta exceeds the representable range.
    async fn adjust_balance(&self, account_number: &str, delta: i64) -> Result<u64, StoreError>;

    /// Append one audit record. Records are immutable once appended.
    async fn append_record(&self, record: &TransactionRecord) -> Result<(), StoreError>;

    /// All records touching the account, most recent first.
    async fn records_for_account(
        &self,
        account_number: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// Repository for user rows. Owned by the auth/profile collaborators; the
/// ledger core never calls this.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<UserId, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    async fn update_profile(
        &self,
        user_id: UserId,
        name: Option<&str>,
        phone: Option<&str>,
        address: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Generate a candidate account number. Uniqueness is enforced by the store
/// (retry on collision), not by this function.
pub(crate) fn new_account_number() -> String {
    let n: u64 = rand::thread_rng().gen_range(10_000_000..100_000_000);
    format!("ACC{}", n)
}
