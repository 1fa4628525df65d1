//! SQLite store backend.
//!
//! Durable counterpart of [`MemoryStore`](super::MemoryStore). Balances are
//! INTEGER minor units; the conditional `UPDATE ... AND balance + ? >= 0`
//! makes the sufficiency check and the write one statement, so the store
//! contract holds even for writers that bypass the engine's locks.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::{AccountStore, StoreError, UserStore, new_account_number};
use crate::models::{Account, AccountType, TransactionRecord, User, UserId};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        name TEXT,
        phone TEXT,
        address TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_number TEXT NOT NULL UNIQUE,
        user_id INTEGER NOT NULL REFERENCES users(id),
        account_type TEXT NOT NULL,
        balance INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tx_id TEXT NOT NULL UNIQUE,
        from_account TEXT,
        to_account TEXT,
        amount INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_tx_from ON transactions(from_account)",
    "CREATE INDEX IF NOT EXISTS idx_tx_to ON transactions(to_account)",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url`, e.g.
    /// `sqlite:bank.db` or `sqlite::memory:`, and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Single connection: SQLite serializes writers anyway, and it keeps
        // `::memory:` databases shared rather than one-per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn row_to_account(row: &SqliteRow) -> Result<Account, StoreError> {
    let balance: i64 = row.try_get("balance")?;
    let account_type: String = row.try_get("account_type")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Account {
        account_number: row.try_get("account_number")?,
        user_id: row.try_get("user_id")?,
        account_type: account_type.parse().unwrap_or_default(),
        balance: balance as u64,
        created_at,
    })
}

fn row_to_record(row: &SqliteRow) -> Result<TransactionRecord, StoreError> {
    let amount: i64 = row.try_get("amount")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(TransactionRecord {
        tx_id: row.try_get("tx_id")?,
        from_account: row.try_get("from_account")?,
        to_account: row.try_get("to_account")?,
        amount: amount as u64,
        created_at,
    })
}

fn row_to_user(row: &SqliteRow) -> Result<User, StoreError> {
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(User {
        user_id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        created_at,
    })
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn create_account(
        &self,
        user_id: UserId,
        account_type: AccountType,
    ) -> Result<Account, StoreError> {
        loop {
            let number = new_account_number();
            let created_at = Utc::now();
            let result = sqlx::query(
                "INSERT INTO accounts (account_number, user_id, account_type, balance, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
            )
            .bind(&number)
            .bind(user_id)
            .bind(account_type.to_string())
            .bind(created_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    return Ok(Account {
                        account_number: number,
                        user_id,
                        account_type,
                        balance: 0,
                        created_at,
                    });
                }
                // Number collision: draw again
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn get_account(&self, account_number: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT account_number, user_id, account_type, balance, created_at
             FROM accounts WHERE account_number = ?1",
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query(
            "SELECT account_number, user_id, account_type, balance, created_at
             FROM accounts WHERE user_id = ?1 ORDER BY account_number",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn adjust_balance(&self, account_number: &str, delta: i64) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE accounts SET balance = balance + ?1
             WHERE account_number = ?2 AND balance + ?1 >= 0",
        )
        .bind(delta)
        .bind(account_number)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back; distinguish the two
            // failure causes for the caller.
            let existing: Option<i64> =
                sqlx::query_scalar("SELECT balance FROM accounts WHERE account_number = ?1")
                    .bind(account_number)
                    .fetch_optional(&mut *tx)
                    .await?;
            return match existing {
                None => Err(StoreError::NotFound),
                Some(_) => Err(StoreError::WouldGoNegative),
            };
        }

        let balance: i64 =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE account_number = ?1")
                .bind(account_number)
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;

        Ok(balance as u64)
    }

    async fn append_record(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO transactions (tx_id, from_account, to_account, amount, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.tx_id)
        .bind(&record.from_account)
        .bind(&record.to_account)
        .bind(record.amount as i64)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn records_for_account(
        &self,
        account_number: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT tx_id, from_account, to_account, amount, created_at
             FROM transactions
             WHERE from_account = ?1 OR to_account = ?1
             ORDER BY id DESC",
        )
        .bind(account_number)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<UserId, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(email.to_ascii_lowercase())
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate(email.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, name, phone, address, created_at
             FROM users WHERE email = ?1",
        )
        .bind(email.to_ascii_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn user_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, name, phone, address, created_at
             FROM users WHERE id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        name: Option<&str>,
        phone: Option<&str>,
        address: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET
                name = COALESCE(?1, name),
                phone = COALESCE(?2, phone),
                address = COALESCE(?3, address)
             WHERE id = ?4",
        )
        .bind(name)
        .bind(phone)
        .bind(address)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
