//! MiniBank - transactional account ledger service
//!
//! Account balances mutated under strict guarantees: no balance goes
//! negative, every mutation leaves exactly one immutable audit record, and
//! transfers are atomic even under concurrent access to the same accounts.
//!
//! # Modules
//!
//! - [`models`] - Account, user and transaction-record types
//! - [`money`] - Decimal-string ⇄ minor-unit conversion
//! - [`store`] - Repository traits + in-memory and SQLite backends
//! - [`ledger`] - The transactional engine (deposit/withdraw/transfer)
//! - [`auth`] - Registration, login, JWT verification
//! - [`gateway`] - axum HTTP surface
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing initialization

pub mod auth;
pub mod config;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod money;
pub mod store;

// Convenient re-exports at crate root
pub use ledger::{DepositReceipt, Ledger, LedgerError};
pub use models::{Account, AccountType, TransactionKind, TransactionRecord, User, UserId};
pub use store::{AccountStore, MemoryStore, SqliteStore, StoreError, UserStore};
