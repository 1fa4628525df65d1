//! Transactional ledger engine.
//!
//! Deposit, withdraw and transfer against the account store, each as one
//! atomic unit: balances mutate and exactly one audit record is appended, or
//! nothing happens at all.

pub mod engine;
pub mod error;
pub mod locks;

pub use engine::{DepositReceipt, Ledger};
pub use error::LedgerError;
pub use locks::LockTable;
