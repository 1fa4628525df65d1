//! Core data model: accounts and the immutable transaction records that
//! document every committed balance mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User identifier, owned by the auth collaborator. The ledger never mutates
/// user rows; it only references them as account owners.
pub type UserId = i64;

/// Account category. Has no effect on ledger semantics; carried for the
/// account-listing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AccountType {
    #[default]
    Savings,
    Checking,
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::Savings => write!(f, "Savings"),
            AccountType::Checking => write!(f, "Checking"),
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Savings" => Ok(AccountType::Savings),
            "Checking" => Ok(AccountType::Checking),
            other => Err(format!("unknown account type: {}", other)),
        }
    }
}

/// A single account row.
///
/// # Invariants
/// - `account_number` is globally unique and immutable after creation
/// - `balance` is in minor units and never negative
/// - balance mutations go through the ledger engine only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub user_id: UserId,
    pub account_type: AccountType,
    pub balance: u64,
    pub created_at: DateTime<Utc>,
}

/// User row, owned by the auth/profile collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: UserId,
    pub email: String,
    /// PHC-format argon2 hash; never serialized to clients.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Transaction kind, derived from which account references are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

/// Immutable audit record for one committed balance mutation.
///
/// Exactly one record exists per successful ledger operation and zero per
/// failed one. Records are append-only: never updated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// ULID, generated at commit time, never reused.
    pub tx_id: String,
    /// Debited account; absent for pure deposits.
    pub from_account: Option<String>,
    /// Credited account; absent for pure withdrawals.
    pub to_account: Option<String>,
    /// Positive amount in minor units.
    pub amount: u64,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn deposit(to_account: &str, amount: u64) -> Self {
        Self::new(None, Some(to_account.to_string()), amount)
    }

    pub fn withdrawal(from_account: &str, amount: u64) -> Self {
        Self::new(Some(from_account.to_string()), None, amount)
    }

    pub fn transfer(from_account: &str, to_account: &str, amount: u64) -> Self {
        Self::new(
            Some(from_account.to_string()),
            Some(to_account.to_string()),
            amount,
        )
    }

    fn new(from_account: Option<String>, to_account: Option<String>, amount: u64) -> Self {
        Self {
            tx_id: ulid::Ulid::new().to_string(),
            from_account,
            to_account,
            amount,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match (&self.from_account, &self.to_account) {
            (None, Some(_)) => TransactionKind::Deposit,
            (Some(_), None) => TransactionKind::Withdrawal,
            _ => TransactionKind::Transfer,
        }
    }

    /// Whether this record involves the given account on either side.
    pub fn touches(&self, account_number: &str) -> bool {
        self.from_account.as_deref() == Some(account_number)
            || self.to_account.as_deref() == Some(account_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_from_sides() {
        assert_eq!(
            TransactionRecord::deposit("ACC1", 100).kind(),
            TransactionKind::Deposit
        );
        assert_eq!(
            TransactionRecord::withdrawal("ACC1", 100).kind(),
            TransactionKind::Withdrawal
        );
        assert_eq!(
            TransactionRecord::transfer("ACC1", "ACC2", 100).kind(),
            TransactionKind::Transfer
        );
    }

    #[test]
    fn record_touches_either_side() {
        let rec = TransactionRecord::transfer("ACC1", "ACC2", 100);
        assert!(rec.touches("ACC1"));
        assert!(rec.touches("ACC2"));
        assert!(!rec.touches("ACC3"));
    }

    #[test]
    fn tx_ids_are_unique() {
        let a = TransactionRecord::deposit("ACC1", 1);
        let b = TransactionRecord::deposit("ACC1", 1);
        assert_ne!(a.tx_id, b.tx_id);
    }
}
