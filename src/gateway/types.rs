//! Gateway wire types: the uniform response envelope, numeric error codes
//! and the request/response DTOs.
//!
//! Amounts cross the wire as decimal strings (or JSON numbers, which
//! `rust_decimal` accepts losslessly) and are converted to minor units by
//! the `money` module before they reach the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Account, AccountType, TransactionKind, TransactionRecord, User};
use crate::money::{CURRENCY_DECIMALS, format_amount};

/// Uniform response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 0 for success, non-zero error code otherwise
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_FUNDS: i32 = 1002;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const FORBIDDEN: i32 = 2003;

    // Resource errors (4xxx)
    pub const ACCOUNT_NOT_FOUND: i32 = 4001;
    pub const ACCOUNT_BUSY: i32 = 4291; // retryable

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
}

// --- Requests ---

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub account_type: AccountType,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub account_number: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub account_number: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

// --- Responses ---

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: String,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            account_number: account.account_number,
            account_type: account.account_type,
            balance: format_amount(account.balance, CURRENCY_DECIMALS),
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub tx_id: String,
    pub new_balance: String,
}

#[derive(Debug, Serialize)]
pub struct TxResponse {
    pub tx_id: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_number: String,
    pub balance: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub tx_id: String,
    pub kind: TransactionKind,
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: String,
    pub time: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionView {
    fn from(record: TransactionRecord) -> Self {
        let kind = record.kind();
        Self {
            tx_id: record.tx_id,
            kind,
            from: record.from_account,
            to: record.to_account,
            amount: format_amount(record.amount, CURRENCY_DECIMALS),
            time: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub user_id: i64,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for ProfileView {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            name: user.name,
            phone: user.phone,
            address: user.address,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub build: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_data_on_error() {
        let err = ApiResponse::<()>::error(error_codes::INVALID_PARAMETER, "bad amount");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 1001);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn views_render_minor_units_as_decimal_strings() {
        let record = TransactionRecord::transfer("ACC1", "ACC2", 12_345);
        let view = TransactionView::from(record);
        assert_eq!(view.amount, "123.45");
        assert_eq!(view.kind, TransactionKind::Transfer);
    }

    #[test]
    fn deposit_request_accepts_string_and_number_amounts() {
        let from_string: DepositRequest =
            serde_json::from_str(r#"{"account_number":"ACC1","amount":"12.50"}"#).unwrap();
        let from_number: DepositRequest =
            serde_json::from_str(r#"{"account_number":"ACC1","amount":12.5}"#).unwrap();
        assert_eq!(from_string.amount, from_number.amount);
    }
}
