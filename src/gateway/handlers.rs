//! HTTP handlers. Thin: parse/convert input, enforce ownership, call the
//! engine or a store collaborator, map the typed error to the wire envelope.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::warn;

use super::state::AppState;
use super::types::*;
use crate::auth::{AuthError, Claims, LoginRequest, RegisterRequest};
use crate::ledger::LedgerError;
use crate::models::Account;
use crate::money::{self, CURRENCY_DECIMALS};

type ErrorReply = (StatusCode, Json<ApiResponse<()>>);

fn reply_error(status: StatusCode, code: i32, msg: impl Into<String>) -> ErrorReply {
    (status, Json(ApiResponse::<()>::error(code, msg)))
}

fn ledger_error(err: LedgerError) -> ErrorReply {
    let (status, code) = match &err {
        LedgerError::InvalidAmount => (StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER),
        LedgerError::AccountNotFound(_) => (StatusCode::NOT_FOUND, error_codes::ACCOUNT_NOT_FOUND),
        LedgerError::InsufficientFunds(_) => {
            (StatusCode::BAD_REQUEST, error_codes::INSUFFICIENT_FUNDS)
        }
        // Retryable: the client may simply resubmit
        LedgerError::Contended(_) => (StatusCode::TOO_MANY_REQUESTS, error_codes::ACCOUNT_BUSY),
        LedgerError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
        ),
    };
    reply_error(status, code, err.to_string())
}

fn auth_error(err: AuthError) -> ErrorReply {
    match &err {
        AuthError::InvalidCredentials | AuthError::InvalidToken => reply_error(
            StatusCode::UNAUTHORIZED,
            error_codes::AUTH_FAILED,
            err.to_string(),
        ),
        AuthError::EmailTaken => reply_error(
            StatusCode::CONFLICT,
            error_codes::INVALID_PARAMETER,
            err.to_string(),
        ),
        AuthError::InvalidInput(_) => reply_error(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            err.to_string(),
        ),
        AuthError::Storage(_) => {
            warn!(error = %err, "auth storage failure");
            reply_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "internal error",
            )
        }
    }
}

fn parse_amount(amount: rust_decimal::Decimal) -> Result<u64, ErrorReply> {
    money::parse_decimal(amount, CURRENCY_DECIMALS).map_err(|e| {
        reply_error(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            e.to_string(),
        )
    })
}

/// Fetch an account and verify it belongs to the authenticated user.
async fn owned_account(
    state: &AppState,
    claims: &Claims,
    account_number: &str,
) -> Result<Account, ErrorReply> {
    let user_id = claims.user_id().map_err(|e| auth_error(e))?;
    let account = state
        .accounts
        .get_account(account_number)
        .await
        .map_err(|e| {
            warn!(error = %e, "account lookup failed");
            reply_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "internal error",
            )
        })?
        .ok_or_else(|| {
            reply_error(
                StatusCode::NOT_FOUND,
                error_codes::ACCOUNT_NOT_FOUND,
                format!("account not found: {}", account_number),
            )
        })?;

    if account.user_id != user_id {
        return Err(reply_error(
            StatusCode::FORBIDDEN,
            error_codes::FORBIDDEN,
            "account does not belong to the authenticated user",
        ));
    }
    Ok(account)
}

// --- Health ---

/// GET /api/v1/health
pub async fn health_check() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        build: env!("GIT_HASH"),
    }))
}

// --- Auth ---

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<i64>>), ErrorReply> {
    match state.auth.register(req).await {
        Ok(user_id) => Ok((StatusCode::CREATED, Json(ApiResponse::success(user_id)))),
        Err(e) => Err(auth_error(e)),
    }
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<crate::auth::AuthResponse>>, ErrorReply> {
    match state.auth.login(req).await {
        Ok(resp) => Ok(Json(ApiResponse::success(resp))),
        Err(e) => Err(auth_error(e)),
    }
}

// --- Accounts ---

/// POST /api/v1/accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccountView>>), ErrorReply> {
    let user_id = claims.user_id().map_err(auth_error)?;
    let account = state
        .accounts
        .create_account(user_id, req.account_type)
        .await
        .map_err(|e| {
            warn!(error = %e, "account creation failed");
            reply_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "account creation failed",
            )
        })?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(account.into())),
    ))
}

/// GET /api/v1/accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<AccountView>>>, ErrorReply> {
    let user_id = claims.user_id().map_err(auth_error)?;
    let accounts = state.accounts.accounts_for_user(user_id).await.map_err(|e| {
        warn!(error = %e, "account listing failed");
        reply_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            "internal error",
        )
    })?;
    Ok(Json(ApiResponse::success(
        accounts.into_iter().map(AccountView::from).collect(),
    )))
}

/// GET /api/v1/accounts/{account_number}/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(account_number): Path<String>,
) -> Result<Json<ApiResponse<BalanceResponse>>, ErrorReply> {
    owned_account(&state, &claims, &account_number).await?;
    let balance = state
        .ledger
        .balance(&account_number)
        .await
        .map_err(ledger_error)?;
    Ok(Json(ApiResponse::success(BalanceResponse {
        account_number,
        balance: money::format_amount(balance, CURRENCY_DECIMALS),
    })))
}

// --- Ledger operations ---

/// POST /api/v1/ledger/deposit
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<ApiResponse<DepositResponse>>, ErrorReply> {
    let amount = parse_amount(req.amount)?;
    owned_account(&state, &claims, &req.account_number).await?;

    let receipt = state
        .ledger
        .deposit(&req.account_number, amount)
        .await
        .map_err(ledger_error)?;
    Ok(Json(ApiResponse::success(DepositResponse {
        tx_id: receipt.tx_id,
        new_balance: money::format_amount(receipt.new_balance, CURRENCY_DECIMALS),
    })))
}

/// POST /api/v1/ledger/withdraw
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<ApiResponse<TxResponse>>, ErrorReply> {
    let amount = parse_amount(req.amount)?;
    owned_account(&state, &claims, &req.account_number).await?;

    let tx_id = state
        .ledger
        .withdraw(&req.account_number, amount)
        .await
        .map_err(ledger_error)?;
    Ok(Json(ApiResponse::success(TxResponse { tx_id })))
}

/// POST /api/v1/ledger/transfer
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<ApiResponse<TxResponse>>, ErrorReply> {
    let amount = parse_amount(req.amount)?;
    // Only the debited side must belong to the caller; the credited side may
    // be any existing account.
    owned_account(&state, &claims, &req.from).await?;

    let tx_id = state
        .ledger
        .transfer(&req.from, &req.to, amount)
        .await
        .map_err(ledger_error)?;
    Ok(Json(ApiResponse::success(TxResponse { tx_id })))
}

// --- Transaction history ---

/// GET /api/v1/accounts/{account_number}/transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(account_number): Path<String>,
) -> Result<Json<ApiResponse<Vec<TransactionView>>>, ErrorReply> {
    owned_account(&state, &claims, &account_number).await?;
    let records = state
        .ledger
        .transactions(&account_number)
        .await
        .map_err(ledger_error)?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(TransactionView::from).collect(),
    )))
}

/// GET /api/v1/accounts/{account_number}/transactions/export
///
/// CSV rendering of the same rows as the JSON listing.
pub async fn export_transactions(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(account_number): Path<String>,
) -> Result<impl IntoResponse, ErrorReply> {
    owned_account(&state, &claims, &account_number).await?;
    let records = state
        .ledger
        .transactions(&account_number)
        .await
        .map_err(ledger_error)?;

    let mut csv = String::from("tx_id,kind,from,to,amount,time\n");
    for record in records {
        let view = TransactionView::from(record);
        csv.push_str(&format!(
            "\"{}\",{:?},\"{}\",\"{}\",{},\"{}\"\n",
            view.tx_id,
            view.kind,
            view.from.unwrap_or_default(),
            view.to.unwrap_or_default(),
            view.amount,
            view.time.to_rfc3339(),
        ));
    }

    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        csv,
    ))
}

// --- Profile ---

/// GET /api/v1/user/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<ProfileView>>, ErrorReply> {
    let user_id = claims.user_id().map_err(auth_error)?;
    let user = state
        .users
        .user_by_id(user_id)
        .await
        .map_err(|e| {
            warn!(error = %e, "profile lookup failed");
            reply_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "internal error",
            )
        })?
        .ok_or_else(|| {
            reply_error(
                StatusCode::NOT_FOUND,
                error_codes::ACCOUNT_NOT_FOUND,
                "user not found",
            )
        })?;
    Ok(Json(ApiResponse::success(user.into())))
}

/// PUT /api/v1/user/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<ApiResponse<ProfileView>>, ErrorReply> {
    let user_id = claims.user_id().map_err(auth_error)?;
    state
        .users
        .update_profile(
            user_id,
            req.name.as_deref(),
            req.phone.as_deref(),
            req.address.as_deref(),
        )
        .await
        .map_err(|e| {
            warn!(error = %e, "profile update failed");
            reply_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "profile update failed",
            )
        })?;

    get_profile(State(state), Extension(claims)).await
}
