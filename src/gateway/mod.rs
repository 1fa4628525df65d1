//! HTTP gateway: routing and server startup.
//!
//! The gateway owns no ledger logic. It authenticates, parses, calls the
//! engine or a store collaborator, and maps typed errors onto the wire.

pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::auth::middleware::jwt_auth_middleware;
use state::AppState;

/// Build the full application router.
///
/// Separated from [`run_server`] so tests can drive the router without
/// binding a socket.
pub fn router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login));

    // Everything below requires a verified JWT
    let protected_routes = Router::new()
        .route(
            "/accounts",
            post(handlers::create_account).get(handlers::list_accounts),
        )
        .route(
            "/accounts/{account_number}/balance",
            get(handlers::get_balance),
        )
        .route(
            "/accounts/{account_number}/transactions",
            get(handlers::list_transactions),
        )
        .route(
            "/accounts/{account_number}/transactions/export",
            get(handlers::export_transactions),
        )
        .route("/ledger/deposit", post(handlers::deposit))
        .route("/ledger/withdraw", post(handlers::withdraw))
        .route("/ledger/transfer", post(handlers::transfer))
        .route(
            "/user/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1", protected_routes)
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!("gateway listening on http://{}", addr);

    axum::serve(listener, app).await
}
