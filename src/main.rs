//! MiniBank server entry point.
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│  Store   │───▶│  Ledger  │───▶│ Gateway  │
//! │  (YAML)  │    │(mem/sqlite)   │ (engine) │    │  (axum)  │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use minibank::auth::AuthService;
use minibank::config::{AppConfig, StorageBackend};
use minibank::gateway::{self, state::AppState};
use minibank::ledger::Ledger;
use minibank::logging::init_logging;
use minibank::store::{AccountStore, MemoryStore, SqliteStore, UserStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--env" && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    std::env::var("MINIBANK_ENV").unwrap_or_else(|_| "dev".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = init_logging(&config);

    info!(env = %env, build = env!("GIT_HASH"), "starting minibank");

    let (accounts, users): (Arc<dyn AccountStore>, Arc<dyn UserStore>) = match config
        .storage
        .backend
    {
        StorageBackend::Memory => {
            info!("storage backend: in-memory (volatile)");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        }
        StorageBackend::Sqlite => {
            info!(url = %config.storage.sqlite_url, "storage backend: sqlite");
            let store = Arc::new(
                SqliteStore::connect(&config.storage.sqlite_url)
                    .await
                    .context("failed to open sqlite database")?,
            );
            (store.clone(), store)
        }
    };

    let ledger = Ledger::new(
        accounts.clone(),
        Duration::from_millis(config.ledger.lock_timeout_ms),
    );
    let auth = Arc::new(AuthService::new(users.clone(), config.jwt_secret.clone()));

    let state = Arc::new(AppState::new(ledger, accounts, users, auth));

    gateway::run_server(&config.gateway.host, config.gateway.port, state)
        .await
        .context("gateway server failed")?;

    Ok(())
}
