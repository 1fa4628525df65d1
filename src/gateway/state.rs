use std::sync::Arc;

use crate::auth::AuthService;
use crate::ledger::Ledger;
use crate::store::{AccountStore, UserStore};

/// Shared gateway state.
///
/// The ledger engine owns all balance mutations; the two store handles are
/// for the collaborator surfaces (account creation/listing, profile CRUD)
/// that never touch balances.
pub struct AppState {
    pub ledger: Ledger,
    pub accounts: Arc<dyn AccountStore>,
    pub users: Arc<dyn UserStore>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(
        ledger: Ledger,
        accounts: Arc<dyn AccountStore>,
        users: Arc<dyn UserStore>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            ledger,
            accounts,
            users,
            auth,
        }
    }
}
