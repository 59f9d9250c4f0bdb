use std::sync::Arc;

use fabric_auth::ApiKeyResolver;
use fabric_ledger::Ledger;
use fabric_storage::PostgresStorage;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger<PostgresStorage>>,
    pub resolver: Arc<ApiKeyResolver>,
}
