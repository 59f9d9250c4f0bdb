use std::sync::Arc;

use fabric_auth::ApiKeyResolver;
use fabric_coordinator::{Coordinator, ExpiryReaper};
use fabric_storage::PostgresStorage;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator<PostgresStorage>>,
    pub reaper: Arc<ExpiryReaper<PostgresStorage>>,
    pub resolver: Arc<ApiKeyResolver>,
}
