//! Explicit service configuration, loaded once in `main` via `clap` and
//! threaded through construction (§6, §9 re-architecture note).

use std::collections::HashMap;

use clap::Parser;
use fabric_types::TenantId;

#[derive(Debug, Parser)]
#[command(name = "fabric-ledger-service")]
pub struct CliArgs {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8081")]
    pub listen_addr: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    #[arg(long, env = "DB_CONNECT_TIMEOUT_SECS", default_value_t = 5)]
    pub db_connect_timeout_secs: u64,

    /// Comma-separated `key=tenant_id` pairs accepted as API keys or
    /// bearer tokens (§4.6 MVP tenant resolver).
    #[arg(long, env = "TENANT_API_KEYS", value_delimiter = ',')]
    pub tenant_api_keys: Vec<String>,
}

impl CliArgs {
    pub fn parse_tenant_api_keys(&self) -> HashMap<String, TenantId> {
        self.tenant_api_keys
            .iter()
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, tenant)| (key.to_string(), TenantId::new(tenant)))
            .collect()
    }
}
