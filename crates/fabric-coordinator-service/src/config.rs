//! Explicit service configuration, loaded once in `main` via `clap`.

use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;
use fabric_coordinator::CoordinatorConfig;
use fabric_emission::EmissionConfig;
use fabric_types::TenantId;

#[derive(Debug, Parser)]
#[command(name = "fabric-coordinator-service")]
pub struct CliArgs {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "LEDGER_BASE_URL")]
    pub ledger_base_url: String,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8082")]
    pub listen_addr: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    #[arg(long, env = "DB_CONNECT_TIMEOUT_SECS", default_value_t = 5)]
    pub db_connect_timeout_secs: u64,

    #[arg(long, env = "LEASE_DURATION_SECONDS", default_value_t = 900)]
    pub lease_duration_secs: i64,

    #[arg(long, env = "REAPER_INTERVAL_SECONDS", default_value_t = 30)]
    pub reaper_interval_secs: u64,

    #[arg(long, env = "DEFAULT_ESCALATION_RECIPIENT", default_value = "delegate")]
    pub default_escalation_recipient: String,

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

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            lease_duration_secs: self.lease_duration_secs,
            reaper_interval: Duration::from_secs(self.reaper_interval_secs),
            default_escalation_recipient: self.default_escalation_recipient.clone(),
        }
    }

    pub fn emission_config(&self) -> EmissionConfig {
        EmissionConfig::default()
    }
}
