mod api;
mod auth_extract;
mod config;
mod error;
mod state;

use std::sync::Arc;

use clap::Parser;
use fabric_auth::ApiKeyResolver;
use fabric_coordinator::{Coordinator, ExpiryReaper};
use fabric_emission::EmissionClient;
use fabric_storage::PostgresStorage;
use tracing_subscriber::EnvFilter;

use crate::config::CliArgs;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = CliArgs::parse();

    let storage = Arc::new(
        PostgresStorage::new(&args.database_url, args.db_max_connections, args.db_connect_timeout_secs).await?,
    );
    let emission = Arc::new(EmissionClient::new(args.ledger_base_url.clone(), args.emission_config()));
    emission.clone().spawn_drain_worker();

    let coordinator_config = args.coordinator_config();
    let coordinator = Arc::new(Coordinator::new(storage.clone(), emission.clone(), coordinator_config.clone()));
    let reaper = Arc::new(ExpiryReaper::new(coordinator.clone(), storage, emission, coordinator_config));
    reaper.clone().spawn();

    let resolver = Arc::new(ApiKeyResolver::new(args.parse_tenant_api_keys()));

    let state = AppState { coordinator, reaper: reaper.clone(), resolver };
    let app = api::router::create_router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    tracing::info!(addr = %args.listen_addr, "fabric-coordinator-service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(reaper))
        .await?;

    Ok(())
}

async fn shutdown_signal(reaper: Arc<ExpiryReaper<PostgresStorage>>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    reaper.shutdown();
    tracing::info!("shutdown signal received");
}
