use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::ExposeSecret;
use tokio::sync::watch;
use tracing::{info, warn};

use asset_lifecycle::api::{create_router, create_router_with_rate_limit};
use asset_lifecycle::app::{AppState, LifecycleService, StatusPoller, WorkerPool};
use asset_lifecycle::config::AppConfig;
use asset_lifecycle::infra::observability::{init_metrics, init_tracing};
use asset_lifecycle::infra::{
    HttpStatusService, PostgresClient, PostgresConfig, RpcBlockchainClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;
    init_tracing(config.log_json);

    let metrics = init_metrics().context("failed to install metrics recorder")?;

    let db = Arc::new(
        PostgresClient::new(config.database_url.expose_secret(), PostgresConfig::default())
            .await
            .context("failed to connect to database")?,
    );
    db.run_migrations()
        .await
        .context("failed to run migrations")?;

    let chain = Arc::new(RpcBlockchainClient::new(
        &config.chain_rpc_url,
        config.rpc.clone(),
    )?);
    let status = Arc::new(HttpStatusService::new(
        &config.status_service_url,
        config.status.clone(),
    )?);

    let pool = WorkerPool::new(config.worker_pool_capacity)?;
    let poller = Arc::new(StatusPoller::new(config.poller.clone(), pool.clone())?);

    let service = Arc::new(LifecycleService::new(
        db.clone(),
        db,
        chain,
        status,
        Arc::clone(&poller),
        pool.clone(),
    ));

    match service.resume_watching().await {
        Ok(resumed) => info!(resumed, "Storage watches restored"),
        Err(e) => warn!(error = %e, "Could not restore storage watches"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shard_loops = poller.start(shutdown_rx);

    let state = Arc::new(AppState::new(service).with_metrics(metrics));
    let router = match config.rate_limit {
        Some(limits) => {
            info!(rps = limits.general_rps, burst = limits.general_burst, "Rate limiting enabled");
            create_router_with_rate_limit(state, limits)
        }
        None => create_router(state),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, shards = poller.shard_count(), "Server starting");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    })
    .await?;

    let _ = shutdown_tx.send(true);
    pool.close();
    for handle in shard_loops {
        if let Err(e) = handle.await {
            warn!(error = %e, "Shard loop ended abnormally");
        }
    }
    info!("Shutdown complete");

    Ok(())
}
