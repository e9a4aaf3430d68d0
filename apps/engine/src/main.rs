//! Rankguard permission engine runtime.

#![forbid(unsafe_code)]

mod catalog;
mod engine_config;

use std::sync::Arc;

use rankguard_application::{InvalidationListener, PermissionEngine};
use rankguard_core::{AppError, AppResult};
use rankguard_infrastructure::{PostgresPermissionStore, RedisInvalidationBus};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine_config::EngineConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = EngineConfig::load()?;
    let pool = connect_pool(config.database_url.as_str(), config.database_max_connections).await?;
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    let registry = catalog::declared_permissions()?;
    let store = Arc::new(PostgresPermissionStore::new(pool));
    let engine = PermissionEngine::bootstrap(store, &registry, config.engine).await?;

    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|error| AppError::Internal(format!("invalid REDIS_URL: {error}")))?;
    let bus = Arc::new(RedisInvalidationBus::new(redis_client, config.bus.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = InvalidationListener::new(engine.clone(), bus, config.listener)
        .spawn(shutdown_rx.clone());
    let sweeper = engine.spawn_decision_sweeper(config.decision_sweep_interval, shutdown_rx);

    let stats = engine.cache_stats();
    info!(
        consumer = %config.bus.consumer,
        group = %config.bus.group,
        permissions = stats.permissions,
        roles = stats.roles,
        grants = stats.grants,
        decision_ttl_seconds = config.engine.decision_ttl.as_secs(),
        "rankguard-engine started"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| AppError::Internal(format!("failed to listen for shutdown: {error}")))?;
    info!("shutdown requested");

    if shutdown_tx.send(true).is_err() {
        warn!("background tasks already stopped");
    }
    for (task, handle) in [("invalidation listener", listener), ("decision sweeper", sweeper)] {
        if let Err(error) = handle.await {
            warn!(task, error = %error, "background task ended abnormally");
        }
    }

    let decisions = engine.decision_stats();
    info!(
        decision_hits = decisions.hits,
        decision_misses = decisions.misses,
        "rankguard-engine stopped"
    );
    Ok(())
}

async fn connect_pool(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to connect to database: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
