use std::env;
use std::time::Duration;

use rankguard_application::{InvalidationListenerConfig, PermissionEngineConfig};
use rankguard_core::{AppError, AppResult};
use rankguard_infrastructure::RedisInvalidationBusConfig;

/// Process configuration loaded from the environment.
#[derive(Debug, Clone)]
pub(crate) struct EngineConfig {
    pub database_url: String,
    pub redis_url: String,
    pub database_max_connections: u32,
    pub decision_sweep_interval: Duration,
    pub engine: PermissionEngineConfig,
    pub listener: InvalidationListenerConfig,
    pub bus: RedisInvalidationBusConfig,
}

impl EngineConfig {
    pub(crate) fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let redis_url = required_env("REDIS_URL")?;
        let database_max_connections = parse_env_u32("PERMS_DATABASE_MAX_CONNECTIONS", 5)?;
        let decision_ttl_seconds = parse_env_u64("PERMS_DECISION_CACHE_TTL_SECONDS", 300)?;
        let sweep_seconds = parse_env_u64("PERMS_DECISION_CACHE_SWEEP_SECONDS", 60)?;
        let reload_timeout_ms = parse_env_u64("PERMS_RELOAD_TIMEOUT_MS", 5_000)?;
        let retry_min_ms = parse_env_u64("PERMS_LISTENER_RETRY_MIN_MS", 500)?;
        let retry_max_ms = parse_env_u64("PERMS_LISTENER_RETRY_MAX_MS", 30_000)?;
        let block_ms = parse_env_u64("PERMS_BUS_BLOCK_MS", 5_000)?;
        let read_timeout_ms = parse_env_u64("PERMS_BUS_READ_TIMEOUT_MS", 10_000)?;
        let group = optional_env("PERMS_BUS_CONSUMER_GROUP").unwrap_or_else(|| "rankguard".to_owned());
        let consumer = optional_env("PERMS_BUS_CONSUMER_NAME")
            .unwrap_or_else(|| format!("engine-{}", std::process::id()));
        let stream_prefix = optional_env("PERMS_BUS_STREAM_PREFIX").unwrap_or_default();

        if database_max_connections == 0 {
            return Err(AppError::Validation(
                "PERMS_DATABASE_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        if sweep_seconds == 0 {
            return Err(AppError::Validation(
                "PERMS_DECISION_CACHE_SWEEP_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if reload_timeout_ms == 0 {
            return Err(AppError::Validation(
                "PERMS_RELOAD_TIMEOUT_MS must be greater than zero".to_owned(),
            ));
        }

        if retry_min_ms == 0 || retry_max_ms < retry_min_ms {
            return Err(AppError::Validation(
                "PERMS_LISTENER_RETRY_MIN_MS must be positive and not exceed PERMS_LISTENER_RETRY_MAX_MS"
                    .to_owned(),
            ));
        }

        let bus = RedisInvalidationBusConfig {
            stream_prefix,
            group,
            consumer,
            block: Duration::from_millis(block_ms),
            read_timeout: Duration::from_millis(read_timeout_ms),
            ..RedisInvalidationBusConfig::default()
        };
        if bus.block.is_zero() || bus.read_timeout <= bus.block {
            return Err(AppError::Validation(
                "PERMS_BUS_BLOCK_MS must be positive and below PERMS_BUS_READ_TIMEOUT_MS"
                    .to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            redis_url,
            database_max_connections,
            decision_sweep_interval: Duration::from_secs(sweep_seconds),
            engine: PermissionEngineConfig {
                decision_ttl: Duration::from_secs(decision_ttl_seconds),
                reload_timeout: Duration::from_millis(reload_timeout_ms),
            },
            listener: InvalidationListenerConfig {
                retry_min: Duration::from_millis(retry_min_ms),
                retry_max: Duration::from_millis(retry_max_ms),
            },
            bus,
        })
    }
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
