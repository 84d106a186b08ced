//! Process configuration read from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::api::RateLimitConfig;
use crate::app::PollerConfig;
use crate::domain::ConfigError;
use crate::infra::{RpcClientConfig, StatusClientConfig};

const DEFAULT_CHAIN_RPC_URL: &str = "http://127.0.0.1:8899";
const DEFAULT_STATUS_SERVICE_URL: &str = "http://127.0.0.1:8081/status";
const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000);
const DEFAULT_WORKER_POOL_CAPACITY: usize = 64;

/// Everything the server binary needs to wire itself up.
#[derive(Debug)]
pub struct AppConfig {
    pub database_url: SecretString,
    pub chain_rpc_url: String,
    pub status_service_url: String,
    pub bind_addr: SocketAddr,
    pub poller: PollerConfig,
    pub worker_pool_capacity: usize,
    pub rpc: RpcClientConfig,
    pub status: StatusClientConfig,
    /// `None` unless `RATE_LIMIT_RPS` is set.
    pub rate_limit: Option<RateLimitConfig>,
    pub log_json: bool,
}

impl AppConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let defaults = PollerConfig::default();
        let poller = PollerConfig {
            shard_bits: parse_or(&lookup, "POLLER_SHARD_BITS", defaults.shard_bits)?,
            shard_capacity: parse_or(&lookup, "POLLER_SHARD_CAPACITY", defaults.shard_capacity)?,
            tick_interval: secs_or(&lookup, "POLLER_TICK_SECS", defaults.tick_interval)?,
            base_interval: secs_or(
                &lookup,
                "POLLER_BASE_INTERVAL_SECS",
                defaults.base_interval,
            )?,
            max_backoff: secs_or(&lookup, "POLLER_MAX_BACKOFF_SECS", defaults.max_backoff)?,
        };
        poller.validate()?;

        let worker_pool_capacity =
            parse_or(&lookup, "WORKER_POOL_CAPACITY", DEFAULT_WORKER_POOL_CAPACITY)?;
        if worker_pool_capacity == 0 {
            return Err(invalid("WORKER_POOL_CAPACITY", "must be greater than zero"));
        }

        let rpc = RpcClientConfig {
            confirmation_timeout: secs_or(
                &lookup,
                "CHAIN_CONFIRMATION_TIMEOUT_SECS",
                RpcClientConfig::default().confirmation_timeout,
            )?,
            ..RpcClientConfig::default()
        };
        let status = StatusClientConfig {
            request_timeout: secs_or(
                &lookup,
                "STATUS_REQUEST_TIMEOUT_SECS",
                StatusClientConfig::default().request_timeout,
            )?,
        };

        let rate_limit = match lookup("RATE_LIMIT_RPS") {
            Some(_) => {
                let defaults = RateLimitConfig::default();
                let config = RateLimitConfig {
                    general_rps: parse_or(&lookup, "RATE_LIMIT_RPS", defaults.general_rps)?,
                    general_burst: parse_or(&lookup, "RATE_LIMIT_BURST", defaults.general_burst)?,
                    ..defaults
                };
                if config.general_rps == 0 || config.general_burst == 0 {
                    return Err(invalid("RATE_LIMIT_RPS", "rate and burst must be non-zero"));
                }
                Some(config)
            }
            None => None,
        };

        let log_json = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") | Some("pretty") => false,
            Some("json") => true,
            Some(other) => {
                return Err(invalid(
                    "LOG_FORMAT",
                    &format!("expected 'text' or 'json', got '{}'", other),
                ));
            }
        };

        Ok(Self {
            database_url: SecretString::from(database_url),
            chain_rpc_url: lookup("CHAIN_RPC_URL")
                .unwrap_or_else(|| DEFAULT_CHAIN_RPC_URL.to_string()),
            status_service_url: lookup("STATUS_SERVICE_URL")
                .unwrap_or_else(|| DEFAULT_STATUS_SERVICE_URL.to_string()),
            bind_addr: parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR)?,
            poller,
            worker_pool_capacity,
            rpc,
            status,
            rate_limit,
            log_json,
        })
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &format!("'{}': {}", raw, e))),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let default_secs = default.as_secs();
    parse_or(lookup, key, default_secs).map(Duration::from_secs)
}
