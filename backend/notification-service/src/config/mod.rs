use crate::error::{AppError, Result};
use push_delivery::{CircuitBreakerConfig, EngineConfig, RateLimiterConfig};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub fcm: FcmConfig,
    pub push: PushConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    #[serde(skip_serializing)]
    pub server_key: String,
    pub endpoint: String,
}

/// Delivery engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub max_batch_size: usize,
    pub worker_count: usize,
    pub max_retries: u32,
    pub rate_capacity: u32,
    pub rate_per_sec: f64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
    pub deadline_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("{} must be set", key)))
        };

        Ok(Config {
            app: AppConfig {
                env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            fcm: FcmConfig {
                server_key: required("FCM_SERVER_KEY")?,
                endpoint: lookup("FCM_ENDPOINT")
                    .unwrap_or_else(|| fcm_provider::FCM_LEGACY_ENDPOINT.to_string()),
            },
            push: PushConfig {
                max_batch_size: parse_or(&lookup, "PUSH_MAX_BATCH_SIZE", 500)?,
                worker_count: parse_or(&lookup, "PUSH_WORKER_COUNT", 4)?,
                max_retries: parse_or(&lookup, "PUSH_MAX_RETRIES", 3)?,
                rate_capacity: parse_or(&lookup, "PUSH_RATE_CAPACITY", 20)?,
                rate_per_sec: parse_or(&lookup, "PUSH_RATE_PER_SEC", 20.0)?,
                breaker_threshold: parse_or(&lookup, "PUSH_BREAKER_THRESHOLD", 5)?,
                breaker_cooldown_secs: parse_or(&lookup, "PUSH_BREAKER_COOLDOWN_SECS", 60)?,
                deadline_secs: parse_or(&lookup, "PUSH_DEADLINE_SECS", 120)?,
            },
        })
    }

    /// Engine configuration: push presets overridden by `PUSH_*` settings
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        let push = &self.push;

        EngineConfig {
            max_batch_size: push.max_batch_size,
            worker_count: push.worker_count,
            retry: push_delivery::RetryConfig {
                max_retries: push.max_retries,
                ..defaults.retry.clone()
            },
            rate_limit: RateLimiterConfig {
                capacity: push.rate_capacity,
                refill_per_sec: push.rate_per_sec,
                ..defaults.rate_limit.clone()
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: push.breaker_threshold,
                timeout: Duration::from_secs(push.breaker_cooldown_secs),
                ..defaults.circuit_breaker.clone()
            },
            default_deadline: Duration::from_secs(push.deadline_secs),
            ..defaults
        }
    }

    pub fn is_production(&self) -> bool {
        self.app.env == "production"
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} is invalid ({:?}): {}", key, raw, e))),
        None => Ok(default),
    }
}
