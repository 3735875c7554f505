use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

use crate::services::identifier::DEFAULT_MISSING_SENTINELS;

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub storage: StorageBackend,
    pub settlement: SettlementSettings,
    pub cors_origins: Vec<String>,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid SETTLEMENT_STORAGE: {}. Must be one of: mongo, memory",
                other
            ))),
        }
    }
}

/// Knobs of the settlement engine.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementSettings {
    pub default_payment_method: String,
    /// Placeholder table identifiers meaning "no table". Case-sensitive.
    pub missing_table_sentinels: Vec<String>,
    /// Offset used for invoice numbers and the "today" order view.
    pub utc_offset_minutes: i32,
    pub lock_wait_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            default_payment_method: "Cash".to_string(),
            missing_table_sentinels: DEFAULT_MISSING_SENTINELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            utc_offset_minutes: 330,
            lock_wait_ms: 5_000,
            request_timeout_secs: 30,
        }
    }
}

impl SettlementSettings {
    pub fn utc_offset(&self) -> FixedOffset {
        // Out-of-range values are rejected at load time; fall back to UTC.
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SettlementConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";
        let defaults = SettlementSettings::default();

        let storage: StorageBackend = get_env("SETTLEMENT_STORAGE", Some("mongo"), false)?.parse()?;
        if is_prod && storage == StorageBackend::Memory {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SETTLEMENT_STORAGE=memory is not allowed in production"
            )));
        }

        let mongodb = match storage {
            StorageBackend::Mongo => MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("restaurant_db"), is_prod)?,
            },
            StorageBackend::Memory => MongoConfig {
                uri: env::var("MONGODB_URI").unwrap_or_default(),
                database: env::var("MONGODB_DATABASE").unwrap_or_default(),
            },
        };

        let utc_offset_minutes = parse_number("SETTLEMENT_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)?;
        if FixedOffset::east_opt(utc_offset_minutes * 60).is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SETTLEMENT_UTC_OFFSET_MINUTES out of range: {}",
                utc_offset_minutes
            )));
        }

        Ok(SettlementConfig {
            common: common_config,
            mongodb,
            storage,
            settlement: SettlementSettings {
                default_payment_method: env::var("SETTLEMENT_DEFAULT_PAYMENT_METHOD")
                    .ok()
                    .filter(|pm| !pm.trim().is_empty())
                    .unwrap_or(defaults.default_payment_method),
                missing_table_sentinels: env::var("SETTLEMENT_MISSING_TABLE_SENTINELS")
                    .map(|raw| parse_list(&raw))
                    .unwrap_or(defaults.missing_table_sentinels),
                utc_offset_minutes,
                lock_wait_ms: parse_number("SETTLEMENT_LOCK_WAIT_MS", defaults.lock_wait_ms)?,
                request_timeout_secs: parse_number(
                    "SETTLEMENT_REQUEST_TIMEOUT_SECS",
                    defaults.request_timeout_secs,
                )?,
            },
            cors_origins: env::var("CORS_ORIGINS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|e| !e.is_empty()),
        })
    }
}

/// Comma-separated list, entries trimmed, empties dropped.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.trim().parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} is not a valid number: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
