//! Service configuration.
//!
//! Every setting has a default. `ServiceConfig::from_env` overrides them from
//! `GROUNDSTATION_*` environment variables; the CLI applies its own flags on
//! top of that.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hub::DEFAULT_SEND_TIMEOUT;

pub const DEFAULT_INGEST_PORT: u16 = 8089;
pub const DEFAULT_FEED_PORT: u16 = 8090;

pub const ENV_INGEST_ADDR: &str = "GROUNDSTATION_INGEST_ADDR";
pub const ENV_MAX_IN_FLIGHT: &str = "GROUNDSTATION_MAX_IN_FLIGHT";
pub const ENV_STRICT_LENGTH: &str = "GROUNDSTATION_STRICT_LENGTH";
pub const ENV_FEED_ADDR: &str = "GROUNDSTATION_FEED_ADDR";
pub const ENV_SEND_TIMEOUT_MS: &str = "GROUNDSTATION_SEND_TIMEOUT_MS";
pub const ENV_RETENTION: &str = "GROUNDSTATION_RETENTION";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub bind_addr: SocketAddr,
    /// Frames handled concurrently before new ones are dropped; 0 = no limit.
    pub max_in_flight: usize,
    pub strict_length: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_INGEST_PORT)),
            max_in_flight: 0,
            strict_length: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub bind_addr: SocketAddr,
    pub send_timeout_ms: u64,
}

impl FeedConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_FEED_PORT)),
            send_timeout_ms: DEFAULT_SEND_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum readings kept in memory; `None` keeps everything.
    pub retention: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub ingest: IngestConfig,
    pub feed: FeedConfig,
    pub store: StoreConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults
    /// for keys that are absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let retention = match lookup(ENV_RETENTION) {
            Some(value) => Some(parse_value::<usize>(ENV_RETENTION, &value)?).filter(|&n| n > 0),
            None => defaults.store.retention,
        };

        Ok(Self {
            ingest: IngestConfig {
                bind_addr: parse_or(&lookup, ENV_INGEST_ADDR, defaults.ingest.bind_addr)?,
                max_in_flight: parse_or(&lookup, ENV_MAX_IN_FLIGHT, defaults.ingest.max_in_flight)?,
                strict_length: match lookup(ENV_STRICT_LENGTH) {
                    Some(value) => parse_bool(ENV_STRICT_LENGTH, &value)?,
                    None => defaults.ingest.strict_length,
                },
            },
            feed: FeedConfig {
                bind_addr: parse_or(&lookup, ENV_FEED_ADDR, defaults.feed.bind_addr)?,
                send_timeout_ms: parse_or(&lookup, ENV_SEND_TIMEOUT_MS, defaults.feed.send_timeout_ms)?,
            },
            store: StoreConfig { retention },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

pub fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

pub fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true/false".to_string(),
        }),
    }
}
