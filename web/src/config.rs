//! Server configuration.
//!
//! Loaded from environment variables (after `.env`, if present) with defaults
//! suitable for local development.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default `EnvFilter` directives when `LOG_LEVEL` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,lotkeeper=debug,sqlx=warn";

/// A variable was set to something unparsable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value '{value}' for {key}")]
pub struct ConfigError {
    /// Variable name
    pub key: &'static str,
    /// Offending value
    pub value: String,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// `PostgreSQL` settings; `None` runs on the in-memory store
    pub database: Option<DatabaseConfig>,
    /// Initial lot layout
    pub seed: SeedConfig,
    /// Install the Prometheus recorder and serve `/metrics`
    pub metrics_enabled: bool,
    /// Capacity of the WebSocket event channel
    pub event_buffer: usize,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// `EnvFilter` directives
    pub log_level: String,
    /// Origins allowed to call the API from a browser; `*` allows any
    pub cors_origins: Vec<String>,
}

/// `PostgreSQL` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
}

/// Layout created on first start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Seed an empty store
    pub enabled: bool,
    /// Spaces in the reserved class; the lowest labels get it
    pub reserved: u32,
    /// Spaces in total
    pub total: u32,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reserved: 5,
            total: 30,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database = match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            }),
            None => None,
        };
        let defaults = SeedConfig::default();

        Ok(Self {
            server: ServerConfig {
                host: lookup("LOTKEEPER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "LOTKEEPER_PORT", 8080)?,
                log_level: lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
                cors_origins: list_or(&lookup, "LOTKEEPER_CORS_ORIGINS", &["*"]),
            },
            database,
            seed: SeedConfig {
                enabled: flag_or(&lookup, "LOTKEEPER_SEED", defaults.enabled)?,
                reserved: parse_or(&lookup, "LOTKEEPER_SEED_RESERVED", defaults.reserved)?,
                total: parse_or(&lookup, "LOTKEEPER_SEED_TOTAL", defaults.total)?,
            },
            metrics_enabled: flag_or(&lookup, "LOTKEEPER_METRICS", true)?,
            event_buffer: parse_or(&lookup, "LOTKEEPER_EVENT_BUFFER", 256)?,
        })
    }

    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError { key, value }),
        None => Ok(default),
    }
}

fn list_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &[&str],
) -> Vec<String> {
    let items: Vec<String> = lookup(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect();
    if items.is_empty() {
        default.iter().map(|item| (*item).to_string()).collect()
    } else {
        items
    }
}

fn flag_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError { key, value }),
        },
        None => Ok(default),
    }
}
