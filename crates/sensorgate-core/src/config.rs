//! Configuration module for sensorgate
//!
//! Configuration is layered with figment: defaults, then an optional TOML
//! file, then `SENSORGATE_`-prefixed environment variables. Nested keys use
//! a double underscore in the environment, e.g.
//! `SENSORGATE_SERVER__PORT=8080`.

use std::net::IpAddr;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use sensorgate_common::{GatewayError, Result};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Gateway instance name, used in startup logging
    pub name: String,

    /// Bind address
    pub host: IpAddr,

    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "sensorgate".to_string(),
            host: [0, 0, 0, 0].into(),
            port: 8080,
        }
    }
}

/// Northbound API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Public base URI used to build entity self-links; links are
    /// byte-deterministic for a given base
    pub base_url: String,

    /// Default page size for collection listings
    pub page_size: usize,

    /// Page size for observation history listings
    pub history_page_size: usize,

    /// Number of observations embedded when a client expands a
    /// Datastream's Observations relation
    pub embedded_observations: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            page_size: 25,
            history_page_size: 500,
            embedded_observations: 25,
        }
    }
}

/// History backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Whether the in-memory history backend records twin updates
    pub enabled: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing env-filter directive, e.g. `info` or `sensorgate=debug`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// History configuration
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(GatewayConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("SENSORGATE_").split("__"))
            .extract()
            .map_err(|e| GatewayError::Config(e.to_string()))
    }
}
