/// Configuration management for enlace

use crate::core::{ConnectOptions, Endpoint};
use crate::error::{ConfigError, RouterResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Main enlace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend pool configuration
    pub router: RouterConfig,
    /// Routing behaviour
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Backend pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// mongos endpoints as host:port, in pool order
    pub backends: Vec<String>,
    /// Database used when a caller does not name one
    pub default_db: String,
    /// Connection option string, e.g. "retryWrites=true&w=majority"
    #[serde(default)]
    pub options: String,
}

/// Routing behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Seed for backend selection; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Drop cursor pins once the cursor is exhausted or killed
    #[serde(default)]
    pub evict_exhausted_cursors: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
    /// Log to stdout
    pub stdout: bool,
    /// Log file path (optional)
    pub file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            router: RouterConfig {
                backends: vec!["127.0.0.1:27017".to_string()],
                default_db: "test".to_string(),
                options: String::new(),
            },
            routing: RoutingConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
                stdout: true,
                file: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router.backends.is_empty() {
            return Err(ConfigError::ValidationError(
                "backends cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for backend in &self.router.backends {
            let endpoint = backend.parse::<Endpoint>().map_err(|_| {
                ConfigError::ValidationError(format!("Invalid backend endpoint: {}", backend))
            })?;
            if !seen.insert(endpoint.to_string()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate backend endpoint: {}",
                    backend
                )));
            }
        }

        if self.router.default_db.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_db cannot be empty".to_string(),
            ));
        }

        ConnectOptions::parse(&self.router.options)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log level: {}", self.logging.level)
            )),
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log format: {}", self.logging.format)
            )),
        }

        Ok(())
    }

    /// Parsed backend endpoints in pool order
    pub fn endpoints(&self) -> RouterResult<Vec<Endpoint>> {
        self.router
            .backends
            .iter()
            .map(|backend| backend.parse())
            .collect()
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config {
            router: RouterConfig {
                backends: vec![
                    "10.0.1.10:27017".to_string(),
                    "10.0.1.11:27017".to_string(),
                    "10.0.1.12:27017".to_string(),
                ],
                default_db: "test".to_string(),
                options: "retryWrites=true&w=majority".to_string(),
            },
            routing: RoutingConfig {
                seed: None,
                evict_exhausted_cursors: false,
            },
            ..Default::default()
        };

        config.save_to_file(path)
    }
}
