//! # Configuration Management
//!
//! Structured configuration for the probe: where to listen, where the
//! schema data file lives, and how loudly to log.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment variable overrides via `from_env()`
//!
//! Protocol constants (stream tag, packet types, fragment ceiling) are
//! not configuration; they live as `pub const` next to their codecs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ProtocolError, Result};

/// Port the engine's remote tools subsystem dials by default.
pub const DEFAULT_PORT: u16 = 6777;

/// Top-level probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProbeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

/// Where the engine-build schema dump lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    pub path: PathBuf,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("remote_tools_classes.json"),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default tracing level when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl ProbeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| ProtocolError::ConfigError(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("failed to parse TOML: {e}")))
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(address) = std::env::var("REMOTE_TOOLS_ADDRESS") {
            config.server.address = address;
        }
        if let Ok(port) = std::env::var("REMOTE_TOOLS_PORT") {
            config.server.port = port
                .parse::<u16>()
                .map_err(|e| ProtocolError::ConfigError(format!("invalid port: {e}")))?;
        }
        if let Ok(path) = std::env::var("REMOTE_TOOLS_SCHEMA") {
            config.schema.path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("REMOTE_TOOLS_LOG") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// The socket address string the listener binds.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }

    /// Validate the configuration. Returns all problems found; an empty
    /// list means the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.address.is_empty() {
            errors.push("server.address must not be empty".into());
        }
        if self.server.port == 0 {
            errors.push("server.port must be nonzero".into());
        }
        if self.schema.path.as_os_str().is_empty() {
            errors.push("schema.path must not be empty".into());
        }
        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            errors.push(format!("unknown logging.level {:?}", self.logging.level));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.listen_addr(), "127.0.0.1:6777");
    }

    #[test]
    fn toml_roundtrip() {
        let toml = r#"
            [server]
            address = "0.0.0.0"
            port = 7000

            [schema]
            path = "build_1234_classes.json"

            [logging]
            level = "debug"
        "#;
        let config = ProbeConfig::from_toml(toml).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.schema.path, PathBuf::from("build_1234_classes.json"));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = ProbeConfig::from_toml("[server]\nport = 9000\naddress = \"127.0.0.1\"\n")
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn bad_level_reported() {
        let mut config = ProbeConfig::default();
        config.logging.level = "loud".into();
        assert_eq!(config.validate().len(), 1);
    }
}
