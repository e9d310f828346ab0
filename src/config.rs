//! # Configuration Management
//!
//! Centralized configuration for the game server core.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Startup Requirements
//! The RSA modulus and public exponent have no defaults. A configuration
//! without them fails validation, and the server refuses to start without an
//! encryption identity.

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default cap on one wire frame, length field included
pub const MAX_FRAME_SIZE: usize = 8192;

/// Default number of concurrent crypto jobs
pub const CRYPTO_WORKERS: usize = 4;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Listener and connection settings
    #[serde(default)]
    pub server: ServerConfig,

    /// RSA identity for the handshake
    #[serde(default)]
    pub crypto: CryptoConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `HABBO_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override fields that have a matching environment variable set.
    /// Unparseable numbers are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("HABBO_SERVER_ADDRESS") {
            self.server.address = addr;
        }

        if let Ok(timeout) = std::env::var("HABBO_CONNECTION_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                self.server.connection_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(size) = std::env::var("HABBO_MAX_FRAME_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                self.server.max_frame_size = val;
            }
        }

        if let Ok(e) = std::env::var("HABBO_RSA_E") {
            self.crypto.rsa_public_exponent = e;
        }

        if let Ok(n) = std::env::var("HABBO_RSA_N") {
            self.crypto.rsa_modulus = n;
        }

        if let Ok(d) = std::env::var("HABBO_RSA_D") {
            self.crypto.rsa_private_exponent = Some(d);
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.crypto.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:2095")
    pub address: String,

    /// Outbound frames queued per connection before sends fail
    pub backpressure_limit: usize,

    /// Idle time before a connection is force-closed
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// TCP keep-alive probe interval
    #[serde(with = "duration_serde")]
    pub keepalive_interval: Duration,

    /// Time a half-closed connection gets to finish
    #[serde(with = "duration_serde")]
    pub close_grace_period: Duration,

    /// Delay before rebinding after a listener failure
    #[serde(with = "duration_serde")]
    pub restart_delay: Duration,

    /// Interval between status log lines
    #[serde(with = "duration_serde")]
    pub status_interval: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Largest accepted frame in bytes, length field included
    pub max_frame_size: usize,

    /// Concurrent CPU-bound crypto jobs
    pub crypto_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:2095"),
            backpressure_limit: 64,
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            keepalive_interval: timeout::KEEPALIVE_INTERVAL,
            close_grace_period: timeout::CLOSE_GRACE_PERIOD,
            restart_delay: timeout::RESTART_DELAY,
            status_interval: timeout::STATUS_INTERVAL,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
            crypto_workers: CRYPTO_WORKERS,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:2095')",
                self.address
            ));
        }

        if self.backpressure_limit == 0 {
            errors.push("Backpressure limit must be greater than 0".to_string());
        } else if self.backpressure_limit > 1_000_000 {
            errors.push(format!(
                "Backpressure limit too large: {} (max recommended: 1,000,000)",
                self.backpressure_limit
            ));
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        } else if self.connection_timeout.as_secs() > 3600 {
            errors.push("Connection timeout too long (maximum: 1 hour)".to_string());
        }

        if self.keepalive_interval.as_secs() < 1 {
            errors.push("Keep-alive interval too short (minimum: 1s)".to_string());
        }

        if self.close_grace_period.as_secs() > 60 {
            errors.push("Close grace period too long (maximum: 60s)".to_string());
        }

        if self.restart_delay.as_millis() < 10 {
            errors.push("Restart delay too short (minimum: 10ms)".to_string());
        }

        if self.status_interval.as_millis() < 100 {
            errors.push("Status interval too short (minimum: 100ms)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_frame_size < 6 {
            errors.push(format!(
                "Max frame size too small: {} (minimum: 6 bytes)",
                self.max_frame_size
            ));
        } else if self.max_frame_size > 16 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum: 16 MB)",
                self.max_frame_size
            ));
        }

        if self.crypto_workers == 0 {
            errors.push("Crypto workers must be greater than 0".to_string());
        }

        errors
    }
}

/// RSA key material, hex encoded
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CryptoConfig {
    /// Public exponent `e`
    #[serde(default)]
    pub rsa_public_exponent: String,

    /// Modulus `n`
    #[serde(default)]
    pub rsa_modulus: String,

    /// Private exponent `d`; required to sign DH parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsa_private_exponent: Option<String>,
}

impl CryptoConfig {
    /// Validate crypto configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let fields = [
            ("RSA public exponent", Some(&self.rsa_public_exponent)),
            ("RSA modulus", Some(&self.rsa_modulus)),
            ("RSA private exponent", self.rsa_private_exponent.as_ref()),
        ];

        for (label, value) in fields {
            match value {
                Some(v) if v.trim().is_empty() => {
                    errors.push(format!("{label} is missing"));
                }
                Some(v) if !v.trim().chars().all(|c| c.is_ascii_hexdigit()) => {
                    errors.push(format!("{label} is not valid hex"));
                }
                Some(_) => {}
                None => {
                    errors.push(format!("{label} is missing"));
                }
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("habbo-server"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
