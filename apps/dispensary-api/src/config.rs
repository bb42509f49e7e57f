//! # Dispensary Configuration
//!
//! Server, database and fulfillment settings.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Load order (later overrides earlier)                                   │
//! │                                                                         │
//! │  1. Defaults                                                            │
//! │  2. dispensary.toml                                                     │
//! │     $DISPENSARY_CONFIG, else                                            │
//! │     ~/.config/dispensary/dispensary.toml (Linux)                        │
//! │     ~/Library/Application Support/org.hospital.dispensary/ (macOS)      │
//! │  3. Environment                                                         │
//! │     DISPENSARY_DB_PATH, DISPENSARY_PORT, DISPENSARY_BIND_ADDR,          │
//! │     DISPENSARY_MAX_ATTEMPTS                                             │
//! │  4. validate()                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! path = "dispensary.db"
//! max_connections = 5
//! lock_timeout_ms = 5000
//!
//! [fulfillment]
//! max_attempts = 3
//! initial_backoff_ms = 50
//! max_backoff_ms = 1000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dispensary_db::{DbConfig, RetryPolicy};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "DISPENSARY_CONFIG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// `addr:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// SQLite settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a commit waits for another writer's lock.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("dispensary.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_lock_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            lock_timeout_ms: default_lock_timeout(),
        }
    }
}

/// Retry settings for the fulfillment commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    50
}

fn default_max_backoff() -> u64 {
    1000
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        FulfillmentSettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispensaryConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub fulfillment: FulfillmentSettings,
}

impl DispensaryConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// A missing file is not an error; an unreadable or malformed one is.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }

        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must be set".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.fulfillment.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "fulfillment.max_attempts must be at least 1".into(),
            ));
        }

        if self.fulfillment.initial_backoff_ms > self.fulfillment.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "fulfillment.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.fulfillment.initial_backoff_ms, self.fulfillment.max_backoff_ms
            )));
        }

        Ok(())
    }

    /// Pool settings for [`dispensary_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .lock_timeout(Duration::from_millis(self.database.lock_timeout_ms))
    }

    /// Retry schedule for the fulfillment commit.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fulfillment.max_attempts,
            initial_backoff: Duration::from_millis(self.fulfillment.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.fulfillment.max_backoff_ms),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("DISPENSARY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(port) = lookup("DISPENSARY_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!(port = %port, "Ignoring unparsable DISPENSARY_PORT"),
            }
        }

        if let Some(addr) = lookup("DISPENSARY_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Some(attempts) = lookup("DISPENSARY_MAX_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.fulfillment.max_attempts = n,
                Err(_) => warn!(attempts = %attempts, "Ignoring unparsable DISPENSARY_MAX_ATTEMPTS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "hospital", "dispensary")
            .map(|dirs| dirs.config_dir().join("dispensary.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = DispensaryConfig::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.database.lock_timeout_ms, 5000);
        assert_eq!(config.fulfillment.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: DispensaryConfig = toml::from_str(
            r#"
            [server]
            port = 9090

            [fulfillment]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.fulfillment.max_attempts, 5);
        assert_eq!(config.fulfillment.initial_backoff_ms, 50);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DispensaryConfig::default();
        config.fulfillment.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = DispensaryConfig::default();
        config.fulfillment.initial_backoff_ms = 2000;
        assert!(config.validate().is_err());

        let mut config = DispensaryConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("DISPENSARY_DB_PATH", "/var/lib/dispensary/rx.db"),
            ("DISPENSARY_PORT", "not-a-port"),
            ("DISPENSARY_MAX_ATTEMPTS", "7"),
        ]
        .into_iter()
        .collect();

        let mut config = DispensaryConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/var/lib/dispensary/rx.db"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.fulfillment.max_attempts, 7);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispensary.toml");
        std::fs::write(&path, "[database]\nlock_timeout_ms = 250\n").unwrap();

        let config = DispensaryConfig::load(Some(path)).unwrap();
        assert_eq!(config.database.lock_timeout_ms, 250);
        assert_eq!(config.retry_policy().max_attempts, config.fulfillment.max_attempts);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispensary.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        assert!(matches!(
            DispensaryConfig::load(Some(path)),
            Err(ConfigError::Parse(_))
        ));
    }
}
