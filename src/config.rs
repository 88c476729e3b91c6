//! Client configuration.
//!
//! Loaded from TOML, every key optional:
//!
//! ```toml
//! [transaction]
//! max_wait_ms = 2000
//! timeout_ms = 5000
//! isolation_level = "Serializable"
//!
//! [query]
//! max_take = 500
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use neuronek_db_core::{IsolationLevel, QueryLimits, TransactionOptions};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "neuronek-db.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub transaction: TransactionConfig,
    pub query: QueryConfig,
}

/// Defaults for implicit and interactive transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionConfig {
    /// Longest wait for a transaction to start
    pub max_wait_ms: u64,
    /// Longest run time before a forced rollback
    pub timeout_ms: u64,
    pub isolation_level: IsolationLevel,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: TransactionOptions::DEFAULT_MAX_WAIT.as_millis() as u64,
            timeout_ms: TransactionOptions::DEFAULT_TIMEOUT.as_millis() as u64,
            isolation_level: IsolationLevel::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Upper bound on `|take|`; unbounded when unset
    pub max_take: Option<u64>,
}

impl ClientConfig {
    /// Load from the default config file in the working directory
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file(Path::new(CONFIG_FILE))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.into())
            } else {
                ConfigError::Io(path.into(), e)
            }
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(path.into(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(PathBuf::from("<string>"), e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.transaction.timeout_ms == 0 {
            return Err(ConfigError::Invalid("transaction.timeout_ms must be positive".into()));
        }
        if self.query.max_take == Some(0) {
            return Err(ConfigError::Invalid("query.max_take must be positive".into()));
        }
        Ok(())
    }

    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::default()
            .max_wait(Duration::from_millis(self.transaction.max_wait_ms))
            .timeout(Duration::from_millis(self.transaction.timeout_ms))
            .isolation_level(self.transaction.isolation_level)
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            max_take: self.query.max_take,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.transaction_options(), TransactionOptions::default());
        assert_eq!(cfg.query_limits(), QueryLimits::default());
    }

    #[test]
    fn full_config() {
        let cfg = ClientConfig::from_toml_str(
            r#"
            [transaction]
            max_wait_ms = 100
            timeout_ms = 250
            isolation_level = "ReadCommitted"

            [query]
            max_take = 50
        "#,
        )
        .unwrap();
        let opts = cfg.transaction_options();
        assert_eq!(opts.max_wait, Duration::from_millis(100));
        assert_eq!(opts.timeout, Duration::from_millis(250));
        assert_eq!(opts.isolation_level, IsolationLevel::ReadCommitted);
        assert_eq!(cfg.query_limits().max_take, Some(50));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            ClientConfig::from_toml_str("[query]\nlimit = 3"),
            Err(ConfigError::Parse(..))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("[transaction]\ntimeout_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ClientConfig::from_file(Path::new("/nonexistent/neuronek-db.toml")),
            Err(ConfigError::NotFound(_))
        ));
    }
}
