//! Configuration schema (macrosql.toml)

use chrono::Duration;
use serde::{Deserialize, Serialize};
use crate::duration::{parse_duration, DurationError};

/// SQL dialect used to parse templates and render macro fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// ClickHouse SQL (the backing analytic database)
    ClickHouse,

    /// Generic ANSI-ish SQL
    Generic,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::ClickHouse
    }
}

impl std::fmt::Display for DialectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClickHouse => write!(f, "clickhouse"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQL dialect
    pub dialect: DialectConfig,

    /// Round unit applied when a request leaves `round` empty (Go duration
    /// syntax, `0` or empty disables rounding)
    pub default_round: String,

    /// Per-request budget of the stdio server, in milliseconds
    pub request_timeout_ms: u64,

    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: DialectConfig::default(),
            default_round: String::new(),
            request_timeout_ms: 30_000,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Reject a bad default_round at load time rather than on every request.
        config.default_round()?;

        Ok(config)
    }

    /// Parsed `default_round`
    pub fn default_round(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.default_round).map_err(ConfigError::InvalidRound)
    }

    /// Round unit for a request: the request's own value unless it is empty
    pub fn effective_round(&self, requested: &str) -> Result<Duration, DurationError> {
        if requested.trim().is_empty() {
            parse_duration(&self.default_round)
        } else {
            parse_duration(requested)
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid default_round: {0}")]
    InvalidRound(DurationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.dialect, DialectConfig::ClickHouse);
        assert_eq!(config.default_round().unwrap(), Duration::zero());
        assert_eq!(config.request_timeout(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            dialect = "generic"
            default_round = "1m"
            "#,
        )
        .unwrap();

        assert_eq!(config.dialect, DialectConfig::Generic);
        assert_eq!(config.default_round().unwrap(), Duration::minutes(1));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn request_round_overrides_default() {
        let config = Config {
            default_round: "1m".to_string(),
            ..Config::default()
        };

        assert_eq!(config.effective_round("").unwrap(), Duration::minutes(1));
        assert_eq!(config.effective_round("5s").unwrap(), Duration::seconds(5));
        assert_eq!(config.effective_round("0").unwrap(), Duration::zero());
    }

    #[test]
    fn invalid_default_round_is_rejected() {
        let err = Config::from_toml(r#"default_round = "soon""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRound(_)));
    }

    #[test]
    fn unknown_dialect_is_rejected() {
        let err = Config::from_toml(r#"dialect = "oracle""#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config, parsed);
    }
}
