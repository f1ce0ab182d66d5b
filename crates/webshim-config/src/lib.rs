#![deny(unsafe_code)]

//! Configuration loading and validation for webshim.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`AppConfig`] type as the central configuration structure.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network fetch configuration.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Script console configuration.
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How a streamed response body retains chunks until a reader consumes them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyBuffering {
    /// Keep every chunk; reads resolve with the complete body.
    #[default]
    Accumulate,
    /// Keep only the newest undelivered chunk; reads resolve chunk by chunk.
    LatestChunk,
}

/// Configuration for `fetch` and the native HTTP transport.
///
/// ## TOML Example
///
/// ```toml
/// [fetch]
/// user_agent = "webshim/0.1.0"
/// timeout_secs = 30
/// connect_timeout_secs = 10
/// max_redirects = 10
/// body_buffering = "accumulate"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// `User-Agent` header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Overall request timeout in seconds (0 = no timeout).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// TCP/TLS connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum redirects followed per request (0 = never follow).
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Response body buffering policy.
    #[serde(default)]
    pub body_buffering: BodyBuffering,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_redirects: default_max_redirects(),
            body_buffering: BodyBuffering::default(),
        }
    }
}

fn default_user_agent() -> String {
    format!("webshim/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    10
}

/// Script console configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Minimum console level forwarded to the logger.
    #[serde(default = "default_console_level")]
    pub level: String,

    /// Number of log entries kept by the in-memory collector.
    #[serde(default = "default_capture_capacity")]
    pub capture_capacity: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            level: default_console_level(),
            capture_capacity: default_capture_capacity(),
        }
    }
}

fn default_console_level() -> String {
    "info".to_string()
}

fn default_capture_capacity() -> usize {
    1000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Console levels accepted by `console.level`.
pub const CONSOLE_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

const MAX_REDIRECT_LIMIT: usize = 50;

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "fetch.user_agent must not be empty".to_string(),
            ));
        }
        if self.fetch.max_redirects > MAX_REDIRECT_LIMIT {
            return Err(ConfigError::Validation(format!(
                "fetch.max_redirects must be at most {MAX_REDIRECT_LIMIT}, got {}",
                self.fetch.max_redirects
            )));
        }
        if self.fetch.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch.connect_timeout_secs must be non-zero".to_string(),
            ));
        }

        if !CONSOLE_LEVELS.contains(&self.console.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "console.level must be one of {:?}, got {:?}",
                CONSOLE_LEVELS, self.console.level
            )));
        }
        if self.console.capture_capacity == 0 {
            return Err(ConfigError::Validation(
                "console.capture_capacity must be non-zero".to_string(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The overall request timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<std::time::Duration> {
        match self.fetch.timeout_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.fetch.user_agent.starts_with("webshim/"));
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.fetch.max_redirects, 10);
        assert_eq!(config.fetch.body_buffering, BodyBuffering::Accumulate);
        assert_eq!(config.console.level, "info");
        assert_eq!(config.console.capture_capacity, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.fetch.connect_timeout_secs, 10);
        assert_eq!(
            config.request_timeout(),
            Some(std::time::Duration::from_secs(30))
        );
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [fetch]
            user_agent = "agent/2"
            timeout_secs = 0
            connect_timeout_secs = 3
            max_redirects = 0
            body_buffering = "latest-chunk"

            [console]
            level = "warn"
            capture_capacity = 16

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.fetch.user_agent, "agent/2");
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.fetch.max_redirects, 0);
        assert_eq!(config.fetch.body_buffering, BodyBuffering::LatestChunk);
        assert_eq!(config.console.level, "warn");
        assert_eq!(config.console.capture_capacity, 16);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = AppConfig::parse("this is not valid toml {{{");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_buffering_policy_is_a_parse_error() {
        let toml = r#"
            [fetch]
            body_buffering = "newest"
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    // ── Validation ────────────────────────────────────────────────────

    #[test]
    fn test_validation_rejects_empty_user_agent() {
        let toml = r#"
            [fetch]
            user_agent = "  "
        "#;
        let result = AppConfig::parse(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_redirect_limit() {
        let toml = r#"
            [fetch]
            max_redirects = 51
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("fetch.max_redirects"));
    }

    #[test]
    fn test_validation_rejects_zero_connect_timeout() {
        let toml = r#"
            [fetch]
            connect_timeout_secs = 0
        "#;
        let result = AppConfig::parse(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_console_level() {
        let toml = r#"
            [console]
            level = "verbose"
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("console.level"));
    }

    #[test]
    fn test_validation_rejects_zero_capture_capacity() {
        let toml = r#"
            [console]
            capture_capacity = 0
        "#;
        let result = AppConfig::parse(toml);
        assert!(result.is_err());
    }

    // ── Round trip through TOML ───────────────────────────────────────

    #[test]
    fn test_serialize_round_trip() {
        let mut config = AppConfig::default();
        config.fetch.body_buffering = BodyBuffering::LatestChunk;
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("body_buffering = \"latest-chunk\""));
        let parsed = AppConfig::parse(&text).unwrap();
        assert_eq!(parsed.fetch.body_buffering, BodyBuffering::LatestChunk);
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("webshim.toml");
        tokio::fs::write(&path, b"[fetch]\nmax_redirects = 3\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.fetch.max_redirects, 3);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[")
            .await
            .unwrap();

        let result = AppConfig::load(&path).await;
        assert!(result.is_err());
    }

    // ── Error display ─────────────────────────────────────────────────

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
