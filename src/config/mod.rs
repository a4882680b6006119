//! config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order:
//! 1. An explicit path passed to [`Config::load`]
//! 2. `$PAC_FORGE_CONFIG` if set
//! 3. Built-in defaults
//!
//! A missing file at an explicit path is an error; a missing file named by
//! the environment variable falls through to the defaults.
//!
//! # Example
//!
//! ```no_run
//! use pac_forge::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Some(Path::new("/etc/pac-forge/config.toml"))).unwrap();
//! println!("timeout: {:?}", config.request_timeout());
//! ```

pub mod schema;

pub use schema::{ForgeConfig, HostConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::forge::ProviderKind;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PAC_FORGE_CONFIG";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent header value.
pub const DEFAULT_USER_AGENT: &str = concat!("pac-forge/", env!("CARGO_PKG_VERSION"));

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded and validated configuration.
///
/// Accessors apply defaults so callers never see unset options.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed configuration
    pub forge: ForgeConfig,
    /// Path the configuration was loaded from, if any
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, `$PAC_FORGE_CONFIG`, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed
    /// or validated, or if an explicit `path` does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::read(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let env_path = PathBuf::from(env_path);
            if env_path.exists() {
                return Self::read(&env_path);
            }
            tracing::warn!(path = %env_path.display(), "{} points at a missing file, using defaults", CONFIG_ENV);
        }

        Ok(Self::default())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let forge: ForgeConfig = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        forge.validate()?;
        Ok(Self { forge, path: None })
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let forge: ForgeConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        forge.validate()?;

        Ok(Self {
            forge,
            path: Some(path.to_path_buf()),
        })
    }

    /// Path the configuration came from, `None` for defaults or inline.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.forge
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn user_agent(&self) -> &str {
        self.forge.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn serialize_reconciliation(&self) -> bool {
        self.forge.serialize_reconciliation.unwrap_or(true)
    }

    /// Configured entry for `host`, compared case-insensitively.
    pub fn host(&self, host: &str) -> Option<&HostConfig> {
        self.forge
            .hosts
            .iter()
            .find(|h| h.host.eq_ignore_ascii_case(host))
    }

    /// Provider kind and API base override configured for `host`.
    pub fn host_kind(&self, host: &str) -> Option<(ProviderKind, Option<&str>)> {
        let entry = self.host(host)?;
        let kind = ProviderKind::parse(&entry.kind)?;
        Some((kind, entry.api_base.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.user_agent().starts_with("pac-forge/"));
        assert!(config.serialize_reconciliation());
        assert!(config.path().is_none());
    }

    #[test]
    fn from_toml_str_parses_hosts() {
        let config = Config::from_toml_str(
            r#"
            request_timeout_secs = 10
            serialize_reconciliation = false

            [[hosts]]
            host = "gitlab.example.com"
            kind = "gitlab"
            api_base = "https://gitlab.example.com/api/v4"
            "#,
        )
        .unwrap();

        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(!config.serialize_reconciliation());
        let (kind, base) = config.host_kind("GITLAB.example.com").unwrap();
        assert_eq!(kind, ProviderKind::GitLab);
        assert_eq!(base, Some("https://gitlab.example.com/api/v4"));
        assert!(config.host_kind("github.com").is_none());
    }

    #[test]
    fn from_toml_str_validates() {
        let err = Config::from_toml_str(
            r#"
            [[hosts]]
            host = "git.example.com"
            kind = "svn"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user_agent = \"controller/2.0\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.user_agent(), "controller/2.0");
        assert_eq!(config.path(), Some(file.path()));
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request_timeout_secs = \"soon\"").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        match err {
            ConfigError::ParseError { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
