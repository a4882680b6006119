//! config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Values are validated after parsing: host entries must name a known
//! provider kind, hosts must be unique, API bases must be HTTP(S) URLs and
//! the request timeout must be positive.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::forge::ProviderKind;

/// Top-level configuration.
///
/// # Example
///
/// ```toml
/// request_timeout_secs = 30
/// user_agent = "pac-forge"
/// serialize_reconciliation = true
///
/// [[hosts]]
/// host = "gitlab.example.com"
/// kind = "gitlab"
/// api_base = "https://gitlab.example.com/api/v4"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeConfig {
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// User-Agent header sent to providers
    pub user_agent: Option<String>,

    /// Serialize ensure/remove per repository within the process
    pub serialize_reconciliation: Option<bool>,

    /// Self-hosted instances and API base overrides
    pub hosts: Vec<HostConfig>,
}

impl ForgeConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if let Some(agent) = &self.user_agent {
            if agent.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "user_agent cannot be empty".to_string(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            host.validate()?;
            if !seen.insert(host.host.to_lowercase()) {
                return Err(ConfigError::InvalidValue(format!(
                    "host '{}' is configured more than once",
                    host.host
                )));
            }
        }

        Ok(())
    }
}

/// A host mapped to a provider kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Hostname as it appears in repository URLs
    pub host: String,

    /// Provider kind ("github", "gitlab" or "bitbucket")
    pub kind: String,

    /// API base URL; defaults to the provider's convention for the host
    pub api_base: Option<String>,
}

impl HostConfig {
    /// Validate one host entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() || self.host.contains('/') {
            return Err(ConfigError::InvalidValue(format!(
                "invalid host '{}'",
                self.host
            )));
        }

        if ProviderKind::parse(&self.kind).is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "invalid provider kind '{}' for host '{}', must be one of: {}",
                self.kind,
                self.host,
                ProviderKind::names().join(", ")
            )));
        }

        if let Some(base) = &self.api_base {
            if !(base.starts_with("https://") || base.starts_with("http://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "api_base '{}' for host '{}' must be an http(s) URL",
                    base, self.host
                )));
            }
        }

        Ok(())
    }
}
