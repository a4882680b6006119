//! forge::factory
//!
//! Provider selection and client construction.
//!
//! # Design
//!
//! Callers never import a specific adapter. They hand a repository URL to
//! [`ProviderResolver`], which picks the provider from the URL host (or an
//! explicit override), looks up the API base and credentials, and returns a
//! `Box<dyn GitProvider>`.
//!
//! # Provider Detection
//!
//! Built-in hosts:
//! - `github.com` → GitHub
//! - `gitlab.com` → GitLab
//! - `bitbucket.org` → Bitbucket Cloud
//!
//! Self-hosted instances are mapped in configuration with `[[hosts]]`
//! entries; configured entries win over the built-ins. Anything else is
//! `UnknownProvider`.
//!
//! # Example
//!
//! ```
//! use pac_forge::auth::StaticCredentials;
//! use pac_forge::config::Config;
//! use pac_forge::forge::{ProviderKind, ProviderResolver};
//! use std::sync::Arc;
//!
//! let credentials = Arc::new(StaticCredentials::new().with_token("github.com", "ghp_example"));
//! let resolver = ProviderResolver::new(Config::default(), credentials).unwrap();
//!
//! assert_eq!(
//!     resolver.provider_kind("git@github.com:owner/repo.git").unwrap(),
//!     ProviderKind::GitHub
//! );
//! let provider = resolver.resolve("https://github.com/owner/repo").unwrap();
//! assert_eq!(provider.name(), "github");
//! ```

use std::sync::Arc;

use reqwest::Client;
use tracing::debug;

use super::bitbucket::{self, BitbucketHost};
use super::client::{ProviderClient, RepoLocks};
use super::errors::ProviderError;
use super::github::{self, GitHubHost};
use super::gitlab::{self, GitLabHost};
use super::traits::{GitProvider, RepoHost};
use super::url::RepoRef;
use crate::auth::CredentialSource;
use crate::config::Config;

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Bitbucket,
}

impl ProviderKind {
    /// All supported providers.
    ///
    /// # Example
    ///
    /// ```
    /// use pac_forge::forge::ProviderKind;
    ///
    /// assert!(ProviderKind::all().contains(&ProviderKind::GitLab));
    /// ```
    pub fn all() -> &'static [ProviderKind] {
        &[
            ProviderKind::GitHub,
            ProviderKind::GitLab,
            ProviderKind::Bitbucket,
        ]
    }

    /// Name as used in configuration and overrides.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::GitLab => "gitlab",
            ProviderKind::Bitbucket => "bitbucket",
        }
    }

    /// Names of all supported providers.
    pub fn names() -> Vec<&'static str> {
        Self::all().iter().map(|k| k.name()).collect()
    }

    /// Parse a provider name, case-insensitively.
    ///
    /// # Example
    ///
    /// ```
    /// use pac_forge::forge::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("GitLab"), Some(ProviderKind::GitLab));
    /// assert_eq!(ProviderKind::parse("gitea"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "github" => Some(ProviderKind::GitHub),
            "gitlab" => Some(ProviderKind::GitLab),
            "bitbucket" | "bitbucket-cloud" => Some(ProviderKind::Bitbucket),
            _ => None,
        }
    }

    /// Provider serving a well-known public host.
    pub fn for_builtin_host(host: &str) -> Option<Self> {
        match host {
            "github.com" => Some(ProviderKind::GitHub),
            "gitlab.com" => Some(ProviderKind::GitLab),
            "bitbucket.org" => Some(ProviderKind::Bitbucket),
            _ => None,
        }
    }

    /// Conventional API base for an instance of this provider on `host`.
    pub fn default_api_base(&self, host: &str) -> String {
        match self {
            ProviderKind::GitHub if host == "github.com" => github::DEFAULT_API_BASE.to_string(),
            ProviderKind::GitHub => format!("https://{}/api/v3", host),
            ProviderKind::GitLab => format!("https://{}/api/v4", host),
            ProviderKind::Bitbucket => bitbucket::DEFAULT_API_BASE.to_string(),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the provider of a repository URL from the built-in hosts.
///
/// Returns `None` for unparseable URLs and unknown hosts; use
/// [`ProviderResolver::provider_kind`] to include configured hosts.
///
/// # Example
///
/// ```
/// use pac_forge::forge::{detect_provider, ProviderKind};
///
/// assert_eq!(
///     detect_provider("git@bitbucket.org:workspace/repo.git"),
///     Some(ProviderKind::Bitbucket)
/// );
/// assert_eq!(detect_provider("https://git.example.com/o/r"), None);
/// ```
pub fn detect_provider(repo_url: &str) -> Option<ProviderKind> {
    let repo = RepoRef::parse(repo_url).ok()?;
    ProviderKind::for_builtin_host(&repo.host)
}

/// Builds provider clients for repository URLs.
///
/// Holds the shared HTTP client and the per-repository lock table, so every
/// client it hands out shares connections and serialization.
pub struct ProviderResolver {
    config: Config,
    credentials: Arc<dyn CredentialSource>,
    client: Client,
    locks: Option<Arc<RepoLocks>>,
}

impl std::fmt::Debug for ProviderResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderResolver")
            .field("config", &self.config)
            .field("serialized", &self.locks.is_some())
            .finish()
    }
}

impl ProviderResolver {
    /// Create a resolver with an HTTP client built from `config`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the HTTP client cannot be constructed (for
    /// example an invalid User-Agent).
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| ProviderError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(config, credentials, client))
    }

    /// Create a resolver around an existing HTTP client.
    pub fn with_client(
        config: Config,
        credentials: Arc<dyn CredentialSource>,
        client: Client,
    ) -> Self {
        let locks = config
            .serialize_reconciliation()
            .then(|| Arc::new(RepoLocks::new()));
        Self {
            config,
            credentials,
            client,
            locks,
        }
    }

    /// Provider serving `repo_url`, consulting configured hosts first.
    pub fn provider_kind(&self, repo_url: &str) -> Result<ProviderKind, ProviderError> {
        let repo = RepoRef::parse(repo_url)?;
        self.kind_for_host(&repo.host, None).map(|(kind, _)| kind)
    }

    /// Build a client for `repo_url`, detecting the provider.
    pub fn resolve(&self, repo_url: &str) -> Result<Box<dyn GitProvider>, ProviderError> {
        self.resolve_with_override(repo_url, None)
    }

    /// Build a client for `repo_url`, optionally forcing the provider.
    ///
    /// # Errors
    ///
    /// - `InvalidRepositoryUrl` if the URL cannot be parsed
    /// - `UnknownProvider` if the host is not mapped or the override names
    ///   no supported provider
    /// - `Unauthorized` if no credential is configured for the host
    pub fn resolve_with_override(
        &self,
        repo_url: &str,
        provider_override: Option<&str>,
    ) -> Result<Box<dyn GitProvider>, ProviderError> {
        self.build(repo_url, provider_override)
            .map_err(|e| e.in_operation("resolve", repo_url))
    }

    fn build(
        &self,
        repo_url: &str,
        provider_override: Option<&str>,
    ) -> Result<Box<dyn GitProvider>, ProviderError> {
        let repo = RepoRef::parse(repo_url)?;

        let forced = match provider_override {
            Some(name) => Some(ProviderKind::parse(name).ok_or_else(|| {
                ProviderError::UnknownProvider(format!(
                    "'{}', expected one of: {}",
                    name,
                    ProviderKind::names().join(", ")
                ))
            })?),
            None => None,
        };
        let (kind, api_base) = self.kind_for_host(&repo.host, forced)?;

        let token = self.credentials.token_provider(&repo.host).ok_or_else(|| {
            ProviderError::Unauthorized(format!(
                "no credentials configured for host '{}'",
                repo.host
            ))
        })?;

        debug!(host = %repo.host, provider = %kind, api_base = %api_base, "resolved provider");

        let client = self.client.clone();
        Ok(match kind {
            ProviderKind::GitHub => {
                let mut host = GitHubHost::new(client, &api_base, token);
                if let Some(app_token) = self.credentials.app_token_provider(&repo.host) {
                    host = host.with_app_token(app_token);
                }
                self.wrap(host)
            }
            ProviderKind::GitLab => self.wrap(GitLabHost::new(client, &api_base, token)),
            ProviderKind::Bitbucket => self.wrap(BitbucketHost::new(client, &api_base, token)),
        })
    }

    /// Provider kind and API base for `host`.
    ///
    /// A configured `api_base` only applies when the configured kind is the
    /// one chosen.
    fn kind_for_host(
        &self,
        host: &str,
        forced: Option<ProviderKind>,
    ) -> Result<(ProviderKind, String), ProviderError> {
        let configured = self.config.host_kind(host);

        let kind = forced
            .or_else(|| configured.map(|(kind, _)| kind))
            .or_else(|| ProviderKind::for_builtin_host(host))
            .ok_or_else(|| {
                ProviderError::UnknownProvider(format!(
                    "host '{}' is not mapped to a provider",
                    host
                ))
            })?;

        let api_base = configured
            .filter(|(configured_kind, _)| *configured_kind == kind)
            .and_then(|(_, base)| base)
            .map(str::to_string)
            .unwrap_or_else(|| kind.default_api_base(host));

        Ok((kind, api_base))
    }

    fn wrap<H: RepoHost + 'static>(&self, host: H) -> Box<dyn GitProvider> {
        match &self.locks {
            Some(locks) => Box::new(ProviderClient::with_locks(host, locks.clone())),
            None => Box::new(ProviderClient::new(host)),
        }
    }
}
