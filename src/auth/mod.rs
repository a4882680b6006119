//! auth
//!
//! Credential supply for provider adapters.
//!
//! # Architecture
//!
//! Credentials are an opaque input. The crate never stores, refreshes or
//! mints tokens itself; it asks a [`TokenProvider`] for a bearer token right
//! before each request, so a caller-side implementation can rotate tokens
//! (GitHub App installation tokens, short-lived OAuth tokens) freely.
//!
//! [`CredentialSource`] maps a host to its token providers and is what the
//! resolver consults when building a client for a repository.
//!
//! # Security
//!
//! Tokens never appear in logs, errors or `Debug` output. Every type here
//! implements `Debug` by hand to redact them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

mod errors;

pub use errors::AuthError;

/// Trait for providing bearer tokens to provider adapters.
///
/// Implementors must never log or expose token values.
///
/// # Example
///
/// ```
/// use pac_forge::auth::{StaticToken, TokenProvider};
///
/// # tokio_test::block_on(async {
/// let provider = StaticToken::new("github.com", "ghp_example");
/// assert_eq!(provider.bearer_token().await.unwrap(), "ghp_example");
/// assert!(!format!("{:?}", provider).contains("ghp_example"));
/// # });
/// ```
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a valid bearer token.
    ///
    /// # Errors
    ///
    /// `AuthError::Expired` or `AuthError::RefreshFailed` when a rotating
    /// credential cannot be renewed, `AuthError::Network` when renewal hit a
    /// network failure worth retrying.
    async fn bearer_token(&self) -> Result<String, AuthError>;

    /// Host this provider authenticates for.
    fn host(&self) -> &str;
}

/// A fixed token, e.g. a personal access token read from a secret.
#[derive(Clone)]
pub struct StaticToken {
    host: String,
    token: String,
}

impl StaticToken {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("host", &self.host)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::NotAuthenticated(self.host.clone()));
        }
        Ok(self.token.clone())
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Source of credentials per host.
pub trait CredentialSource: Send + Sync {
    /// Token used for repository operations on `host`.
    fn token_provider(&self, host: &str) -> Option<Arc<dyn TokenProvider>>;

    /// Token identifying the installable app itself (a GitHub App JWT).
    ///
    /// Only consulted by providers with an app concept.
    fn app_token_provider(&self, _host: &str) -> Option<Arc<dyn TokenProvider>> {
        None
    }
}

/// In-memory credential table.
///
/// # Example
///
/// ```
/// use pac_forge::auth::{CredentialSource, StaticCredentials};
///
/// let creds = StaticCredentials::new()
///     .with_token("github.com", "ghp_example")
///     .with_token("gitlab.example.com", "glpat-example");
///
/// assert!(creds.token_provider("github.com").is_some());
/// assert!(creds.token_provider("bitbucket.org").is_none());
/// ```
#[derive(Default, Clone)]
pub struct StaticCredentials {
    tokens: HashMap<String, Arc<dyn TokenProvider>>,
    app_tokens: HashMap<String, Arc<dyn TokenProvider>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixed repository token for `host`.
    pub fn with_token(self, host: &str, token: impl Into<String>) -> Self {
        let provider = Arc::new(StaticToken::new(host, token));
        self.with_provider(host, provider)
    }

    /// Register a token provider for `host`.
    pub fn with_provider(mut self, host: &str, provider: Arc<dyn TokenProvider>) -> Self {
        self.tokens.insert(host.to_lowercase(), provider);
        self
    }

    /// Register the app token provider for `host`.
    pub fn with_app_provider(mut self, host: &str, provider: Arc<dyn TokenProvider>) -> Self {
        self.app_tokens.insert(host.to_lowercase(), provider);
        self
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hosts: Vec<&String> = self.tokens.keys().collect();
        hosts.sort();
        f.debug_struct("StaticCredentials")
            .field("hosts", &hosts)
            .field("app_hosts", &self.app_tokens.len())
            .finish()
    }
}

impl CredentialSource for StaticCredentials {
    fn token_provider(&self, host: &str) -> Option<Arc<dyn TokenProvider>> {
        self.tokens.get(&host.to_lowercase()).cloned()
    }

    fn app_token_provider(&self, host: &str) -> Option<Arc<dyn TokenProvider>> {
        self.app_tokens.get(&host.to_lowercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_static_token_is_not_authenticated() {
        let provider = StaticToken::new("github.com", "");
        let err = provider.bearer_token().await.unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated(_)));
    }

    #[test]
    fn credentials_lookup_is_case_insensitive() {
        let creds = StaticCredentials::new().with_token("GitLab.Example.com", "t");
        assert!(creds.token_provider("gitlab.example.com").is_some());
        assert!(creds.token_provider("GITLAB.EXAMPLE.COM").is_some());
    }

    #[test]
    fn app_provider_is_separate() {
        let creds = StaticCredentials::new()
            .with_token("github.com", "t")
            .with_app_provider("github.com", Arc::new(StaticToken::new("github.com", "jwt")));
        assert!(creds.app_token_provider("github.com").is_some());
        assert!(creds.app_token_provider("gitlab.com").is_none());
    }

    #[test]
    fn debug_redacts_tokens() {
        let creds = StaticCredentials::new().with_token("github.com", "ghp_secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("github.com"));
        assert!(!rendered.contains("ghp_secret"));
    }
}
