//! auth::errors
//!
//! Credential errors.
//!
//! Error messages never contain token values.

use thiserror::Error;

use crate::forge::ProviderError;

/// Errors from credential providers.
///
/// [`StaticToken`](super::StaticToken) only reports `NotAuthenticated`.
/// Caller-side [`TokenProvider`](super::TokenProvider)s that rotate tokens
/// report `Expired`, `RefreshFailed` and `Network`; adapters turn these into
/// `Unauthorized` or `Transient` provider errors before any request is sent.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential exists for the host.
    #[error("not authenticated for host '{0}'")]
    NotAuthenticated(String),

    /// The credential expired and cannot be renewed.
    #[error("authentication expired for host '{0}'")]
    Expired(String),

    /// Renewing the credential failed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Network error while obtaining a token.
    #[error("network error: {0}")]
    Network(String),
}

impl AuthError {
    /// Check if this error indicates a transient failure that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

impl From<AuthError> for ProviderError {
    fn from(err: AuthError) -> Self {
        if err.is_transient() {
            ProviderError::Transient(err.to_string())
        } else {
            ProviderError::Unauthorized(err.to_string())
        }
    }
}
