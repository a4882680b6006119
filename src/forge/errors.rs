//! forge::errors
//!
//! Shared error taxonomy and the classifier that normalizes provider
//! responses into it.
//!
//! # Design
//!
//! Adapters never hand raw HTTP status codes to the core. Every failure is
//! classified once, at the transport boundary, into a [`ProviderError`].
//! The reconciler and introspector branch only on [`ErrorKind`].
//!
//! Errors leaving a [`ProviderClient`](super::ProviderClient) are wrapped in
//! [`ProviderError::Operation`] so logs and callers can see which operation
//! failed against which repository. Use [`ProviderError::kind`] to look
//! through the wrapper.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors from provider operations.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Repository, branch, file or hook does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials missing, invalid or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials valid but lacking permission.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Provider quota exhausted.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited {
        /// How long the provider asked us to wait, when it said so.
        retry_after: Option<Duration>,
    },

    /// URL cannot be parsed or its host is not a reachable git host.
    #[error("invalid repository URL: {0}")]
    InvalidRepositoryUrl(String),

    /// The host is not mapped to any provider.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider has no such capability (e.g. installable apps).
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// The request was rejected before reaching the provider.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network failure or provider-side 5xx; worth retrying.
    #[error("transient error: {0}")]
    Transient(String),

    /// The caller cancelled the operation or its deadline passed.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Anything else.
    #[error("provider error: {0}")]
    Unknown(String),

    /// An error tagged with the operation and repository it came from.
    #[error("{operation} failed for {repo_url}: {source}")]
    Operation {
        operation: &'static str,
        repo_url: String,
        #[source]
        source: Box<ProviderError>,
    },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

/// Flat classification of a [`ProviderError`], ignoring operation tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    InvalidRepositoryUrl,
    UnknownProvider,
    UnsupportedCapability,
    InvalidRequest,
    Transient,
    Cancelled,
    Unknown,
}

impl ProviderError {
    /// The kind of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::Unauthorized(_) => ErrorKind::Unauthorized,
            ProviderError::Forbidden(_) => ErrorKind::Forbidden,
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::InvalidRepositoryUrl(_) => ErrorKind::InvalidRepositoryUrl,
            ProviderError::UnknownProvider(_) => ErrorKind::UnknownProvider,
            ProviderError::UnsupportedCapability(_) => ErrorKind::UnsupportedCapability,
            ProviderError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ProviderError::Transient(_) => ErrorKind::Transient,
            ProviderError::Cancelled(_) => ErrorKind::Cancelled,
            ProviderError::Unknown(_) => ErrorKind::Unknown,
            ProviderError::Operation { source, .. } => source.kind(),
        }
    }

    /// Whether a caller-side retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::RateLimited)
    }

    /// Retry hint carried by a `RateLimited` error, looking through tags.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            ProviderError::Operation { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    /// Wrap this error with its originating operation and repository.
    ///
    /// Already-tagged errors are returned unchanged so nested calls do not
    /// stack wrappers.
    pub fn in_operation(self, operation: &'static str, repo_url: &str) -> Self {
        match self {
            tagged @ ProviderError::Operation { .. } => tagged,
            other => ProviderError::Operation {
                operation,
                repo_url: repo_url.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Classify an unsuccessful HTTP response.
///
/// `message` is whatever the provider put in its error body, already
/// extracted by the adapter.
pub fn classify_status(status: StatusCode, headers: &HeaderMap, message: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized(message),
        StatusCode::FORBIDDEN if quota_exhausted(headers) => ProviderError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::FORBIDDEN => ProviderError::Forbidden(message),
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::REQUEST_TIMEOUT => ProviderError::Transient(message),
        _ if status.is_server_error() => {
            ProviderError::Transient(format!("server error {}: {}", status.as_u16(), message))
        }
        _ => ProviderError::Unknown(format!("status {}: {}", status.as_u16(), message)),
    }
}

/// Classify a transport-level failure (no HTTP status available).
pub fn classify_transport(err: &reqwest::Error) -> ProviderError {
    if let Some(status) = err.status() {
        return classify_status(status, &HeaderMap::new(), err.to_string());
    }
    if err.is_timeout() {
        return ProviderError::Transient(format!("request timed out: {}", err));
    }
    if err.is_decode() {
        return ProviderError::Unknown(format!("failed to decode response: {}", err));
    }
    if err.is_connect() && is_dns_failure(err) {
        return ProviderError::InvalidRepositoryUrl(format!("host cannot be resolved: {}", err));
    }
    if err.is_builder() {
        return ProviderError::InvalidRepositoryUrl(err.to_string());
    }
    ProviderError::Transient(err.to_string())
}

/// Walk the source chain looking for a resolver failure.
fn is_dns_failure(err: &reqwest::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no such host")
        {
            return true;
        }
        current = e.source();
    }
    false
}

fn quota_exhausted(headers: &HeaderMap) -> bool {
    header_str(headers, "x-ratelimit-remaining")
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

/// Extract a retry-after hint from `Retry-After` or `X-RateLimit-Reset`.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = header_str(headers, RETRY_AFTER.as_str())
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }

    let reset = header_str(headers, "x-ratelimit-reset")?
        .trim()
        .parse::<u64>()
        .ok()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(Duration::from_secs(reset.saturating_sub(now)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
