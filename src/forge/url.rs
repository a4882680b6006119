//! forge::url
//!
//! Repository URL parsing shared by every provider.
//!
//! Supported forms:
//! - `https://host/owner/repo(.git)` and `http://...`
//! - `git@host:owner/repo(.git)`
//! - `ssh://git@host(:port)/owner/repo(.git)`
//!
//! The path may have more than two segments (GitLab nested groups); the last
//! segment is the repository name and everything before it is the namespace.

use std::fmt;

use super::errors::ProviderError;

/// A parsed repository location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    /// Lowercased hostname without port.
    pub host: String,
    /// Owner, organization, workspace or group path.
    pub namespace: String,
    /// Repository name without `.git`.
    pub name: String,
}

impl RepoRef {
    /// Parse a repository URL.
    ///
    /// # Errors
    ///
    /// `ProviderError::InvalidRepositoryUrl` when the URL is not in one of
    /// the supported forms or lacks a namespace or name.
    ///
    /// # Example
    ///
    /// ```
    /// use pac_forge::forge::RepoRef;
    ///
    /// let repo = RepoRef::parse("git@github.com:octocat/hello-world.git").unwrap();
    /// assert_eq!(repo.host, "github.com");
    /// assert_eq!(repo.namespace, "octocat");
    /// assert_eq!(repo.name, "hello-world");
    /// ```
    pub fn parse(url: &str) -> Result<Self, ProviderError> {
        let invalid = || ProviderError::InvalidRepositoryUrl(url.to_string());
        let trimmed = url.trim();

        let (authority, path) = if let Some(rest) = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .or_else(|| trimmed.strip_prefix("ssh://"))
        {
            rest.split_once('/').ok_or_else(invalid)?
        } else if let Some((user_host, path)) = trimmed.split_once(':') {
            // scp-like syntax: user@host:path
            if !user_host.contains('@') || user_host.contains('/') {
                return Err(invalid());
            }
            (user_host, path)
        } else {
            return Err(invalid());
        };

        let host = authority
            .rsplit('@')
            .next()
            .and_then(|h| h.split(':').next())
            .filter(|h| !h.is_empty())
            .ok_or_else(invalid)?
            .to_lowercase();

        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let (namespace, name) = path.rsplit_once('/').ok_or_else(invalid)?;

        if namespace.is_empty()
            || name.is_empty()
            || namespace.split('/').any(|segment| segment.is_empty())
        {
            return Err(invalid());
        }

        Ok(Self {
            host,
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// `namespace/name`, the form most APIs address a repository by.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Web URL of the repository on its host.
    pub fn web_url(&self) -> String {
        format!("https://{}/{}", self.host, self.full_name())
    }
}

/// Percent-encode each `/`-separated segment of a file path or branch
/// name, keeping the separators.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.full_name())
    }
}
