//! forge::introspect
//!
//! Read-only repository probes built on [`RepoHost`] primitives.
//!
//! The host reports absence as `None`/`false`; this layer turns it into the
//! error or boolean the capability interface promises.

use tracing::debug;

use super::errors::{ErrorKind, ProviderError};
use super::traits::RepoHost;
use super::url::RepoRef;

/// Read-only probes against one host.
pub struct Introspector<'a, H: RepoHost + ?Sized> {
    host: &'a H,
}

impl<'a, H: RepoHost + ?Sized> Introspector<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Default branch, with repository absence reported as `NotFound`.
    pub async fn default_branch(&self, repo: &RepoRef) -> Result<String, ProviderError> {
        match self.host.default_branch(repo).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ProviderError::NotFound(format!(
                "repository '{}' does not exist or is not accessible",
                repo
            ))),
            other => other,
        }
    }

    pub async fn branch_head_sha(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<String, ProviderError> {
        self.host
            .branch_sha(repo, branch)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("branch '{}'", branch)))
    }

    pub async fn read_file(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        self.host
            .read_file(repo, branch, path)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("file '{}' on '{}'", path, branch)))
    }

    pub async fn file_exists(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
    ) -> Result<bool, ProviderError> {
        Ok(self.host.read_file(repo, branch, path).await?.is_some())
    }

    pub async fn is_public(&self, repo: &RepoRef) -> Result<bool, ProviderError> {
        self.host.is_public(repo).await
    }

    pub fn browse_at_sha_url(&self, repo: &RepoRef, sha: &str) -> String {
        self.host.browse_at_sha_url(repo, sha)
    }

    /// Delete a branch; a missing branch is `Ok(false)`.
    pub async fn delete_branch(&self, repo: &RepoRef, branch: &str) -> Result<bool, ProviderError> {
        match self.host.delete_branch(repo, branch).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(repo = %repo, branch, "branch already absent");
                Ok(false)
            }
            other => other,
        }
    }
}
