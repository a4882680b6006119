//! forge::client
//!
//! Capability dispatch: one [`GitProvider`] implementation for every
//! [`RepoHost`].
//!
//! `ProviderClient` parses the repository URL, routes each operation to the
//! reconciler, introspector or webhook manager, and tags failures with the
//! operation name and repository URL.
//!
//! # Same-repository concurrency
//!
//! Ensure and remove calls for the same repository are serialized within
//! the process through [`RepoLocks`] when the client is built with a lock
//! table. The table stores only mutexes, never repository state. Separate
//! processes still race; callers needing exactly-once creation across
//! processes must serialize themselves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::errors::ProviderError;
use super::introspect::Introspector;
use super::reconcile::Reconciler;
use super::traits::{
    AppIdentity, GitProvider, MergeRequest, MergeRequestData, ReconcileOutcome, RepoHost,
};
use super::url::RepoRef;
use super::webhook::WebhookManager;

/// Per-repository async locks, shared by every client a resolver creates.
#[derive(Debug, Default)]
pub struct RepoLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on.
            locks.retain(|k, m| k == key || Arc::strong_count(m) > 1);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Number of tracked repositories.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`GitProvider`] over any [`RepoHost`].
pub struct ProviderClient<H: RepoHost> {
    host: H,
    locks: Option<Arc<RepoLocks>>,
}

impl<H: RepoHost> std::fmt::Debug for ProviderClient<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("provider", &self.host.name())
            .field("serialized", &self.locks.is_some())
            .finish()
    }
}

impl<H: RepoHost> ProviderClient<H> {
    /// Client without per-repository serialization.
    pub fn new(host: H) -> Self {
        Self { host, locks: None }
    }

    /// Client that serializes ensure/remove per repository through `locks`.
    pub fn with_locks(host: H, locks: Arc<RepoLocks>) -> Self {
        Self {
            host,
            locks: Some(locks),
        }
    }

    /// The underlying host adapter.
    pub fn host(&self) -> &H {
        &self.host
    }

    async fn serialize(&self, repo: &RepoRef) -> Option<OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.lock(&repo.to_string()).await),
            None => None,
        }
    }
}

fn parse(operation: &'static str, repo_url: &str) -> Result<RepoRef, ProviderError> {
    RepoRef::parse(repo_url).map_err(|e| e.in_operation(operation, repo_url))
}

#[async_trait]
impl<H: RepoHost> GitProvider for ProviderClient<H> {
    fn name(&self) -> &'static str {
        self.host.name()
    }

    async fn ensure_config_merge_request(
        &self,
        repo_url: &str,
        data: &MergeRequestData,
    ) -> Result<ReconcileOutcome, ProviderError> {
        const OP: &str = "ensure_config_merge_request";
        let repo = parse(OP, repo_url)?;
        let _guard = self.serialize(&repo).await;
        Reconciler::new(&self.host)
            .ensure(&repo, data)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn remove_config_merge_request(
        &self,
        repo_url: &str,
        data: &MergeRequestData,
    ) -> Result<ReconcileOutcome, ProviderError> {
        const OP: &str = "remove_config_merge_request";
        let repo = parse(OP, repo_url)?;
        let _guard = self.serialize(&repo).await;
        Reconciler::new(&self.host)
            .remove(&repo, data)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn find_open_config_merge_request(
        &self,
        repo_url: &str,
        data: &MergeRequestData,
    ) -> Result<Option<MergeRequest>, ProviderError> {
        const OP: &str = "find_open_config_merge_request";
        let repo = parse(OP, repo_url)?;
        Reconciler::new(&self.host)
            .find(&repo, data)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn create_webhook(
        &self,
        repo_url: &str,
        webhook_url: &str,
        secret: &str,
    ) -> Result<(), ProviderError> {
        const OP: &str = "create_webhook";
        let repo = parse(OP, repo_url)?;
        WebhookManager::new(&self.host)
            .create(&repo, webhook_url, secret)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn delete_webhook(&self, repo_url: &str, webhook_url: &str) -> Result<(), ProviderError> {
        const OP: &str = "delete_webhook";
        let repo = parse(OP, repo_url)?;
        WebhookManager::new(&self.host)
            .delete(&repo, webhook_url)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn default_branch(&self, repo_url: &str) -> Result<String, ProviderError> {
        const OP: &str = "default_branch";
        let repo = parse(OP, repo_url)?;
        Introspector::new(&self.host)
            .default_branch(&repo)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn delete_branch(&self, repo_url: &str, branch: &str) -> Result<bool, ProviderError> {
        const OP: &str = "delete_branch";
        let repo = parse(OP, repo_url)?;
        Introspector::new(&self.host)
            .delete_branch(&repo, branch)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn branch_head_sha(&self, repo_url: &str, branch: &str) -> Result<String, ProviderError> {
        const OP: &str = "branch_head_sha";
        let repo = parse(OP, repo_url)?;
        Introspector::new(&self.host)
            .branch_head_sha(&repo, branch)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn read_file(
        &self,
        repo_url: &str,
        branch: &str,
        path: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        const OP: &str = "read_file";
        let repo = parse(OP, repo_url)?;
        Introspector::new(&self.host)
            .read_file(&repo, branch, path)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn file_exists(
        &self,
        repo_url: &str,
        branch: &str,
        path: &str,
    ) -> Result<bool, ProviderError> {
        const OP: &str = "file_exists";
        let repo = parse(OP, repo_url)?;
        Introspector::new(&self.host)
            .file_exists(&repo, branch, path)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    async fn is_public(&self, repo_url: &str) -> Result<bool, ProviderError> {
        const OP: &str = "is_public";
        let repo = parse(OP, repo_url)?;
        Introspector::new(&self.host)
            .is_public(&repo)
            .await
            .map_err(|e| e.in_operation(OP, repo_url))
    }

    fn browse_at_sha_url(&self, repo_url: &str, sha: &str) -> String {
        match RepoRef::parse(repo_url) {
            Ok(repo) => Introspector::new(&self.host).browse_at_sha_url(&repo, sha),
            // Construction only; fall back to the URL as given.
            Err(_) => format!("{}/tree/{}", repo_url.trim_end_matches(".git"), sha),
        }
    }

    async fn app_identity(&self) -> Result<AppIdentity, ProviderError> {
        self.host.app_identity().await
    }

    async fn app_user_id(&self, user_name: &str) -> Result<i64, ProviderError> {
        self.host.app_user_id(user_name).await
    }
}
