//! forge::webhook
//!
//! Idempotent lifecycle of the Pipelines as Code delivery webhook.
//!
//! Hooks are matched by target URL, ignoring a trailing `/`. Create is a
//! no-op when a matching hook exists; delete removes every matching hook and
//! treats "not found" as success.

use tracing::{debug, info};

use super::errors::{ErrorKind, ProviderError};
use super::traits::{RepoHost, Webhook};
use super::url::RepoRef;

/// Whether two webhook target URLs point at the same receiver.
pub fn same_target(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/')
}

pub struct WebhookManager<'a, H: RepoHost + ?Sized> {
    host: &'a H,
}

impl<'a, H: RepoHost + ?Sized> WebhookManager<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    pub async fn create(
        &self,
        repo: &RepoRef,
        webhook_url: &str,
        secret: &str,
    ) -> Result<(), ProviderError> {
        if webhook_url.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(
                "webhook URL cannot be empty".into(),
            ));
        }

        let hooks = self.host.list_webhooks(repo).await?;
        if hooks.iter().any(|h| same_target(&h.url, webhook_url)) {
            debug!(repo = %repo, url = webhook_url, "webhook already configured");
            return Ok(());
        }

        self.host.create_webhook(repo, webhook_url, secret).await?;
        info!(repo = %repo, url = webhook_url, "created webhook");
        Ok(())
    }

    pub async fn delete(&self, repo: &RepoRef, webhook_url: &str) -> Result<(), ProviderError> {
        let hooks = match self.host.list_webhooks(repo).await {
            Ok(hooks) => hooks,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(repo = %repo, "repository gone, no webhook to delete");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let matching: Vec<&Webhook> = hooks
            .iter()
            .filter(|h| same_target(&h.url, webhook_url))
            .collect();
        if matching.is_empty() {
            debug!(repo = %repo, url = webhook_url, "webhook already absent");
            return Ok(());
        }

        for hook in matching {
            match self.host.delete_webhook(repo, &hook.id).await {
                Ok(()) => info!(repo = %repo, hook_id = %hook.id, "deleted webhook"),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(repo = %repo, hook_id = %hook.id, "webhook vanished before delete")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
