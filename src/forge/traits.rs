//! forge::traits
//!
//! The capability interface every provider exposes, the narrow host
//! primitives adapters implement, and the types flowing through both.
//!
//! # Design
//!
//! Two traits, two audiences:
//!
//! - [`GitProvider`] is what callers drive. It is object safe and async,
//!   and the resolver hands out `Box<dyn GitProvider>`.
//! - [`RepoHost`] is what a provider adapter supplies: single round trips
//!   against one REST API, with absence reported as `Option`/`bool` rather
//!   than errors where the core needs to branch on it.
//!
//! [`ProviderClient`](super::ProviderClient) implements `GitProvider` once
//! for any `RepoHost`, so the reconciliation protocol is written a single
//! time and provider quirks stay inside their adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ProviderError;
use super::url::RepoRef;

/// A whole file to write into the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    /// Path from the repository root, e.g. `.tekton/push.yaml`.
    pub full_path: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

impl RepositoryFile {
    pub fn new(full_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            full_path: full_path.into(),
            content: content.into(),
        }
    }
}

/// Desired state for one reconciliation attempt.
///
/// Built by the caller per call and never mutated by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestData {
    /// Logical branch name; the proposal branch is derived from it.
    pub branch_name: String,
    /// Target branch. Empty means the repository default branch.
    pub base_branch_name: String,
    pub commit_message: String,
    pub title: String,
    pub text: String,
    pub author_name: String,
    pub author_email: String,
    /// Append a `Signed-off-by` trailer to the commit message.
    pub signed_off: bool,
    /// Files to write (ensure) or delete (remove), in order.
    pub files: Vec<RepositoryFile>,
}

impl MergeRequestData {
    /// Commit message including the sign-off trailer when requested.
    pub fn full_commit_message(&self) -> String {
        if self.signed_off {
            format!(
                "{}\n\nSigned-off-by: {} <{}>",
                self.commit_message.trim_end(),
                self.author_name,
                self.author_email
            )
        } else {
            self.commit_message.clone()
        }
    }

    pub fn author(&self) -> CommitAuthor {
        CommitAuthor {
            name: self.author_name.clone(),
            email: self.author_email.clone(),
        }
    }
}

/// A merge request as observed on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Provider identifier (PR number, MR iid).
    pub id: i64,
    /// Creation time, when the provider reports it.
    pub created_at: Option<DateTime<Utc>>,
    pub web_url: String,
    pub title: String,
}

/// Result of an ensure or remove call.
///
/// Replaces the "empty URL means nothing to do" convention with an explicit
/// tag. Every variant except `AlreadySatisfied` carries the merge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new merge request was opened.
    Created(MergeRequest),
    /// An open merge request existed with stale content and was updated.
    Updated(MergeRequest),
    /// An open merge request already proposes exactly the desired state.
    Unchanged(MergeRequest),
    /// The base branch already holds the desired state.
    AlreadySatisfied,
}

impl ReconcileOutcome {
    /// Web URL of the merge request, `None` when nothing was needed.
    pub fn web_url(&self) -> Option<&str> {
        self.merge_request().map(|mr| mr.web_url.as_str())
    }

    pub fn merge_request(&self) -> Option<&MergeRequest> {
        match self {
            ReconcileOutcome::Created(mr)
            | ReconcileOutcome::Updated(mr)
            | ReconcileOutcome::Unchanged(mr) => Some(mr),
            ReconcileOutcome::AlreadySatisfied => None,
        }
    }

    /// Whether this call wrote anything to the provider.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Created(_) | ReconcileOutcome::Updated(_)
        )
    }
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileOutcome::Created(mr) => write!(f, "created {}", mr.web_url),
            ReconcileOutcome::Updated(mr) => write!(f, "updated {}", mr.web_url),
            ReconcileOutcome::Unchanged(mr) => write!(f, "unchanged {}", mr.web_url),
            ReconcileOutcome::AlreadySatisfied => write!(f, "already satisfied"),
        }
    }
}

/// Name and identifier of the configured installable app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    /// Display name.
    pub name: String,
    /// Provider identifier of the app.
    pub id: String,
    /// URL-safe name; the app's bot user is `<slug>[bot]` on GitHub.
    pub slug: String,
}

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// One change within a commit, relative to the parent commit.
///
/// `Create` and `Update` are distinguished because some providers (GitLab)
/// reject a create for an existing path and an update for a missing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Create { path: String, content: Vec<u8> },
    Update { path: String, content: Vec<u8> },
    Delete { path: String },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            FileChange::Create { path, .. }
            | FileChange::Update { path, .. }
            | FileChange::Delete { path } => path,
        }
    }

    /// New content, `None` for deletions.
    pub fn content(&self) -> Option<&[u8]> {
        match self {
            FileChange::Create { content, .. } | FileChange::Update { content, .. } => {
                Some(content)
            }
            FileChange::Delete { .. } => None,
        }
    }
}

/// A commit to create on top of `parent_sha`, with `branch` pointed at it.
///
/// The branch is created when missing and force-moved when present.
#[derive(Debug, Clone)]
pub struct CommitRequest<'a> {
    pub branch: &'a str,
    pub parent_sha: &'a str,
    pub message: &'a str,
    pub author: &'a CommitAuthor,
    pub changes: &'a [FileChange],
}

/// An open merge request as listed by a host, with its branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMergeRequest {
    pub merge_request: MergeRequest,
    pub source_branch: String,
    pub target_branch: String,
    /// The source branch lives in the target repository, not a fork.
    pub same_repository: bool,
}

/// Request to open a merge request.
#[derive(Debug, Clone)]
pub struct CreateMergeRequest<'a> {
    pub source_branch: &'a str,
    pub target_branch: &'a str,
    pub title: &'a str,
    pub body: &'a str,
}

/// A webhook registered on a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    pub id: String,
    pub url: String,
}

/// Operations available for every repository regardless of provider.
///
/// # Error Handling
///
/// Every fallible method returns `ProviderError`. Branch on
/// [`ProviderError::kind`]:
/// - `NotFound`: the repository (or branch, file) does not exist
/// - `Unauthorized` / `Forbidden`: credentials problem
/// - `RateLimited`: back off, see [`ProviderError::retry_after`]
/// - `Transient`: retry later
/// - `UnsupportedCapability`: the provider lacks the feature
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// Provider name ("github", "gitlab", "bitbucket", "mock").
    fn name(&self) -> &'static str;

    /// Make sure an open merge request proposes `data.files`, unless the
    /// base branch already contains them.
    async fn ensure_config_merge_request(
        &self,
        repo_url: &str,
        data: &MergeRequestData,
    ) -> Result<ReconcileOutcome, ProviderError>;

    /// Make sure an open merge request deletes the paths in `data.files`,
    /// unless none of them exist on the base branch.
    async fn remove_config_merge_request(
        &self,
        repo_url: &str,
        data: &MergeRequestData,
    ) -> Result<ReconcileOutcome, ProviderError>;

    /// Find the open configuration merge request for `data`, if any.
    async fn find_open_config_merge_request(
        &self,
        repo_url: &str,
        data: &MergeRequestData,
    ) -> Result<Option<MergeRequest>, ProviderError>;

    /// Register a webhook unless one with the same URL exists.
    async fn create_webhook(
        &self,
        repo_url: &str,
        webhook_url: &str,
        secret: &str,
    ) -> Result<(), ProviderError>;

    /// Remove webhooks targeting `webhook_url`; absence is success.
    async fn delete_webhook(&self, repo_url: &str, webhook_url: &str)
        -> Result<(), ProviderError>;

    /// Default branch name.
    ///
    /// `NotFound` means the repository does not exist;
    /// `InvalidRepositoryUrl` means the URL or host is invalid.
    async fn default_branch(&self, repo_url: &str) -> Result<String, ProviderError>;

    /// Delete a branch. `Ok(false)` when it did not exist.
    async fn delete_branch(&self, repo_url: &str, branch: &str) -> Result<bool, ProviderError>;

    /// SHA of the branch head.
    async fn branch_head_sha(&self, repo_url: &str, branch: &str) -> Result<String, ProviderError>;

    /// Raw content of a file on a branch.
    async fn read_file(
        &self,
        repo_url: &str,
        branch: &str,
        path: &str,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Whether a file exists on a branch.
    async fn file_exists(
        &self,
        repo_url: &str,
        branch: &str,
        path: &str,
    ) -> Result<bool, ProviderError>;

    /// Whether the repository is readable without authentication.
    async fn is_public(&self, repo_url: &str) -> Result<bool, ProviderError>;

    /// Web link to browse the repository at `sha`.
    fn browse_at_sha_url(&self, repo_url: &str, sha: &str) -> String;

    /// Name and id of the configured installable app.
    async fn app_identity(&self) -> Result<AppIdentity, ProviderError>;

    /// Numeric id of a user, typically the app's bot user.
    async fn app_user_id(&self, user_name: &str) -> Result<i64, ProviderError>;
}

impl std::fmt::Debug for dyn GitProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitProvider").field("name", &self.name()).finish()
    }
}

/// Per-provider primitives the core is built on.
///
/// Each method is one logical provider call. Implementations classify
/// failures with [`classify_status`](super::errors::classify_status) and
/// must not retry.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Provider name.
    fn name(&self) -> &'static str;

    async fn default_branch(&self, repo: &RepoRef) -> Result<String, ProviderError>;

    /// Head SHA of a branch, `None` if the branch does not exist.
    async fn branch_sha(&self, repo: &RepoRef, branch: &str)
        -> Result<Option<String>, ProviderError>;

    /// File content at a ref, `None` if the file does not exist there.
    async fn read_file(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError>;

    /// Parent SHAs of a commit.
    async fn commit_parents(&self, repo: &RepoRef, sha: &str) -> Result<Vec<String>, ProviderError>;

    /// Create a commit and point the branch at it. Returns the new SHA.
    async fn commit_files(
        &self,
        repo: &RepoRef,
        request: CommitRequest<'_>,
    ) -> Result<String, ProviderError>;

    /// Delete a branch. `Ok(false)` when it did not exist.
    async fn delete_branch(&self, repo: &RepoRef, branch: &str) -> Result<bool, ProviderError>;

    /// Open merge requests targeting `target_branch`.
    async fn list_open_merge_requests(
        &self,
        repo: &RepoRef,
        target_branch: &str,
    ) -> Result<Vec<OpenMergeRequest>, ProviderError>;

    async fn create_merge_request(
        &self,
        repo: &RepoRef,
        request: CreateMergeRequest<'_>,
    ) -> Result<MergeRequest, ProviderError>;

    async fn list_webhooks(&self, repo: &RepoRef) -> Result<Vec<Webhook>, ProviderError>;

    async fn create_webhook(
        &self,
        repo: &RepoRef,
        url: &str,
        secret: &str,
    ) -> Result<(), ProviderError>;

    async fn delete_webhook(&self, repo: &RepoRef, id: &str) -> Result<(), ProviderError>;

    async fn is_public(&self, repo: &RepoRef) -> Result<bool, ProviderError>;

    fn browse_at_sha_url(&self, repo: &RepoRef, sha: &str) -> String;

    async fn app_identity(&self) -> Result<AppIdentity, ProviderError> {
        Err(ProviderError::UnsupportedCapability(format!(
            "{} does not support installable apps",
            self.name()
        )))
    }

    async fn app_user_id(&self, _user_name: &str) -> Result<i64, ProviderError> {
        Err(ProviderError::UnsupportedCapability(format!(
            "{} does not support installable apps",
            self.name()
        )))
    }
}
