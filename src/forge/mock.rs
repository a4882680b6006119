//! forge::mock
//!
//! In-memory host for deterministic testing.
//!
//! # Design
//!
//! `MockHost` implements [`RepoHost`] over a tiny commit graph per
//! repository: branches point at commits, commits hold a full snapshot of
//! their files and their parent SHAs. That is enough to exercise every
//! reconciler state (satisfied, open, stale, orphaned) without a network.
//!
//! Like a real provider it is strict about commit actions: creating an
//! existing path, updating or deleting a missing one is rejected.
//!
//! Every call is recorded as a [`MockOperation`] so tests can assert that a
//! no-op reconciliation performed no writes. Failures are injected with
//! [`FailOn`].
//!
//! # Example
//!
//! ```
//! use pac_forge::forge::mock::MockHost;
//! use pac_forge::forge::{GitProvider, MergeRequestData, ProviderClient, RepositoryFile};
//!
//! # tokio_test::block_on(async {
//! let host = MockHost::new().with_repo("owner/repo", "main", &[("README.md", "hello")]);
//! let provider = ProviderClient::new(host.clone());
//!
//! let data = MergeRequestData {
//!     branch_name: "pac-config".into(),
//!     title: "Configure Pipelines as Code".into(),
//!     files: vec![RepositoryFile::new(".tekton/push.yaml", "kind: PipelineRun")],
//!     ..Default::default()
//! };
//!
//! let outcome = provider
//!     .ensure_config_merge_request("https://github.com/owner/repo", &data)
//!     .await
//!     .unwrap();
//! assert!(outcome.is_write());
//! assert_eq!(host.open_merge_request_count("owner/repo"), 1);
//! # });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::errors::ProviderError;
use super::traits::{
    AppIdentity, CommitRequest, CreateMergeRequest, FileChange, MergeRequest, OpenMergeRequest,
    RepoHost, Webhook,
};
use super::url::RepoRef;

type Files = BTreeMap<String, Vec<u8>>;

/// Mock host for testing.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the provider under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    inner: Arc<Mutex<MockHostInner>>,
}

#[derive(Debug, Default)]
struct MockHostInner {
    repos: HashMap<String, MockRepo>,
    next_sha: u64,
    fail_on: Vec<FailOn>,
    operations: Vec<MockOperation>,
    app: Option<AppIdentity>,
    users: HashMap<String, i64>,
}

#[derive(Debug, Default)]
struct MockRepo {
    default_branch: String,
    public: bool,
    branches: BTreeMap<String, String>,
    commits: HashMap<String, MockCommit>,
    merge_requests: Vec<MockMergeRequest>,
    hooks: Vec<Webhook>,
    next_mr: i64,
    next_hook: u64,
}

#[derive(Debug, Clone)]
struct MockCommit {
    parents: Vec<String>,
    files: Files,
}

#[derive(Debug, Clone)]
struct MockMergeRequest {
    open: OpenMergeRequest,
    is_open: bool,
}

/// Which host call should fail, and with what.
#[derive(Debug, Clone)]
pub enum FailOn {
    DefaultBranch(ProviderError),
    ReadFile(ProviderError),
    CommitFiles(ProviderError),
    DeleteBranch(ProviderError),
    ListOpenMergeRequests(ProviderError),
    CreateMergeRequest(ProviderError),
    ListWebhooks(ProviderError),
    CreateWebhook(ProviderError),
    DeleteWebhook(ProviderError),
}

impl FailOn {
    fn error_for(&self, op: &MockOperation) -> Option<ProviderError> {
        match (self, op) {
            (FailOn::DefaultBranch(e), MockOperation::DefaultBranch)
            | (FailOn::ReadFile(e), MockOperation::ReadFile { .. })
            | (FailOn::CommitFiles(e), MockOperation::CommitFiles { .. })
            | (FailOn::DeleteBranch(e), MockOperation::DeleteBranch { .. })
            | (FailOn::ListOpenMergeRequests(e), MockOperation::ListOpenMergeRequests { .. })
            | (FailOn::CreateMergeRequest(e), MockOperation::CreateMergeRequest { .. })
            | (FailOn::ListWebhooks(e), MockOperation::ListWebhooks)
            | (FailOn::CreateWebhook(e), MockOperation::CreateWebhook { .. })
            | (FailOn::DeleteWebhook(e), MockOperation::DeleteWebhook { .. }) => Some(e.clone()),
            _ => None,
        }
    }
}

/// Recorded host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    DefaultBranch,
    BranchSha {
        branch: String,
    },
    ReadFile {
        git_ref: String,
        path: String,
    },
    CommitParents {
        sha: String,
    },
    CommitFiles {
        branch: String,
        parent_sha: String,
        changes: Vec<FileChange>,
    },
    DeleteBranch {
        branch: String,
    },
    ListOpenMergeRequests {
        target_branch: String,
    },
    CreateMergeRequest {
        source_branch: String,
        target_branch: String,
        title: String,
    },
    ListWebhooks,
    CreateWebhook {
        url: String,
    },
    DeleteWebhook {
        id: String,
    },
    IsPublic,
}

impl MockOperation {
    /// Whether the call mutates the provider.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            MockOperation::CommitFiles { .. }
                | MockOperation::DeleteBranch { .. }
                | MockOperation::CreateMergeRequest { .. }
                | MockOperation::CreateWebhook { .. }
                | MockOperation::DeleteWebhook { .. }
        )
    }
}

fn repo_missing(full_name: &str) -> ProviderError {
    ProviderError::NotFound(format!("repository '{}'", full_name))
}

impl MockHostInner {
    fn sha(&mut self) -> String {
        self.next_sha += 1;
        format!("{:040x}", self.next_sha)
    }

    fn repo(&self, full_name: &str) -> Result<&MockRepo, ProviderError> {
        self.repos.get(full_name).ok_or_else(|| repo_missing(full_name))
    }

    fn repo_mut(&mut self, full_name: &str) -> Result<&mut MockRepo, ProviderError> {
        self.repos
            .get_mut(full_name)
            .ok_or_else(|| repo_missing(full_name))
    }

    /// Commit `files` on `parents`, returning the new SHA.
    fn commit(
        &mut self,
        full_name: &str,
        parents: Vec<String>,
        files: Files,
    ) -> Result<String, ProviderError> {
        let sha = self.sha();
        self.repo_mut(full_name)?
            .commits
            .insert(sha.clone(), MockCommit { parents, files });
        Ok(sha)
    }
}

impl MockRepo {
    /// Resolve a branch name or commit SHA to a commit.
    fn resolve(&self, git_ref: &str) -> Option<&MockCommit> {
        let sha = self.branches.get(git_ref).map(String::as_str).unwrap_or(git_ref);
        self.commits.get(sha)
    }
}

impl MockHost {
    /// Create an empty mock host.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockHostInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a repository whose default branch holds `files`.
    pub fn with_repo(self, full_name: &str, default_branch: &str, files: &[(&str, &str)]) -> Self {
        self.add_repo(full_name, default_branch, files);
        self
    }

    /// Add a repository whose default branch holds `files`.
    pub fn add_repo(&self, full_name: &str, default_branch: &str, files: &[(&str, &str)]) {
        let mut inner = self.state();
        let snapshot: Files = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
            .collect();

        inner.repos.insert(
            full_name.to_string(),
            MockRepo {
                default_branch: default_branch.to_string(),
                next_mr: 1,
                next_hook: 1,
                ..Default::default()
            },
        );
        if let Ok(sha) = inner.commit(full_name, Vec::new(), snapshot) {
            if let Ok(repo) = inner.repo_mut(full_name) {
                repo.branches.insert(default_branch.to_string(), sha);
            }
        }
    }

    pub fn set_public(&self, full_name: &str, public: bool) {
        if let Ok(repo) = self.state().repo_mut(full_name) {
            repo.public = public;
        }
    }

    /// Configure the identity returned by `app_identity`.
    pub fn with_app(self, app: AppIdentity) -> Self {
        self.state().app = Some(app);
        self
    }

    /// Register a user id returned by `app_user_id`.
    pub fn with_user(self, name: &str, id: i64) -> Self {
        self.state().users.insert(name.to_string(), id);
        self
    }

    /// Fail matching calls until [`clear_fail_on`](Self::clear_fail_on).
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.state().fail_on.push(fail_on);
        self
    }

    pub fn clear_fail_on(&self) {
        self.state().fail_on.clear();
    }

    /// All recorded calls, oldest first.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.state().operations.clone()
    }

    /// Recorded calls that mutate the provider.
    pub fn writes(&self) -> Vec<MockOperation> {
        self.state()
            .operations
            .iter()
            .filter(|op| op.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Record `op` and return the injected failure for it, if any.
    fn begin(&self, op: MockOperation) -> Result<MutexGuard<'_, MockHostInner>, ProviderError> {
        let mut inner = self.state();
        let injected = inner.fail_on.iter().find_map(|f| f.error_for(&op));
        inner.operations.push(op);
        match injected {
            Some(err) => Err(err),
            None => Ok(inner),
        }
    }

    /// Head SHA of `branch`.
    pub fn branch_head(&self, full_name: &str, branch: &str) -> Option<String> {
        self.state().repos.get(full_name)?.branches.get(branch).cloned()
    }

    /// Content of `path` on `branch`.
    pub fn branch_file(&self, full_name: &str, branch: &str, path: &str) -> Option<Vec<u8>> {
        let inner = self.state();
        let repo = inner.repos.get(full_name)?;
        repo.resolve(branch)?.files.get(path).cloned()
    }

    pub fn branches(&self, full_name: &str) -> Vec<String> {
        self.state()
            .repos
            .get(full_name)
            .map(|r| r.branches.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Open merge requests in a repository.
    pub fn open_merge_requests(&self, full_name: &str) -> Vec<OpenMergeRequest> {
        self.state()
            .repos
            .get(full_name)
            .map(|r| {
                r.merge_requests
                    .iter()
                    .filter(|mr| mr.is_open)
                    .map(|mr| mr.open.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn open_merge_request_count(&self, full_name: &str) -> usize {
        self.open_merge_requests(full_name).len()
    }

    pub fn webhooks(&self, full_name: &str) -> Vec<Webhook> {
        self.state()
            .repos
            .get(full_name)
            .map(|r| r.hooks.clone())
            .unwrap_or_default()
    }

    /// Register a hook directly, bypassing call recording.
    pub fn add_webhook(&self, full_name: &str, url: &str) {
        if let Ok(repo) = self.state().repo_mut(full_name) {
            let id = repo.next_hook.to_string();
            repo.next_hook += 1;
            repo.hooks.push(Webhook {
                id,
                url: url.to_string(),
            });
        }
    }

    /// Fast-forward `branch` with a commit writing (`Some`) or deleting
    /// (`None`) paths. Creates the branch from the default branch if needed.
    pub fn advance_branch(
        &self,
        full_name: &str,
        branch: &str,
        changes: &[(&str, Option<&str>)],
    ) -> Option<String> {
        let mut inner = self.state();
        let repo = inner.repos.get(full_name)?;
        let parent = repo
            .branches
            .get(branch)
            .or_else(|| repo.branches.get(&repo.default_branch))?
            .clone();
        let mut files = repo.commits.get(&parent)?.files.clone();
        for (path, content) in changes {
            match content {
                Some(c) => files.insert(path.to_string(), c.as_bytes().to_vec()),
                None => files.remove(*path),
            };
        }

        let sha = inner.commit(full_name, vec![parent], files).ok()?;
        inner
            .repos
            .get_mut(full_name)?
            .branches
            .insert(branch.to_string(), sha.clone());
        Some(sha)
    }

    /// Merge an open merge request: the target gets the source snapshot,
    /// the request closes and the source branch is deleted.
    pub fn merge_merge_request(&self, full_name: &str, id: i64) -> Option<String> {
        let mut inner = self.state();
        let repo = inner.repos.get(full_name)?;
        let mr = repo
            .merge_requests
            .iter()
            .find(|mr| mr.is_open && mr.open.merge_request.id == id)?
            .open
            .clone();
        let target_head = repo.branches.get(&mr.target_branch)?.clone();
        let source_head = repo.branches.get(&mr.source_branch)?.clone();
        let files = repo.commits.get(&source_head)?.files.clone();

        let sha = inner
            .commit(full_name, vec![target_head, source_head], files)
            .ok()?;
        let repo = inner.repos.get_mut(full_name)?;
        repo.branches.insert(mr.target_branch.clone(), sha.clone());
        repo.branches.remove(&mr.source_branch);
        for entry in repo.merge_requests.iter_mut() {
            if entry.open.merge_request.id == id {
                entry.is_open = false;
            }
        }
        Some(sha)
    }

    /// Open a merge request from a fork whose branch is named
    /// `source_branch`. Nothing is created in this repository.
    pub fn open_fork_merge_request(
        &self,
        full_name: &str,
        source_branch: &str,
        target_branch: &str,
    ) -> Option<i64> {
        let mut inner = self.state();
        let repo = inner.repo_mut(full_name).ok()?;
        let id = repo.next_mr;
        repo.next_mr += 1;
        repo.merge_requests.push(MockMergeRequest {
            open: OpenMergeRequest {
                merge_request: MergeRequest {
                    id,
                    created_at: Some(chrono::Utc::now()),
                    web_url: format!("https://fork.example.com/pull/{}", id),
                    title: format!("fork: {}", source_branch),
                },
                source_branch: source_branch.to_string(),
                target_branch: target_branch.to_string(),
                same_repository: false,
            },
            is_open: true,
        });
        Some(id)
    }

    /// Close a merge request without merging.
    pub fn close_merge_request(&self, full_name: &str, id: i64) {
        if let Ok(repo) = self.state().repo_mut(full_name) {
            for entry in repo.merge_requests.iter_mut() {
                if entry.open.merge_request.id == id {
                    entry.is_open = false;
                }
            }
        }
    }
}

#[async_trait]
impl RepoHost for MockHost {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn default_branch(&self, repo: &RepoRef) -> Result<String, ProviderError> {
        let inner = self.begin(MockOperation::DefaultBranch)?;
        Ok(inner.repo(&repo.full_name())?.default_branch.clone())
    }

    async fn branch_sha(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>, ProviderError> {
        let inner = self.begin(MockOperation::BranchSha {
            branch: branch.to_string(),
        })?;
        Ok(inner.repo(&repo.full_name())?.branches.get(branch).cloned())
    }

    async fn read_file(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        let inner = self.begin(MockOperation::ReadFile {
            git_ref: git_ref.to_string(),
            path: path.to_string(),
        })?;
        let commit = inner
            .repo(&repo.full_name())?
            .resolve(git_ref)
            .ok_or_else(|| ProviderError::NotFound(format!("ref '{}'", git_ref)))?;
        Ok(commit.files.get(path).cloned())
    }

    async fn commit_parents(&self, repo: &RepoRef, sha: &str) -> Result<Vec<String>, ProviderError> {
        let inner = self.begin(MockOperation::CommitParents {
            sha: sha.to_string(),
        })?;
        inner
            .repo(&repo.full_name())?
            .commits
            .get(sha)
            .map(|c| c.parents.clone())
            .ok_or_else(|| ProviderError::NotFound(format!("commit '{}'", sha)))
    }

    async fn commit_files(
        &self,
        repo: &RepoRef,
        request: CommitRequest<'_>,
    ) -> Result<String, ProviderError> {
        let full_name = repo.full_name();
        let mut inner = self.begin(MockOperation::CommitFiles {
            branch: request.branch.to_string(),
            parent_sha: request.parent_sha.to_string(),
            changes: request.changes.to_vec(),
        })?;

        let mut files = inner
            .repo(&full_name)?
            .commits
            .get(request.parent_sha)
            .ok_or_else(|| ProviderError::NotFound(format!("commit '{}'", request.parent_sha)))?
            .files
            .clone();

        for change in request.changes {
            let exists = files.contains_key(change.path());
            match change {
                FileChange::Create { path, content } if !exists => {
                    files.insert(path.clone(), content.clone());
                }
                FileChange::Update { path, content } if exists => {
                    files.insert(path.clone(), content.clone());
                }
                FileChange::Delete { path } if exists => {
                    files.remove(path);
                }
                other => {
                    return Err(ProviderError::Unknown(format!(
                        "status 400: invalid commit action for '{}'",
                        other.path()
                    )))
                }
            }
        }

        let sha = inner.commit(&full_name, vec![request.parent_sha.to_string()], files)?;
        inner
            .repo_mut(&full_name)?
            .branches
            .insert(request.branch.to_string(), sha.clone());
        Ok(sha)
    }

    async fn delete_branch(&self, repo: &RepoRef, branch: &str) -> Result<bool, ProviderError> {
        let mut inner = self.begin(MockOperation::DeleteBranch {
            branch: branch.to_string(),
        })?;
        let state = inner.repo_mut(&repo.full_name())?;
        if state.default_branch == branch {
            return Err(ProviderError::Forbidden(
                "cannot delete the default branch".into(),
            ));
        }
        Ok(state.branches.remove(branch).is_some())
    }

    async fn list_open_merge_requests(
        &self,
        repo: &RepoRef,
        target_branch: &str,
    ) -> Result<Vec<OpenMergeRequest>, ProviderError> {
        let inner = self.begin(MockOperation::ListOpenMergeRequests {
            target_branch: target_branch.to_string(),
        })?;
        Ok(inner
            .repo(&repo.full_name())?
            .merge_requests
            .iter()
            .filter(|mr| mr.is_open && mr.open.target_branch == target_branch)
            .map(|mr| mr.open.clone())
            .collect())
    }

    async fn create_merge_request(
        &self,
        repo: &RepoRef,
        request: CreateMergeRequest<'_>,
    ) -> Result<MergeRequest, ProviderError> {
        let mut inner = self.begin(MockOperation::CreateMergeRequest {
            source_branch: request.source_branch.to_string(),
            target_branch: request.target_branch.to_string(),
            title: request.title.to_string(),
        })?;
        let state = inner.repo_mut(&repo.full_name())?;

        if !state.branches.contains_key(request.source_branch) {
            return Err(ProviderError::Unknown(format!(
                "status 422: source branch '{}' does not exist",
                request.source_branch
            )));
        }
        if state.merge_requests.iter().any(|mr| {
            mr.is_open
                && mr.open.same_repository
                && mr.open.source_branch == request.source_branch
                && mr.open.target_branch == request.target_branch
        }) {
            return Err(ProviderError::Unknown(
                "status 422: a merge request for this branch already exists".into(),
            ));
        }

        let id = state.next_mr;
        state.next_mr += 1;
        let merge_request = MergeRequest {
            id,
            created_at: Some(chrono::Utc::now()),
            web_url: format!("{}/pull/{}", repo.web_url(), id),
            title: request.title.to_string(),
        };
        state.merge_requests.push(MockMergeRequest {
            open: OpenMergeRequest {
                merge_request: merge_request.clone(),
                source_branch: request.source_branch.to_string(),
                target_branch: request.target_branch.to_string(),
                same_repository: true,
            },
            is_open: true,
        });
        Ok(merge_request)
    }

    async fn list_webhooks(&self, repo: &RepoRef) -> Result<Vec<Webhook>, ProviderError> {
        let inner = self.begin(MockOperation::ListWebhooks)?;
        Ok(inner.repo(&repo.full_name())?.hooks.clone())
    }

    async fn create_webhook(
        &self,
        repo: &RepoRef,
        url: &str,
        _secret: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.begin(MockOperation::CreateWebhook {
            url: url.to_string(),
        })?;
        let state = inner.repo_mut(&repo.full_name())?;
        let id = state.next_hook.to_string();
        state.next_hook += 1;
        state.hooks.push(Webhook {
            id,
            url: url.to_string(),
        });
        Ok(())
    }

    async fn delete_webhook(&self, repo: &RepoRef, id: &str) -> Result<(), ProviderError> {
        let mut inner = self.begin(MockOperation::DeleteWebhook { id: id.to_string() })?;
        let state = inner.repo_mut(&repo.full_name())?;
        let before = state.hooks.len();
        state.hooks.retain(|h| h.id != id);
        if state.hooks.len() == before {
            return Err(ProviderError::NotFound(format!("webhook {}", id)));
        }
        Ok(())
    }

    async fn is_public(&self, repo: &RepoRef) -> Result<bool, ProviderError> {
        let inner = self.begin(MockOperation::IsPublic)?;
        Ok(inner.repo(&repo.full_name())?.public)
    }

    fn browse_at_sha_url(&self, repo: &RepoRef, sha: &str) -> String {
        format!("{}/tree/{}", repo.web_url(), sha)
    }

    async fn app_identity(&self) -> Result<AppIdentity, ProviderError> {
        self.state().app.clone().ok_or_else(|| {
            ProviderError::UnsupportedCapability("mock host has no app configured".into())
        })
    }

    async fn app_user_id(&self, user_name: &str) -> Result<i64, ProviderError> {
        self.state()
            .users
            .get(user_name)
            .copied()
            .ok_or_else(|| ProviderError::NotFound(format!("user '{}'", user_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::{CommitAuthor, ErrorKind};

    fn repo() -> RepoRef {
        RepoRef::parse("https://github.com/owner/repo").unwrap()
    }

    fn author() -> CommitAuthor {
        CommitAuthor {
            name: "Bot".into(),
            email: "bot@example.com".into(),
        }
    }

    #[tokio::test]
    async fn seeded_repo_is_readable() {
        let host = MockHost::new().with_repo("owner/repo", "main", &[("README.md", "hi")]);
        assert_eq!(host.default_branch(&repo()).await.unwrap(), "main");
        assert_eq!(
            host.read_file(&repo(), "main", "README.md").await.unwrap(),
            Some(b"hi".to_vec())
        );
        assert_eq!(host.read_file(&repo(), "main", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_repo_is_not_found() {
        let host = MockHost::new();
        let err = host.default_branch(&repo()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn commit_creates_then_force_moves_branch() {
        let host = MockHost::new().with_repo("owner/repo", "main", &[]);
        let base = host.branch_head("owner/repo", "main").unwrap();
        let author = author();

        let changes = vec![FileChange::Create {
            path: "a".into(),
            content: b"1".to_vec(),
        }];
        let first = host
            .commit_files(
                &repo(),
                CommitRequest {
                    branch: "topic",
                    parent_sha: &base,
                    message: "m",
                    author: &author,
                    changes: &changes,
                },
            )
            .await
            .unwrap();

        let second = host
            .commit_files(
                &repo(),
                CommitRequest {
                    branch: "topic",
                    parent_sha: &base,
                    message: "m",
                    author: &author,
                    changes: &changes,
                },
            )
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(host.branch_head("owner/repo", "topic"), Some(second.clone()));
        assert_eq!(host.commit_parents(&repo(), &second).await.unwrap(), vec![base]);
    }

    #[tokio::test]
    async fn commit_rejects_mismatched_actions() {
        let host = MockHost::new().with_repo("owner/repo", "main", &[("a", "1")]);
        let base = host.branch_head("owner/repo", "main").unwrap();
        let author = author();
        let changes = vec![FileChange::Create {
            path: "a".into(),
            content: b"2".to_vec(),
        }];

        let err = host
            .commit_files(
                &repo(),
                CommitRequest {
                    branch: "topic",
                    parent_sha: &base,
                    message: "m",
                    author: &author,
                    changes: &changes,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn fail_on_injects_error_and_records_call() {
        let host = MockHost::new()
            .with_repo("owner/repo", "main", &[])
            .fail_on(FailOn::ListWebhooks(ProviderError::Transient("reset".into())));

        let err = host.list_webhooks(&repo()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(host.operations(), vec![MockOperation::ListWebhooks]);

        host.clear_fail_on();
        assert!(host.list_webhooks(&repo()).await.unwrap().is_empty());
    }

    #[test]
    fn merge_moves_target_and_closes() {
        let host = MockHost::new().with_repo("owner/repo", "main", &[]);
        host.advance_branch("owner/repo", "topic", &[("x", Some("1"))]);

        let mut inner = host.state();
        let state = inner.repo_mut("owner/repo").unwrap();
        state.merge_requests.push(MockMergeRequest {
            open: OpenMergeRequest {
                merge_request: MergeRequest {
                    id: 1,
                    created_at: None,
                    web_url: "u".into(),
                    title: "t".into(),
                },
                source_branch: "topic".into(),
                target_branch: "main".into(),
                same_repository: true,
            },
            is_open: true,
        });
        drop(inner);

        host.merge_merge_request("owner/repo", 1).unwrap();
        assert_eq!(host.branch_file("owner/repo", "main", "x"), Some(b"1".to_vec()));
        assert_eq!(host.open_merge_request_count("owner/repo"), 0);
        assert!(!host.branches("owner/repo").contains(&"topic".to_string()));
    }
}
