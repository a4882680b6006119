//! forge::reconcile
//!
//! The merge request reconciliation protocol.
//!
//! # States
//!
//! Every ensure/remove call re-derives the state of the repository from the
//! provider; nothing is cached between calls.
//!
//! | state | observed as | action |
//! |---|---|---|
//! | Satisfied | base head already holds the desired files | none |
//! | ProposalOpen | open MR, branch on base head with desired files | none |
//! | ProposalStale | open MR, branch diverges | force-update branch |
//! | Absent | no open MR, no branch | commit, open MR |
//! | Absent with orphan branch | no open MR, branch left behind | delete branch, commit, open MR |
//!
//! # Idempotence
//!
//! The proposal branch is a pure function of the logical branch name and the
//! base branch ([`proposal_branch_name`]). Finding the existing proposal is a
//! lookup by that name, so repeated calls converge on one merge request
//! without persisting any identifier.
//!
//! # Failure
//!
//! No retries and no rollback. An attempt interrupted between the commit and
//! opening the merge request leaves an orphan branch that the next call
//! cleans up.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use super::errors::ProviderError;
use super::traits::{
    CommitRequest, CreateMergeRequest, FileChange, MergeRequest, MergeRequestData,
    ReconcileOutcome, RepoHost, RepositoryFile,
};
use super::url::RepoRef;

/// Proposal branch for a logical branch and base.
///
/// # Example
///
/// ```
/// use pac_forge::forge::proposal_branch_name;
///
/// assert_eq!(proposal_branch_name("pac-config", "main"), "pac-config-main");
/// assert_eq!(proposal_branch_name("pac-config", "release/1.0"), "pac-config-release-1.0");
/// ```
pub fn proposal_branch_name(branch_name: &str, base_branch_name: &str) -> String {
    format!("{}-{}", branch_name, base_branch_name.replace('/', "-"))
}

/// Branches involved in one reconciliation.
#[derive(Debug, Clone)]
struct Target {
    base: String,
    proposal: String,
}

/// Whether the listed files should end up present or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Desired {
    Present,
    Absent,
}

/// Drives the ensure/remove/find protocol against one host.
pub struct Reconciler<'a, H: RepoHost + ?Sized> {
    host: &'a H,
}

impl<'a, H: RepoHost + ?Sized> Reconciler<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Make sure `data.files` are proposed (or already present) on the base.
    #[instrument(skip(self, data), fields(repo = %repo, branch = %data.branch_name))]
    pub async fn ensure(
        &self,
        repo: &RepoRef,
        data: &MergeRequestData,
    ) -> Result<ReconcileOutcome, ProviderError> {
        validate_request(data)?;
        let target = self.resolve_target(repo, data).await?;
        let base_sha = self.base_sha(repo, &target).await?;

        let changes = self.writes_against(repo, &base_sha, &data.files).await?;
        if changes.is_empty() {
            info!(base = %target.base, "configuration already present on base branch");
            return Ok(ReconcileOutcome::AlreadySatisfied);
        }

        match self.find_open(repo, &target).await? {
            Some(mr) => {
                if self
                    .proposal_is_current(repo, &target, &base_sha, &data.files, Desired::Present)
                    .await?
                {
                    debug!(mr_id = mr.id, "open proposal is up to date");
                    return Ok(ReconcileOutcome::Unchanged(mr));
                }
                self.push_proposal(repo, &target, &base_sha, data, &changes)
                    .await?;
                info!(mr_id = mr.id, url = %mr.web_url, "updated stale proposal");
                Ok(ReconcileOutcome::Updated(mr))
            }
            None => {
                let mr = self
                    .open_proposal(repo, &target, &base_sha, data, &changes)
                    .await?;
                info!(mr_id = mr.id, url = %mr.web_url, "opened configuration proposal");
                Ok(ReconcileOutcome::Created(mr))
            }
        }
    }

    /// Make sure the paths in `data.files` are proposed for deletion (or
    /// already absent from the base).
    #[instrument(skip(self, data), fields(repo = %repo, branch = %data.branch_name))]
    pub async fn remove(
        &self,
        repo: &RepoRef,
        data: &MergeRequestData,
    ) -> Result<ReconcileOutcome, ProviderError> {
        validate_request(data)?;
        let target = self.resolve_target(repo, data).await?;
        let base_sha = self.base_sha(repo, &target).await?;

        let changes = self.deletes_against(repo, &base_sha, &data.files).await?;
        let existing = self.find_open(repo, &target).await?;

        match existing {
            None if changes.is_empty() => {
                info!(base = %target.base, "configuration already absent from base branch");
                Ok(ReconcileOutcome::AlreadySatisfied)
            }
            Some(mr) if changes.is_empty() => {
                // Nothing left to delete; the open proposal would be empty.
                debug!(mr_id = mr.id, "base already clean, leaving removal proposal as is");
                Ok(ReconcileOutcome::Unchanged(mr))
            }
            Some(mr) => {
                if self
                    .proposal_is_current(repo, &target, &base_sha, &data.files, Desired::Absent)
                    .await?
                {
                    debug!(mr_id = mr.id, "open removal proposal is up to date");
                    return Ok(ReconcileOutcome::Unchanged(mr));
                }
                self.push_proposal(repo, &target, &base_sha, data, &changes)
                    .await?;
                info!(mr_id = mr.id, url = %mr.web_url, "updated stale removal proposal");
                Ok(ReconcileOutcome::Updated(mr))
            }
            None => {
                let mr = self
                    .open_proposal(repo, &target, &base_sha, data, &changes)
                    .await?;
                info!(mr_id = mr.id, url = %mr.web_url, "opened removal proposal");
                Ok(ReconcileOutcome::Created(mr))
            }
        }
    }

    /// Find the open proposal for `data` without touching anything.
    #[instrument(skip(self, data), fields(repo = %repo, branch = %data.branch_name))]
    pub async fn find(
        &self,
        repo: &RepoRef,
        data: &MergeRequestData,
    ) -> Result<Option<MergeRequest>, ProviderError> {
        if data.branch_name.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "branch name cannot be empty".into(),
            ));
        }
        let target = self.resolve_target(repo, data).await?;
        self.find_open(repo, &target).await
    }

    async fn resolve_target(
        &self,
        repo: &RepoRef,
        data: &MergeRequestData,
    ) -> Result<Target, ProviderError> {
        let default_branch = self.host.default_branch(repo).await?;
        let base = if data.base_branch_name.is_empty() {
            default_branch.clone()
        } else {
            data.base_branch_name.clone()
        };
        let proposal = proposal_branch_name(&data.branch_name, &base);

        if proposal == default_branch || proposal == base {
            return Err(ProviderError::InvalidRequest(format!(
                "proposal branch '{}' collides with base or default branch",
                proposal
            )));
        }

        Ok(Target { base, proposal })
    }

    async fn base_sha(&self, repo: &RepoRef, target: &Target) -> Result<String, ProviderError> {
        self.host
            .branch_sha(repo, &target.base)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("base branch '{}'", target.base)))
    }

    async fn find_open(
        &self,
        repo: &RepoRef,
        target: &Target,
    ) -> Result<Option<MergeRequest>, ProviderError> {
        let open = self
            .host
            .list_open_merge_requests(repo, &target.base)
            .await?;
        Ok(open
            .into_iter()
            .find(|mr| {
                mr.same_repository
                    && mr.source_branch == target.proposal
                    && mr.target_branch == target.base
            })
            .map(|mr| mr.merge_request))
    }

    /// Writes needed to bring `git_ref` to the desired files.
    async fn writes_against(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        files: &[RepositoryFile],
    ) -> Result<Vec<FileChange>, ProviderError> {
        let mut changes = Vec::new();
        for file in files {
            match self.host.read_file(repo, git_ref, &file.full_path).await? {
                Some(current) if current == file.content => {}
                Some(_) => changes.push(FileChange::Update {
                    path: file.full_path.clone(),
                    content: file.content.clone(),
                }),
                None => changes.push(FileChange::Create {
                    path: file.full_path.clone(),
                    content: file.content.clone(),
                }),
            }
        }
        Ok(changes)
    }

    /// Deletions needed to remove the listed files from `git_ref`.
    async fn deletes_against(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        files: &[RepositoryFile],
    ) -> Result<Vec<FileChange>, ProviderError> {
        let mut changes = Vec::new();
        for file in files {
            if self
                .host
                .read_file(repo, git_ref, &file.full_path)
                .await?
                .is_some()
            {
                changes.push(FileChange::Delete {
                    path: file.full_path.clone(),
                });
            }
        }
        Ok(changes)
    }

    /// The proposal branch sits directly on the base head and holds the
    /// desired state.
    async fn proposal_is_current(
        &self,
        repo: &RepoRef,
        target: &Target,
        base_sha: &str,
        files: &[RepositoryFile],
        desired: Desired,
    ) -> Result<bool, ProviderError> {
        let Some(tip) = self.host.branch_sha(repo, &target.proposal).await? else {
            warn!(branch = %target.proposal, "open proposal has no branch");
            return Ok(false);
        };

        let parents = self.host.commit_parents(repo, &tip).await?;
        if !parents.iter().any(|p| p == base_sha) {
            debug!(branch = %target.proposal, "proposal is not based on current base head");
            return Ok(false);
        }

        let pending = match desired {
            Desired::Present => self.writes_against(repo, &tip, files).await?,
            Desired::Absent => self.deletes_against(repo, &tip, files).await?,
        };
        Ok(pending.is_empty())
    }

    async fn push_proposal(
        &self,
        repo: &RepoRef,
        target: &Target,
        base_sha: &str,
        data: &MergeRequestData,
        changes: &[FileChange],
    ) -> Result<String, ProviderError> {
        let message = data.full_commit_message();
        let author = data.author();
        let sha = self
            .host
            .commit_files(
                repo,
                CommitRequest {
                    branch: &target.proposal,
                    parent_sha: base_sha,
                    message: &message,
                    author: &author,
                    changes,
                },
            )
            .await?;
        debug!(branch = %target.proposal, sha = %sha, "pushed proposal commit");
        Ok(sha)
    }

    async fn open_proposal(
        &self,
        repo: &RepoRef,
        target: &Target,
        base_sha: &str,
        data: &MergeRequestData,
        changes: &[FileChange],
    ) -> Result<MergeRequest, ProviderError> {
        if self.host.delete_branch(repo, &target.proposal).await? {
            warn!(branch = %target.proposal, "removed orphaned proposal branch");
        }
        self.push_proposal(repo, target, base_sha, data, changes)
            .await?;
        self.host
            .create_merge_request(
                repo,
                CreateMergeRequest {
                    source_branch: &target.proposal,
                    target_branch: &target.base,
                    title: &data.title,
                    body: &data.text,
                },
            )
            .await
    }
}

fn validate_request(data: &MergeRequestData) -> Result<(), ProviderError> {
    if data.branch_name.is_empty() {
        return Err(ProviderError::InvalidRequest(
            "branch name cannot be empty".into(),
        ));
    }
    if data.files.is_empty() {
        return Err(ProviderError::InvalidRequest(
            "at least one file is required".into(),
        ));
    }

    let mut seen = HashSet::new();
    for file in &data.files {
        if file.full_path.is_empty() || file.full_path.starts_with('/') {
            return Err(ProviderError::InvalidRequest(format!(
                "invalid file path '{}'",
                file.full_path
            )));
        }
        if !seen.insert(file.full_path.as_str()) {
            return Err(ProviderError::InvalidRequest(format!(
                "duplicate file path '{}'",
                file.full_path
            )));
        }
    }
    Ok(())
}
