//! forge::gitlab
//!
//! GitLab host adapter over the REST v4 API.
//!
//! Projects are addressed by their URL-encoded full path, which also covers
//! nested groups (`group%2Fsub%2Fproject`).
//!
//! Commits go through the commits API in a single call: `start_sha` pins the
//! parent and `force` lets the same call create the branch or move it.
//! Every action must say whether the path is created, updated or deleted,
//! which is why [`FileChange`] carries that distinction.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::ProviderError;
use super::http::HttpApi;
use super::traits::{
    CommitRequest, CreateMergeRequest, FileChange, MergeRequest, OpenMergeRequest, RepoHost,
    Webhook,
};
use super::url::RepoRef;
use crate::auth::TokenProvider;

/// GitLab.com API base URL.
pub const DEFAULT_API_BASE: &str = "https://gitlab.com/api/v4";

/// GitLab implementation of [`RepoHost`].
#[derive(Debug, Clone)]
pub struct GitLabHost {
    api: HttpApi,
}

impl GitLabHost {
    pub fn new(client: Client, api_base: &str, token: Arc<dyn TokenProvider>) -> Self {
        Self {
            api: HttpApi::new(client, api_base, token, "gitlab"),
        }
    }

    pub fn api_base(&self) -> &str {
        self.api.api_base()
    }

    fn project(repo: &RepoRef) -> String {
        format!("projects/{}", urlencoding::encode(&repo.full_name()))
    }

    fn project_path(repo: &RepoRef, path: &str) -> String {
        format!("{}/{}", Self::project(repo), path)
    }
}

#[async_trait]
impl RepoHost for GitLabHost {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    async fn default_branch(&self, repo: &RepoRef) -> Result<String, ProviderError> {
        let project: GitLabProject = self.api.get_json(&Self::project(repo)).await?;
        // Empty projects have no default branch yet.
        project.default_branch.ok_or_else(|| {
            ProviderError::NotFound(format!("project '{}' has no default branch", repo))
        })
    }

    async fn branch_sha(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>, ProviderError> {
        let found: Option<GitLabBranch> = self
            .api
            .get_json_opt(&Self::project_path(
                repo,
                &format!("repository/branches/{}", urlencoding::encode(branch)),
            ))
            .await?;
        Ok(found.map(|b| b.commit.id))
    }

    async fn read_file(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        let endpoint = Self::project_path(
            repo,
            &format!(
                "repository/files/{}/raw?ref={}",
                urlencoding::encode(path),
                urlencoding::encode(git_ref)
            ),
        );
        self.api.get_bytes_opt(&endpoint, None).await
    }

    async fn commit_parents(&self, repo: &RepoRef, sha: &str) -> Result<Vec<String>, ProviderError> {
        let commit: GitLabCommit = self
            .api
            .get_json(&Self::project_path(repo, &format!("repository/commits/{}", sha)))
            .await?;
        Ok(commit.parent_ids)
    }

    async fn commit_files(
        &self,
        repo: &RepoRef,
        request: CommitRequest<'_>,
    ) -> Result<String, ProviderError> {
        let actions: Vec<CommitAction<'_>> = request.changes.iter().map(CommitAction::from).collect();
        let commit: GitLabCommit = self
            .api
            .post_json(
                &Self::project_path(repo, "repository/commits"),
                &NewCommit {
                    branch: request.branch,
                    commit_message: request.message,
                    start_sha: request.parent_sha,
                    actions,
                    author_name: &request.author.name,
                    author_email: &request.author.email,
                    force: true,
                },
            )
            .await?;
        debug!(repo = %repo, branch = request.branch, sha = %commit.id, "pushed commit");
        Ok(commit.id)
    }

    async fn delete_branch(&self, repo: &RepoRef, branch: &str) -> Result<bool, ProviderError> {
        self.api
            .delete(&Self::project_path(
                repo,
                &format!("repository/branches/{}", urlencoding::encode(branch)),
            ))
            .await
    }

    async fn list_open_merge_requests(
        &self,
        repo: &RepoRef,
        target_branch: &str,
    ) -> Result<Vec<OpenMergeRequest>, ProviderError> {
        let mrs: Vec<GitLabMergeRequest> = self
            .api
            .get_paged(&Self::project_path(
                repo,
                &format!(
                    "merge_requests?state=opened&target_branch={}",
                    urlencoding::encode(target_branch)
                ),
            ))
            .await?;
        Ok(mrs.into_iter().map(OpenMergeRequest::from).collect())
    }

    async fn create_merge_request(
        &self,
        repo: &RepoRef,
        request: CreateMergeRequest<'_>,
    ) -> Result<MergeRequest, ProviderError> {
        let mr: GitLabMergeRequest = self
            .api
            .post_json(
                &Self::project_path(repo, "merge_requests"),
                &NewMergeRequest {
                    source_branch: request.source_branch,
                    target_branch: request.target_branch,
                    title: request.title,
                    description: request.body,
                    remove_source_branch: true,
                },
            )
            .await?;
        Ok(OpenMergeRequest::from(mr).merge_request)
    }

    async fn list_webhooks(&self, repo: &RepoRef) -> Result<Vec<Webhook>, ProviderError> {
        let hooks: Vec<GitLabHook> = self.api.get_paged(&Self::project_path(repo, "hooks")).await?;
        Ok(hooks
            .into_iter()
            .map(|h| Webhook {
                id: h.id.to_string(),
                url: h.url,
            })
            .collect())
    }

    async fn create_webhook(
        &self,
        repo: &RepoRef,
        url: &str,
        secret: &str,
    ) -> Result<(), ProviderError> {
        self.api
            .post_unit(
                &Self::project_path(repo, "hooks"),
                &NewHook {
                    url,
                    token: secret,
                    push_events: true,
                    merge_requests_events: true,
                    note_events: true,
                    tag_push_events: true,
                    enable_ssl_verification: true,
                },
            )
            .await
    }

    async fn delete_webhook(&self, repo: &RepoRef, id: &str) -> Result<(), ProviderError> {
        if self
            .api
            .delete(&Self::project_path(repo, &format!("hooks/{}", id)))
            .await?
        {
            Ok(())
        } else {
            Err(ProviderError::NotFound(format!("webhook {}", id)))
        }
    }

    async fn is_public(&self, repo: &RepoRef) -> Result<bool, ProviderError> {
        self.api.anonymous_visibility(&Self::project(repo)).await
    }

    fn browse_at_sha_url(&self, repo: &RepoRef, sha: &str) -> String {
        format!("{}/-/tree/{}", repo.web_url(), sha)
    }
}

#[derive(Deserialize)]
struct GitLabProject {
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct GitLabBranch {
    commit: GitLabCommitRef,
}

#[derive(Deserialize)]
struct GitLabCommitRef {
    id: String,
}

#[derive(Deserialize)]
struct GitLabCommit {
    id: String,
    #[serde(default)]
    parent_ids: Vec<String>,
}

#[derive(Deserialize)]
struct GitLabMergeRequest {
    iid: i64,
    web_url: String,
    title: String,
    created_at: Option<DateTime<Utc>>,
    source_branch: String,
    target_branch: String,
    source_project_id: Option<i64>,
    target_project_id: Option<i64>,
}

impl From<GitLabMergeRequest> for OpenMergeRequest {
    fn from(mr: GitLabMergeRequest) -> Self {
        let same_repository =
            mr.source_project_id.is_some() && mr.source_project_id == mr.target_project_id;
        OpenMergeRequest {
            merge_request: MergeRequest {
                id: mr.iid,
                created_at: mr.created_at,
                web_url: mr.web_url,
                title: mr.title,
            },
            source_branch: mr.source_branch,
            target_branch: mr.target_branch,
            same_repository,
        }
    }
}

#[derive(Deserialize)]
struct GitLabHook {
    id: i64,
    url: String,
}

#[derive(Serialize, Debug, PartialEq)]
struct CommitAction<'a> {
    action: &'static str,
    file_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<&'static str>,
}

impl<'a> From<&'a FileChange> for CommitAction<'a> {
    fn from(change: &'a FileChange) -> Self {
        let action = match change {
            FileChange::Create { .. } => "create",
            FileChange::Update { .. } => "update",
            FileChange::Delete { .. } => "delete",
        };
        let content = change
            .content()
            .map(|c| base64::engine::general_purpose::STANDARD.encode(c));
        CommitAction {
            action,
            file_path: change.path(),
            encoding: content.as_ref().map(|_| "base64"),
            content,
        }
    }
}

#[derive(Serialize)]
struct NewCommit<'a> {
    branch: &'a str,
    commit_message: &'a str,
    start_sha: &'a str,
    actions: Vec<CommitAction<'a>>,
    author_name: &'a str,
    author_email: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct NewMergeRequest<'a> {
    source_branch: &'a str,
    target_branch: &'a str,
    title: &'a str,
    description: &'a str,
    remove_source_branch: bool,
}

#[derive(Serialize)]
struct NewHook<'a> {
    url: &'a str,
    token: &'a str,
    push_events: bool,
    merge_requests_events: bool,
    note_events: bool,
    tag_push_events: bool,
    enable_ssl_verification: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    fn host() -> GitLabHost {
        GitLabHost::new(
            Client::new(),
            DEFAULT_API_BASE,
            Arc::new(StaticToken::new("gitlab.com", "glpat-secret")),
        )
    }

    #[test]
    fn nested_group_project_path_is_encoded() {
        let repo = RepoRef::parse("https://gitlab.com/group/sub/project").unwrap();
        assert_eq!(GitLabHost::project(&repo), "projects/group%2Fsub%2Fproject");
    }

    #[test]
    fn browse_url_uses_dash_tree() {
        let repo = RepoRef::parse("https://gitlab.com/group/project.git").unwrap();
        assert_eq!(
            host().browse_at_sha_url(&repo, "deadbeef"),
            "https://gitlab.com/group/project/-/tree/deadbeef"
        );
    }

    #[test]
    fn commit_actions_map_change_kinds() {
        let create = FileChange::Create {
            path: ".tekton/push.yaml".into(),
            content: b"kind: PipelineRun".to_vec(),
        };
        let delete = FileChange::Delete {
            path: ".tekton/old.yaml".into(),
        };

        let action = CommitAction::from(&create);
        assert_eq!(action.action, "create");
        assert_eq!(action.encoding, Some("base64"));
        assert_eq!(action.content.as_deref(), Some("a2luZDogUGlwZWxpbmVSdW4="));

        let json = serde_json::to_value(CommitAction::from(&delete)).unwrap();
        assert_eq!(json["action"], "delete");
        assert!(json.get("content").is_none());
        assert!(json.get("encoding").is_none());
    }

    #[test]
    fn debug_does_not_expose_token() {
        assert!(!format!("{:?}", host()).contains("glpat-secret"));
    }
}
