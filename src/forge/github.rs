//! forge::github
//!
//! GitHub host adapter over the REST v3 API.
//!
//! # Design
//!
//! Commits are built with the git data API so that any number of file
//! writes and deletions land in a single commit on an explicit parent:
//!
//! 1. read the parent commit for its tree
//! 2. upload one blob per written file
//! 3. create a tree on top of the parent tree (`sha: null` deletes a path)
//! 4. create the commit, then create or force-move the branch ref
//!
//! GitHub Enterprise works by pointing the adapter at
//! `https://<host>/api/v3`.
//!
//! # Apps
//!
//! `app_identity` calls `GET /app`, which only accepts a GitHub App JWT.
//! That credential is separate from the repository token and is supplied
//! with [`GitHubHost::with_app_token`].

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
    AppIdentity, CommitRequest, CreateMergeRequest, MergeRequest, OpenMergeRequest, RepoHost,
    Webhook,
};
use super::url::{encode_path, RepoRef};
use crate::auth::TokenProvider;

/// GitHub.com API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Events the Pipelines as Code receiver consumes.
const WEBHOOK_EVENTS: &[&str] = &["push", "pull_request", "issue_comment", "commit_comment"];

const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

/// GitHub implementation of [`RepoHost`].
#[derive(Debug, Clone)]
pub struct GitHubHost {
    api: HttpApi,
    app_api: Option<HttpApi>,
}

impl GitHubHost {
    /// Create an adapter for the API at `api_base`.
    ///
    /// # Example
    ///
    /// ```
    /// use pac_forge::auth::StaticToken;
    /// use pac_forge::forge::github::{GitHubHost, DEFAULT_API_BASE};
    /// use std::sync::Arc;
    ///
    /// let token = Arc::new(StaticToken::new("github.com", "ghp_example"));
    /// let host = GitHubHost::new(reqwest::Client::new(), DEFAULT_API_BASE, token);
    /// ```
    pub fn new(client: Client, api_base: &str, token: Arc<dyn TokenProvider>) -> Self {
        let api = HttpApi::new(client, api_base, token, "github")
            .with_header("accept", "application/vnd.github+json")
            .with_header("x-github-api-version", "2022-11-28");
        Self { api, app_api: None }
    }

    /// Use `token` (a GitHub App JWT) for app-level endpoints.
    pub fn with_app_token(mut self, token: Arc<dyn TokenProvider>) -> Self {
        self.app_api = Some(self.api.with_token(token));
        self
    }

    pub fn api_base(&self) -> &str {
        self.api.api_base()
    }

    fn repo_path(repo: &RepoRef, path: &str) -> String {
        format!("repos/{}/{}", repo.full_name(), path)
    }
}

#[async_trait]
impl RepoHost for GitHubHost {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn default_branch(&self, repo: &RepoRef) -> Result<String, ProviderError> {
        let info: GitHubRepo = self
            .api
            .get_json(&format!("repos/{}", repo.full_name()))
            .await?;
        Ok(info.default_branch)
    }

    async fn branch_sha(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>, ProviderError> {
        let reference: Option<GitHubRef> = self
            .api
            .get_json_opt(&Self::repo_path(repo, &format!("git/ref/heads/{}", encode_path(branch))))
            .await?;
        Ok(reference.map(|r| r.object.sha))
    }

    async fn read_file(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        let endpoint = Self::repo_path(
            repo,
            &format!(
                "contents/{}?ref={}",
                encode_path(path),
                urlencoding::encode(git_ref)
            ),
        );
        self.api.get_bytes_opt(&endpoint, Some(RAW_MEDIA_TYPE)).await
    }

    async fn commit_parents(&self, repo: &RepoRef, sha: &str) -> Result<Vec<String>, ProviderError> {
        let commit: GitHubCommit = self
            .api
            .get_json(&Self::repo_path(repo, &format!("git/commits/{}", sha)))
            .await?;
        Ok(commit.parents.into_iter().map(|p| p.sha).collect())
    }

    async fn commit_files(
        &self,
        repo: &RepoRef,
        request: CommitRequest<'_>,
    ) -> Result<String, ProviderError> {
        let parent: GitHubCommit = self
            .api
            .get_json(&Self::repo_path(
                repo,
                &format!("git/commits/{}", request.parent_sha),
            ))
            .await?;

        let mut entries = Vec::with_capacity(request.changes.len());
        for change in request.changes {
            let sha = match change.content() {
                Some(content) => {
                    let blob: GitHubSha = self
                        .api
                        .post_json(
                            &Self::repo_path(repo, "git/blobs"),
                            &NewBlob {
                                content: base64::engine::general_purpose::STANDARD.encode(content),
                                encoding: "base64",
                            },
                        )
                        .await?;
                    Some(blob.sha)
                }
                None => None,
            };
            entries.push(TreeEntry {
                path: change.path(),
                mode: "100644",
                kind: "blob",
                sha,
            });
        }

        let tree: GitHubSha = self
            .api
            .post_json(
                &Self::repo_path(repo, "git/trees"),
                &NewTree {
                    base_tree: &parent.tree.sha,
                    tree: entries,
                },
            )
            .await?;

        let commit: GitHubSha = self
            .api
            .post_json(
                &Self::repo_path(repo, "git/commits"),
                &NewCommit {
                    message: request.message,
                    tree: &tree.sha,
                    parents: vec![request.parent_sha],
                    author: NewCommitAuthor {
                        name: &request.author.name,
                        email: &request.author.email,
                    },
                },
            )
            .await?;

        if self.branch_sha(repo, request.branch).await?.is_some() {
            let _: GitHubRef = self
                .api
                .patch_json(
                    &Self::repo_path(repo, &format!("git/refs/heads/{}", encode_path(request.branch))),
                    &UpdateRef {
                        sha: &commit.sha,
                        force: true,
                    },
                )
                .await?;
        } else {
            let _: GitHubRef = self
                .api
                .post_json(
                    &Self::repo_path(repo, "git/refs"),
                    &CreateRef {
                        reference: format!("refs/heads/{}", request.branch),
                        sha: &commit.sha,
                    },
                )
                .await?;
        }

        debug!(repo = %repo, branch = request.branch, sha = %commit.sha, "pushed commit");
        Ok(commit.sha)
    }

    async fn delete_branch(&self, repo: &RepoRef, branch: &str) -> Result<bool, ProviderError> {
        // Deleting a missing ref answers 422, not 404.
        if self.branch_sha(repo, branch).await?.is_none() {
            return Ok(false);
        }
        self.api
            .delete(&Self::repo_path(repo, &format!("git/refs/heads/{}", encode_path(branch))))
            .await
    }

    async fn list_open_merge_requests(
        &self,
        repo: &RepoRef,
        target_branch: &str,
    ) -> Result<Vec<OpenMergeRequest>, ProviderError> {
        let pulls: Vec<GitHubPull> = self
            .api
            .get_paged(&Self::repo_path(
                repo,
                &format!("pulls?state=open&base={}", urlencoding::encode(target_branch)),
            ))
            .await?;
        Ok(pulls.into_iter().map(|pr| pr.into_open(repo)).collect())
    }

    async fn create_merge_request(
        &self,
        repo: &RepoRef,
        request: CreateMergeRequest<'_>,
    ) -> Result<MergeRequest, ProviderError> {
        let pull: GitHubPull = self
            .api
            .post_json(
                &Self::repo_path(repo, "pulls"),
                &NewPull {
                    title: request.title,
                    head: request.source_branch,
                    base: request.target_branch,
                    body: request.body,
                },
            )
            .await?;
        Ok(pull.into_open(repo).merge_request)
    }

    async fn list_webhooks(&self, repo: &RepoRef) -> Result<Vec<Webhook>, ProviderError> {
        let hooks: Vec<GitHubHook> = self.api.get_paged(&Self::repo_path(repo, "hooks")).await?;
        Ok(hooks
            .into_iter()
            .filter_map(|h| {
                h.config.url.map(|url| Webhook {
                    id: h.id.to_string(),
                    url,
                })
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
                &Self::repo_path(repo, "hooks"),
                &NewHook {
                    name: "web",
                    active: true,
                    events: WEBHOOK_EVENTS,
                    config: NewHookConfig {
                        url,
                        content_type: "json",
                        insecure_ssl: "0",
                        secret,
                    },
                },
            )
            .await
    }

    async fn delete_webhook(&self, repo: &RepoRef, id: &str) -> Result<(), ProviderError> {
        if self
            .api
            .delete(&Self::repo_path(repo, &format!("hooks/{}", id)))
            .await?
        {
            Ok(())
        } else {
            Err(ProviderError::NotFound(format!("webhook {}", id)))
        }
    }

    async fn is_public(&self, repo: &RepoRef) -> Result<bool, ProviderError> {
        self
            .api
            .anonymous_visibility(&format!("repos/{}", repo.full_name()))
            .await
    }

    fn browse_at_sha_url(&self, repo: &RepoRef, sha: &str) -> String {
        format!("{}/tree/{}", repo.web_url(), sha)
    }

    async fn app_identity(&self) -> Result<AppIdentity, ProviderError> {
        let app_api = self.app_api.as_ref().ok_or_else(|| {
            ProviderError::Unauthorized("no GitHub App credential configured".into())
        })?;
        let app: GitHubApp = app_api.get_json("app").await?;
        Ok(AppIdentity {
            name: app.name,
            id: app.id.to_string(),
            slug: app.slug,
        })
    }

    async fn app_user_id(&self, user_name: &str) -> Result<i64, ProviderError> {
        let user: GitHubUser = self
            .api
            .get_json(&format!("users/{}", urlencoding::encode(user_name)))
            .await?;
        Ok(user.id)
    }
}

// --------------------------------------------------------------------------
// Wire types
// --------------------------------------------------------------------------

#[derive(Deserialize)]
struct GitHubRepo {
    default_branch: String,
}

#[derive(Deserialize)]
struct GitHubRef {
    object: GitHubSha,
}

#[derive(Deserialize)]
struct GitHubSha {
    sha: String,
}

#[derive(Deserialize)]
struct GitHubCommit {
    tree: GitHubSha,
    #[serde(default)]
    parents: Vec<GitHubSha>,
}

#[derive(Deserialize)]
struct GitHubPull {
    number: i64,
    html_url: String,
    title: String,
    created_at: Option<DateTime<Utc>>,
    head: GitHubBranchRef,
    base: GitHubBranchRef,
}

#[derive(Deserialize)]
struct GitHubBranchRef {
    #[serde(rename = "ref")]
    ref_name: String,
    /// `null` once a fork has been deleted.
    repo: Option<GitHubRepoName>,
}

#[derive(Deserialize)]
struct GitHubRepoName {
    full_name: String,
}

impl GitHubPull {
    fn into_open(self, repo: &RepoRef) -> OpenMergeRequest {
        let same_repository = self
            .head
            .repo
            .as_ref()
            .is_some_and(|r| r.full_name.eq_ignore_ascii_case(&repo.full_name()));
        OpenMergeRequest {
            merge_request: MergeRequest {
                id: self.number,
                created_at: self.created_at,
                web_url: self.html_url,
                title: self.title,
            },
            source_branch: self.head.ref_name,
            target_branch: self.base.ref_name,
            same_repository,
        }
    }
}

#[derive(Deserialize)]
struct GitHubHook {
    id: i64,
    #[serde(default)]
    config: GitHubHookConfig,
}

#[derive(Deserialize, Default)]
struct GitHubHookConfig {
    url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubApp {
    id: i64,
    slug: String,
    name: String,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: i64,
}

#[derive(Serialize)]
struct NewBlob {
    content: String,
    encoding: &'static str,
}

#[derive(Serialize)]
struct TreeEntry<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    /// `None` serializes as `null`, which removes the path.
    sha: Option<String>,
}

#[derive(Serialize)]
struct NewTree<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntry<'a>>,
}

#[derive(Serialize)]
struct NewCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
    author: NewCommitAuthor<'a>,
}

#[derive(Serialize)]
struct NewCommitAuthor<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct UpdateRef<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct CreateRef<'a> {
    #[serde(rename = "ref")]
    reference: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct NewPull<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct NewHook<'a> {
    name: &'static str,
    active: bool,
    events: &'static [&'static str],
    config: NewHookConfig<'a>,
}

#[derive(Serialize)]
struct NewHookConfig<'a> {
    url: &'a str,
    content_type: &'static str,
    insecure_ssl: &'static str,
    secret: &'a str,
}
