//! forge::bitbucket
//!
//! Bitbucket Cloud host adapter over the 2.0 API.
//!
//! Commits use the multipart `src` endpoint: each written file is a form
//! field named by its path, each deleted path is a `files` field, and
//! `parents` pins the parent commit. The endpoint cannot move an existing
//! branch to a commit that does not descend from its head, so a stale
//! proposal branch is deleted first and recreated by the commit.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::ProviderError;
use super::http::{page_cap_exceeded, HttpApi};
use super::traits::{
    CommitRequest, CreateMergeRequest, FileChange, MergeRequest, OpenMergeRequest, RepoHost,
    Webhook,
};
use super::url::{encode_path, RepoRef};
use crate::auth::TokenProvider;

/// Bitbucket Cloud API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.bitbucket.org/2.0";

const WEBHOOK_EVENTS: &[&str] = &[
    "repo:push",
    "pullrequest:created",
    "pullrequest:updated",
    "pullrequest:comment_created",
];

/// Upper bound on `next` links followed for one listing.
const MAX_PAGES: usize = 20;

/// Bitbucket Cloud implementation of [`RepoHost`].
#[derive(Debug, Clone)]
pub struct BitbucketHost {
    api: HttpApi,
}

impl BitbucketHost {
    pub fn new(client: Client, api_base: &str, token: Arc<dyn TokenProvider>) -> Self {
        Self {
            api: HttpApi::new(client, api_base, token, "bitbucket"),
        }
    }

    pub fn api_base(&self) -> &str {
        self.api.api_base()
    }

    fn repo_path(repo: &RepoRef, path: &str) -> String {
        format!("repositories/{}/{}", repo.full_name(), path)
    }

    /// Follow `next` links until the listing is exhausted.
    async fn get_all<T: DeserializeOwned>(&self, first: String) -> Result<Vec<T>, ProviderError> {
        let mut all = Vec::new();
        let mut url = first;
        for _ in 0..MAX_PAGES {
            let page: Page<T> = self.api.get_json(&url).await?;
            all.extend(page.values);
            match page.next {
                Some(next) => url = next,
                None => return Ok(all),
            }
        }
        Err(page_cap_exceeded("bitbucket", &url, MAX_PAGES))
    }
}

/// Multipart body for the `src` commit endpoint.
fn commit_form(request: &CommitRequest<'_>) -> Form {
    let mut form = Form::new()
        .text("message", request.message.to_string())
        .text(
            "author",
            format!("{} <{}>", request.author.name, request.author.email),
        )
        .text("branch", request.branch.to_string())
        .text("parents", request.parent_sha.to_string());

    for change in request.changes {
        form = match change {
            FileChange::Create { path, content } | FileChange::Update { path, content } => form
                .part(
                    path.clone(),
                    Part::bytes(content.clone()).file_name(path.clone()),
                ),
            FileChange::Delete { path } => form.text("files", path.clone()),
        };
    }
    form
}

#[async_trait]
impl RepoHost for BitbucketHost {
    fn name(&self) -> &'static str {
        "bitbucket"
    }

    async fn default_branch(&self, repo: &RepoRef) -> Result<String, ProviderError> {
        let info: BitbucketRepo = self
            .api
            .get_json(&format!("repositories/{}", repo.full_name()))
            .await?;
        info.mainbranch.map(|b| b.name).ok_or_else(|| {
            ProviderError::NotFound(format!("repository '{}' has no main branch", repo))
        })
    }

    async fn branch_sha(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>, ProviderError> {
        let found: Option<BitbucketBranch> = self
            .api
            .get_json_opt(&Self::repo_path(
                repo,
                &format!("refs/branches/{}", urlencoding::encode(branch)),
            ))
            .await?;
        Ok(found.map(|b| b.target.hash))
    }

    async fn read_file(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        let endpoint = Self::repo_path(
            repo,
            &format!("src/{}/{}", urlencoding::encode(git_ref), encode_path(path)),
        );
        self.api.get_bytes_opt(&endpoint, None).await
    }

    async fn commit_parents(&self, repo: &RepoRef, sha: &str) -> Result<Vec<String>, ProviderError> {
        let commit: BitbucketCommit = self
            .api
            .get_json(&Self::repo_path(repo, &format!("commit/{}", sha)))
            .await?;
        Ok(commit.parents.into_iter().map(|p| p.hash).collect())
    }

    async fn commit_files(
        &self,
        repo: &RepoRef,
        request: CommitRequest<'_>,
    ) -> Result<String, ProviderError> {
        if self.delete_branch(repo, request.branch).await? {
            debug!(repo = %repo, branch = request.branch, "deleted branch before recommit");
        }

        self.api
            .post_multipart(&Self::repo_path(repo, "src"), commit_form(&request))
            .await?;

        // The src endpoint answers 201 without a body; read the new head back.
        let sha = self.branch_sha(repo, request.branch).await?.ok_or_else(|| {
            ProviderError::Unknown(format!(
                "branch '{}' missing right after commit",
                request.branch
            ))
        })?;
        debug!(repo = %repo, branch = request.branch, sha = %sha, "pushed commit");
        Ok(sha)
    }

    async fn delete_branch(&self, repo: &RepoRef, branch: &str) -> Result<bool, ProviderError> {
        self.api
            .delete(&Self::repo_path(
                repo,
                &format!("refs/branches/{}", urlencoding::encode(branch)),
            ))
            .await
    }

    async fn list_open_merge_requests(
        &self,
        repo: &RepoRef,
        target_branch: &str,
    ) -> Result<Vec<OpenMergeRequest>, ProviderError> {
        let query = format!("state=\"OPEN\" AND destination.branch.name=\"{}\"", target_branch);
        let first = self.api.url(&Self::repo_path(
            repo,
            &format!("pullrequests?q={}&pagelen=50", urlencoding::encode(&query)),
        ));
        let prs: Vec<BitbucketPullRequest> = self.get_all(first).await?;
        Ok(prs.into_iter().map(|pr| pr.into_open(repo)).collect())
    }

    async fn create_merge_request(
        &self,
        repo: &RepoRef,
        request: CreateMergeRequest<'_>,
    ) -> Result<MergeRequest, ProviderError> {
        let pr: BitbucketPullRequest = self
            .api
            .post_json(
                &Self::repo_path(repo, "pullrequests"),
                &NewPullRequest {
                    title: request.title,
                    description: request.body,
                    source: NewEndpoint {
                        branch: NewBranchName {
                            name: request.source_branch,
                        },
                    },
                    destination: NewEndpoint {
                        branch: NewBranchName {
                            name: request.target_branch,
                        },
                    },
                    close_source_branch: true,
                },
            )
            .await?;
        Ok(pr.into_open(repo).merge_request)
    }

    async fn list_webhooks(&self, repo: &RepoRef) -> Result<Vec<Webhook>, ProviderError> {
        let first = self.api.url(&Self::repo_path(repo, "hooks?pagelen=100"));
        let hooks: Vec<BitbucketHook> = self.get_all(first).await?;
        Ok(hooks
            .into_iter()
            .map(|h| Webhook {
                id: h.uuid,
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
                &Self::repo_path(repo, "hooks"),
                &NewHook {
                    description: "Pipelines as Code",
                    url,
                    active: true,
                    secret,
                    events: WEBHOOK_EVENTS,
                },
            )
            .await
    }

    async fn delete_webhook(&self, repo: &RepoRef, id: &str) -> Result<(), ProviderError> {
        let path = Self::repo_path(repo, &format!("hooks/{}", urlencoding::encode(id)));
        if self.api.delete(&path).await? {
            Ok(())
        } else {
            Err(ProviderError::NotFound(format!("webhook {}", id)))
        }
    }

    async fn is_public(&self, repo: &RepoRef) -> Result<bool, ProviderError> {
        self
            .api
            .anonymous_visibility(&format!("repositories/{}", repo.full_name()))
            .await
    }

    fn browse_at_sha_url(&self, repo: &RepoRef, sha: &str) -> String {
        format!("{}/src/{}", repo.web_url(), sha)
    }
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct BitbucketRepo {
    mainbranch: Option<BitbucketBranchName>,
}

#[derive(Deserialize)]
struct BitbucketBranchName {
    name: String,
}

#[derive(Deserialize)]
struct BitbucketBranch {
    target: BitbucketHash,
}

#[derive(Deserialize)]
struct BitbucketHash {
    hash: String,
}

#[derive(Deserialize)]
struct BitbucketCommit {
    #[serde(default)]
    parents: Vec<BitbucketHash>,
}

#[derive(Deserialize)]
struct BitbucketPullRequest {
    id: i64,
    title: String,
    created_on: Option<DateTime<Utc>>,
    links: BitbucketLinks,
    source: BitbucketEndpoint,
    destination: BitbucketEndpoint,
}

#[derive(Deserialize)]
struct BitbucketLinks {
    html: BitbucketHref,
}

#[derive(Deserialize)]
struct BitbucketHref {
    href: String,
}

#[derive(Deserialize)]
struct BitbucketEndpoint {
    branch: BitbucketBranchName,
    repository: Option<BitbucketRepoName>,
}

#[derive(Deserialize)]
struct BitbucketRepoName {
    full_name: String,
}

impl BitbucketPullRequest {
    fn into_open(self, repo: &RepoRef) -> OpenMergeRequest {
        let same_repository = self
            .source
            .repository
            .as_ref()
            .is_some_and(|r| r.full_name.eq_ignore_ascii_case(&repo.full_name()));
        OpenMergeRequest {
            merge_request: MergeRequest {
                id: self.id,
                created_at: self.created_on,
                web_url: self.links.html.href,
                title: self.title,
            },
            source_branch: self.source.branch.name,
            target_branch: self.destination.branch.name,
            same_repository,
        }
    }
}

#[derive(Deserialize)]
struct BitbucketHook {
    uuid: String,
    url: String,
}

#[derive(Serialize)]
struct NewPullRequest<'a> {
    title: &'a str,
    description: &'a str,
    source: NewEndpoint<'a>,
    destination: NewEndpoint<'a>,
    close_source_branch: bool,
}

#[derive(Serialize)]
struct NewEndpoint<'a> {
    branch: NewBranchName<'a>,
}

#[derive(Serialize)]
struct NewBranchName<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct NewHook<'a> {
    description: &'static str,
    url: &'a str,
    active: bool,
    secret: &'a str,
    events: &'static [&'static str],
}
