//! forge
//!
//! Provider-agnostic access to git hosting services (GitHub, GitLab,
//! Bitbucket Cloud) for managing Pipelines as Code configuration.
//!
//! # Architecture
//!
//! The [`GitProvider`] trait is the capability interface callers drive.
//! Callers obtain one from [`ProviderResolver`] rather than importing a
//! specific adapter.
//!
//! Underneath, each provider only implements the narrow [`RepoHost`]
//! primitives. [`ProviderClient`] turns any `RepoHost` into a
//! `GitProvider` by routing calls through three provider-independent
//! components:
//!
//! - [`Reconciler`]: idempotent ensure/remove/find of the configuration
//!   merge request
//! - [`Introspector`]: read-only repository probes
//! - [`WebhookManager`]: idempotent webhook create/delete
//!
//! Failures from every provider are normalized into [`ProviderError`] by
//! the classifier in `errors`.
//!
//! # Modules
//!
//! - `traits`: `GitProvider`, `RepoHost` and the data types
//! - `errors`: error taxonomy and classifier
//! - `url`: repository URL parsing
//! - `reconcile`, `introspect`, `webhook`: the core components
//! - `client`: capability dispatch and per-repository locks
//! - `factory`: provider detection and resolution
//! - [`github`], [`gitlab`], [`bitbucket`]: REST adapters
//! - [`mock`]: in-memory host for deterministic testing
//!
//! # Example
//!
//! ```ignore
//! use pac_forge::forge::{MergeRequestData, ProviderResolver, RepositoryFile};
//!
//! let provider = resolver.resolve("https://github.com/owner/repo")?;
//! let outcome = provider
//!     .ensure_config_merge_request("https://github.com/owner/repo", &MergeRequestData {
//!         branch_name: "pac-config".into(),
//!         title: "Configure Pipelines as Code".into(),
//!         files: vec![RepositoryFile::new(".tekton/push.yaml", pipeline_run)],
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! match outcome.web_url() {
//!     Some(url) => println!("proposal: {}", url),
//!     None => println!("already configured"),
//! }
//! ```

pub mod bitbucket;
mod client;
mod errors;
mod factory;
pub mod github;
pub mod gitlab;
mod http;
mod introspect;
pub mod mock;
mod reconcile;
mod traits;
mod url;
mod webhook;

pub use client::{ProviderClient, RepoLocks};
pub use errors::{classify_status, classify_transport, retry_after, ErrorKind, ProviderError};
pub use factory::{detect_provider, ProviderKind, ProviderResolver};
pub use introspect::Introspector;
pub use reconcile::{proposal_branch_name, Reconciler};
pub use traits::*;
pub use url::RepoRef;
pub use webhook::{same_target, WebhookManager};
