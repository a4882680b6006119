//! pac-forge - provider-agnostic git hosting access for Pipelines as Code
//!
//! pac-forge lets a controller manage Pipelines as Code configuration on any
//! supported git hosting service through one interface: propose
//! configuration files through a merge request (idempotently), propose
//! their removal, manage the delivery webhook, and inspect repositories.
//!
//! # Architecture
//!
//! - [`forge`] - Capability interface, core reconciliation logic and the
//!   GitHub, GitLab and Bitbucket adapters
//! - [`auth`] - Credential supply (opaque bearer tokens per host)
//! - [`config`] - Configuration loading and validation
//! - [`cancel`] - Cancellation and deadlines for provider operations
//!
//! # Guarantees
//!
//! 1. Ensure and remove are idempotent: repeated calls converge on one
//!    merge request per logical branch and base
//! 2. A call that needs no change performs no write
//! 3. No provider state is cached between calls
//! 4. Credentials never appear in logs or error messages

pub mod auth;
pub mod cancel;
pub mod config;
pub mod forge;
