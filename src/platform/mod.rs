//! Hosting service providers
//!
//! Provides a unified interface for PR/MR operations across platforms. The
//! orchestration core only ever talks to [`Provider`]; adapters translate
//! each service's API into the types in [`crate::types`].

mod factory;
mod github;
mod gitlab;

pub use factory::create_provider;
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;

use crate::error::Result;
use crate::types::{
    Check, ListOptions, MergeOptions, MergeOutcome, PrStatus, ProviderKind, PullRequest,
    RateLimit, Repository,
};
use async_trait::async_trait;

/// Capability set every hosting service implements
///
/// Errors are classified (see [`crate::error::ErrorKind`]) so callers can
/// decide whether a retry makes sense.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured name of this provider instance (rate-limit key)
    fn name(&self) -> &str;

    /// Which hosting service this is
    fn kind(&self) -> ProviderKind;

    /// Verify the credentials work
    async fn authenticate(&self) -> Result<()>;

    /// Repositories visible to the authenticated user
    async fn list_repositories(&self) -> Result<Vec<Repository>>;

    /// Fetch a single repository
    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository>;

    /// List PRs in a repository
    async fn list_pull_requests(
        &self,
        repo: &Repository,
        options: &ListOptions,
    ) -> Result<Vec<PullRequest>>;

    /// Fetch a single PR
    async fn get_pull_request(&self, repo: &Repository, number: u64) -> Result<PullRequest>;

    /// Merge a PR
    ///
    /// The commit title/message in `options` are already synthesized for the
    /// merge method; adapters pass them through where the API allows.
    async fn merge_pull_request(
        &self,
        repo: &Repository,
        pr: &PullRequest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome>;

    /// Combined CI status of the PR's head commit
    async fn get_pr_status(&self, repo: &Repository, pr: &PullRequest) -> Result<PrStatus>;

    /// Individual CI checks of the PR's head commit
    async fn get_checks(&self, repo: &Repository, pr: &PullRequest) -> Result<Vec<Check>>;

    /// Remaining API budget
    async fn get_rate_limit(&self) -> Result<RateLimit>;
}
