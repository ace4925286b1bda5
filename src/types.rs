//! Core types for pr-herd
//!
//! Everything here is a per-run snapshot normalized from a hosting service.
//! Nothing is cached between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hosting service type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// GitHub or GitHub Enterprise
    GitHub,
    /// GitLab or self-hosted GitLab
    GitLab,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitHub => write!(f, "GitHub"),
            Self::GitLab => write!(f, "GitLab"),
        }
    }
}

/// Repository visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to everyone
    Public,
    /// Visible to members only
    Private,
    /// Visible to the organization/instance
    Internal,
}

/// A repository (GitHub repo / GitLab project)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Owner (user, organization or group path)
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Default branch (e.g. "main")
    pub default_branch: String,
    /// Visibility
    pub visibility: Visibility,
    /// Name of the provider this repository was fetched from
    pub provider: String,
    /// Web URL
    pub html_url: String,
}

impl Repository {
    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// PR state (open, closed, merged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    /// PR is open and can be merged
    Open,
    /// PR was closed without merging
    Closed,
    /// PR was merged
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// A branch reference on one side of a PR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    /// Branch name
    pub name: String,
    /// Commit SHA the branch points at
    pub sha: String,
}

/// A pull request / merge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number (GitLab: MR iid)
    pub number: u64,
    /// PR/MR title
    pub title: String,
    /// PR/MR body/description
    pub body: Option<String>,
    /// Current state
    pub state: PrState,
    /// Whether PR is a draft
    pub is_draft: bool,
    /// Whether PR can be merged
    /// - `Some(true)` = mergeable
    /// - `Some(false)` = has conflicts
    /// - `None` = unknown (still computing)
    pub mergeable: Option<bool>,
    /// Head (source) branch
    pub head: BranchRef,
    /// Base (target) branch
    pub base: BranchRef,
    /// Author login
    pub author: String,
    /// Label names
    pub labels: Vec<String>,
    /// Web URL for the PR/MR
    pub html_url: String,
    /// When the PR was opened
    pub created_at: DateTime<Utc>,
    /// When the PR was last updated
    pub updated_at: DateTime<Utc>,
}

/// Aggregate CI state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiState {
    /// Everything passed
    Success,
    /// Something failed
    Failure,
    /// Still running
    Pending,
    /// CI errored out
    Error,
}

impl std::fmt::Display for CiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Pending => write!(f, "pending"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Combined status for a PR's head commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrStatus {
    /// Aggregate state
    pub state: CiState,
    /// Human-readable description of the aggregate state
    pub description: String,
}

impl PrStatus {
    /// Whether the aggregate state is success
    pub fn is_success(&self) -> bool {
        self.state == CiState::Success
    }
}

/// Lifecycle of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Waiting to start
    Queued,
    /// Running
    InProgress,
    /// Finished
    Completed,
}

/// Outcome of a completed check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    /// Passed
    Success,
    /// Neither passed nor failed
    Neutral,
    /// Not run
    Skipped,
    /// Failed
    Failure,
    /// Cancelled before finishing
    Cancelled,
    /// Ran too long
    TimedOut,
    /// Needs manual action
    ActionRequired,
    /// Superseded
    Stale,
}

impl CheckConclusion {
    /// Conclusions that count as passing
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Neutral | Self::Skipped)
    }

    /// Conclusions that count as failing
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Failure | Self::Cancelled | Self::TimedOut | Self::ActionRequired
        )
    }
}

/// A single named CI check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// Check name
    pub name: String,
    /// Lifecycle status
    pub status: CheckStatus,
    /// Conclusion (only for completed checks)
    pub conclusion: Option<CheckConclusion>,
}

impl Check {
    /// Whether the check is finished
    pub fn is_completed(&self) -> bool {
        self.status == CheckStatus::Completed
    }

    /// Completed with a passing conclusion
    pub fn is_success(&self) -> bool {
        self.is_completed() && self.conclusion.is_some_and(CheckConclusion::is_success)
    }

    /// Completed with a failing conclusion
    ///
    /// A completed check without a conclusion counts as failed.
    pub fn is_failure(&self) -> bool {
        self.is_completed() && self.conclusion.is_none_or(CheckConclusion::is_failure)
    }
}

/// Remaining request budget reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests allowed per window
    pub limit: u64,
    /// Requests remaining in the current window
    pub remaining: u64,
    /// When the window resets
    pub reset_at: Option<DateTime<Utc>>,
}

/// Merge strategy/method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    /// Squash all commits into one
    #[default]
    Squash,
    /// Create a merge commit
    Merge,
    /// Rebase commits onto base branch
    Rebase,
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

/// Filter for listing pull requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Only PRs in this state
    pub state: PrState,
    /// Page size requested from the provider
    pub per_page: u8,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            state: PrState::Open,
            per_page: 100,
        }
    }
}

/// Parameters for a merge call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Merge strategy
    pub method: MergeMethod,
    /// Commit title (ignored by strategies that keep original commits)
    pub commit_title: String,
    /// Commit message body
    pub commit_message: Option<String>,
    /// Head SHA the merge must apply to
    pub sha: Option<String>,
}

/// Response from a merge call
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Whether the merge was successful
    pub merged: bool,
    /// The SHA of the merge commit (if successful)
    pub sha: Option<String>,
    /// Message from the merge operation (especially on failure)
    pub message: Option<String>,
}
