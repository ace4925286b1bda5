//! GitHub provider implementation

use crate::error::{Error, ErrorKind, Result};
use crate::platform::Provider;
use crate::types::{
    BranchRef, Check, CheckConclusion, CheckStatus, CiState, ListOptions, MergeMethod,
    MergeOptions, MergeOutcome, PrState, PrStatus, ProviderKind, PullRequest, RateLimit,
    Repository, Visibility,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// GitHub service using octocrab
///
/// Pull request and repository calls go through octocrab; commit statuses,
/// check runs and the rate-limit endpoint are queried with raw requests.
pub struct GitHubProvider {
    name: String,
    client: Octocrab,
    /// Token for raw HTTP requests
    token: String,
    /// HTTP client for raw requests
    http_client: Client,
    /// API base for raw requests, e.g. `https://api.github.com`
    api_base: String,
}

#[derive(Deserialize)]
struct CombinedStatus {
    state: String,
    total_count: u32,
    #[serde(default)]
    statuses: Vec<CommitStatus>,
}

#[derive(Deserialize)]
struct CommitStatus {
    context: String,
    state: String,
    description: Option<String>,
}

#[derive(Deserialize)]
struct CheckRunsResponse {
    check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct CheckRun {
    name: String,
    status: String,
    conclusion: Option<String>,
}

#[derive(Deserialize)]
struct RateLimitResponse {
    rate: RateWindow,
}

#[derive(Deserialize)]
struct RateWindow {
    limit: u64,
    remaining: u64,
    reset: i64,
}

impl GitHubProvider {
    /// Create a provider for github.com or a GitHub Enterprise host
    pub fn new(name: impl Into<String>, token: &str, host: Option<&str>) -> Result<Self> {
        let api_base = host.map_or_else(
            || "https://api.github.com".to_string(),
            |h| format!("https://{h}/api/v3"),
        );
        Self::with_base_url(name, token, &api_base)
    }

    /// Create a provider against an explicit API base URL
    pub fn with_base_url(name: impl Into<String>, token: &str, api_base: &str) -> Result<Self> {
        let name = name.into();
        let api_base = api_base.trim_end_matches('/').to_string();

        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .base_uri(api_base.as_str())
            .map_err(|e| Error::provider(&name, ErrorKind::Validation, e.to_string()))?
            .build()
            .map_err(|e| Error::provider(&name, ErrorKind::Unknown, e.to_string()))?;

        let http_client = Client::builder()
            .user_agent("pr-herd")
            .build()
            .map_err(|e| {
                Error::provider(&name, ErrorKind::Unknown, format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            name,
            client,
            token: token.to_string(),
            http_client,
            api_base,
        })
    }

    /// GET a raw API path and decode the JSON response
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                &self.name,
                ErrorKind::from_response(status.as_u16(), &body),
                format!("GET {path} returned {status}: {body}"),
            ));
        }

        Ok(response.json().await?)
    }
}

fn repo_from_octocrab(provider: &str, repo: &octocrab::models::Repository) -> Repository {
    let visibility = match repo.visibility.as_deref() {
        Some("internal") => Visibility::Internal,
        Some("private") => Visibility::Private,
        Some(_) => Visibility::Public,
        None if repo.private == Some(true) => Visibility::Private,
        None => Visibility::Public,
    };

    Repository {
        owner: repo
            .owner
            .as_ref()
            .map(|o| o.login.clone())
            .unwrap_or_default(),
        name: repo.name.clone(),
        default_branch: repo
            .default_branch
            .clone()
            .unwrap_or_else(|| "main".to_string()),
        visibility,
        provider: provider.to_string(),
        html_url: repo
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
    }
}

/// Helper to convert octocrab PR to our `PullRequest` type
fn pr_from_octocrab(pr: &octocrab::models::pulls::PullRequest) -> PullRequest {
    // Determine PR state from GitHub's state field and merged_at
    let state = match pr.state {
        Some(octocrab::models::IssueState::Open) => PrState::Open,
        Some(octocrab::models::IssueState::Closed) if pr.merged_at.is_some() => PrState::Merged,
        // IssueState is non-exhaustive, so use wildcard for Closed and any future variants
        Some(_) | None => PrState::Closed,
    };
    let created_at = pr.created_at.unwrap_or_else(Utc::now);

    PullRequest {
        number: pr.number,
        title: pr.title.clone().unwrap_or_default(),
        body: pr.body.clone(),
        state,
        is_draft: pr.draft.unwrap_or(false),
        mergeable: pr.mergeable,
        head: BranchRef {
            name: pr.head.ref_field.clone(),
            sha: pr.head.sha.clone(),
        },
        base: BranchRef {
            name: pr.base.ref_field.clone(),
            sha: pr.base.sha.clone(),
        },
        author: pr
            .user
            .as_ref()
            .map(|u| u.login.clone())
            .unwrap_or_default(),
        labels: pr
            .labels
            .as_ref()
            .map(|labels| labels.iter().map(|l| l.name.clone()).collect())
            .unwrap_or_default(),
        html_url: pr
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        created_at,
        updated_at: pr.updated_at.unwrap_or(created_at),
    }
}

fn ci_state(state: &str) -> CiState {
    match state {
        "success" => CiState::Success,
        "pending" => CiState::Pending,
        "failure" => CiState::Failure,
        _ => CiState::Error,
    }
}

fn status_from_combined(combined: &CombinedStatus) -> PrStatus {
    // No statuses configured = passing
    if combined.total_count == 0 {
        return PrStatus {
            state: CiState::Success,
            description: "no commit statuses".to_string(),
        };
    }

    let state = ci_state(&combined.state);
    let description = combined
        .statuses
        .iter()
        .find(|s| s.state != "success")
        .map_or_else(
            || format!("{} status(es) reported", combined.total_count),
            |s| match s.description.as_deref() {
                Some(d) if !d.is_empty() => format!("{}: {d}", s.context),
                _ => format!("{}: {}", s.context, s.state),
            },
        );

    PrStatus { state, description }
}

fn check_from_run(run: CheckRun) -> Check {
    let status = match run.status.as_str() {
        "completed" => CheckStatus::Completed,
        "in_progress" => CheckStatus::InProgress,
        _ => CheckStatus::Queued,
    };
    let conclusion = run.conclusion.as_deref().map(|c| match c {
        "success" => CheckConclusion::Success,
        "neutral" => CheckConclusion::Neutral,
        "skipped" => CheckConclusion::Skipped,
        "cancelled" => CheckConclusion::Cancelled,
        "timed_out" => CheckConclusion::TimedOut,
        "action_required" => CheckConclusion::ActionRequired,
        "stale" => CheckConclusion::Stale,
        _ => CheckConclusion::Failure,
    });

    Check {
        name: run.name,
        status,
        conclusion,
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn authenticate(&self) -> Result<()> {
        debug!(provider = %self.name, "authenticating");
        let user = self.client.current().user().await?;
        debug!(provider = %self.name, login = %user.login, "authenticated");
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        debug!(provider = %self.name, "listing repositories");
        let page = self
            .client
            .current()
            .list_repos_for_authenticated_user()
            .per_page(100)
            .send()
            .await?;
        let repos = self.client.all_pages(page).await?;

        let result: Vec<Repository> = repos
            .iter()
            .map(|r| repo_from_octocrab(&self.name, r))
            .collect();
        debug!(provider = %self.name, count = result.len(), "listed repositories");
        Ok(result)
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        debug!(owner, name, "getting repository");
        let repo = self.client.repos(owner, name).get().await?;
        Ok(repo_from_octocrab(&self.name, &repo))
    }

    async fn list_pull_requests(
        &self,
        repo: &Repository,
        options: &ListOptions,
    ) -> Result<Vec<PullRequest>> {
        debug!(repo = %repo.full_name(), state = %options.state, "listing PRs");
        let state = match options.state {
            PrState::Open => octocrab::params::State::Open,
            PrState::Closed | PrState::Merged => octocrab::params::State::Closed,
        };

        let page = self
            .client
            .pulls(&repo.owner, &repo.name)
            .list()
            .state(state)
            .per_page(options.per_page)
            .send()
            .await?;
        let prs = self.client.all_pages(page).await?;

        let result: Vec<PullRequest> = prs
            .iter()
            .map(pr_from_octocrab)
            .filter(|pr| pr.state == options.state)
            .collect();
        debug!(repo = %repo.full_name(), count = result.len(), "listed PRs");
        Ok(result)
    }

    async fn get_pull_request(&self, repo: &Repository, number: u64) -> Result<PullRequest> {
        debug!(repo = %repo.full_name(), pr_number = number, "getting PR");
        let pr = self
            .client
            .pulls(&repo.owner, &repo.name)
            .get(number)
            .await?;

        let result = pr_from_octocrab(&pr);
        debug!(pr_number = number, state = %result.state, "got PR");
        Ok(result)
    }

    async fn merge_pull_request(
        &self,
        repo: &Repository,
        pr: &PullRequest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome> {
        debug!(repo = %repo.full_name(), pr_number = pr.number, method = %options.method, "merging PR");

        let octocrab_method = match options.method {
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
            MergeMethod::Rebase => octocrab::params::pulls::MergeMethod::Rebase,
        };

        let pulls = self.client.pulls(&repo.owner, &repo.name);
        let mut builder = pulls.merge(pr.number).method(octocrab_method);

        // Rebase keeps the original commits, so there is no message to set
        if options.method != MergeMethod::Rebase {
            builder = builder.title(options.commit_title.clone());
            if let Some(ref message) = options.commit_message {
                builder = builder.message(message.clone());
            }
        }
        if let Some(ref sha) = options.sha {
            builder = builder.sha(sha.clone());
        }

        let result = builder.send().await?;

        let outcome = MergeOutcome {
            merged: result.merged,
            sha: result.sha,
            message: result.message,
        };

        debug!(
            pr_number = pr.number,
            merged = outcome.merged,
            sha = ?outcome.sha,
            "merge complete"
        );
        Ok(outcome)
    }

    async fn get_pr_status(&self, repo: &Repository, pr: &PullRequest) -> Result<PrStatus> {
        let path = format!(
            "/repos/{}/{}/commits/{}/status",
            repo.owner, repo.name, pr.head.sha
        );
        let combined: CombinedStatus = self.get_json(&path).await?;

        let status = status_from_combined(&combined);
        debug!(pr_number = pr.number, state = %status.state, count = combined.total_count, "commit status");
        Ok(status)
    }

    async fn get_checks(&self, repo: &Repository, pr: &PullRequest) -> Result<Vec<Check>> {
        let path = format!(
            "/repos/{}/{}/commits/{}/check-runs?per_page=100",
            repo.owner, repo.name, pr.head.sha
        );
        let response: CheckRunsResponse = self.get_json(&path).await?;

        let checks: Vec<Check> = response.check_runs.into_iter().map(check_from_run).collect();
        debug!(pr_number = pr.number, count = checks.len(), "check runs");
        Ok(checks)
    }

    async fn get_rate_limit(&self) -> Result<RateLimit> {
        let response: RateLimitResponse = self.get_json("/rate_limit").await?;
        Ok(RateLimit {
            limit: response.rate.limit,
            remaining: response.rate.remaining,
            reset_at: DateTime::from_timestamp(response.rate.reset, 0),
        })
    }
}
