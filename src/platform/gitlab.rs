//! GitLab provider implementation

use crate::error::{Error, ErrorKind, Result};
use crate::platform::Provider;
use crate::types::{
    BranchRef, Check, CheckConclusion, CheckStatus, CiState, ListOptions, MergeMethod,
    MergeOptions, MergeOutcome, PrState, PrStatus, ProviderKind, PullRequest, RateLimit,
    Repository, Visibility,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound on pages fetched for one listing
const MAX_PAGES: u32 = 50;

/// GitLab service using reqwest
pub struct GitLabProvider {
    name: String,
    client: Client,
    token: String,
    /// API base, e.g. `https://gitlab.com/api/v4`
    api_base: String,
}

#[derive(Deserialize)]
struct Project {
    path: String,
    namespace: Namespace,
    default_branch: Option<String>,
    #[serde(default)]
    visibility: Option<String>,
    web_url: String,
}

#[derive(Deserialize)]
struct Namespace {
    full_path: String,
}

#[derive(Deserialize)]
struct User {
    username: String,
}

#[derive(Deserialize)]
struct DiffRefs {
    base_sha: Option<String>,
    head_sha: Option<String>,
}

#[derive(Deserialize)]
struct Pipeline {
    id: u64,
    status: String, // "success", "failed", "running", "pending", ...
}

#[derive(Deserialize)]
struct MergeRequest {
    iid: u64,
    title: String,
    description: Option<String>,
    state: String, // "opened", "closed", "merged", "locked"
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    work_in_progress: bool,
    #[serde(default)]
    merge_status: Option<String>, // "can_be_merged", "cannot_be_merged", "checking", ...
    #[serde(default)]
    detailed_merge_status: Option<String>, // "mergeable", "conflict", "need_rebase", "ci_still_running", ...
    #[serde(default)]
    has_conflicts: bool,
    sha: Option<String>,
    diff_refs: Option<DiffRefs>,
    source_branch: String,
    target_branch: String,
    author: Option<User>,
    #[serde(default)]
    labels: Vec<String>,
    web_url: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    head_pipeline: Option<Pipeline>,
}

#[derive(Deserialize)]
struct Job {
    name: String,
    status: String,
    #[serde(default)]
    allow_failure: bool,
}

/// Merge response
#[derive(Deserialize)]
struct MergeResponse {
    state: String,
    merge_commit_sha: Option<String>,
    squash_commit_sha: Option<String>,
}

impl From<MergeRequest> for PullRequest {
    fn from(mr: MergeRequest) -> Self {
        let state = match mr.state.as_str() {
            "opened" => PrState::Open,
            "merged" => PrState::Merged,
            _ => PrState::Closed,
        };
        let mergeable = if mr.has_conflicts {
            Some(false)
        } else {
            mergeable_from(mr.detailed_merge_status.as_deref(), mr.merge_status.as_deref())
        };
        let (head_sha, base_sha) = mr.diff_refs.map_or((None, None), |refs| {
            (refs.head_sha, refs.base_sha)
        });

        Self {
            number: mr.iid,
            title: mr.title,
            body: mr.description,
            state,
            is_draft: mr.draft || mr.work_in_progress,
            mergeable,
            head: BranchRef {
                name: mr.source_branch,
                sha: head_sha.or(mr.sha).unwrap_or_default(),
            },
            base: BranchRef {
                name: mr.target_branch,
                sha: base_sha.unwrap_or_default(),
            },
            author: mr.author.map(|a| a.username).unwrap_or_default(),
            labels: mr.labels,
            html_url: mr.web_url,
            created_at: mr.created_at,
            updated_at: mr.updated_at.unwrap_or(mr.created_at),
        }
    }
}

/// Mergeability from `detailed_merge_status`, falling back to the older `merge_status`
///
/// Detailed states that are not about the branch itself (CI, approvals,
/// discussions) leave the answer to `merge_status`.
fn mergeable_from(detailed: Option<&str>, legacy: Option<&str>) -> Option<bool> {
    match detailed {
        Some("mergeable") => return Some(true),
        Some("conflict" | "need_rebase") => return Some(false),
        Some("checking" | "unchecked" | "preparing") => return None,
        _ => {}
    }
    match legacy {
        Some("can_be_merged") => Some(true),
        Some("cannot_be_merged") => Some(false),
        _ => None,
    }
}

fn pipeline_state(status: &str) -> CiState {
    match status {
        "success" | "skipped" => CiState::Success,
        "failed" => CiState::Failure,
        "canceled" => CiState::Error,
        _ => CiState::Pending,
    }
}

fn check_from_job(job: Job) -> Check {
    let (status, conclusion) = match job.status.as_str() {
        "success" => (CheckStatus::Completed, Some(CheckConclusion::Success)),
        "failed" if job.allow_failure => (CheckStatus::Completed, Some(CheckConclusion::Neutral)),
        "failed" => (CheckStatus::Completed, Some(CheckConclusion::Failure)),
        "canceled" => (CheckStatus::Completed, Some(CheckConclusion::Cancelled)),
        // Manual jobs never run on their own
        "skipped" | "manual" => (CheckStatus::Completed, Some(CheckConclusion::Skipped)),
        "running" => (CheckStatus::InProgress, None),
        _ => (CheckStatus::Queued, None),
    };
    Check {
        name: job.name,
        status,
        conclusion,
    }
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

impl GitLabProvider {
    /// Create a provider for gitlab.com or a self-hosted instance
    pub fn new(name: impl Into<String>, token: String, host: Option<&str>) -> Result<Self> {
        let host = host.unwrap_or("gitlab.com");
        Self::with_base_url(name, token, &format!("https://{host}/api/v4"))
    }

    /// Create a provider against an explicit API base URL
    pub fn with_base_url(name: impl Into<String>, token: String, api_base: &str) -> Result<Self> {
        let name = name.into();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent("pr-herd")
            .build()
            .map_err(|e| {
                Error::provider(&name, ErrorKind::Unknown, format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            name,
            client,
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn project_path(repo: &Repository) -> String {
        urlencoding::encode(&repo.full_name()).into_owned()
    }

    fn mr_path(repo: &Repository, iid: u64) -> String {
        format!(
            "/projects/{}/merge_requests/{}",
            Self::project_path(repo),
            iid
        )
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("PRIVATE-TOKEN", &self.token)
    }

    /// Send a request, turning non-success statuses into classified errors
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let kind = if status.as_u16() == 406 {
            // GitLab answers "not mergeable" with 406
            ErrorKind::Conflict
        } else {
            ErrorKind::from_response(status.as_u16(), &body)
        };
        Err(Error::provider(
            &self.name,
            kind,
            format!("request returned {status}: {body}"),
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.client.get(self.api_url(path))).await?;
        Ok(response.json().await?)
    }

    /// Follow `x-next-page` until exhausted
    async fn get_paged<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let request = self
                .client
                .get(self.api_url(path))
                .query(query)
                .query(&[("page", page.to_string())]);
            let response = self.send(request).await?;
            let next = header_u64(&response, "x-next-page");
            let mut batch: Vec<T> = response.json().await?;
            items.append(&mut batch);

            match next {
                Some(n) if page < MAX_PAGES => page = u32::try_from(n).unwrap_or(MAX_PAGES),
                _ => break,
            }
        }

        Ok(items)
    }

    fn repo_from_project(&self, project: Project) -> Repository {
        let visibility = match project.visibility.as_deref() {
            Some("private") => Visibility::Private,
            Some("internal") => Visibility::Internal,
            _ => Visibility::Public,
        };
        Repository {
            owner: project.namespace.full_path,
            name: project.path,
            default_branch: project
                .default_branch
                .unwrap_or_else(|| "main".to_string()),
            visibility,
            provider: self.name.clone(),
            html_url: project.web_url,
        }
    }

    async fn get_merge_request(&self, repo: &Repository, iid: u64) -> Result<MergeRequest> {
        self.get_json(&Self::mr_path(repo, iid)).await
    }
}

#[async_trait]
impl Provider for GitLabProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    async fn authenticate(&self) -> Result<()> {
        debug!(provider = %self.name, "authenticating");
        let user: User = self.get_json("/user").await?;
        debug!(provider = %self.name, login = %user.username, "authenticated");
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        debug!(provider = %self.name, "listing projects");
        let projects: Vec<Project> = self
            .get_paged(
                "/projects",
                &[
                    ("membership", "true".to_string()),
                    ("archived", "false".to_string()),
                    ("per_page", "100".to_string()),
                ],
            )
            .await?;

        let result: Vec<Repository> = projects
            .into_iter()
            .map(|p| self.repo_from_project(p))
            .collect();
        debug!(provider = %self.name, count = result.len(), "listed projects");
        Ok(result)
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        debug!(owner, name, "getting project");
        let path = format!(
            "/projects/{}",
            urlencoding::encode(&format!("{owner}/{name}"))
        );
        let project: Project = self.get_json(&path).await?;
        Ok(self.repo_from_project(project))
    }

    async fn list_pull_requests(
        &self,
        repo: &Repository,
        options: &ListOptions,
    ) -> Result<Vec<PullRequest>> {
        debug!(repo = %repo.full_name(), state = %options.state, "listing MRs");
        let state = match options.state {
            PrState::Open => "opened",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
        };
        let path = format!("/projects/{}/merge_requests", Self::project_path(repo));

        let mrs: Vec<MergeRequest> = self
            .get_paged(
                &path,
                &[
                    ("state", state.to_string()),
                    ("per_page", options.per_page.to_string()),
                ],
            )
            .await?;

        let result: Vec<PullRequest> = mrs.into_iter().map(Into::into).collect();
        debug!(repo = %repo.full_name(), count = result.len(), "listed MRs");
        Ok(result)
    }

    async fn get_pull_request(&self, repo: &Repository, number: u64) -> Result<PullRequest> {
        debug!(mr_iid = number, "getting MR");
        let mr = self.get_merge_request(repo, number).await?;
        Ok(mr.into())
    }

    async fn merge_pull_request(
        &self,
        repo: &Repository,
        pr: &PullRequest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome> {
        debug!(mr_iid = pr.number, method = %options.method, "merging MR");

        let message = match &options.commit_message {
            Some(body) if !body.is_empty() => format!("{}\n\n{body}", options.commit_title),
            _ => options.commit_title.clone(),
        };

        // No rebase option on this endpoint: the project's merge method applies
        let mut body = match options.method {
            MergeMethod::Squash => serde_json::json!({
                "squash": true,
                "squash_commit_message": message,
            }),
            MergeMethod::Merge => serde_json::json!({
                "merge_commit_message": message,
            }),
            MergeMethod::Rebase => serde_json::json!({}),
        };
        if let Some(ref sha) = options.sha {
            body["sha"] = serde_json::Value::String(sha.clone());
        }

        let url = self.api_url(&format!("{}/merge", Self::mr_path(repo, pr.number)));
        let response: MergeResponse = self
            .send(self.client.put(&url).json(&body))
            .await?
            .json()
            .await?;

        let merged = response.state == "merged";
        let outcome = MergeOutcome {
            merged,
            sha: response.merge_commit_sha.or(response.squash_commit_sha),
            message: (!merged).then(|| format!("merge request is {}", response.state)),
        };

        debug!(
            mr_iid = pr.number,
            merged = outcome.merged,
            sha = ?outcome.sha,
            "merge complete"
        );
        Ok(outcome)
    }

    async fn get_pr_status(&self, repo: &Repository, pr: &PullRequest) -> Result<PrStatus> {
        let mr = self.get_merge_request(repo, pr.number).await?;

        // No pipeline = not blocking
        let status = mr.head_pipeline.map_or_else(
            || PrStatus {
                state: CiState::Success,
                description: "no pipeline".to_string(),
            },
            |p| PrStatus {
                state: pipeline_state(&p.status),
                description: format!("pipeline #{} {}", p.id, p.status),
            },
        );
        debug!(mr_iid = pr.number, state = %status.state, "pipeline status");
        Ok(status)
    }

    async fn get_checks(&self, repo: &Repository, pr: &PullRequest) -> Result<Vec<Check>> {
        let mr = self.get_merge_request(repo, pr.number).await?;
        let Some(pipeline) = mr.head_pipeline else {
            return Ok(Vec::new());
        };

        let path = format!(
            "/projects/{}/pipelines/{}/jobs",
            Self::project_path(repo),
            pipeline.id
        );
        let jobs: Vec<Job> = self
            .get_paged(&path, &[("per_page", "100".to_string())])
            .await?;

        let checks: Vec<Check> = jobs.into_iter().map(check_from_job).collect();
        debug!(mr_iid = pr.number, count = checks.len(), "pipeline jobs");
        Ok(checks)
    }

    async fn get_rate_limit(&self) -> Result<RateLimit> {
        // GitLab has no rate-limit endpoint; the headers ride on every response
        let response = self.send(self.client.get(self.api_url("/user"))).await?;
        let limit = header_u64(&response, "ratelimit-limit").unwrap_or(0);
        let remaining = header_u64(&response, "ratelimit-remaining").unwrap_or(limit);
        let reset_at = header_u64(&response, "ratelimit-reset")
            .and_then(|r| i64::try_from(r).ok())
            .and_then(|r| DateTime::from_timestamp(r, 0));

        Ok(RateLimit {
            limit,
            remaining,
            reset_at,
        })
    }
}
