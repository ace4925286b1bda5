//! Mock provider for testing
//!
//! These are test utilities - not all may be used in every test binary.

#![allow(dead_code)]

use async_trait::async_trait;
use pr_herd::error::{Error, ErrorKind, Result};
use pr_herd::platform::Provider;
use pr_herd::types::{
    Check, CheckConclusion, CheckStatus, CiState, ListOptions, MergeOptions, MergeOutcome,
    PrStatus, ProviderKind, PullRequest, RateLimit, Repository, Visibility,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Call record for `merge_pull_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCall {
    pub repository: String,
    pub pr_number: u64,
    pub options: MergeOptions,
}

/// Hand-written provider with canned responses
///
/// Features:
/// - Repositories and PRs registered per `owner/name`
/// - Status/checks/merge responses per PR number
/// - Call tracking for verification
/// - Error injection, including failures that clear after N attempts
/// - Optional merge latency with in-flight tracking
pub struct MockProvider {
    name: String,
    kind: ProviderKind,
    repositories: Mutex<HashMap<String, Repository>>,
    pull_requests: Mutex<HashMap<String, Vec<PullRequest>>>,
    status_responses: Mutex<HashMap<u64, PrStatus>>,
    checks_responses: Mutex<HashMap<u64, Vec<Check>>>,
    merge_responses: Mutex<HashMap<u64, MergeOutcome>>,
    merge_delays: Mutex<HashMap<u64, Duration>>,
    mergeable_on_fetch: Mutex<HashMap<u64, Option<bool>>>,
    // Call tracking
    authenticate_calls: AtomicUsize,
    get_repository_calls: Mutex<Vec<String>>,
    list_pr_calls: Mutex<Vec<String>>,
    get_pr_calls: Mutex<Vec<u64>>,
    status_calls: Mutex<Vec<u64>>,
    checks_calls: Mutex<Vec<u64>>,
    merge_calls: Mutex<Vec<MergeCall>>,
    merges_in_flight: AtomicUsize,
    peak_merges_in_flight: AtomicUsize,
    // Error injection
    error_on_authenticate: Mutex<Option<ErrorKind>>,
    error_on_get_repository: Mutex<HashMap<String, ErrorKind>>,
    error_on_list_prs: Mutex<HashMap<String, ErrorKind>>,
    error_on_status: Mutex<HashMap<u64, (ErrorKind, Option<u32>)>>,
    error_on_merge: Mutex<HashMap<u64, ErrorKind>>,
    error_on_get_pr: Mutex<HashMap<u64, ErrorKind>>,
    panic_on_get_repository: Mutex<Option<String>>,
    panic_on_merge: Mutex<Option<u64>>,
}

impl MockProvider {
    /// Create a GitHub-flavored mock
    pub fn new(name: &str) -> Self {
        Self::with_kind(name, ProviderKind::GitHub)
    }

    /// Create a mock of the given kind
    pub fn with_kind(name: &str, kind: ProviderKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            repositories: Mutex::new(HashMap::new()),
            pull_requests: Mutex::new(HashMap::new()),
            status_responses: Mutex::new(HashMap::new()),
            checks_responses: Mutex::new(HashMap::new()),
            merge_responses: Mutex::new(HashMap::new()),
            merge_delays: Mutex::new(HashMap::new()),
            mergeable_on_fetch: Mutex::new(HashMap::new()),
            authenticate_calls: AtomicUsize::new(0),
            get_repository_calls: Mutex::new(Vec::new()),
            list_pr_calls: Mutex::new(Vec::new()),
            get_pr_calls: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
            checks_calls: Mutex::new(Vec::new()),
            merge_calls: Mutex::new(Vec::new()),
            merges_in_flight: AtomicUsize::new(0),
            peak_merges_in_flight: AtomicUsize::new(0),
            error_on_authenticate: Mutex::new(None),
            error_on_get_repository: Mutex::new(HashMap::new()),
            error_on_list_prs: Mutex::new(HashMap::new()),
            error_on_status: Mutex::new(HashMap::new()),
            error_on_merge: Mutex::new(HashMap::new()),
            error_on_get_pr: Mutex::new(HashMap::new()),
            panic_on_get_repository: Mutex::new(None),
            panic_on_merge: Mutex::new(None),
        }
    }

    fn error(&self, kind: ErrorKind, what: &str) -> Error {
        Error::provider(&self.name, kind, format!("injected {what} failure"))
    }

    // === Setup methods ===

    /// Register a repository with no PRs
    pub fn add_repository(&self, owner: &str, name: &str) -> Repository {
        let repo = Repository {
            owner: owner.to_string(),
            name: name.to_string(),
            default_branch: "main".to_string(),
            visibility: Visibility::Public,
            provider: self.name.clone(),
            html_url: format!("https://example.com/{owner}/{name}"),
        };
        self.repositories
            .lock()
            .unwrap()
            .insert(repo.full_name(), repo.clone());
        self.pull_requests
            .lock()
            .unwrap()
            .entry(repo.full_name())
            .or_default();
        repo
    }

    /// Add an open PR to a registered repository
    pub fn add_pull_request(&self, repo: &str, pr: PullRequest) {
        self.pull_requests
            .lock()
            .unwrap()
            .entry(repo.to_string())
            .or_default()
            .push(pr);
    }

    /// Set the combined status for a PR
    pub fn set_status(&self, pr_number: u64, state: CiState, description: &str) {
        self.status_responses.lock().unwrap().insert(
            pr_number,
            PrStatus {
                state,
                description: description.to_string(),
            },
        );
    }

    /// Set the individual checks for a PR
    pub fn set_checks(&self, pr_number: u64, checks: Vec<Check>) {
        self.checks_responses
            .lock()
            .unwrap()
            .insert(pr_number, checks);
    }

    /// Set the merge response for a PR
    pub fn set_merge_response(&self, pr_number: u64, outcome: MergeOutcome) {
        self.merge_responses
            .lock()
            .unwrap()
            .insert(pr_number, outcome);
    }

    /// Make merging a PR take `delay`
    pub fn set_merge_delay(&self, pr_number: u64, delay: Duration) {
        self.merge_delays.lock().unwrap().insert(pr_number, delay);
    }

    /// Mergeability reported by `get_pull_request`, which listings leave unknown
    pub fn set_mergeable_on_fetch(&self, pr_number: u64, mergeable: Option<bool>) {
        self.mergeable_on_fetch
            .lock()
            .unwrap()
            .insert(pr_number, mergeable);
    }

    /// Green status with one successful check
    pub fn setup_passing_ci(&self, pr_number: u64) {
        self.set_status(pr_number, CiState::Success, "all checks passed");
        self.set_checks(pr_number, vec![completed_check("build", CheckConclusion::Success)]);
    }

    // === Error injection methods ===

    /// Make `authenticate` fail
    pub fn fail_authenticate(&self, kind: ErrorKind) {
        *self.error_on_authenticate.lock().unwrap() = Some(kind);
    }

    /// Make `get_repository` fail for `owner/name`
    pub fn fail_get_repository(&self, repo: &str, kind: ErrorKind) {
        self.error_on_get_repository
            .lock()
            .unwrap()
            .insert(repo.to_string(), kind);
    }

    /// Make `list_pull_requests` fail for `owner/name`
    pub fn fail_list_pull_requests(&self, repo: &str, kind: ErrorKind) {
        self.error_on_list_prs
            .lock()
            .unwrap()
            .insert(repo.to_string(), kind);
    }

    /// Make `get_pr_status` fail for a PR on every call
    pub fn fail_status(&self, pr_number: u64, kind: ErrorKind) {
        self.error_on_status
            .lock()
            .unwrap()
            .insert(pr_number, (kind, None));
    }

    /// Make `get_pr_status` fail for a PR on the next `times` calls only
    pub fn fail_status_times(&self, pr_number: u64, kind: ErrorKind, times: u32) {
        self.error_on_status
            .lock()
            .unwrap()
            .insert(pr_number, (kind, Some(times)));
    }

    /// Make `merge_pull_request` fail for a PR
    pub fn fail_merge(&self, pr_number: u64, kind: ErrorKind) {
        self.error_on_merge.lock().unwrap().insert(pr_number, kind);
    }

    /// Make `get_pull_request` fail for a PR
    pub fn fail_get_pull_request(&self, pr_number: u64, kind: ErrorKind) {
        self.error_on_get_pr.lock().unwrap().insert(pr_number, kind);
    }

    /// Make `get_repository` panic for `owner/name`
    pub fn panic_on_get_repository(&self, repo: &str) {
        *self.panic_on_get_repository.lock().unwrap() = Some(repo.to_string());
    }

    /// Make `merge_pull_request` panic for a PR
    pub fn panic_on_merge(&self, pr_number: u64) {
        *self.panic_on_merge.lock().unwrap() = Some(pr_number);
    }

    // === Call verification methods ===

    /// Number of `authenticate` calls
    pub fn authenticate_count(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    /// Repositories passed to `get_repository`
    pub fn get_repository_calls(&self) -> Vec<String> {
        self.get_repository_calls.lock().unwrap().clone()
    }

    /// Repositories passed to `list_pull_requests`
    pub fn list_pr_calls(&self) -> Vec<String> {
        self.list_pr_calls.lock().unwrap().clone()
    }

    /// PR numbers passed to `get_pull_request`
    pub fn get_pr_calls(&self) -> Vec<u64> {
        self.get_pr_calls.lock().unwrap().clone()
    }

    /// PR numbers passed to `get_pr_status`
    pub fn status_calls(&self) -> Vec<u64> {
        self.status_calls.lock().unwrap().clone()
    }

    /// PR numbers passed to `get_checks`
    pub fn checks_calls(&self) -> Vec<u64> {
        self.checks_calls.lock().unwrap().clone()
    }

    /// All `merge_pull_request` calls
    pub fn merge_calls(&self) -> Vec<MergeCall> {
        self.merge_calls.lock().unwrap().clone()
    }

    /// Highest number of merges observed running at once
    pub fn peak_merges_in_flight(&self) -> usize {
        self.peak_merges_in_flight.load(Ordering::SeqCst)
    }

    /// Assert that `merge_pull_request` was called for a PR
    pub fn assert_merge_called(&self, pr_number: u64) {
        let calls = self.merge_calls();
        assert!(
            calls.iter().any(|c| c.pr_number == pr_number),
            "Expected merge_pull_request(#{pr_number}) but got: {calls:?}"
        );
    }

    /// Assert that `merge_pull_request` was never called
    pub fn assert_no_merges(&self) {
        let calls = self.merge_calls();
        assert!(calls.is_empty(), "Expected no merges but got: {calls:?}");
    }
}

/// A completed check with the given conclusion
pub fn completed_check(name: &str, conclusion: CheckConclusion) -> Check {
    Check {
        name: name.to_string(),
        status: CheckStatus::Completed,
        conclusion: Some(conclusion),
    }
}

/// A check that has not finished
pub fn running_check(name: &str) -> Check {
    Check {
        name: name.to_string(),
        status: CheckStatus::InProgress,
        conclusion: None,
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn authenticate(&self) -> Result<()> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = *self.error_on_authenticate.lock().unwrap() {
            return Err(self.error(kind, "authenticate"));
        }
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        Ok(self.repositories.lock().unwrap().values().cloned().collect())
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        let full_name = format!("{owner}/{name}");
        self.get_repository_calls
            .lock()
            .unwrap()
            .push(full_name.clone());

        let panics = self.panic_on_get_repository.lock().unwrap().as_deref() == Some(full_name.as_str());
        if panics {
            panic!("get_repository({full_name}) blew up");
        }

        if let Some(kind) = self.error_on_get_repository.lock().unwrap().get(&full_name) {
            return Err(self.error(*kind, "get_repository"));
        }
        self.repositories
            .lock()
            .unwrap()
            .get(&full_name)
            .cloned()
            .ok_or_else(|| self.error(ErrorKind::NotFound, "get_repository"))
    }

    async fn list_pull_requests(
        &self,
        repo: &Repository,
        options: &ListOptions,
    ) -> Result<Vec<PullRequest>> {
        let full_name = repo.full_name();
        self.list_pr_calls.lock().unwrap().push(full_name.clone());

        if let Some(kind) = self.error_on_list_prs.lock().unwrap().get(&full_name) {
            return Err(self.error(*kind, "list_pull_requests"));
        }
        Ok(self
            .pull_requests
            .lock()
            .unwrap()
            .get(&full_name)
            .map(|prs| {
                prs.iter()
                    .filter(|pr| pr.state == options.state)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_pull_request(&self, repo: &Repository, number: u64) -> Result<PullRequest> {
        self.get_pr_calls.lock().unwrap().push(number);

        if let Some(kind) = self.error_on_get_pr.lock().unwrap().get(&number) {
            return Err(self.error(*kind, "get_pull_request"));
        }
        let mut pr = self
            .pull_requests
            .lock()
            .unwrap()
            .get(&repo.full_name())
            .and_then(|prs| prs.iter().find(|pr| pr.number == number).cloned())
            .ok_or_else(|| self.error(ErrorKind::NotFound, "get_pull_request"))?;
        if let Some(mergeable) = self.mergeable_on_fetch.lock().unwrap().get(&number) {
            pr.mergeable = *mergeable;
        }
        Ok(pr)
    }

    async fn merge_pull_request(
        &self,
        repo: &Repository,
        pr: &PullRequest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome> {
        self.merge_calls.lock().unwrap().push(MergeCall {
            repository: repo.full_name(),
            pr_number: pr.number,
            options: options.clone(),
        });

        let panics = *self.panic_on_merge.lock().unwrap() == Some(pr.number);
        if panics {
            panic!("merge_pull_request(#{}) blew up", pr.number);
        }

        let running = self.merges_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_merges_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = self.merge_delays.lock().unwrap().get(&pr.number).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.merges_in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(kind) = self.error_on_merge.lock().unwrap().get(&pr.number) {
            return Err(self.error(*kind, "merge"));
        }
        Ok(self
            .merge_responses
            .lock()
            .unwrap()
            .get(&pr.number)
            .cloned()
            .unwrap_or_else(|| MergeOutcome {
                merged: true,
                sha: Some(format!("merged_sha_{}", pr.number)),
                message: None,
            }))
    }

    async fn get_pr_status(&self, _repo: &Repository, pr: &PullRequest) -> Result<PrStatus> {
        self.status_calls.lock().unwrap().push(pr.number);

        {
            let mut errors = self.error_on_status.lock().unwrap();
            if let Some((kind, remaining)) = errors.get_mut(&pr.number) {
                let kind = *kind;
                match remaining {
                    None => return Err(self.error(kind, "get_pr_status")),
                    Some(0) => {}
                    Some(n) => {
                        *n -= 1;
                        return Err(self.error(kind, "get_pr_status"));
                    }
                }
            }
        }

        Ok(self
            .status_responses
            .lock()
            .unwrap()
            .get(&pr.number)
            .cloned()
            .unwrap_or(PrStatus {
                state: CiState::Success,
                description: "no commit statuses".to_string(),
            }))
    }

    async fn get_checks(&self, _repo: &Repository, pr: &PullRequest) -> Result<Vec<Check>> {
        self.checks_calls.lock().unwrap().push(pr.number);
        Ok(self
            .checks_responses
            .lock()
            .unwrap()
            .get(&pr.number)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_rate_limit(&self) -> Result<RateLimit> {
        Ok(RateLimit {
            limit: 5000,
            remaining: 5000,
            reset_at: None,
        })
    }
}
