//! Per-repository processing: fetch, list, evaluate

use crate::behavior::BehaviorManager;
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::evaluate::{EvaluatedPr, Filters, ReadinessEvaluator};
use crate::platform::Provider;
use crate::types::{ListOptions, MergeMethod, Repository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A configured repository to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    /// Provider name
    pub provider: String,
    /// Owner or group path
    pub owner: String,
    /// Repository name
    pub name: String,
    /// How ready PRs get merged
    pub merge_method: MergeMethod,
    /// Whether CI must pass
    pub require_checks: bool,
}

impl RepoTarget {
    /// Target with default merge settings (squash, checks required)
    pub fn new(
        provider: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            owner: owner.into(),
            name: name.into(),
            merge_method: MergeMethod::default(),
            require_checks: true,
        }
    }

    /// Build from a repository entry of the config file
    pub fn from_config(config: &RepositoryConfig) -> Result<Self> {
        let (owner, name) = config.owner_and_name()?;
        Ok(Self {
            provider: config.provider.clone(),
            owner: owner.to_string(),
            name: name.to_string(),
            merge_method: config.merge_method,
            require_checks: config.require_checks,
        })
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Outcome of processing one repository
///
/// A repository-level failure carries no pull requests.
#[derive(Debug)]
pub struct ProcessResult {
    target: RepoTarget,
    repository: Option<Repository>,
    pull_requests: Vec<EvaluatedPr>,
    error: Option<Error>,
}

impl ProcessResult {
    /// Repository fetched and its PRs evaluated
    pub const fn completed(
        target: RepoTarget,
        repository: Repository,
        pull_requests: Vec<EvaluatedPr>,
    ) -> Self {
        Self {
            target,
            repository: Some(repository),
            pull_requests,
            error: None,
        }
    }

    /// Repository could not be processed
    pub const fn failed(target: RepoTarget, error: Error) -> Self {
        Self {
            target,
            repository: None,
            pull_requests: Vec::new(),
            error: Some(error),
        }
    }

    /// The configured target
    pub const fn target(&self) -> &RepoTarget {
        &self.target
    }

    /// Provider name
    pub fn provider(&self) -> &str {
        &self.target.provider
    }

    /// Fetched repository, absent on failure
    pub const fn repository(&self) -> Option<&Repository> {
        self.repository.as_ref()
    }

    /// Evaluated PRs, in the order the provider listed them
    pub fn pull_requests(&self) -> &[EvaluatedPr] {
        &self.pull_requests
    }

    /// Repository-level error
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Whether the repository failed as a whole
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Counts over a batch of [`ProcessResult`]s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Repositories processed
    pub repositories: usize,
    /// Repositories that failed as a whole
    pub failed_repositories: usize,
    /// PRs ready to merge
    pub ready: usize,
    /// PRs filtered out
    pub skipped: usize,
    /// PRs not mergeable right now
    pub blocked: usize,
    /// PRs whose evaluation failed
    pub errored: usize,
}

impl ProcessSummary {
    /// Tally results
    pub fn from_results(results: &[ProcessResult]) -> Self {
        let mut summary = Self {
            repositories: results.len(),
            ..Self::default()
        };
        for result in results {
            if result.is_failed() {
                summary.failed_repositories += 1;
            }
            for pr in result.pull_requests() {
                if pr.is_ready() {
                    summary.ready += 1;
                } else if pr.is_skipped() {
                    summary.skipped += 1;
                } else if pr.is_blocked() {
                    summary.blocked += 1;
                } else {
                    summary.errored += 1;
                }
            }
        }
        summary
    }

    /// Every PR seen
    pub const fn total_pull_requests(&self) -> usize {
        self.ready + self.skipped + self.blocked + self.errored
    }
}

/// Fetch a repository, list its open PRs and evaluate each one
pub(crate) async fn process_repository(
    cancel: &CancellationToken,
    behavior: &BehaviorManager,
    evaluator: &ReadinessEvaluator,
    provider: &dyn Provider,
    filters: &Filters,
    target: RepoTarget,
) -> ProcessResult {
    let full_name = target.full_name();
    let provider_name = provider.name();

    let repository = match behavior
        .execute_with_result(cancel, provider_name, "get_repository", || {
            provider.get_repository(&target.owner, &target.name)
        })
        .await
    {
        Ok(repo) => repo,
        Err(e) => {
            warn!(provider = provider_name, repo = %full_name, error = %e, "failed to fetch repository");
            return ProcessResult::failed(target, e);
        }
    };

    let options = ListOptions::default();
    let pull_requests = match behavior
        .execute_with_result(cancel, provider_name, "list_pull_requests", || {
            provider.list_pull_requests(&repository, &options)
        })
        .await
    {
        Ok(prs) => prs,
        Err(e) => {
            warn!(provider = provider_name, repo = %full_name, error = %e, "failed to list pull requests");
            return ProcessResult::failed(target, e);
        }
    };

    debug!(provider = provider_name, repo = %full_name, count = pull_requests.len(), "evaluating pull requests");

    let mut evaluated = Vec::with_capacity(pull_requests.len());
    for pr in pull_requests {
        evaluated.push(
            evaluator
                .evaluate(cancel, provider, &repository, pr, filters, target.require_checks)
                .await,
        );
    }

    ProcessResult::completed(target, repository, evaluated)
}
