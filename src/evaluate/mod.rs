//! Readiness evaluation
//!
//! Turns one pull request into an [`EvaluatedPr`]. Rules run in a fixed order
//! and the first one that matches decides; the CI rules come last because
//! they are the only ones that cost network calls.
//!
//! `Blocked` is a confident "no". `Errored` means the evaluation itself failed
//! and the answer is unknown, so it is reported separately.

pub mod rules;

pub use rules::Filters;

use crate::behavior::BehaviorManager;
use crate::error::Error;
use crate::platform::Provider;
use crate::types::{PullRequest, Repository};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reason reported for a PR that passed every rule
pub const READY_REASON: &str = "ready to merge";

/// Outcome of evaluating one PR
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Eligible for merge
    Ready,
    /// Filtered out by configuration (author, labels, age)
    Skipped(String),
    /// Evaluated and not mergeable right now
    Blocked(String),
    /// Evaluation failed; readiness unknown
    Errored(String),
}

impl Verdict {
    /// Human-readable reason, never empty
    pub fn reason(&self) -> &str {
        match self {
            Self::Ready => READY_REASON,
            Self::Skipped(r) | Self::Blocked(r) | Self::Errored(r) => r,
        }
    }

    /// Short label for display
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Skipped(_) => "skipped",
            Self::Blocked(_) => "blocked",
            Self::Errored(_) => "error",
        }
    }
}

/// A pull request together with its evaluation
#[derive(Debug)]
pub struct EvaluatedPr {
    /// The evaluated PR
    pub pull_request: PullRequest,
    /// Decision
    pub verdict: Verdict,
    /// Cause of an `Errored` verdict
    pub error: Option<Error>,
}

impl EvaluatedPr {
    /// Wrap a decided (non-error) verdict
    pub const fn decided(pull_request: PullRequest, verdict: Verdict) -> Self {
        Self {
            pull_request,
            verdict,
            error: None,
        }
    }

    /// Record a failed evaluation
    pub fn errored(pull_request: PullRequest, error: Error) -> Self {
        Self {
            pull_request,
            verdict: Verdict::Errored(format!("evaluation failed: {error}")),
            error: Some(error),
        }
    }

    /// Eligible for merge
    pub fn is_ready(&self) -> bool {
        self.verdict == Verdict::Ready
    }

    /// Filtered out by configuration
    pub const fn is_skipped(&self) -> bool {
        matches!(self.verdict, Verdict::Skipped(_))
    }

    /// Evaluated as not mergeable
    pub const fn is_blocked(&self) -> bool {
        matches!(self.verdict, Verdict::Blocked(_))
    }

    /// Evaluation failed
    pub const fn is_errored(&self) -> bool {
        matches!(self.verdict, Verdict::Errored(_))
    }

    /// Human-readable reason
    pub fn reason(&self) -> &str {
        self.verdict.reason()
    }
}

/// Evaluates PRs, fetching CI data through the behavior manager
pub struct ReadinessEvaluator {
    behavior: Arc<BehaviorManager>,
}

impl ReadinessEvaluator {
    /// Create an evaluator
    pub const fn new(behavior: Arc<BehaviorManager>) -> Self {
        Self { behavior }
    }

    /// Evaluate `pr` as of now
    pub async fn evaluate(
        &self,
        cancel: &CancellationToken,
        provider: &dyn Provider,
        repo: &Repository,
        pr: PullRequest,
        filters: &Filters,
        require_checks: bool,
    ) -> EvaluatedPr {
        self.evaluate_at(cancel, provider, repo, pr, filters, require_checks, Utc::now())
            .await
    }

    /// Evaluate `pr` against a fixed clock
    #[allow(clippy::too_many_arguments)]
    pub async fn evaluate_at(
        &self,
        cancel: &CancellationToken,
        provider: &dyn Provider,
        repo: &Repository,
        pr: PullRequest,
        filters: &Filters,
        require_checks: bool,
        now: DateTime<Utc>,
    ) -> EvaluatedPr {
        let repo_name = repo.full_name();
        let mut pr = pr;
        let mut verdict = rules::precheck(&pr, filters, now);

        // Listings may omit mergeability; the single-PR endpoint computes it
        if verdict.is_none() && pr.mergeable.is_none() {
            let number = pr.number;
            let refreshed = self
                .behavior
                .execute_with_result(cancel, provider.name(), "get_pull_request", || {
                    provider.get_pull_request(repo, number)
                })
                .await;
            match refreshed {
                Ok(fresh) => {
                    debug!(repo = %repo_name, pr_number = number, mergeable = ?fresh.mergeable, "refreshed mergeability");
                    pr = fresh;
                    verdict = rules::precheck(&pr, filters, now);
                }
                Err(e) => {
                    warn!(repo = %repo_name, pr_number = number, error = %e, "could not refresh PR");
                    return EvaluatedPr::errored(pr, e);
                }
            }
        }

        if let Some(verdict) = verdict {
            debug!(repo = %repo_name, pr_number = pr.number, verdict = verdict.label(), reason = verdict.reason(), "evaluated");
            return EvaluatedPr::decided(pr, verdict);
        }

        if require_checks {
            match self.ci_blocker(cancel, provider, repo, &pr).await {
                Ok(Some(reason)) => {
                    debug!(repo = %repo_name, pr_number = pr.number, %reason, "blocked by CI");
                    return EvaluatedPr::decided(pr, Verdict::Blocked(reason));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(repo = %repo_name, pr_number = pr.number, error = %e, "could not evaluate CI");
                    return EvaluatedPr::errored(pr, e);
                }
            }
        }

        debug!(repo = %repo_name, pr_number = pr.number, "ready to merge");
        EvaluatedPr::decided(pr, Verdict::Ready)
    }

    /// Combined status first, then individual checks
    async fn ci_blocker(
        &self,
        cancel: &CancellationToken,
        provider: &dyn Provider,
        repo: &Repository,
        pr: &PullRequest,
    ) -> crate::error::Result<Option<String>> {
        let status = self
            .behavior
            .execute_with_result(cancel, provider.name(), "get_pr_status", || {
                provider.get_pr_status(repo, pr)
            })
            .await?;
        if let Some(reason) = rules::status_blocker(&status) {
            return Ok(Some(reason));
        }

        let checks = self
            .behavior
            .execute_with_result(cancel, provider.name(), "get_checks", || {
                provider.get_checks(repo, pr)
            })
            .await?;
        Ok(rules::checks_blocker(&checks))
    }
}
