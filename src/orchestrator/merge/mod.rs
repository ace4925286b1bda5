//! Merge orchestration
//!
//! Turns evaluated PRs into merges. PRs that are not ready get a skipped
//! result immediately; ready ones (or every PR under `force`) become tasks
//! on the bounded executor. Each task reports through a channel into a
//! pre-sized slot, so the returned results follow the input order no matter
//! in which order merges finish.

pub mod message;

use super::collect_indexed;
use super::process::ProcessResult;
use crate::behavior::BehaviorManager;
use crate::error::{Error, ErrorKind, Result};
use crate::executor::BoundedExecutor;
use crate::platform::Provider;
use crate::types::{MergeMethod, PullRequest, Repository};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Reason recorded for dry-run merges
pub const DRY_RUN_REASON: &str = "dry run - would merge";

/// Knobs for one merge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSettings {
    /// Report what would be merged without calling the provider
    pub dry_run: bool,
    /// Merge PRs that were skipped or not ready
    pub force: bool,
}

/// Identity of one merge attempt
#[derive(Debug, Clone)]
struct MergeTarget {
    provider: String,
    repository: String,
    pr_number: u64,
    title: String,
    method: MergeMethod,
}

/// Outcome of one merge attempt
///
/// When `skipped` is set no merge was attempted: `success` carries no
/// meaning and `error` is `None`.
#[derive(Debug)]
pub struct MergeResult {
    /// Provider name
    pub provider: String,
    /// Repository `owner/name`
    pub repository: String,
    /// PR number
    pub pr_number: u64,
    /// PR title
    pub title: String,
    /// Merge method used or planned
    pub method: MergeMethod,
    /// Whether the PR was merged (or would be, in a dry run)
    pub success: bool,
    /// Not attempted
    pub skipped: bool,
    /// Human-readable outcome
    pub reason: String,
    /// Cause of a failed merge
    pub error: Option<Error>,
    /// When the merge completed
    pub merged_at: Option<DateTime<Utc>>,
    /// Merge commit SHA, when the provider reports one
    pub sha: Option<String>,
}

impl MergeResult {
    fn base(target: MergeTarget, reason: String) -> Self {
        Self {
            provider: target.provider,
            repository: target.repository,
            pr_number: target.pr_number,
            title: target.title,
            method: target.method,
            success: false,
            skipped: false,
            reason,
            error: None,
            merged_at: None,
            sha: None,
        }
    }

    fn skipped(target: MergeTarget, reason: &str) -> Self {
        Self {
            skipped: true,
            ..Self::base(target, reason.to_string())
        }
    }

    fn dry_run(target: MergeTarget) -> Self {
        Self {
            success: true,
            ..Self::base(target, DRY_RUN_REASON.to_string())
        }
    }

    fn merged(target: MergeTarget, sha: Option<String>) -> Self {
        Self {
            success: true,
            merged_at: Some(Utc::now()),
            sha,
            ..Self::base(target, "merged".to_string())
        }
    }

    fn failed(target: MergeTarget, error: Error) -> Self {
        let reason = format!("merge failed: {error}");
        Self {
            error: Some(error),
            ..Self::base(target, reason)
        }
    }

    /// Merged (or would be, in a dry run)
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !self.skipped && self.success
    }

    /// Attempted and failed
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !self.skipped && !self.success
    }
}

/// Counts over a batch of [`MergeResult`]s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Merged
    pub succeeded: usize,
    /// Attempted and failed
    pub failed: usize,
    /// Not attempted
    pub skipped: usize,
}

impl MergeSummary {
    /// Tally results
    pub fn from_results(results: &[MergeResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            if result.skipped {
                summary.skipped += 1;
            } else if result.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            summary
        })
    }

    /// Every result counted
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Whether any merge failed
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// A PR queued for merging
struct MergeUnit {
    index: usize,
    target: MergeTarget,
    provider: Arc<dyn Provider>,
    repository: Repository,
    pull_request: PullRequest,
}

/// Drives concurrent merges
#[derive(Debug)]
pub struct MergeOrchestrator {
    behavior: Arc<BehaviorManager>,
    executor: BoundedExecutor,
}

impl MergeOrchestrator {
    /// Create an orchestrator sharing the run's behavior manager
    pub const fn new(behavior: Arc<BehaviorManager>, executor: BoundedExecutor) -> Self {
        Self { behavior, executor }
    }

    /// Merge every eligible PR in `results`
    ///
    /// Returns one result per PR of every successfully processed repository,
    /// in input order. Fails only when no provider is available or when
    /// cancellation prevented every merge from starting.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        providers: &HashMap<String, Arc<dyn Provider>>,
        results: &[ProcessResult],
        settings: MergeSettings,
    ) -> Result<Vec<MergeResult>> {
        if providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let total: usize = results.iter().map(|r| r.pull_requests().len()).sum();
        let mut slots: Vec<Option<MergeResult>> = Vec::with_capacity(total);
        let mut units = Vec::new();

        for result in results {
            let Some(repository) = result.repository() else {
                continue;
            };
            let method = result.target().merge_method;
            let provider = providers.get(result.provider());

            for evaluated in result.pull_requests() {
                let pr = &evaluated.pull_request;
                let target = MergeTarget {
                    provider: result.provider().to_string(),
                    repository: repository.full_name(),
                    pr_number: pr.number,
                    title: pr.title.clone(),
                    method,
                };

                if !settings.force && !evaluated.is_ready() {
                    slots.push(Some(MergeResult::skipped(target, evaluated.reason())));
                    continue;
                }

                let Some(provider) = provider else {
                    let error = Error::Config(format!("unknown provider '{}'", target.provider));
                    slots.push(Some(MergeResult::failed(target, error)));
                    continue;
                };

                units.push(MergeUnit {
                    index: slots.len(),
                    target,
                    provider: Arc::clone(provider),
                    repository: repository.clone(),
                    pull_request: pr.clone(),
                });
                slots.push(None);
            }
        }

        if units.is_empty() {
            return Ok(slots.into_iter().flatten().collect());
        }

        info!(count = units.len(), dry_run = settings.dry_run, force = settings.force, "dispatching merges");

        let fallback: Vec<(usize, MergeTarget)> =
            units.iter().map(|u| (u.index, u.target.clone())).collect();
        let (tx, rx) = mpsc::channel(self.executor.concurrency());

        let tasks: Vec<_> = units
            .into_iter()
            .map(|unit| {
                let tx = tx.clone();
                let behavior = Arc::clone(&self.behavior);
                move |cancel: CancellationToken| {
                    let span = info_span!(
                        "merge",
                        provider = %unit.target.provider,
                        repo = %unit.target.repository,
                        pr_number = unit.target.pr_number,
                    );
                    async move {
                        let index = unit.index;
                        let result = merge_one(&cancel, &behavior, unit, settings.dry_run).await;
                        tx.send((index, result))
                            .await
                            .map_err(|_| Error::Internal("merge result collector closed".to_string()))
                    }
                    .instrument(span)
                }
            })
            .collect();
        drop(tx);

        let (report, collected) = tokio::join!(
            self.executor.execute_with_report(cancel, tasks),
            collect_indexed(rx, slots.len()),
        );

        if report.dispatched == 0 {
            warn!("cancelled before any merge was started");
            return Err(Error::Cancelled);
        }
        if let Err(e) = report.result() {
            warn!(error = %e, dispatched = report.dispatched, total = report.total, "merge pass interrupted");
        }

        for (slot, result) in slots.iter_mut().zip(collected) {
            if result.is_some() {
                *slot = result;
            }
        }

        // Fallback entries are in task order
        for (position, (index, target)) in fallback.into_iter().enumerate() {
            if let Some(slot) = slots.get_mut(index)
                && slot.is_none()
            {
                let error = if report.was_dispatched(position) {
                    Error::Internal("merge task panicked".to_string())
                } else {
                    Error::Cancelled
                };
                *slot = Some(MergeResult::failed(target, error));
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

/// Merge a single PR
async fn merge_one(
    cancel: &CancellationToken,
    behavior: &BehaviorManager,
    unit: MergeUnit,
    dry_run: bool,
) -> MergeResult {
    let MergeUnit {
        target,
        provider,
        repository,
        pull_request,
        ..
    } = unit;
    let options = message::merge_options(&pull_request, target.method);

    if dry_run {
        info!(method = %target.method, title = %options.commit_title, "dry run, not merging");
        return MergeResult::dry_run(target);
    }

    let outcome = behavior
        .execute_with_result(cancel, provider.name(), "merge_pull_request", || {
            provider.merge_pull_request(&repository, &pull_request, &options)
        })
        .await;

    match outcome {
        Ok(outcome) if outcome.merged => {
            info!(method = %target.method, sha = ?outcome.sha, "merged");
            MergeResult::merged(target, outcome.sha)
        }
        Ok(outcome) => {
            let message = outcome
                .message
                .unwrap_or_else(|| "provider declined the merge".to_string());
            warn!(%message, "merge not performed");
            let error = Error::provider(provider.name(), ErrorKind::Conflict, message);
            MergeResult::failed(target, error)
        }
        Err(e) => {
            warn!(error = %e, "merge failed");
            debug!(kind = %e.kind(), "merge failure classification");
            MergeResult::failed(target, e)
        }
    }
}
