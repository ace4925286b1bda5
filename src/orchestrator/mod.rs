//! Orchestration across providers
//!
//! [`Orchestrator`] owns one run: the providers, the shared behavior manager
//! and executor, and the configured repositories. `process` fetches and
//! evaluates every repository concurrently; `merge` hands the ready PRs to
//! the [`MergeOrchestrator`].

pub mod merge;
pub mod process;

pub use merge::{DRY_RUN_REASON, MergeOrchestrator, MergeResult, MergeSettings, MergeSummary};
pub use process::{ProcessResult, ProcessSummary, RepoTarget};

use crate::behavior::{BehaviorManager, RateLimitPolicy, RetryPolicy};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::evaluate::{Filters, ReadinessEvaluator};
use crate::executor::{BoundedExecutor, DEFAULT_CONCURRENCY};
use crate::platform::{Provider, create_provider};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Run-wide knobs
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Tasks in flight
    pub concurrency: usize,
    /// Per-provider request budget
    pub rate_limit: RateLimitPolicy,
    /// Retry policy
    pub retry: RetryPolicy,
    /// PR filters
    pub filters: Filters,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            rate_limit: RateLimitPolicy::default(),
            retry: RetryPolicy::default(),
            filters: Filters::default(),
        }
    }
}

impl OrchestratorSettings {
    /// Settings from a loaded config
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            rate_limit: config.rate_limit_policy(),
            retry: config.retry_policy(),
            filters: config.filters(),
        }
    }
}

/// One orchestration run
pub struct Orchestrator {
    providers: HashMap<String, Arc<dyn Provider>>,
    /// Providers that could not be set up, with the reason
    unavailable: HashMap<String, String>,
    targets: Vec<RepoTarget>,
    behavior: Arc<BehaviorManager>,
    executor: BoundedExecutor,
    evaluator: Arc<ReadinessEvaluator>,
    filters: Arc<Filters>,
}

impl Orchestrator {
    /// Create an orchestrator over ready-made providers
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        targets: Vec<RepoTarget>,
        settings: OrchestratorSettings,
    ) -> Self {
        let behavior = Arc::new(BehaviorManager::new(settings.rate_limit, settings.retry));
        Self {
            providers: providers
                .into_iter()
                .map(|p| (p.name().to_string(), p))
                .collect(),
            unavailable: HashMap::new(),
            targets,
            evaluator: Arc::new(ReadinessEvaluator::new(Arc::clone(&behavior))),
            behavior,
            executor: BoundedExecutor::new(settings.concurrency),
            filters: Arc::new(settings.filters),
        }
    }

    /// Build providers and targets from a loaded config
    ///
    /// A provider whose token cannot be resolved does not fail the run; its
    /// repositories are reported as failed instead.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = OrchestratorSettings::from_config(config);
        let targets = config
            .repositories
            .iter()
            .map(RepoTarget::from_config)
            .collect::<Result<Vec<_>>>()?;

        let mut providers = Vec::new();
        let mut unavailable = HashMap::new();
        for provider_config in &config.providers {
            match create_provider(provider_config) {
                Ok(provider) => providers.push(provider),
                Err(e) => {
                    warn!(provider = %provider_config.name, error = %e, "provider unavailable");
                    unavailable.insert(provider_config.name.clone(), e.to_string());
                }
            }
        }

        let mut orchestrator = Self::new(providers, targets, settings);
        orchestrator.unavailable = unavailable;
        Ok(orchestrator)
    }

    /// Configured repositories
    pub fn targets(&self) -> &[RepoTarget] {
        &self.targets
    }

    /// Providers by name
    pub const fn providers(&self) -> &HashMap<String, Arc<dyn Provider>> {
        &self.providers
    }

    /// Shared behavior manager
    pub const fn behavior(&self) -> &Arc<BehaviorManager> {
        &self.behavior
    }

    /// Fetch and evaluate every configured repository
    ///
    /// Results follow the order of [`Self::targets`]. A failing repository
    /// only affects its own result.
    pub async fn process(&self, cancel: &CancellationToken) -> Result<Vec<ProcessResult>> {
        if self.providers.is_empty() && self.unavailable.is_empty() {
            return Err(Error::NoProviders);
        }
        if self.targets.is_empty() {
            return Err(Error::NoRepositories);
        }

        let auth_failures = self.authenticate(cancel).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut slots: Vec<Option<ProcessResult>> = Vec::with_capacity(self.targets.len());
        let mut tasks = Vec::new();
        // Slot index of each task, in task order
        let mut task_slots = Vec::new();
        let (tx, rx) = mpsc::channel(self.executor.concurrency());

        for (index, target) in self.targets.iter().enumerate() {
            let provider = match self.provider_for(&target.provider, &auth_failures) {
                Ok(provider) => provider,
                Err(error) => {
                    slots.push(Some(ProcessResult::failed(target.clone(), error)));
                    continue;
                }
            };
            task_slots.push(slots.len());
            slots.push(None);

            let target = target.clone();
            let tx = tx.clone();
            let behavior = Arc::clone(&self.behavior);
            let evaluator = Arc::clone(&self.evaluator);
            let filters = Arc::clone(&self.filters);

            tasks.push(move |cancel: CancellationToken| {
                let span = info_span!("process", provider = %target.provider, repo = %target.full_name());
                async move {
                    let result = process::process_repository(
                        &cancel,
                        &behavior,
                        &evaluator,
                        provider.as_ref(),
                        &filters,
                        target,
                    )
                    .await;
                    tx.send((index, result))
                        .await
                        .map_err(|_| Error::Internal("process result collector closed".to_string()))
                }
                .instrument(span)
            });
        }
        drop(tx);

        info!(repositories = self.targets.len(), concurrency = self.executor.concurrency(), "processing repositories");

        let (report, collected) = tokio::join!(
            self.executor.execute_with_report(cancel, tasks),
            collect_indexed(rx, slots.len()),
        );

        for (slot, result) in slots.iter_mut().zip(collected) {
            if result.is_some() {
                *slot = result;
            }
        }

        if let Err(e) = report.result() {
            warn!(error = %e, "repository processing interrupted");
        }

        for (position, index) in task_slots.into_iter().enumerate() {
            if let Some(slot) = slots.get_mut(index)
                && slot.is_none()
            {
                let error = if report.was_dispatched(position) {
                    Error::Internal("repository task panicked".to_string())
                } else {
                    Error::Cancelled
                };
                *slot = Some(ProcessResult::failed(self.targets[index].clone(), error));
            }
        }

        let results: Vec<ProcessResult> = slots.into_iter().flatten().collect();

        if results.iter().all(|r| r.error().is_some_and(Error::is_cancelled)) {
            return Err(Error::Cancelled);
        }

        let summary = ProcessSummary::from_results(&results);
        info!(
            ready = summary.ready,
            skipped = summary.skipped,
            blocked = summary.blocked,
            errored = summary.errored,
            failed_repositories = summary.failed_repositories,
            "processing complete"
        );
        Ok(results)
    }

    /// Merge the ready PRs of `results`
    pub async fn merge(
        &self,
        cancel: &CancellationToken,
        results: &[ProcessResult],
        settings: MergeSettings,
    ) -> Result<Vec<MergeResult>> {
        let merger = MergeOrchestrator::new(Arc::clone(&self.behavior), self.executor);
        let merged = merger.run(cancel, &self.providers, results, settings).await?;

        let summary = MergeSummary::from_results(&merged);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "merge pass complete"
        );
        Ok(merged)
    }

    /// The provider serving `name`, unless it is unusable this run
    fn provider_for(
        &self,
        name: &str,
        auth_failures: &HashMap<String, String>,
    ) -> Result<Arc<dyn Provider>> {
        if let Some(reason) = self.unavailable.get(name) {
            return Err(Error::Auth(reason.clone()));
        }
        if let Some(reason) = auth_failures.get(name) {
            return Err(Error::Auth(format!("{name} authentication failed: {reason}")));
        }
        self.providers
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| Error::Config(format!("unknown provider '{name}'")))
    }

    /// Authenticate every provider that has repositories, once
    ///
    /// Returns the failure message per provider name.
    async fn authenticate(&self, cancel: &CancellationToken) -> HashMap<String, String> {
        let mut failures = HashMap::new();
        for (name, provider) in &self.providers {
            if !self.targets.iter().any(|t| &t.provider == name) {
                continue;
            }
            let result = self
                .behavior
                .execute(cancel, name, "authenticate", || provider.authenticate())
                .await;
            match result {
                Ok(()) => debug!(provider = %name, "authenticated"),
                Err(e) => {
                    warn!(provider = %name, error = %e, "authentication failed");
                    failures.insert(name.clone(), e.to_string());
                }
            }
        }
        failures
    }
}

/// Drain `(index, value)` pairs into slots until every sender is gone
pub(crate) async fn collect_indexed<T>(
    mut rx: mpsc::Receiver<(usize, T)>,
    len: usize,
) -> Vec<Option<T>> {
    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(len).collect();
    while let Some((index, value)) = rx.recv().await {
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(value);
        }
    }
    slots
}
