//! Configuration loading and validation
//!
//! The configuration is a TOML file describing providers, repositories,
//! PR filters and the request/retry budget.

use crate::behavior::{RateLimitPolicy, RetryPolicy};
use crate::error::{Error, Result};
use crate::evaluate::Filters;
use crate::types::{MergeMethod, ProviderKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest allowed concurrency ceiling
pub const MIN_CONCURRENCY: usize = 1;
/// Largest allowed concurrency ceiling
pub const MAX_CONCURRENCY: usize = 50;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Maximum tasks in flight (1..=50)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Report merges instead of performing them
    #[serde(default)]
    pub dry_run: bool,
    /// PR filters
    #[serde(default)]
    pub filters: FilterConfig,
    /// Per-provider request budget
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
    /// Hosting services
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Repositories to process
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

const fn default_concurrency() -> usize {
    crate::executor::DEFAULT_CONCURRENCY
}

/// PR filters as written in the file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Author logins allowed to be merged (empty = anyone)
    #[serde(default)]
    pub allowed_actors: Vec<String>,
    /// Labels that exclude a PR
    #[serde(default)]
    pub skip_labels: Vec<String>,
    /// Maximum PR age, e.g. "30d"
    #[serde(default, with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

/// Request budget as written in the file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Sustained requests per second, per provider
    #[serde(default = "default_rps")]
    pub requests_per_second: f64,
    /// Burst size
    #[serde(default = "default_burst")]
    pub burst: u32,
}

const fn default_rps() -> f64 {
    10.0
}

const fn default_burst() -> u32 {
    10
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            burst: default_burst(),
        }
    }
}

/// Retry policy as written in the file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff, e.g. "1s"
    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,
    /// Backoff ceiling, e.g. "30s"
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

/// One hosting service account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Unique name, referenced by repositories
    pub name: String,
    /// Service type
    pub kind: ProviderKind,
    /// Custom host (None for github.com/gitlab.com)
    #[serde(default)]
    pub host: Option<String>,
    /// Environment variable holding the token
    #[serde(default)]
    pub token_env: Option<String>,
}

/// One repository to process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Name of the provider hosting it
    pub provider: String,
    /// `owner/name` (GitLab: `group/subgroup/project`)
    pub repository: String,
    /// How to merge ready PRs
    ///
    /// GitLab's merge API cannot rebase: `rebase` there merges with whatever
    /// method the project is configured for (fast-forward projects rebase).
    #[serde(default)]
    pub merge_method: MergeMethod,
    /// Whether CI must pass before merging
    #[serde(default = "default_require_checks")]
    pub require_checks: bool,
}

const fn default_require_checks() -> bool {
    true
}

impl RepositoryConfig {
    /// Split `owner/name`; the owner may itself contain slashes
    pub fn owner_and_name(&self) -> Result<(&str, &str)> {
        match self.repository.rsplit_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok((owner, name)),
            _ => Err(Error::Config(format!(
                "repository '{}' must be of the form owner/name",
                self.repository
            ))),
        }
    }
}

impl Config {
    /// Default config file location: `<config_dir>/prherd/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("prherd").join("config.toml"))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-references
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(Error::Config(format!(
                "concurrency must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }

        if !self.rate_limit.requests_per_second.is_finite()
            || self.rate_limit.requests_per_second <= 0.0
        {
            return Err(Error::Config(
                "rate_limit.requests_per_second must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.burst == 0 {
            return Err(Error::Config("rate_limit.burst must be at least 1".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.backoff > self.retry.max_backoff {
            return Err(Error::Config(
                "retry.backoff must not exceed retry.max_backoff".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(Error::Config("provider name must not be empty".to_string()));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
            if let Some(ref host) = provider.host {
                url::Url::parse(&format!("https://{host}")).map_err(|e| {
                    Error::Config(format!("provider '{}' has invalid host '{host}': {e}", provider.name))
                })?;
            }
        }

        for repo in &self.repositories {
            repo.owner_and_name()?;
            if !names.contains(repo.provider.as_str()) {
                return Err(Error::Config(format!(
                    "repository '{}' references unknown provider '{}'",
                    repo.repository, repo.provider
                )));
            }
        }

        Ok(())
    }

    /// Resolved PR filters
    pub fn filters(&self) -> Filters {
        Filters {
            allowed_actors: self.filters.allowed_actors.clone(),
            skip_labels: self.filters.skip_labels.clone(),
            max_age: self.filters.max_age,
        }
    }

    /// Resolved retry policy
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff: self.retry.backoff,
            max_backoff: self.retry.max_backoff,
        }
    }

    /// Resolved rate-limit policy
    pub const fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            requests_per_second: self.rate_limit.requests_per_second,
            burst: self.rate_limit.burst,
        }
    }
}
