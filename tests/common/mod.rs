//! Shared test fixtures

#![allow(dead_code)]

mod mock_provider;

pub use mock_provider::{MergeCall, MockProvider, completed_check, running_check};

use chrono::{Duration as ChronoDuration, Utc};
use pr_herd::behavior::{BehaviorManager, RateLimitPolicy, RetryPolicy};
use pr_herd::evaluate::Filters;
use pr_herd::types::{BranchRef, PrState, PullRequest};
use std::time::Duration;

/// Open, mergeable PR opened a day ago
pub fn make_pr(number: u64, author: &str) -> PullRequest {
    let created_at = Utc::now() - ChronoDuration::days(1);
    PullRequest {
        number,
        title: format!("Update dependency #{number}"),
        body: Some(format!("Body of PR {number}")),
        state: PrState::Open,
        is_draft: false,
        mergeable: Some(true),
        head: BranchRef {
            name: format!("update-{number}"),
            sha: format!("head_sha_{number}"),
        },
        base: BranchRef {
            name: "main".to_string(),
            sha: "base_sha".to_string(),
        },
        author: author.to_string(),
        labels: vec![],
        html_url: format!("https://example.com/pull/{number}"),
        created_at,
        updated_at: created_at,
    }
}

/// Same as [`make_pr`] with labels
pub fn make_labeled_pr(number: u64, author: &str, labels: &[&str]) -> PullRequest {
    PullRequest {
        labels: labels.iter().map(|l| (*l).to_string()).collect(),
        ..make_pr(number, author)
    }
}

/// Filters allowing the usual bots, skipping `do-not-merge`, max age 30 days
pub fn bot_filters() -> Filters {
    Filters {
        allowed_actors: vec!["dependabot[bot]".to_string(), "renovate[bot]".to_string()],
        skip_labels: vec!["do-not-merge".to_string()],
        max_age: Some(Duration::from_secs(30 * 86_400)),
    }
}

/// Generous rate limit and fast single-attempt retries
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
    }
}

/// Behavior manager that never throttles in practice
pub fn unthrottled(max_attempts: u32) -> BehaviorManager {
    BehaviorManager::new(
        RateLimitPolicy {
            requests_per_second: 1_000.0,
            burst: 1_000,
        },
        fast_retry(max_attempts),
    )
}
