//! Commit message synthesis - pure functions
//!
//! Each merge method gets its own title/body convention:
//! - squash: `<title> (#N)`, PR body forwarded when short enough
//! - merge: `Merge pull request #N from <branch>`, PR title as body
//! - rebase: original commits are replayed, title kept verbatim, no body

use crate::types::{MergeMethod, MergeOptions, PullRequest};

/// Longest PR body forwarded into a squash commit
pub const MAX_SQUASH_BODY_LEN: usize = 4096;

/// Commit title for merging `pr` with `method`
#[must_use]
pub fn commit_title(pr: &PullRequest, method: MergeMethod) -> String {
    match method {
        MergeMethod::Squash => {
            let suffix = format!("(#{})", pr.number);
            let title = pr.title.trim();
            if title.ends_with(&suffix) {
                title.to_string()
            } else {
                format!("{title} {suffix}")
            }
        }
        MergeMethod::Merge => format!("Merge pull request #{} from {}", pr.number, pr.head.name),
        MergeMethod::Rebase => pr.title.clone(),
    }
}

/// Commit body for merging `pr` with `method`
#[must_use]
pub fn commit_message(pr: &PullRequest, method: MergeMethod) -> Option<String> {
    match method {
        MergeMethod::Squash => pr
            .body
            .as_deref()
            .map(str::trim)
            .filter(|body| !body.is_empty() && body.len() <= MAX_SQUASH_BODY_LEN)
            .map(str::to_string),
        MergeMethod::Merge => Some(pr.title.clone()),
        MergeMethod::Rebase => None,
    }
}

/// Full merge parameters, pinned to the PR's head commit
#[must_use]
pub fn merge_options(pr: &PullRequest, method: MergeMethod) -> MergeOptions {
    MergeOptions {
        method,
        commit_title: commit_title(pr, method),
        commit_message: commit_message(pr, method),
        sha: Some(pr.head.sha.clone()).filter(|sha| !sha.is_empty()),
    }
}
