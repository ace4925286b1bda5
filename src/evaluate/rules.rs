//! Readiness rules - pure functions, no I/O
//!
//! The cheap rules (author, labels, age, state, draft, conflicts) only need
//! the PR itself. The CI rules take data the evaluator fetched beforehand.

use super::Verdict;
use crate::types::{Check, PrState, PrStatus, PullRequest};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Which PRs are considered at all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Author logins allowed to be merged automatically (empty = anyone)
    pub allowed_actors: Vec<String>,
    /// Labels that exclude a PR
    pub skip_labels: Vec<String>,
    /// PRs opened longer ago than this are ignored
    pub max_age: Option<Duration>,
}

/// Apply the rules that need no network access, in order
///
/// Returns `None` when the PR passes all of them.
pub fn precheck(pr: &PullRequest, filters: &Filters, now: DateTime<Utc>) -> Option<Verdict> {
    if !author_allowed(&pr.author, &filters.allowed_actors) {
        return Some(Verdict::Skipped("author not in allowed actors".to_string()));
    }

    let matched = matched_skip_labels(&pr.labels, &filters.skip_labels);
    if !matched.is_empty() {
        return Some(Verdict::Skipped(format!(
            "matched skip labels: {}",
            matched.join(", ")
        )));
    }

    if let Some(max_age) = filters.max_age
        && is_older_than(pr.created_at, now, max_age)
    {
        return Some(Verdict::Skipped(format!(
            "older than {}",
            humantime::format_duration(max_age)
        )));
    }

    if pr.state != PrState::Open {
        return Some(Verdict::Blocked("pull request is not open".to_string()));
    }

    if pr.is_draft {
        return Some(Verdict::Blocked("pull request is a draft".to_string()));
    }

    // Unknown mergeability is not a blocker; the provider is still computing it
    if pr.mergeable == Some(false) {
        return Some(Verdict::Blocked("merge conflicts".to_string()));
    }

    None
}

/// Logins compare case-insensitively; an empty allow-list admits everyone
pub fn author_allowed(author: &str, allowed: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|a| a.eq_ignore_ascii_case(author))
}

/// Labels present on the PR that are also skip labels, in PR order
pub fn matched_skip_labels(labels: &[String], skip: &[String]) -> Vec<String> {
    labels
        .iter()
        .filter(|l| skip.iter().any(|s| s.eq_ignore_ascii_case(l)))
        .cloned()
        .collect()
}

fn is_older_than(created_at: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    let Ok(max_age) = chrono::Duration::from_std(max_age) else {
        return false;
    };
    now.signed_duration_since(created_at) > max_age
}

/// Blocking reason for a non-successful combined status
pub fn status_blocker(status: &PrStatus) -> Option<String> {
    if status.is_success() {
        return None;
    }
    if status.description.is_empty() {
        Some(format!("status checks {}", status.state))
    } else {
        Some(format!(
            "status checks {}: {}",
            status.state, status.description
        ))
    }
}

/// Blocking reason for individual checks
///
/// A failed check wins over one that is still running.
pub fn checks_blocker(checks: &[Check]) -> Option<String> {
    if let Some(failed) = checks.iter().find(|c| c.is_failure()) {
        return Some(format!("check failed: {}", failed.name));
    }
    checks
        .iter()
        .find(|c| !c.is_success())
        .map(|running| format!("check not complete: {}", running.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BranchRef, CheckConclusion, CheckStatus, CiState};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn make_pr() -> PullRequest {
        PullRequest {
            number: 7,
            title: "Bump serde".to_string(),
            body: None,
            state: PrState::Open,
            is_draft: false,
            mergeable: Some(true),
            head: BranchRef {
                name: "deps/serde".to_string(),
                sha: "abc".to_string(),
            },
            base: BranchRef {
                name: "main".to_string(),
                sha: "def".to_string(),
            },
            author: "dependabot[bot]".to_string(),
            labels: vec!["dependencies".to_string()],
            html_url: String::new(),
            created_at: now() - chrono::Duration::days(1),
            updated_at: now(),
        }
    }

    fn filters() -> Filters {
        Filters {
            allowed_actors: vec!["dependabot[bot]".to_string()],
            skip_labels: vec!["do-not-merge".to_string()],
            max_age: Some(Duration::from_secs(30 * 86_400)),
        }
    }

    fn check(name: &str, status: CheckStatus, conclusion: Option<CheckConclusion>) -> Check {
        Check {
            name: name.to_string(),
            status,
            conclusion,
        }
    }

    #[test]
    fn test_passing_pr_has_no_verdict() {
        assert_eq!(precheck(&make_pr(), &filters(), now()), None);
    }

    #[test]
    fn test_unknown_author_skipped() {
        let mut pr = make_pr();
        pr.author = "mallory".to_string();
        assert_eq!(
            precheck(&pr, &filters(), now()),
            Some(Verdict::Skipped("author not in allowed actors".to_string()))
        );
    }

    #[test]
    fn test_author_match_ignores_case() {
        assert!(author_allowed("Dependabot[bot]", &["dependabot[bot]".to_string()]));
        assert!(author_allowed("anyone", &[]));
    }

    #[test]
    fn test_skip_label_lists_matches() {
        let mut pr = make_pr();
        pr.labels = vec!["Do-Not-Merge".to_string(), "wip".to_string()];
        let mut f = filters();
        f.skip_labels.push("wip".to_string());
        assert_eq!(
            precheck(&pr, &f, now()),
            Some(Verdict::Skipped(
                "matched skip labels: Do-Not-Merge, wip".to_string()
            ))
        );
    }

    #[test]
    fn test_too_old_skipped() {
        let mut pr = make_pr();
        pr.created_at = now() - chrono::Duration::days(31);
        assert_eq!(
            precheck(&pr, &filters(), now()),
            Some(Verdict::Skipped("older than 30days".to_string()))
        );
    }

    #[test]
    fn test_no_max_age_never_too_old() {
        let mut pr = make_pr();
        pr.created_at = now() - chrono::Duration::days(3650);
        let mut f = filters();
        f.max_age = None;
        assert_eq!(precheck(&pr, &f, now()), None);
    }

    #[test]
    fn test_skip_rules_run_before_state_rules() {
        let mut pr = make_pr();
        pr.author = "mallory".to_string();
        pr.state = PrState::Closed;
        pr.is_draft = true;
        assert!(matches!(
            precheck(&pr, &filters(), now()),
            Some(Verdict::Skipped(_))
        ));
    }

    #[test]
    fn test_closed_blocked() {
        let mut pr = make_pr();
        pr.state = PrState::Merged;
        assert_eq!(
            precheck(&pr, &filters(), now()),
            Some(Verdict::Blocked("pull request is not open".to_string()))
        );
    }

    #[test]
    fn test_draft_blocked() {
        let mut pr = make_pr();
        pr.is_draft = true;
        assert_eq!(
            precheck(&pr, &filters(), now()),
            Some(Verdict::Blocked("pull request is a draft".to_string()))
        );
    }

    #[test]
    fn test_conflicts_blocked_but_unknown_is_not() {
        let mut pr = make_pr();
        pr.mergeable = Some(false);
        assert_eq!(
            precheck(&pr, &filters(), now()),
            Some(Verdict::Blocked("merge conflicts".to_string()))
        );

        pr.mergeable = None;
        assert_eq!(precheck(&pr, &filters(), now()), None);
    }

    #[test]
    fn test_status_blocker_includes_description() {
        let status = PrStatus {
            state: CiState::Failure,
            description: "2 of 3 checks failed".to_string(),
        };
        assert_eq!(
            status_blocker(&status).as_deref(),
            Some("status checks failure: 2 of 3 checks failed")
        );

        let ok = PrStatus {
            state: CiState::Success,
            description: String::new(),
        };
        assert_eq!(status_blocker(&ok), None);
    }

    #[test]
    fn test_failed_check_wins_over_running() {
        let checks = vec![
            check("lint", CheckStatus::InProgress, None),
            check("test", CheckStatus::Completed, Some(CheckConclusion::Failure)),
        ];
        assert_eq!(checks_blocker(&checks).as_deref(), Some("check failed: test"));
    }

    #[test]
    fn test_running_check_not_complete() {
        let checks = vec![
            check("build", CheckStatus::Completed, Some(CheckConclusion::Success)),
            check("e2e", CheckStatus::Queued, None),
        ];
        assert_eq!(
            checks_blocker(&checks).as_deref(),
            Some("check not complete: e2e")
        );
    }

    #[test]
    fn test_neutral_and_skipped_pass() {
        let checks = vec![
            check("a", CheckStatus::Completed, Some(CheckConclusion::Neutral)),
            check("b", CheckStatus::Completed, Some(CheckConclusion::Skipped)),
        ];
        assert_eq!(checks_blocker(&checks), None);
        assert_eq!(checks_blocker(&[]), None);
    }

    #[test]
    fn test_stale_check_is_not_complete() {
        let checks = vec![check("old", CheckStatus::Completed, Some(CheckConclusion::Stale))];
        assert_eq!(
            checks_blocker(&checks).as_deref(),
            Some("check not complete: old")
        );
    }
}
