//! Check command - report every PR's readiness

use crate::cli::context::CommandContext;
use crate::cli::style::{DOT, Stylize, check, cross, link};
use anstream::println;
use pr_herd::error::Result;
use pr_herd::evaluate::{EvaluatedPr, Verdict};
use pr_herd::orchestrator::{ProcessResult, ProcessSummary};

/// Run the check command
pub async fn run_check(ctx: &CommandContext) -> Result<()> {
    let results = ctx.process().await?;
    println!();
    print_process_results(&results);
    print_process_summary(&ProcessSummary::from_results(&results));
    Ok(())
}

/// Print each repository and the verdict of each of its PRs
pub fn print_process_results(results: &[ProcessResult]) {
    for result in results {
        let name = result.target().full_name();
        let heading = result
            .repository()
            .map_or_else(|| name.clone(), |repo| link(&name, &repo.html_url));
        println!("{} {}", heading.emphasis(), format!("({})", result.provider()).muted());

        if let Some(error) = result.error() {
            println!("  {} {}", cross(), error.to_string().error());
            println!();
            continue;
        }

        if result.pull_requests().is_empty() {
            println!("  {}", "No open pull requests".muted());
        }
        for pr in result.pull_requests() {
            print_evaluated(pr);
        }
        println!();
    }
}

fn print_evaluated(evaluated: &EvaluatedPr) {
    let pr = &evaluated.pull_request;
    let number = link(&format!("#{}", pr.number), &pr.html_url);
    let marker = match evaluated.verdict {
        Verdict::Ready => check(),
        Verdict::Skipped(_) => DOT.muted(),
        Verdict::Blocked(_) => "!".warn(),
        Verdict::Errored(_) => cross(),
    };
    let label = match evaluated.verdict {
        Verdict::Ready => evaluated.verdict.label().success(),
        Verdict::Skipped(_) => evaluated.verdict.label().muted(),
        Verdict::Blocked(_) => evaluated.verdict.label().warn(),
        Verdict::Errored(_) => evaluated.verdict.label().error(),
    };

    println!(
        "  {} {} {} {}",
        marker,
        number.accent(),
        pr.title,
        format!("by {}", pr.author).muted()
    );
    println!("      {}: {}", label, evaluated.reason().muted());
}

/// One-line tally
pub fn print_process_summary(summary: &ProcessSummary) {
    println!(
        "{} ready, {} skipped, {} blocked, {} errored",
        summary.ready.success(),
        summary.skipped.muted(),
        summary.blocked.warn(),
        summary.errored.error()
    );
    if summary.failed_repositories > 0 {
        println!(
            "{}",
            format!(
                "{} of {} repositories could not be processed",
                summary.failed_repositories, summary.repositories
            )
            .warn()
        );
    }
}
