//! Merge command - merge every ready PR

use crate::cli::check::{print_process_results, print_process_summary};
use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check, cross, spinner_style};
use anstream::println;
use dialoguer::Confirm;
use indicatif::ProgressBar;
use pr_herd::error::{Error, Result};
use pr_herd::orchestrator::{MergeResult, MergeSettings, MergeSummary, ProcessSummary};
use std::time::Duration;

/// Options for the merge command
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Report what would be merged without merging
    pub dry_run: bool,
    /// Merge PRs that are skipped or not ready
    pub force: bool,
    /// Do not ask for confirmation
    pub yes: bool,
}

/// Run the merge command
///
/// Returns whether any merge failed.
pub async fn run_merge(ctx: &CommandContext, options: MergeOptions) -> Result<bool> {
    let settings = MergeSettings {
        dry_run: options.dry_run || ctx.config.dry_run,
        force: options.force,
    };

    let results = ctx.process().await?;
    println!();
    print_process_results(&results);

    let summary = ProcessSummary::from_results(&results);
    print_process_summary(&summary);
    println!();

    let candidates = if settings.force {
        summary.total_pull_requests()
    } else {
        summary.ready
    };
    if candidates == 0 {
        println!("{}", "No PRs are ready to merge.".muted());
        return Ok(false);
    }

    if settings.force {
        println!(
            "{}",
            "--force: merging PRs regardless of their verdict".warn()
        );
    }

    if !options.yes && !settings.dry_run {
        let proceed = Confirm::new()
            .with_prompt(format!("Merge {candidates} PR(s)?"))
            .default(false)
            .interact()
            .map_err(|e| Error::Internal(format!("Failed to read confirmation: {e}")))?;
        if !proceed {
            println!("{}", "Aborted".muted());
            return Ok(false);
        }
        println!();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message(if settings.dry_run {
        format!("Planning {candidates} merge(s)...")
    } else {
        format!("Merging {candidates} PR(s)...")
    });
    spinner.enable_steady_tick(Duration::from_millis(80));

    let merged = ctx.orchestrator.merge(&ctx.cancel, &results, settings).await;
    spinner.finish_and_clear();
    let merged = merged?;

    print_merge_results(&merged);
    let summary = MergeSummary::from_results(&merged);
    print_merge_summary(&summary, settings.dry_run);
    Ok(summary.has_failures())
}

fn print_merge_results(results: &[MergeResult]) {
    for result in results.iter().filter(|r| !r.skipped) {
        let marker = if result.success { check() } else { cross() };
        println!(
            "{} {}#{} {} {}",
            marker,
            result.repository.emphasis(),
            result.pr_number,
            result.title,
            format!("({})", result.method).muted()
        );
        if !result.success || result.sha.is_none() {
            println!("    {}", result.reason.muted());
        }
    }
}

fn print_merge_summary(summary: &MergeSummary, dry_run: bool) {
    println!();
    let verb = if dry_run { "would merge" } else { "merged" };
    println!(
        "{} {verb}, {} failed, {} skipped",
        summary.succeeded.success(),
        summary.failed.error(),
        summary.skipped.muted()
    );
    if dry_run {
        println!("{}", "Run without --dry-run to merge.".muted());
    }
}
