//! Sync command - bring every workspace in line with the remote branches

use branchfarm_core::{CancellationFlag, Config, Engine, RunReport};
use chrono::Local;
use clap::Args;

/// Exit status of a strict run with failed items
const FAILURE_EXIT_CODE: i32 = 2;

/// Synchronize workspaces with the remote branches
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Only synchronize these repositories (repeatable)
    #[arg(short, long = "repo", value_name = "ID")]
    pub repos: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Exit with status 2 if any item failed
    #[arg(long)]
    pub strict: bool,
}

impl SyncArgs {
    /// Execute the sync command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let farm = config.validate()?.retain_repositories(&self.repos)?;

        if farm.repositories.is_empty() {
            println!("No repositories configured.");
            return Ok(());
        }

        if verbose {
            println!("Synchronizing {} repositories", farm.repositories.len());
        }

        let cancel = CancellationFlag::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; finishing current operations");
                on_signal.cancel();
            }
        });

        let engine = Engine::with_git(farm);
        let report = engine.run(cancel).await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        if self.strict && report.has_failures() {
            std::process::exit(FAILURE_EXIT_CODE);
        }

        Ok(())
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!(
        "Run started {}",
        report
            .started_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    if report.repositories.is_empty() {
        println!("Nothing to do.");
    }

    for repo in &report.repositories {
        println!("{}:", repo.id);
        for entry in &repo.entries {
            let marker = if entry.outcome.is_failure() { "!" } else { " " };
            println!("  {} {}: {}", marker, entry.path.display(), entry.outcome);
        }
        println!();
    }

    let (synced, removed, failed) = report.summary();
    let elapsed = report.finished_at - report.started_at;
    println!(
        "{} synced, {} removed, {} failed in {:.1}s",
        synced,
        removed,
        failed,
        elapsed.num_milliseconds() as f64 / 1000.0
    );
}
