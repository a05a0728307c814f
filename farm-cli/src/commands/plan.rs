//! Plan command - show what a sync would change

use branchfarm_core::{Config, Engine};
use clap::Args;

/// Show what a sync would do without changing any workspace
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Only plan these repositories (repeatable)
    #[arg(short, long = "repo", value_name = "ID")]
    pub repos: Vec<String>,
}

impl PlanArgs {
    /// Execute the plan command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let farm = config.validate()?.retain_repositories(&self.repos)?;
        let engine = Engine::with_git(farm);

        for plan in engine.plan().await {
            println!("{}:", plan.id);

            if let Some(error) = &plan.error {
                println!("  {}", error);
                println!();
                continue;
            }

            if verbose {
                println!("  {} remote branches", plan.branches.len());
            }

            if plan.workspaces.is_empty() {
                println!("  no branch matches any rule");
            }
            for ws in &plan.workspaces {
                let action = if ws.is_checkout { "pull " } else { "clone" };
                println!(
                    "  {} {} <- {} [{}]",
                    action,
                    ws.path.display(),
                    ws.branch,
                    ws.rule_id
                );
            }
            for path in &plan.stale {
                println!("  remove {}", path.display());
            }
            println!();
        }

        Ok(())
    }
}
