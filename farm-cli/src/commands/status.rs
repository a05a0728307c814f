//! Status command - show the workspaces currently on disk

use branchfarm_core::{Config, Engine};
use clap::Args;

/// List workspaces under every rule's holder directory
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also list rules without any workspace
    #[arg(short, long)]
    all: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let engine = Engine::with_git(config.validate()?);

        let mut shown = 0;
        for rule in engine.status() {
            if rule.workspaces.is_empty() && !(self.all || verbose) {
                continue;
            }
            shown += 1;

            println!(
                "{}/{} ({})",
                rule.repo_id,
                rule.rule_id,
                rule.holder_path.display()
            );

            if rule.workspaces.is_empty() {
                println!("  (no workspaces)");
            }

            for ws in &rule.workspaces {
                match (&ws.checkout, &ws.error) {
                    (Some(info), _) => {
                        let branch = info.branch.as_deref().unwrap_or("(detached)");
                        let commit = info
                            .commit
                            .as_deref()
                            .map(|c| &c[..c.len().min(8)])
                            .unwrap_or("-");
                        println!("  {}  {}  {}", ws.path.display(), branch, commit);
                    }
                    (None, Some(error)) => {
                        println!("  {}  error: {}", ws.path.display(), error);
                    }
                    (None, None) => {
                        println!("  {}  not a checkout", ws.path.display());
                    }
                }
            }
            println!();
        }

        if shown == 0 {
            println!("No workspaces.");
        }

        Ok(())
    }
}
