//! Config command - show the resolved configuration

use branchfarm_core::Config;
use clap::Args;

/// Show current configuration
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Only check that the configuration is valid
    #[arg(long)]
    check: bool,
}

impl ConfigArgs {
    /// Execute the config command
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let farm = config.validate()?;

        if self.check {
            println!("Configuration is valid.");
            return Ok(());
        }

        println!("Branchfarm Configuration");
        println!("========================");
        println!();
        println!("Settings:");
        println!("  remote: {}", farm.settings.remote);
        println!(
            "  git_timeout: {}",
            humanize(farm.settings.git_timeout.as_secs())
        );
        println!(
            "  hook_timeout: {}",
            humanize(farm.settings.hook_timeout.as_secs())
        );
        println!(
            "  max_parallel_repositories: {}",
            farm.settings.max_parallel_repositories
        );
        println!();

        println!("Repositories:");
        if farm.repositories.is_empty() {
            println!("  (none)");
        }
        for repo in &farm.repositories {
            println!("  {}:", repo.id);
            println!("    repo_url: {}", repo.repo_url);
            println!("    base_project_path: {}", repo.base_project_path.display());
            for script in &repo.scripts {
                println!("    script: {}", script.source());
            }
            for rule in &repo.rules {
                println!(
                    "    {}: {} -> {}",
                    rule.id,
                    rule.pattern,
                    rule.holder_path.display()
                );
                for script in &rule.scripts {
                    println!("      script: {}", script.source());
                }
            }
        }
        println!();

        match (&config.source, Config::default_config_path()) {
            (Some(path), _) => println!("Config file: {}", path.display()),
            (None, Some(path)) => {
                println!("Config file: {}", path.display());
                println!("  (not found - using defaults)");
            }
            (None, None) => println!("Config file: (none)"),
        }

        Ok(())
    }
}

fn humanize(secs: u64) -> String {
    match secs {
        s if s > 0 && s % 3600 == 0 => format!("{}h", s / 3600),
        s if s > 0 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}
