//! Bringing one matched workspace up to date

use std::path::Path;
use std::time::Duration;

use super::context::RunContext;
use super::report::Outcome;
use crate::config::Repository;
use crate::exec;
use crate::git::Vcs;
use crate::matcher::{BranchMatch, BranchRule};
use crate::template::{HookTemplate, HookVars};
use crate::{Error, Result};

/// Clones, pulls and runs hooks for matched workspaces
pub struct WorkspaceSynchronizer<'a> {
    vcs: &'a dyn Vcs,
    hook_timeout: Duration,
}

impl<'a> WorkspaceSynchronizer<'a> {
    pub fn new(vcs: &'a dyn Vcs, hook_timeout: Duration) -> Self {
        Self { vcs, hook_timeout }
    }

    /// Ensure the workspace for `m` exists, is a checkout and is up to date
    ///
    /// The workspace path is registered as deployed before anything can fail,
    /// so a broken workspace is never pruned. Failures are logged and returned
    /// as [`Outcome::SyncFailed`]; they never abort the caller.
    pub async fn ensure_synced(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        rule: &BranchRule,
        m: &BranchMatch,
    ) -> Outcome {
        let target = rule.workspace_path(&m.path_segment);

        if !ctx.deploy(&target) {
            tracing::warn!(
                repo = %repo.id,
                rule = %rule.id,
                branch = %m.remote_branch_name,
                path = %target.display(),
                "Workspace path already deployed in this run; the later branch overwrites it"
            );
        }

        let _guard = ctx.locks().lock(&target).await;

        let outcome = match self.sync_workspace(repo, rule, m, &target).await {
            Ok(cloned) => {
                tracing::info!(
                    repo = %repo.id,
                    branch = %m.remote_branch_name,
                    path = %target.display(),
                    cloned,
                    "Workspace synced"
                );
                Outcome::Synced {
                    branch: m.remote_branch_name.clone(),
                    cloned,
                }
            }
            Err(e) => {
                tracing::warn!(
                    repo = %repo.id,
                    branch = %m.remote_branch_name,
                    path = %target.display(),
                    "Workspace sync failed: {}",
                    e
                );
                Outcome::SyncFailed {
                    branch: m.remote_branch_name.clone(),
                    error: e.to_string(),
                }
            }
        };

        ctx.record(&repo.id, &target, outcome.clone());
        outcome
    }

    /// Returns whether a fresh clone was made
    async fn sync_workspace(
        &self,
        repo: &Repository,
        rule: &BranchRule,
        m: &BranchMatch,
        target: &Path,
    ) -> Result<bool> {
        tokio::fs::create_dir_all(target).await?;

        let cloned = if self.vcs.is_checkout(target) {
            false
        } else {
            tracing::info!(
                repo = %repo.id,
                branch = %m.remote_branch_name,
                path = %target.display(),
                "Cloning"
            );
            self.vcs
                .clone_branch(&repo.repo_url, Some(&m.remote_branch_name), target)
                .await?;
            true
        };

        self.vcs.pull(target).await?;

        let vars = HookVars {
            remote_branch_path: m.path_segment.clone(),
            remote_branch_name: m.remote_branch_name.clone(),
            project_fullpath: target.display().to_string(),
            branch_config_name: rule.id.clone(),
        };
        run_hooks(&rule.scripts, &vars, target, self.hook_timeout).await?;

        Ok(cloned)
    }
}

/// Run hooks in order inside `workdir`, stopping at the first failure
pub(crate) async fn run_hooks(
    hooks: &[HookTemplate],
    vars: &HookVars,
    workdir: &Path,
    timeout: Duration,
) -> Result<()> {
    for hook in hooks {
        let spec = hook.command(vars, workdir).with_timeout(timeout);
        tracing::debug!(path = %workdir.display(), "Running hook: {}", spec.display());
        exec::run(&spec).await.map_err(|e| match e {
            Error::CommandFailed { code, stderr, .. } => Error::Other(format!(
                "hook '{}' exited with {}: {}",
                hook.source(),
                code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr
            )),
            other => Error::Other(format!("hook '{}': {}", hook.source(), other)),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::context::CancellationFlag;
    use crate::sync::engine::tests::FakeVcs;
    use crate::template::ScriptSpec;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn repo(rules: Vec<BranchRule>) -> Repository {
        Repository {
            id: "webapp".to_string(),
            repo_url: "https://example.com/webapp.git".to_string(),
            base_project_path: PathBuf::from("/unused"),
            scripts: Vec::new(),
            rules,
        }
    }

    fn feature_match(name: &str) -> BranchMatch {
        BranchMatch {
            rule_id: "features".to_string(),
            path_segment: name.to_string(),
            remote_branch_name: format!("feature/{}", name),
        }
    }

    #[tokio::test]
    async fn test_first_sync_clones_then_pulls() {
        let dir = TempDir::new().unwrap();
        let holder = dir.path().join("features");
        let rule = BranchRule::new("features", "feature/(.+)", &holder, Vec::new()).unwrap();
        let repo = repo(vec![rule.clone()]);
        let vcs = FakeVcs::new(["feature/a"]);
        let ctx = RunContext::new(["webapp"], CancellationFlag::new());

        let sync = WorkspaceSynchronizer::new(&vcs, Duration::from_secs(5));
        let outcome = sync.ensure_synced(&ctx, &repo, &rule, &feature_match("a")).await;

        assert_eq!(
            outcome,
            Outcome::Synced {
                branch: "feature/a".to_string(),
                cloned: true
            }
        );
        let target = holder.join("a");
        assert!(vcs.is_checkout(&target));
        assert_eq!(vcs.checked_out(&target).as_deref(), Some("feature/a"));
        assert_eq!(vcs.pulls(&target), 1);
        assert!(ctx.deployed_paths().contains(&target));
    }

    #[tokio::test]
    async fn test_second_sync_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let holder = dir.path().join("features");
        let rule = BranchRule::new("features", "feature/(.+)", &holder, Vec::new()).unwrap();
        let repo = repo(vec![rule.clone()]);
        let vcs = FakeVcs::new(["feature/a"]);
        let sync = WorkspaceSynchronizer::new(&vcs, Duration::from_secs(5));

        let ctx = RunContext::new(["webapp"], CancellationFlag::new());
        sync.ensure_synced(&ctx, &repo, &rule, &feature_match("a")).await;
        let ctx = RunContext::new(["webapp"], CancellationFlag::new());
        let outcome = sync.ensure_synced(&ctx, &repo, &rule, &feature_match("a")).await;

        assert_eq!(
            outcome,
            Outcome::Synced {
                branch: "feature/a".to_string(),
                cloned: false
            }
        );
        assert_eq!(vcs.clones(), 1);
        assert_eq!(vcs.pulls(&holder.join("a")), 2);
    }

    #[tokio::test]
    async fn test_failed_clone_is_still_deployed() {
        let dir = TempDir::new().unwrap();
        let holder = dir.path().join("features");
        let rule = BranchRule::new("features", "feature/(.+)", &holder, Vec::new()).unwrap();
        let repo = repo(vec![rule.clone()]);
        let vcs = FakeVcs::new(["feature/a"]);
        vcs.fail_clone("feature/a");
        let ctx = RunContext::new(["webapp"], CancellationFlag::new());

        let sync = WorkspaceSynchronizer::new(&vcs, Duration::from_secs(5));
        let outcome = sync.ensure_synced(&ctx, &repo, &rule, &feature_match("a")).await;

        assert!(matches!(outcome, Outcome::SyncFailed { .. }));
        assert!(ctx.deployed_paths().contains(&holder.join("a")));
        assert!(holder.join("a").exists());
    }

    #[tokio::test]
    async fn test_hooks_receive_substituted_values() {
        let dir = TempDir::new().unwrap();
        let holder = dir.path().join("features");
        let hook = HookTemplate::parse(&ScriptSpec::Argv(vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf '%s|%s|%s|%s' \"$1\" \"$2\" \"$3\" \"$4\" > hook.out".to_string(),
            "hook".to_string(),
            "$__REMOTE_BRANCH_PATH__".to_string(),
            "$__REMOTE_BRANCH_NAME__".to_string(),
            "$__PROJECT_FULLPATH__".to_string(),
            "$__BRANCH_CONFIG_NAME__".to_string(),
        ]))
        .unwrap();
        let rule = BranchRule::new("features", "feature/(.+)", &holder, vec![hook]).unwrap();
        let repo = repo(vec![rule.clone()]);
        let vcs = FakeVcs::new(["feature/a"]);
        let ctx = RunContext::new(["webapp"], CancellationFlag::new());

        let sync = WorkspaceSynchronizer::new(&vcs, Duration::from_secs(5));
        let outcome = sync.ensure_synced(&ctx, &repo, &rule, &feature_match("a")).await;
        assert!(matches!(outcome, Outcome::Synced { .. }), "{:?}", outcome);

        let target = holder.join("a");
        let written = std::fs::read_to_string(target.join("hook.out")).unwrap();
        assert_eq!(
            written,
            format!("a|feature/a|{}|features", target.display())
        );
    }

    #[tokio::test]
    async fn test_failing_hook_reports_failure() {
        let dir = TempDir::new().unwrap();
        let holder = dir.path().join("features");
        let hook = HookTemplate::parse(&ScriptSpec::Line("false".to_string())).unwrap();
        let rule = BranchRule::new("features", "feature/(.+)", &holder, vec![hook]).unwrap();
        let repo = repo(vec![rule.clone()]);
        let vcs = FakeVcs::new(["feature/a"]);
        let ctx = RunContext::new(["webapp"], CancellationFlag::new());

        let sync = WorkspaceSynchronizer::new(&vcs, Duration::from_secs(5));
        let outcome = sync.ensure_synced(&ctx, &repo, &rule, &feature_match("a")).await;

        match outcome {
            Outcome::SyncFailed { error, .. } => assert!(error.contains("hook 'false'")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_segment_equal_to_holder_name_deploys_into_holder() {
        let dir = TempDir::new().unwrap();
        let holder = dir.path().join("master");
        let rule = BranchRule::new("master", "(master)", &holder, Vec::new()).unwrap();
        let repo = repo(vec![rule.clone()]);
        let vcs = FakeVcs::new(["master"]);
        let ctx = RunContext::new(["webapp"], CancellationFlag::new());

        let m = BranchMatch {
            rule_id: "master".to_string(),
            path_segment: "master".to_string(),
            remote_branch_name: "master".to_string(),
        };
        let sync = WorkspaceSynchronizer::new(&vcs, Duration::from_secs(5));
        sync.ensure_synced(&ctx, &repo, &rule, &m).await;

        assert!(vcs.is_checkout(&holder));
        assert!(!holder.join("master").exists());
    }
}
