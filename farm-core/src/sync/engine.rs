//! Run orchestration across repositories

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::context::{CancellationFlag, DeployedPathSet, RunContext};
use super::reconciler::WorkspaceReconciler;
use super::report::{Outcome, RunReport};
use super::synchronizer::{run_hooks, WorkspaceSynchronizer};
use crate::config::{Farm, Repository};
use crate::git::{CheckoutInfo, GitCli, GitRepo, Vcs};
use crate::matcher::match_branch;
use crate::template::HookVars;
use crate::Result;

/// A workspace a sync would deploy
#[derive(Debug, Clone)]
pub struct PlannedWorkspace {
    pub rule_id: String,
    pub branch: String,
    pub path: PathBuf,
    /// Whether the path already holds a checkout
    pub is_checkout: bool,
}

/// What a sync of one repository would do
#[derive(Debug, Clone)]
pub struct RepositoryPlan {
    pub id: String,
    /// Remote branches listed
    pub branches: BTreeSet<String>,
    /// Workspaces that would be cloned or pulled
    pub workspaces: Vec<PlannedWorkspace>,
    /// Paths that would be removed
    pub stale: Vec<PathBuf>,
    /// Why the repository could not be planned
    pub error: Option<String>,
}

/// A workspace found on disk under a holder directory
#[derive(Debug, Clone)]
pub struct WorkspaceStatus {
    pub path: PathBuf,
    /// Checkout details, `None` if the directory is not a checkout
    pub checkout: Option<CheckoutInfo>,
    pub error: Option<String>,
}

/// Workspaces present under one rule's holder directory
#[derive(Debug, Clone)]
pub struct RuleStatus {
    pub repo_id: String,
    pub rule_id: String,
    pub holder_path: PathBuf,
    pub workspaces: Vec<WorkspaceStatus>,
}

/// Runs the reconciliation for a validated [`Farm`]
#[derive(Clone)]
pub struct Engine {
    farm: Arc<Farm>,
    vcs: Arc<dyn Vcs>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("farm", &self.farm)
            .field("vcs", &"<dyn Vcs>")
            .finish()
    }
}

impl Engine {
    /// Create an engine using the given source-control driver
    pub fn new(farm: Farm, vcs: Arc<dyn Vcs>) -> Self {
        Self {
            farm: Arc::new(farm),
            vcs,
        }
    }

    /// Create an engine driving the `git` executable with the farm's settings
    pub fn with_git(farm: Farm) -> Self {
        let git = GitCli::new()
            .with_remote(&farm.settings.remote)
            .with_timeout(farm.settings.git_timeout);
        Self::new(farm, Arc::new(git))
    }

    pub fn farm(&self) -> &Farm {
        &self.farm
    }

    /// Synchronize every repository and return the report
    ///
    /// Repositories run concurrently up to `max_parallel_repositories`.
    /// Per-item failures are recorded in the report, never returned.
    pub async fn run(&self, cancel: CancellationFlag) -> RunReport {
        let ctx = Arc::new(RunContext::new(
            self.farm.repositories.iter().map(|r| r.id.clone()),
            cancel,
        ));

        let semaphore = Arc::new(Semaphore::new(self.farm.settings.max_parallel_repositories.max(1)));
        let mut tasks = JoinSet::new();

        for index in 0..self.farm.repositories.len() {
            let engine = self.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let repo = &engine.farm.repositories[index];

                if ctx.is_cancelled() {
                    ctx.record(&repo.id, &repo.base_project_path, Outcome::Cancelled);
                    return;
                }

                engine.sync_repository(&ctx, repo).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Repository task failed: {}", e);
            }
        }

        ctx.finish()
    }

    /// Synchronize one repository: bootstrap, list, sync matches, prune
    pub async fn sync_repository(&self, ctx: &RunContext, repo: &Repository) {
        let base = &repo.base_project_path;

        if let Err(e) = self.bootstrap(ctx, repo).await {
            tracing::warn!(repo = %repo.id, "Repository unavailable: {}", e);
            ctx.record(
                &repo.id,
                base,
                Outcome::RepositoryUnavailable {
                    error: e.to_string(),
                },
            );
            return;
        }

        let branches = match self.remote_branches(repo).await {
            Ok(branches) => branches,
            Err(e) => {
                tracing::warn!(repo = %repo.id, "Cannot list remote branches: {}", e);
                ctx.record(
                    &repo.id,
                    base,
                    Outcome::RepositoryUnavailable {
                        error: e.to_string(),
                    },
                );
                return;
            }
        };

        tracing::info!(repo = %repo.id, count = branches.len(), "Listed remote branches");

        let synchronizer = WorkspaceSynchronizer::new(self.vcs.as_ref(), self.farm.settings.hook_timeout);
        for branch in &branches {
            for m in match_branch(branch, &repo.rules) {
                if ctx.is_cancelled() {
                    // The deployed set is incomplete; pruning now could delete live workspaces
                    tracing::info!(repo = %repo.id, "Run cancelled; skipping remaining branches and prune");
                    return;
                }

                let Some(rule) = repo.rule(&m.rule_id) else {
                    continue;
                };
                synchronizer.ensure_synced(ctx, repo, rule, &m).await;
            }
        }

        if ctx.is_cancelled() {
            tracing::info!(repo = %repo.id, "Run cancelled; skipping prune");
            return;
        }

        let reconciler = WorkspaceReconciler::new(self.vcs.as_ref());
        let mut pruned = HashSet::new();
        for rule in &repo.rules {
            if pruned.insert(&rule.holder_path) {
                reconciler.prune(ctx, &repo.id, &rule.holder_path).await;
            }
        }
    }

    /// Make sure the repository's base checkout exists
    ///
    /// Clones it on first use and runs the repository's bootstrap scripts
    /// once after that clone. The base path is registered as deployed so a
    /// holder directory containing it never prunes it.
    async fn bootstrap(&self, ctx: &RunContext, repo: &Repository) -> Result<()> {
        let base = &repo.base_project_path;
        ctx.deploy(base);
        let _guard = ctx.locks().lock(base).await;

        if self.vcs.is_checkout(base) {
            return Ok(());
        }

        tokio::fs::create_dir_all(base).await?;
        tracing::info!(repo = %repo.id, path = %base.display(), "Cloning base checkout");
        self.vcs.clone_branch(&repo.repo_url, None, base).await?;

        let vars = HookVars {
            project_fullpath: base.display().to_string(),
            ..HookVars::default()
        };

        match run_hooks(&repo.scripts, &vars, base, self.farm.settings.hook_timeout).await {
            Ok(()) => ctx.record(&repo.id, base, Outcome::Bootstrapped),
            Err(e) => {
                tracing::warn!(repo = %repo.id, "Bootstrap script failed: {}", e);
                ctx.record(
                    &repo.id,
                    base,
                    Outcome::SyncFailed {
                        branch: "(default)".to_string(),
                        error: e.to_string(),
                    },
                );
            }
        }

        Ok(())
    }

    /// Fetch, then list the remote branches of the base checkout
    ///
    /// A failed fetch is only logged; listing proceeds on the last fetched refs.
    async fn remote_branches(&self, repo: &Repository) -> Result<BTreeSet<String>> {
        let base = &repo.base_project_path;
        if let Err(e) = self.vcs.fetch_all(base).await {
            tracing::warn!(repo = %repo.id, "git fetch failed, using last fetched refs: {}", e);
        }
        self.vcs.list_remote_branches(base).await
    }

    /// Work out what a sync would do without changing any workspace
    ///
    /// Still fetches in base checkouts so the listing is current.
    pub async fn plan(&self) -> Vec<RepositoryPlan> {
        let mut plans = Vec::with_capacity(self.farm.repositories.len());
        for repo in &self.farm.repositories {
            plans.push(self.plan_repository(repo).await);
        }
        plans
    }

    async fn plan_repository(&self, repo: &Repository) -> RepositoryPlan {
        let mut plan = RepositoryPlan {
            id: repo.id.clone(),
            branches: BTreeSet::new(),
            workspaces: Vec::new(),
            stale: Vec::new(),
            error: None,
        };

        if !self.vcs.is_checkout(&repo.base_project_path) {
            plan.error = Some(format!(
                "base checkout {} does not exist yet; it will be cloned on sync",
                repo.base_project_path.display()
            ));
            return plan;
        }

        plan.branches = match self.remote_branches(repo).await {
            Ok(branches) => branches,
            Err(e) => {
                plan.error = Some(e.to_string());
                return plan;
            }
        };

        let mut deployed = DeployedPathSet::default();
        deployed.insert(&repo.base_project_path);

        for branch in &plan.branches {
            for m in match_branch(branch, &repo.rules) {
                let Some(rule) = repo.rule(&m.rule_id) else {
                    continue;
                };
                let path = rule.workspace_path(&m.path_segment);
                deployed.insert(&path);
                plan.workspaces.push(PlannedWorkspace {
                    rule_id: m.rule_id,
                    branch: m.remote_branch_name,
                    is_checkout: self.vcs.is_checkout(&path),
                    path,
                });
            }
        }

        let reconciler = WorkspaceReconciler::new(self.vcs.as_ref());
        let mut seen = HashSet::new();
        for rule in &repo.rules {
            if !seen.insert(&rule.holder_path) {
                continue;
            }
            match reconciler.stale_children(&rule.holder_path, &deployed) {
                Ok(stale) => plan.stale.extend(stale),
                Err(e) => {
                    plan.error = Some(format!(
                        "cannot list {}: {}",
                        rule.holder_path.display(),
                        e
                    ));
                }
            }
        }

        plan
    }

    /// List the workspaces currently on disk for every rule
    pub fn status(&self) -> Vec<RuleStatus> {
        let mut statuses = Vec::new();

        for repo in &self.farm.repositories {
            for rule in &repo.rules {
                let holder = &rule.holder_path;
                let paths = if self.vcs.is_checkout(holder) {
                    vec![holder.clone()]
                } else {
                    list_dirs(holder)
                };

                let workspaces = paths
                    .into_iter()
                    .map(|path| self.workspace_status(path))
                    .collect();

                statuses.push(RuleStatus {
                    repo_id: repo.id.clone(),
                    rule_id: rule.id.clone(),
                    holder_path: holder.clone(),
                    workspaces,
                });
            }
        }

        statuses
    }

    fn workspace_status(&self, path: PathBuf) -> WorkspaceStatus {
        if !self.vcs.is_checkout(&path) {
            return WorkspaceStatus {
                path,
                checkout: None,
                error: None,
            };
        }

        match GitRepo::inspect(&path) {
            Ok(info) => WorkspaceStatus {
                path,
                checkout: Some(info),
                error: None,
            },
            Err(e) => WorkspaceStatus {
                path,
                checkout: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Sorted subdirectories of `dir`; empty if it cannot be read
fn list_dirs(dir: &std::path::Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}
