//! Branchfarm Core - keeps a directory of checkouts in step with remote branches
//!
//! For every configured repository this crate lists the remote branches,
//! maps each one that matches a branch rule to a workspace directory,
//! clones or pulls that workspace, runs the rule's hook scripts and removes
//! workspaces whose branch disappeared from the remote.

pub mod config;
pub mod error;
pub mod exec;
pub mod git;
pub mod matcher;
pub mod sync;
pub mod template;

pub use config::{BranchRuleConfig, Config, Farm, Repository, RepositoryConfig, Settings};
pub use error::{Error, Result};
pub use exec::{CommandOutput, CommandSpec};
pub use git::{normalize_branch_listing, CheckoutInfo, GitCli, GitRepo, Vcs};
pub use matcher::{match_branch, workspace_path, BranchMatch, BranchRule};
pub use sync::{
    CancellationFlag, DeployedPathSet, Engine, Outcome, PathLocks, PlannedWorkspace,
    RepositoryPlan, RepositoryReport, ReportEntry, RuleStatus, RunContext, RunReport,
    SyncReport, WorkspaceReconciler, WorkspaceStatus, WorkspaceSynchronizer,
};
pub use template::{HookTemplate, HookVars, Placeholder, ScriptSpec};
