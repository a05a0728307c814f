//! Branch-to-workspace reconciliation
//!
//! One run lists each repository's remote branches, matches them against the
//! repository's branch rules, brings every matched workspace up to date and
//! finally prunes workspace directories no remote branch backs any more.
//! All run state lives in a [`RunContext`] created for that run.

mod context;
mod engine;
mod reconciler;
mod report;
mod synchronizer;

pub use context::{CancellationFlag, DeployedPathSet, PathLocks, RunContext};
pub use engine::{Engine, PlannedWorkspace, RepositoryPlan, RuleStatus, WorkspaceStatus};
pub use reconciler::WorkspaceReconciler;
pub use report::{Outcome, ReportEntry, RepositoryReport, RunReport, SyncReport};
pub use synchronizer::WorkspaceSynchronizer;
