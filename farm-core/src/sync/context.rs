//! State shared by the components of one run

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use super::report::{Outcome, RunReport, SyncReport};

/// Workspace paths that should exist after the current run
#[derive(Debug, Default, Clone)]
pub struct DeployedPathSet {
    paths: HashSet<PathBuf>,
}

impl DeployedPathSet {
    /// Register a path; returns `false` if it was already registered
    pub fn insert(&mut self, path: impl Into<PathBuf>) -> bool {
        self.paths.insert(path.into())
    }

    /// Whether exactly `path` is registered
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Whether `path` is registered or is an ancestor of a registered path
    ///
    /// A workspace with a nested segment (`holder/a/b`) keeps `holder/a`.
    pub fn covers(&self, path: &Path) -> bool {
        self.contains(path) || self.paths.iter().any(|p| p.starts_with(path))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }
}

/// Async locks keyed by absolute workspace path
///
/// Any operation touching a workspace holds its lock, so two operations
/// never target the same path at once.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    /// Wait for exclusive access to `path`
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(path.to_path_buf()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Cloneable flag that stops a run from starting new work
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one run accumulates
///
/// Created per run, shared by reference between the repository tasks, and
/// consumed by [`RunContext::into_report`].
#[derive(Debug)]
pub struct RunContext {
    started_at: DateTime<Utc>,
    deployed: Mutex<DeployedPathSet>,
    report: Mutex<SyncReport>,
    locks: PathLocks,
    cancel: CancellationFlag,
}

impl RunContext {
    /// Create a context whose report lists repositories in the given order
    pub fn new<I, S>(repository_order: I, cancel: CancellationFlag) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            started_at: Utc::now(),
            deployed: Mutex::new(DeployedPathSet::default()),
            report: Mutex::new(SyncReport::new(repository_order)),
            locks: PathLocks::default(),
            cancel,
        }
    }

    /// Register a path as deployed; returns `false` if already registered
    pub fn deploy(&self, path: &Path) -> bool {
        self.deployed().insert(path)
    }

    /// Snapshot of the deployed set
    pub fn deployed_paths(&self) -> DeployedPathSet {
        self.deployed().clone()
    }

    /// Whether the deployed set covers `path`
    pub fn is_deployed(&self, path: &Path) -> bool {
        self.deployed().covers(path)
    }

    /// Record an outcome
    pub fn record(&self, repo_id: &str, path: &Path, outcome: Outcome) {
        self.report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(repo_id, path, outcome);
    }

    /// Path locks for this run
    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Whether the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Finish the run, taking the accumulated report
    pub fn finish(&self) -> RunReport {
        let report = std::mem::take(&mut *self.report.lock().unwrap_or_else(|e| e.into_inner()));
        report.finalize(self.started_at)
    }

    /// Finish the run, consuming the context
    pub fn into_report(self) -> RunReport {
        self.finish()
    }

    fn deployed(&self) -> MutexGuard<'_, DeployedPathSet> {
        self.deployed.lock().unwrap_or_else(|e| e.into_inner())
    }
}
