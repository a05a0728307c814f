//! Per-run outcome report

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to one path during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Base checkout cloned for the first time
    Bootstrapped,
    /// Workspace cloned or pulled, hooks (if any) ran
    Synced { branch: String, cloned: bool },
    /// Clone, pull or a hook failed; the workspace was left as it was
    SyncFailed { branch: String, error: String },
    /// Workspace deleted because no matching remote branch backs it
    Removed,
    /// Stale workspace could not be deleted
    RemoveFailed { error: String },
    /// Repository could not be bootstrapped or listed; it was skipped
    RepositoryUnavailable { error: String },
    /// Not started because the run was cancelled
    Cancelled,
}

impl Outcome {
    /// Whether this outcome should make a strict run fail
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::SyncFailed { .. }
                | Outcome::RemoveFailed { .. }
                | Outcome::RepositoryUnavailable { .. }
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Bootstrapped => write!(f, "cloned base checkout"),
            Outcome::Synced {
                branch,
                cloned: true,
            } => write!(f, "synced with remote branch {} (new clone)", branch),
            Outcome::Synced { branch, .. } => write!(f, "synced with remote branch {}", branch),
            Outcome::SyncFailed { branch, error } => {
                write!(f, "FAILED to sync remote branch {}: {}", branch, error)
            }
            Outcome::Removed => write!(f, "REMOVED! remote branch is no longer available"),
            Outcome::RemoveFailed { error } => {
                write!(f, "FAILED to remove stale workspace: {}", error)
            }
            Outcome::RepositoryUnavailable { error } => {
                write!(f, "repository unavailable, skipped: {}", error)
            }
            Outcome::Cancelled => write!(f, "skipped: run cancelled"),
        }
    }
}

/// Accumulates outcomes keyed by repository and path
///
/// Last write for a (repository, path) key wins.
#[derive(Debug, Default)]
pub struct SyncReport {
    order: Vec<String>,
    entries: HashMap<String, BTreeMap<PathBuf, Outcome>>,
}

impl SyncReport {
    /// Create a report presenting repositories in the given order
    pub fn new<I, S>(repository_order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order: repository_order.into_iter().map(Into::into).collect(),
            entries: HashMap::new(),
        }
    }

    /// Record the outcome for a path
    pub fn record(&mut self, repo_id: &str, path: impl Into<PathBuf>, outcome: Outcome) {
        if !self.order.iter().any(|id| id == repo_id) {
            self.order.push(repo_id.to_string());
        }
        self.entries
            .entry(repo_id.to_string())
            .or_default()
            .insert(path.into(), outcome);
    }

    /// Outcome recorded for a path, if any
    pub fn get(&self, repo_id: &str, path: &std::path::Path) -> Option<&Outcome> {
        self.entries.get(repo_id)?.get(path)
    }

    /// Produce the final report: repositories in order, paths sorted
    pub fn finalize(mut self, started_at: DateTime<Utc>) -> RunReport {
        let repositories = self
            .order
            .iter()
            .filter_map(|id| {
                let entries = self.entries.remove(id)?;
                Some(RepositoryReport {
                    id: id.clone(),
                    entries: entries
                        .into_iter()
                        .map(|(path, outcome)| ReportEntry { path, outcome })
                        .collect(),
                })
            })
            .collect();

        RunReport {
            started_at,
            finished_at: Utc::now(),
            repositories,
        }
    }
}

/// One path's outcome
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Outcomes of one repository, sorted by path
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryReport {
    pub id: String,
    pub entries: Vec<ReportEntry>,
}

/// The finished report of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub repositories: Vec<RepositoryReport>,
}

impl RunReport {
    /// All entries across repositories
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ReportEntry)> {
        self.repositories
            .iter()
            .flat_map(|r| r.entries.iter().map(move |e| (r.id.as_str(), e)))
    }

    /// Whether any entry is a failure
    pub fn has_failures(&self) -> bool {
        self.entries().any(|(_, e)| e.outcome.is_failure())
    }

    /// Entries for a repository
    pub fn repository(&self, id: &str) -> Option<&RepositoryReport> {
        self.repositories.iter().find(|r| r.id == id)
    }

    /// Outcome recorded for a path
    pub fn outcome(&self, repo_id: &str, path: &std::path::Path) -> Option<&Outcome> {
        self.repository(repo_id)?
            .entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| &e.outcome)
    }

    /// Counts of (synced, removed, failed) entries
    pub fn summary(&self) -> (usize, usize, usize) {
        self.entries().fold((0, 0, 0), |(s, r, f), (_, e)| match e.outcome {
            Outcome::Synced { .. } | Outcome::Bootstrapped => (s + 1, r, f),
            Outcome::Removed => (s, r + 1, f),
            ref o if o.is_failure() => (s, r, f + 1),
            _ => (s, r, f),
        })
    }
}
