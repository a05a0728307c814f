//! Removal of workspaces no remote branch backs any more

use std::io;
use std::path::{Path, PathBuf};

use super::context::{DeployedPathSet, RunContext};
use super::report::Outcome;
use crate::git::Vcs;

/// Prunes holder directories against the run's deployed set
pub struct WorkspaceReconciler<'a> {
    vcs: &'a dyn Vcs,
}

impl<'a> WorkspaceReconciler<'a> {
    pub fn new(vcs: &'a dyn Vcs) -> Self {
        Self { vcs }
    }

    /// Children of `holder` the deployed set does not cover
    ///
    /// Empty when the holder does not exist or is itself a checkout (a rule
    /// whose branch deploys into the holder directory).
    pub fn stale_children(&self, holder: &Path, deployed: &DeployedPathSet) -> io::Result<Vec<PathBuf>> {
        if !holder.is_dir() || self.vcs.is_checkout(holder) {
            return Ok(Vec::new());
        }

        let mut stale = Vec::new();
        for entry in std::fs::read_dir(holder)? {
            let path = entry?.path();
            if !deployed.covers(&path) {
                stale.push(path);
            }
        }
        stale.sort();
        Ok(stale)
    }

    /// Delete every stale child of `holder`, recording each outcome
    ///
    /// Must run only after every match of the holder's rule has been
    /// synchronized. A failed deletion is recorded and the remaining
    /// children are still processed. Returns the paths removed.
    pub async fn prune(&self, ctx: &RunContext, repo_id: &str, holder: &Path) -> Vec<PathBuf> {
        let stale = match self.stale_children(holder, &ctx.deployed_paths()) {
            Ok(stale) => stale,
            Err(e) => {
                tracing::warn!(repo = %repo_id, holder = %holder.display(), "Cannot list holder directory: {}", e);
                ctx.record(
                    repo_id,
                    holder,
                    Outcome::RemoveFailed {
                        error: format!("cannot list directory: {}", e),
                    },
                );
                return Vec::new();
            }
        };

        let mut removed = Vec::new();
        for path in stale {
            if ctx.is_cancelled() {
                tracing::info!(repo = %repo_id, "Run cancelled; stopping prune");
                break;
            }

            let _guard = ctx.locks().lock(&path).await;

            // A sibling repository task may have deployed it meanwhile
            if ctx.is_deployed(&path) {
                continue;
            }

            match remove_path(&path).await {
                Ok(()) => {
                    tracing::info!(repo = %repo_id, path = %path.display(), "Removed stale workspace");
                    ctx.record(repo_id, &path, Outcome::Removed);
                    removed.push(path);
                }
                Err(e) => {
                    tracing::warn!(repo = %repo_id, path = %path.display(), "Failed to remove stale workspace: {}", e);
                    ctx.record(
                        repo_id,
                        &path,
                        Outcome::RemoveFailed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        removed
    }
}

/// Remove a directory tree, or a single file or symlink
async fn remove_path(path: &Path) -> io::Result<()> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}
