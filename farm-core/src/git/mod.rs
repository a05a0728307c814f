//! Git operations for branchfarm
//!
//! The synchronization engine talks to source control only through the
//! [`Vcs`] trait. [`GitCli`] implements it by running the `git` executable;
//! [`GitRepo`] reads checkouts in-process through git2 for status reporting.

mod branch;
mod cli;
mod repo;

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;

use crate::Result;

pub use branch::normalize_branch_listing;
pub use cli::GitCli;
pub use repo::{CheckoutInfo, GitRepo};

/// Effectful source-control operations needed by the engine
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Normalized names of the remote branches visible from `root`
    async fn list_remote_branches(&self, root: &Path) -> Result<BTreeSet<String>>;

    /// Clone `url` into the existing directory `dest`, checking out `branch`
    /// (the remote's default branch when `None`)
    async fn clone_branch(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<()>;

    /// Fetch all remotes of the checkout at `root`, pruning deleted branches
    async fn fetch_all(&self, root: &Path) -> Result<()>;

    /// Pull the currently checked-out branch of `root`
    async fn pull(&self, root: &Path) -> Result<()>;

    /// Whether `path` holds a checkout
    fn is_checkout(&self, path: &Path) -> bool;
}
