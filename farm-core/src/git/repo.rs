//! In-process inspection of workspace checkouts

use std::path::{Path, PathBuf};

use git2::Repository;

use crate::{Error, Result};

/// What a workspace currently has checked out
#[derive(Debug, Clone)]
pub struct CheckoutInfo {
    /// Workspace path
    pub path: PathBuf,
    /// Checked-out branch, `None` when detached or unborn
    pub branch: Option<String>,
    /// HEAD commit SHA, `None` when unborn
    pub commit: Option<String>,
}

/// A git checkout opened through git2
pub struct GitRepo {
    /// The underlying git2 repository
    repo: Repository,
    /// Path to the repository root
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open the checkout rooted exactly at `path`
    ///
    /// Unlike discovery this does not search parent directories, so a plain
    /// directory nested inside some other checkout is not mistaken for one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::open(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Git(format!("Not a git checkout: {}", path.display()))
            } else {
                Error::Git(format!("Failed to open {}: {}", path.display(), e.message()))
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Git("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(Error::Git(format!("Failed to get HEAD: {}", e.message()))),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }

    /// Get the SHA of the HEAD commit
    pub fn head_commit(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit()?;
                Ok(Some(commit.id().to_string()))
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Summarize the checkout at `path`
    pub fn inspect(path: impl AsRef<Path>) -> Result<CheckoutInfo> {
        let repo = Self::open(path.as_ref())?;
        Ok(CheckoutInfo {
            path: path.as_ref().to_path_buf(),
            branch: repo.current_branch()?,
            commit: repo.head_commit()?,
        })
    }
}
