//! [`Vcs`] implementation driving the `git` executable

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::branch::normalize_branch_listing;
use super::Vcs;
use crate::exec::{self, CommandSpec};
use crate::{Error, Result};

/// Runs git commands with a per-invocation timeout
#[derive(Debug, Clone)]
pub struct GitCli {
    /// Remote whose branches are listed
    remote: String,
    /// Timeout for every invocation
    timeout: Duration,
}

impl GitCli {
    /// Create a git driver with default settings
    pub fn new() -> Self {
        Self {
            remote: "origin".to_string(),
            timeout: exec::DEFAULT_TIMEOUT,
        }
    }

    /// List branches of a remote other than `origin`
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Set the timeout for every invocation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn git(&self, cwd: &Path) -> CommandSpec {
        CommandSpec::new("git", cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .with_timeout(self.timeout)
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn list_remote_branches(&self, root: &Path) -> Result<BTreeSet<String>> {
        let pattern = format!("{}/*", self.remote);
        let spec = self
            .git(root)
            .args(["branch", "-r", "--no-color", "--list", pattern.as_str()]);
        let output = exec::run(&spec).await?;
        Ok(normalize_branch_listing(&output.stdout, &self.remote))
    }

    async fn clone_branch(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<()> {
        let mut spec = self.git(dest).args(["clone", "--origin", self.remote.as_str()]);
        if let Some(branch) = branch {
            spec = spec.args(["--branch", branch]);
        }
        spec = spec.args([url, "."]);

        match exec::run(&spec).await {
            Ok(_) => Ok(()),
            Err(Error::CommandFailed { stderr, .. }) => Err(describe_clone_failure(url, &stderr)),
            Err(e) => Err(e),
        }
    }

    async fn fetch_all(&self, root: &Path) -> Result<()> {
        let spec = self.git(root).args(["fetch", "--all", "--prune"]);
        exec::run(&spec).await.map(|_| ())
    }

    async fn pull(&self, root: &Path) -> Result<()> {
        let spec = self.git(root).args(["pull", "--ff-only"]);
        exec::run(&spec).await.map(|_| ())
    }

    fn is_checkout(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }
}

/// Turn git clone's stderr into an actionable message
fn describe_clone_failure(url: &str, stderr: &str) -> Error {
    let stderr = stderr.trim();

    if stderr.contains("Authentication failed") || stderr.contains("Permission denied") {
        return Error::Git(format!(
            "Authentication failed for {}. Check your credentials or repository access.",
            url
        ));
    }

    if stderr.contains("Could not resolve host") || stderr.contains("unable to access") {
        return Error::Git(format!(
            "Network error cloning {}. Check your internet connection.",
            url
        ));
    }

    if stderr.contains("Remote branch") && stderr.contains("not found") {
        return Error::Git(format!("Branch not found on {}: {}", url, stderr));
    }

    if stderr.contains("not found") || stderr.contains("does not exist") {
        return Error::Git(format!(
            "Repository not found: {}. Check the URL is correct.",
            url
        ));
    }

    if stderr.contains("already exists and is not an empty directory") {
        return Error::Git(format!(
            "Cannot clone {}: destination is not empty and holds no checkout",
            url
        ));
    }

    Error::Git(format!("git clone failed: {}", stderr))
}
