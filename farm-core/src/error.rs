//! Error types for branchfarm

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for branchfarm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for branchfarm operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid configuration; fatal to the run
    #[error("Configuration error: {0}")]
    Config(String),

    /// Git repository error (opening or reading a checkout)
    #[error("Git error: {0}")]
    Git(String),

    /// An external command could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An external command exited unsuccessfully
    #[error("{program} failed in {}: {stderr}", cwd.display())]
    CommandFailed {
        program: String,
        cwd: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    /// An external command exceeded its timeout and was killed
    #[error("{program} timed out after {}s in {}", after.as_secs(), cwd.display())]
    Timeout {
        program: String,
        cwd: PathBuf,
        after: Duration,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<git2::Error> for Error {
    fn from(e: git2::Error) -> Self {
        Error::Git(e.message().to_string())
    }
}
