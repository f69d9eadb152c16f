//! Typed errors for basekit.
//!
//! Everything in here is fatal: the binary prints the message and exits with
//! code 1. Advisory conditions (failing tests, missing security headers) are
//! logged with `tracing::warn!` instead and never become an error.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BasekitError>;

/// Where a conflicting branch was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchLocation {
    Local,
    Remote,
}

impl std::fmt::Display for BranchLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchLocation::Local => f.write_str("locally"),
            BranchLocation::Remote => f.write_str("on the remote"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BasekitError {
    #[error("Required tool '{tool}' is not installed or not on PATH")]
    ToolMissing { tool: String },

    #[error("`{command}` exited with code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Working directory has uncommitted changes; commit or stash them first")]
    DirtyWorkingTree,

    #[error("Branch '{name}' already exists {location}")]
    BranchExists {
        name: String,
        location: BranchLocation,
    },

    #[error("Branch '{name}' does not exist locally or on the remote")]
    BranchNotFound { name: String },

    #[error("Refusing to delete protected branch '{name}'")]
    ProtectedBranch { name: String },

    #[error("No analysis found for issue #{issue} (expected {})", path.display())]
    AnalysisMissing { issue: u64, path: PathBuf },

    #[error("Could not parse issue number from '{0}'")]
    InvalidIssueRef(String),

    #[error("Could not determine GitHub repository from remote URL '{0}'")]
    UnknownRepository(String),

    #[error("GitHub CLI is not authenticated; run `gh auth login`")]
    GitHubAuth,

    #[error("No backup files found in {}", .0.display())]
    NoBackups(PathBuf),

    #[error("Database dump produced no output")]
    EmptyDump,

    #[error("Aborted by user")]
    Aborted,

    #[error("Deployment verification failed: {0}")]
    Verification(String),

    #[error("Invalid configuration value for {key}: {value}")]
    Config { key: String, value: String },

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Streaming data through `{command}` failed: {source}")]
    Stream {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl BasekitError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BasekitError::Io {
            path: path.into(),
            source,
        }
    }
}
