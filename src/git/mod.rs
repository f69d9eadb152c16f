//! Thin async wrapper over the `git` CLI.

mod branch;

use std::sync::Arc;

use tracing::debug;

use crate::error::{BasekitError, Result};
use crate::exec::{CommandRunner, CommandSpec};

pub use branch::BranchManager;

#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn CommandRunner>,
    remote: String,
}

impl Git {
    pub fn new(runner: Arc<dyn CommandRunner>, remote: impl Into<String>) -> Self {
        Self {
            runner,
            remote: remote.into(),
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn spec(args: &[&str]) -> CommandSpec {
        CommandSpec::new("git").args(args.iter().copied())
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        Ok(self.runner.run(&Self::spec(args)).await?.stdout_text())
    }

    /// Run git and report whether it exited successfully.
    pub async fn check(&self, args: &[&str]) -> Result<bool> {
        self.runner.succeeds(&Self::spec(args)).await
    }

    pub async fn current_branch(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    pub async fn is_clean(&self) -> Result<bool> {
        Ok(self.run(&["status", "--porcelain"]).await?.is_empty())
    }

    pub async fn local_branch_exists(&self, name: &str) -> Result<bool> {
        let reference = format!("refs/heads/{name}");
        self.check(&["show-ref", "--verify", "--quiet", &reference])
            .await
    }

    pub async fn remote_branch_exists(&self, name: &str) -> Result<bool> {
        let spec = Self::spec(&["ls-remote", "--exit-code", "--heads", self.remote.as_str(), name]);
        let output = self.runner.output(&spec).await?;
        // ls-remote exits 2 when the remote answered but had no matching ref.
        match output.code {
            Some(0) => Ok(true),
            Some(2) => Ok(false),
            code => Err(BasekitError::CommandFailed {
                command: spec.display(),
                code,
                stderr: output.stderr_text(),
            }),
        }
    }

    pub async fn remote_url(&self) -> Result<String> {
        self.run(&["remote", "get-url", self.remote.as_str()]).await
    }

    /// Files changed on `HEAD` since it diverged from `base`.
    pub async fn changed_files(&self, base: &str) -> Result<Vec<String>> {
        let range = format!("{base}...HEAD");
        Ok(lines(&self.run(&["diff", "--name-only", &range]).await?))
    }

    /// One-line summaries of commits on `HEAD` that are not on `base`.
    pub async fn commits_since(&self, base: &str) -> Result<Vec<String>> {
        let range = format!("{base}..HEAD");
        Ok(lines(&self.run(&["log", &range, "--oneline"]).await?))
    }

    /// `(ahead, behind)` of `HEAD` relative to `base`.
    pub async fn ahead_behind(&self, base: &str) -> Result<(u32, u32)> {
        let range = format!("{base}...HEAD");
        let counts = self
            .run(&["rev-list", "--left-right", "--count", &range])
            .await?;
        let mut parts = counts.split_whitespace().map(|n| n.parse::<u32>().unwrap_or(0));
        let behind = parts.next().unwrap_or(0);
        let ahead = parts.next().unwrap_or(0);
        Ok((ahead, behind))
    }

    pub async fn local_branches(&self) -> Result<Vec<String>> {
        let out = self
            .run(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .await?;
        Ok(lines(&out))
    }

    pub async fn checkout(&self, name: &str) -> Result<()> {
        self.run(&["checkout", name]).await.map(drop)
    }

    pub async fn push_upstream(&self, branch: &str) -> Result<()> {
        self.run(&["push", "-u", self.remote.as_str(), branch]).await.map(drop)
    }

    /// Stage everything and commit. Returns the new commit id, or `None`
    /// when there was nothing to commit.
    pub async fn commit_all(&self, message: &str) -> Result<Option<String>> {
        self.run(&["add", "-A"]).await?;
        if self.run(&["diff", "--cached", "--name-only"]).await?.is_empty() {
            debug!("nothing staged, skipping commit");
            return Ok(None);
        }
        self.run(&["commit", "-m", message]).await?;
        Ok(Some(self.run(&["rev-parse", "HEAD"]).await?))
    }
}

fn lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
