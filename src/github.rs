//! GitHub access through the `gh` CLI.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{BasekitError, Result};
use crate::exec::{CommandRunner, CommandSpec};

/// Issue fields as returned by `gh issue view --json`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

impl GitHubIssue {
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }

    /// `gh` reports `OPEN` or `CLOSED`; an absent state counts as open.
    pub fn is_closed(&self) -> bool {
        self.state.eq_ignore_ascii_case("closed")
    }
}

/// A pull request about to be opened.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    pub title: String,
    pub body: String,
    pub base: String,
    pub head: String,
}

/// Parse the `owner/repo` slug from a git remote URL.
///
/// Handles `git@github.com:owner/repo.git`, `ssh://git@github.com/owner/repo`,
/// `https://github.com/owner/repo(.git)` and token-embedded HTTPS URLs.
pub fn parse_repo_slug(url: &str) -> Option<String> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("git@github.com:") {
        rest
    } else {
        let without_scheme = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .or_else(|| url.strip_prefix("ssh://"))?;
        // Drop any `user[:token]@` prefix.
        let host_path = without_scheme
            .rsplit_once('@')
            .map_or(without_scheme, |(_, rest)| rest);
        host_path.strip_prefix("github.com/")?
    };

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() == 2 && parts.iter().all(|p| !p.is_empty()) {
        Some(format!("{}/{}", parts[0], parts[1]))
    } else {
        None
    }
}

pub struct GitHubCli {
    runner: Arc<dyn CommandRunner>,
}

impl GitHubCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn ensure_auth(&self) -> Result<()> {
        let authed = self
            .runner
            .succeeds(&CommandSpec::new("gh").args(["auth", "status"]))
            .await?;
        if authed {
            Ok(())
        } else {
            Err(BasekitError::GitHubAuth)
        }
    }

    pub async fn fetch_issue(&self, repo: &str, number: u64) -> Result<GitHubIssue> {
        debug!(repo, number, "fetching issue");
        let output = self
            .runner
            .run(&CommandSpec::new("gh").args([
                "issue",
                "view",
                &number.to_string(),
                "--repo",
                repo,
                "--json",
                "number,title,body,labels,state,url",
            ]))
            .await?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    /// Open the pull request and return its URL.
    pub async fn create_pull_request(&self, repo: Option<&str>, pr: &PullRequest) -> Result<String> {
        let mut spec = CommandSpec::new("gh").args([
            "pr", "create", "--title", &pr.title, "--body", &pr.body, "--base", &pr.base,
            "--head", &pr.head,
        ]);
        if let Some(repo) = repo {
            spec = spec.args(["--repo", repo]);
        }
        let output = self.runner.run(&spec).await?;
        let url = output.stdout_text();
        info!(url = %url, "pull request created");
        Ok(url)
    }
}
