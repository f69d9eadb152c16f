//! Pull request creation from an analysis record and local git state.

use tracing::info;

use crate::error::Result;
use crate::git::Git;
use crate::github::{GitHubCli, PullRequest};
use crate::issue::AnalysisRecord;

/// Caller-supplied replacements for generated values.
#[derive(Debug, Default, Clone)]
pub struct PrOverrides {
    pub branch: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
}

pub fn pr_title(record: &AnalysisRecord) -> String {
    format!("{} {}", record.issue_type.title_prefix(), record.title)
}

pub fn pr_body(record: &AnalysisRecord, files: &[String], commits: &[String]) -> String {
    let mut body = format!("## Summary\n\n{}\n\nCloses #{}\n", pr_title(record), record.number);
    if !record.url.is_empty() {
        body.push_str(&format!("Issue: {}\n", record.url));
    }
    push_section(
        &mut body,
        "Requirements",
        "_No explicit requirements listed in the issue._",
        record.requirements.iter().map(|r| format!("- {r}")),
    );
    push_section(
        &mut body,
        "Files Changed",
        "_No file changes detected._",
        files.iter().map(|f| format!("- `{f}`")),
    );
    push_section(
        &mut body,
        "Commits",
        "_No commits ahead of the base branch._",
        commits.iter().map(|c| format!("- {c}")),
    );
    push_section(
        &mut body,
        "Test Plan",
        "",
        [
            "- Automated test suite run by the issue workflow",
            "- Review the changed files listed above",
        ]
        .map(String::from)
        .into_iter(),
    );
    body
}

/// `## heading`, then one line per item or `empty` when there are none.
fn push_section(body: &mut String, heading: &str, empty: &str, items: impl Iterator<Item = String>) {
    body.push_str(&format!("\n## {heading}\n\n"));
    let start = body.len();
    for item in items {
        body.push_str(&item);
        body.push('\n');
    }
    if body.len() == start {
        body.push_str(empty);
        body.push('\n');
    }
}

pub struct PrCreator {
    git: Git,
    github: GitHubCli,
    main_branch: String,
    repo: Option<String>,
}

impl PrCreator {
    pub fn new(git: Git, github: GitHubCli, main_branch: impl Into<String>, repo: Option<String>) -> Self {
        Self {
            git,
            github,
            main_branch: main_branch.into(),
            repo,
        }
    }

    /// Title, body and branch the PR would be opened with. Read-only.
    pub async fn prepare(&self, record: &AnalysisRecord, overrides: PrOverrides) -> Result<PullRequest> {
        let head = match overrides.branch {
            Some(branch) => branch,
            None => self.git.current_branch().await?,
        };
        let body = match overrides.body {
            Some(body) => body,
            None => {
                let files = self.git.changed_files(&self.main_branch).await?;
                let commits = self.git.commits_since(&self.main_branch).await?;
                pr_body(record, &files, &commits)
            }
        };
        Ok(PullRequest {
            title: overrides.title.unwrap_or_else(|| pr_title(record)),
            body,
            base: self.main_branch.clone(),
            head,
        })
    }

    /// Push the branch and open the PR. Returns the PR URL.
    pub async fn create(&self, record: &AnalysisRecord, overrides: PrOverrides) -> Result<String> {
        let pr = self.prepare(record, overrides).await?;
        info!(branch = %pr.head, title = %pr.title, "opening pull request");
        self.git.push_upstream(&pr.head).await?;
        self.github
            .create_pull_request(self.repo.as_deref(), &pr)
            .await
    }
}
