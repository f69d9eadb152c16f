//! Derives an [`AnalysisRecord`] from a GitHub issue.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use super::{AnalysisRecord, IssueType};
use crate::error::{BasekitError, Result};
use crate::git::Git;
use crate::github::{GitHubCli, GitHubIssue, parse_repo_slug};

const BRANCH_SLUG_MAX: usize = 50;

static CHECKLIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-*]\s*\[[ xX]\]\s*(.+)").expect("valid checklist regex"));
static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\d+\.[ \t]*(.+)").expect("valid numbered regex"));
static CRITERIA_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:acceptance criteria|requirements?)[:\s]*\n((?:[ \t]*[-*][ \t]*.+\n?)+)")
        .expect("valid criteria regex")
});
static BULLET_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-*][ \t]*(.+)").expect("valid bullet regex"));
static CHECKBOX_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[ xX]\]\s*").expect("valid checkbox regex"));
static QUOTED_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`([^`]+\.(?:py|js|html|css|md|txt|json|yml|yaml))`").expect("valid file regex")
});
static PYTHON_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*\.py)\b").expect("valid py regex"));
static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid slug regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid ws regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

const COMPLEXITY_KEYWORDS: &[(Complexity, &[&str])] = &[
    (
        Complexity::Simple,
        &["typo", "documentation", "readme", "comment"],
    ),
    (
        Complexity::Medium,
        &["feature", "endpoint", "view", "model", "form"],
    ),
    (
        Complexity::Complex,
        &["authentication", "deployment", "database", "migration", "security"],
    ),
];

/// Classify from labels first, then from words in the title.
pub fn classify(labels: &[String], title: &str) -> IssueType {
    let has = |names: &[&str]| labels.iter().any(|l| names.contains(&l.to_lowercase().as_str()));
    if has(&["bug", "fix"]) {
        return IssueType::Fix;
    }
    if has(&["enhancement", "improvement"]) {
        return IssueType::Enhancement;
    }
    if has(&["feature", "new"]) {
        return IssueType::Feature;
    }
    if has(&["docs", "documentation"]) {
        return IssueType::Docs;
    }
    if has(&["test"]) {
        return IssueType::Test;
    }

    let title = title.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| title.contains(w));
    if mentions(&["fix", "bug", "error", "issue"]) {
        IssueType::Fix
    } else if mentions(&["add", "new", "create", "implement"]) {
        IssueType::Feature
    } else if mentions(&["improve", "enhance", "update"]) {
        IssueType::Enhancement
    } else {
        IssueType::Feature
    }
}

/// `<type>/issue-<N>-<slug>` with the slug capped at 50 characters.
pub fn branch_name(issue_type: IssueType, number: u64, title: &str) -> String {
    let lowered = title.to_lowercase();
    let cleaned = NON_SLUG.replace_all(&lowered, "");
    let slug = WHITESPACE.replace_all(cleaned.trim(), "-");
    let slug: String = slug.chars().take(BRANCH_SLUG_MAX).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        format!("{issue_type}/issue-{number}")
    } else {
        format!("{issue_type}/issue-{number}-{slug}")
    }
}

/// Checklist, numbered and acceptance-criteria items, in that order,
/// trimmed and de-duplicated.
pub fn extract_requirements(body: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    found.extend(CHECKLIST_ITEM.captures_iter(body).map(|c| c[1].to_string()));
    found.extend(NUMBERED_ITEM.captures_iter(body).map(|c| c[1].to_string()));
    if let Some(block) = CRITERIA_BLOCK.captures(body) {
        found.extend(
            BULLET_ITEM
                .captures_iter(&block[1])
                .map(|c| CHECKBOX_PREFIX.replace(&c[1], "").into_owned()),
        );
    }

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty() && seen.insert(r.clone()))
        .collect()
}

pub fn assess_complexity(title: &str, body: &str, requirement_count: usize) -> Complexity {
    let text = format!("{title} {body}").to_lowercase();
    for (complexity, keywords) in COMPLEXITY_KEYWORDS {
        if keywords.iter().any(|k| text.contains(k)) {
            return *complexity;
        }
    }
    match requirement_count {
        0..=2 => Complexity::Simple,
        3..=5 => Complexity::Medium,
        _ => Complexity::Complex,
    }
}

/// Explicitly mentioned files plus files implied by keywords, sorted.
pub fn files_to_modify(title: &str, body: &str) -> Vec<String> {
    let text = format!("{title} {body}").to_lowercase();
    let mut files = BTreeSet::new();

    files.extend(QUOTED_FILE.captures_iter(&text).map(|c| c[1].to_string()));
    files.extend(PYTHON_FILE.captures_iter(&text).map(|c| c[1].to_string()));

    let mentions = |words: &[&str]| words.iter().any(|w| text.contains(w));
    let inferred: &[(&[&str], &[&str])] = &[
        (&["model", "database"], &["models.py"]),
        (&["api", "endpoint"], &["views.py", "serializers.py", "urls.py"]),
        (&["admin"], &["admin.py"]),
        (&["test"], &["tests.py"]),
        (&["migration"], &["migrations/"]),
        (
            &["deployment", "docker"],
            &["Dockerfile", "docker-compose.yml", "requirements.txt"],
        ),
    ];
    for &(keywords, implied) in inferred {
        if mentions(keywords) {
            files.extend(implied.iter().map(|f| f.to_string()));
        }
    }

    files.into_iter().collect()
}

/// Build the record from a fetched issue. Pure.
pub fn analyze_issue(issue: &GitHubIssue) -> AnalysisRecord {
    let body = issue.body.clone().unwrap_or_default();
    let labels = issue.label_names();
    let issue_type = classify(&labels, &issue.title);
    let requirements = extract_requirements(&body);
    let complexity = assess_complexity(&issue.title, &body, requirements.len());

    AnalysisRecord {
        number: issue.number,
        branch_name: branch_name(issue_type, issue.number, &issue.title),
        files_to_modify: files_to_modify(&issue.title, &body),
        complexity: complexity.as_str().to_string(),
        title: issue.title.clone(),
        issue_type,
        requirements,
        labels,
        url: issue.url.clone(),
        body,
    }
}

/// Fetches issues through `gh` and analyzes them.
pub struct IssueAnalyzer {
    github: GitHubCli,
    git: Git,
    repo: Option<String>,
}

impl IssueAnalyzer {
    pub fn new(github: GitHubCli, git: Git, repo: Option<String>) -> Self {
        Self { github, git, repo }
    }

    /// Configured `owner/repo`, or the one behind the git remote.
    pub async fn repository(&self) -> Result<String> {
        if let Some(repo) = &self.repo {
            return Ok(repo.clone());
        }
        let url = self.git.remote_url().await?;
        parse_repo_slug(&url).ok_or(BasekitError::UnknownRepository(url))
    }

    pub async fn fetch(&self, number: u64) -> Result<GitHubIssue> {
        let repo = self.repository().await?;
        let issue = self.github.fetch_issue(&repo, number).await?;
        if issue.is_closed() {
            warn!(issue = number, "issue is already closed");
        }
        Ok(issue)
    }

    pub async fn analyze(&self, number: u64) -> Result<AnalysisRecord> {
        let record = analyze_issue(&self.fetch(number).await?);
        info!(
            issue = record.number,
            issue_type = %record.issue_type,
            complexity = %record.complexity,
            branch = %record.branch_name,
            "issue analyzed"
        );
        Ok(record)
    }
}
