//! Issue references, issue types and the analysis record.

pub mod analyzer;
mod record;

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BasekitError, Result};

pub use record::AnalysisRecord;

static ISSUE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/issues/(\d+)(?:[/?#]|$)").expect("valid issue url regex"));
static ISSUE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?(\d+)$").expect("valid issue number regex"));

/// Parse an issue number from `123`, `#123` or an issue URL.
pub fn parse_issue_ref(reference: &str) -> Result<u64> {
    let trimmed = reference.trim();
    let digits = ISSUE_URL
        .captures(trimmed)
        .or_else(|| ISSUE_NUMBER.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());

    digits
        .and_then(|d| d.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| BasekitError::InvalidIssueRef(reference.to_string()))
}

/// Kind of change an issue asks for. Drives branch prefixes and PR titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Fix,
    Feature,
    Enhancement,
    Docs,
    Test,
    Other,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Fix => "fix",
            IssueType::Feature => "feature",
            IssueType::Enhancement => "enhancement",
            IssueType::Docs => "docs",
            IssueType::Test => "test",
            IssueType::Other => "other",
        }
    }

    /// Pull request title prefix.
    pub fn title_prefix(&self) -> &'static str {
        match self {
            IssueType::Fix => "Fix:",
            IssueType::Feature => "Feature:",
            IssueType::Enhancement => "Enhancement:",
            IssueType::Docs => "Docs:",
            IssueType::Test => "Test:",
            IssueType::Other => "Chore:",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fix" => Ok(IssueType::Fix),
            "feature" => Ok(IssueType::Feature),
            "enhancement" => Ok(IssueType::Enhancement),
            "docs" => Ok(IssueType::Docs),
            "test" => Ok(IssueType::Test),
            "other" => Ok(IssueType::Other),
            other => Err(format!("unknown issue type '{other}'")),
        }
    }
}
