use std::path::Path;

use serde::{Deserialize, Serialize};

use super::IssueType;
use crate::error::{BasekitError, Result};

/// Everything the pipeline needs to know about one issue.
///
/// On disk the record is wrapped as `{"issue": {...}}` so files written by
/// older tooling remain readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub complexity: String,
    pub branch_name: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub files_to_modify: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    issue: T,
}

impl AnalysisRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&Envelope { issue: self })?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: Envelope<AnalysisRecord> = serde_json::from_str(json)?;
        Ok(envelope.issue)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| BasekitError::io(parent, e))?;
        }
        std::fs::write(path, self.to_json()?).map_err(|e| BasekitError::io(path, e))
    }

    /// Load the record for `issue`, reporting a missing file as
    /// [`BasekitError::AnalysisMissing`].
    pub fn load(path: &Path, issue: u64) -> Result<Self> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BasekitError::AnalysisMissing {
                    issue,
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(BasekitError::io(path, e)),
        };
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> AnalysisRecord {
        AnalysisRecord {
            number: 12,
            title: "Fix login redirect".to_string(),
            body: "Users land on 404".to_string(),
            issue_type: IssueType::Fix,
            complexity: "medium".to_string(),
            branch_name: "fix/issue-12-fix-login-redirect".to_string(),
            requirements: vec!["Redirect to dashboard".to_string()],
            files_to_modify: vec!["views.py".to_string()],
            labels: vec!["bug".to_string()],
            url: "https://github.com/acme/base/issues/12".to_string(),
        }
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issue-12-analysis.json");
        sample().save(&path).unwrap();
        assert_eq!(AnalysisRecord::load(&path, 12).unwrap(), sample());
    }

    #[test]
    fn written_json_is_wrapped_in_issue_key() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["issue"]["type"], "fix");
        assert_eq!(value["issue"]["branch_name"], "fix/issue-12-fix-login-redirect");
    }

    #[test]
    fn reads_minimal_record() {
        let json = r#"{"issue": {"number": 3, "title": "Docs", "type": "docs",
            "complexity": "simple", "branch_name": "docs/issue-3-docs"}}"#;
        let record = AnalysisRecord::from_json(json).unwrap();
        assert_eq!(record.issue_type, IssueType::Docs);
        assert!(record.requirements.is_empty());
        assert!(record.url.is_empty());
    }

    #[test]
    fn missing_file_is_analysis_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issue-99-analysis.json");
        let err = AnalysisRecord::load(&path, 99).unwrap_err();
        assert!(matches!(err, BasekitError::AnalysisMissing { issue: 99, .. }));
    }
}
