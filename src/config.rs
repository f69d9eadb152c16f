use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{BasekitError, Result};

/// Runtime settings, read from the environment (and an optional `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub main_branch: String,
    pub remote: String,
    /// Directory holding `issue-<N>-analysis.json` hand-off files.
    pub analysis_dir: PathBuf,
    pub test_cmd: String,
    /// External code-generation command for the implementation step.
    pub implement_cmd: Option<String>,
    /// `owner/repo`; detected from the git remote when unset.
    pub github_repo: Option<String>,
    pub backup_dir: PathBuf,
    pub retention_days: u32,
    pub compose_cmd: String,
    pub db_service: String,
    pub db_name: String,
    pub db_user: String,
    pub ssl_dir: PathBuf,
    pub verify_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            main_branch: "main".to_string(),
            remote: "origin".to_string(),
            analysis_dir: PathBuf::from("/tmp"),
            test_cmd: "pytest".to_string(),
            implement_cmd: None,
            github_repo: None,
            backup_dir: PathBuf::from("backups"),
            retention_days: 7,
            compose_cmd: "docker-compose".to_string(),
            db_service: "db".to_string(),
            db_name: "postgres".to_string(),
            db_user: "postgres".to_string(),
            ssl_dir: PathBuf::from("nginx/ssl"),
            verify_url: "http://localhost".to_string(),
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn load() -> Result<Self> {
        // A missing .env is normal; only the variables matter.
        let _ = dotenvy::dotenv();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let retention_days = match get("BACKUP_RETENTION_DAYS") {
            Some(raw) => raw.trim().parse().map_err(|_| BasekitError::Config {
                key: "BACKUP_RETENTION_DAYS".to_string(),
                value: raw,
            })?,
            None => defaults.retention_days,
        };

        Ok(Self {
            main_branch: get("BASEKIT_MAIN_BRANCH").unwrap_or(defaults.main_branch),
            remote: get("BASEKIT_REMOTE").unwrap_or(defaults.remote),
            analysis_dir: get("BASEKIT_ANALYSIS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.analysis_dir),
            test_cmd: get("BASEKIT_TEST_CMD").unwrap_or(defaults.test_cmd),
            implement_cmd: get("BASEKIT_IMPLEMENT_CMD"),
            github_repo: get("GITHUB_REPOSITORY"),
            backup_dir: get("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.backup_dir),
            retention_days,
            compose_cmd: get("COMPOSE_CMD").unwrap_or(defaults.compose_cmd),
            db_service: get("DB_SERVICE").unwrap_or(defaults.db_service),
            db_name: get("POSTGRES_DB").unwrap_or(defaults.db_name),
            db_user: get("POSTGRES_USER").unwrap_or(defaults.db_user),
            ssl_dir: get("SSL_DIR").map(PathBuf::from).unwrap_or(defaults.ssl_dir),
            verify_url: get("VERIFY_URL").unwrap_or(defaults.verify_url),
        })
    }

    /// Path of the analysis hand-off file for an issue.
    pub fn analysis_path(&self, issue: u64) -> PathBuf {
        self.analysis_dir.join(format!("issue-{issue}-analysis.json"))
    }
}
