//! The pluggable "implement the solution" step.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{BasekitError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use crate::issue::AnalysisRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Implementation {
    /// The implementer ran; changes (if any) are in the working tree.
    Applied { summary: String },
    /// Nothing was done; the branch is left for a human.
    NotConfigured,
}

/// Produces code changes for an analyzed issue on the checked-out branch.
#[async_trait]
pub trait Implementer: Send + Sync {
    fn describe(&self) -> String;

    async fn implement(&self, record: &AnalysisRecord, branch: &str) -> Result<Implementation>;
}

/// Used when no implementation command is configured.
pub struct ManualImplementer;

#[async_trait]
impl Implementer for ManualImplementer {
    fn describe(&self) -> String {
        "manual implementation".to_string()
    }

    async fn implement(&self, record: &AnalysisRecord, branch: &str) -> Result<Implementation> {
        warn!(
            issue = record.number,
            branch,
            "no implementer configured (set BASEKIT_IMPLEMENT_CMD); leaving the branch for manual work"
        );
        Ok(Implementation::NotConfigured)
    }
}

/// Runs an external command with the issue described in its environment:
/// `ISSUE_NUMBER`, `ISSUE_BRANCH` and `ISSUE_ANALYSIS` (the record as JSON).
pub struct CommandImplementer {
    runner: Arc<dyn CommandRunner>,
    command_line: String,
}

impl CommandImplementer {
    pub fn new(runner: Arc<dyn CommandRunner>, command_line: impl Into<String>) -> Self {
        Self {
            runner,
            command_line: command_line.into(),
        }
    }
}

#[async_trait]
impl Implementer for CommandImplementer {
    fn describe(&self) -> String {
        format!("`{}`", self.command_line)
    }

    async fn implement(&self, record: &AnalysisRecord, branch: &str) -> Result<Implementation> {
        let spec = CommandSpec::from_command_line(&self.command_line)
            .ok_or_else(|| BasekitError::Config {
                key: "BASEKIT_IMPLEMENT_CMD".to_string(),
                value: self.command_line.clone(),
            })?
            .env("ISSUE_NUMBER", record.number.to_string())
            .env("ISSUE_BRANCH", branch)
            .env("ISSUE_ANALYSIS", record.to_json()?);

        info!(command = %self.command_line, "running implementer");
        let output = self.runner.run(&spec).await?;
        let summary = output
            .stdout_text()
            .lines()
            .last()
            .unwrap_or_default()
            .to_string();
        Ok(Implementation::Applied { summary })
    }
}

/// Command implementer when one is configured, otherwise manual.
pub fn from_config(runner: Arc<dyn CommandRunner>, command: Option<&str>) -> Arc<dyn Implementer> {
    match command {
        Some(cmd) => Arc::new(CommandImplementer::new(runner, cmd)),
        None => Arc::new(ManualImplementer),
    }
}
