//! The issue-solving pipeline.
//!
//! A run walks a fixed sequence of stages, each consuming and enriching one
//! [`IssueContext`]:
//!
//! ```text
//! START → ANALYZED → BRANCHED → IMPLEMENTED → TESTED → COMMITTED → PR_CREATED → DONE
//! ```
//!
//! Any stage error aborts the run with no rollback, so a failure after
//! BRANCHED leaves the branch behind. Failing tests are the one exception:
//! they are reported as a warning and the commit still happens.

pub mod implement;

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{BasekitError, Result};
use crate::exec::{CommandRunner, CommandSpec, require_tools};
use crate::git::{BranchManager, Git};
use crate::github::GitHubCli;
use crate::issue::AnalysisRecord;
use crate::issue::analyzer::{IssueAnalyzer, analyze_issue};
use crate::pr::{PrCreator, PrOverrides, pr_title};

use implement::{Implementation, Implementer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    Analyzed,
    Branched,
    Implemented,
    Tested,
    Committed,
    PrCreated,
    Done,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Start => Some(Stage::Analyzed),
            Stage::Analyzed => Some(Stage::Branched),
            Stage::Branched => Some(Stage::Implemented),
            Stage::Implemented => Some(Stage::Tested),
            Stage::Tested => Some(Stage::Committed),
            Stage::Committed => Some(Stage::PrCreated),
            Stage::PrCreated => Some(Stage::Done),
            Stage::Done => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "START",
            Stage::Analyzed => "ANALYZED",
            Stage::Branched => "BRANCHED",
            Stage::Implemented => "IMPLEMENTED",
            Stage::Tested => "TESTED",
            Stage::Committed => "COMMITTED",
            Stage::PrCreated => "PR_CREATED",
            Stage::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub dry_run: bool,
    pub skip_tests: bool,
    pub no_pr: bool,
}

/// How a stage finished. Errors abort the run instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Skipped(String),
    Warning(String),
    /// Dry run: the side effect that would have happened.
    WouldRun(String),
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Completed => f.write_str("done"),
            StageOutcome::Skipped(why) => write!(f, "skipped ({why})"),
            StageOutcome::Warning(what) => write!(f, "warning: {what}"),
            StageOutcome::WouldRun(what) => write!(f, "dry run: would {what}"),
        }
    }
}

/// State handed from stage to stage.
#[derive(Debug, Clone, Default)]
pub struct IssueContext {
    pub issue: u64,
    pub analysis: Option<AnalysisRecord>,
    pub branch: Option<String>,
    pub implementation: Option<Implementation>,
    pub tests_passed: Option<bool>,
    pub commit: Option<String>,
    pub pr_url: Option<String>,
}

impl IssueContext {
    pub fn new(issue: u64) -> Self {
        Self {
            issue,
            ..Default::default()
        }
    }

    fn record(&self, settings: &Settings) -> Result<&AnalysisRecord> {
        self.analysis.as_ref().ok_or_else(|| BasekitError::AnalysisMissing {
            issue: self.issue,
            path: settings.analysis_path(self.issue),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub context: IssueContext,
    pub stages: Vec<(Stage, StageOutcome)>,
}

impl PipelineReport {
    pub fn reached(&self) -> Stage {
        self.stages.last().map_or(Stage::Start, |(stage, _)| *stage)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Issue #{}", self.context.issue)?;
        for (stage, outcome) in &self.stages {
            writeln!(f, "  {stage:<12} {outcome}")?;
        }
        if let Some(branch) = &self.context.branch {
            writeln!(f, "Branch: {branch}")?;
        }
        if let Some(commit) = &self.context.commit {
            writeln!(f, "Commit: {commit}")?;
        }
        if let Some(url) = &self.context.pr_url {
            writeln!(f, "Pull request: {url}")?;
        }
        Ok(())
    }
}

pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    settings: Settings,
    options: PipelineOptions,
    implementer: Arc<dyn Implementer>,
    git: Git,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        settings: Settings,
        options: PipelineOptions,
        implementer: Arc<dyn Implementer>,
    ) -> Self {
        let git = Git::new(runner.clone(), settings.remote.clone());
        Self {
            runner,
            settings,
            options,
            implementer,
            git,
        }
    }

    fn github(&self) -> GitHubCli {
        GitHubCli::new(self.runner.clone())
    }

    fn branches(&self) -> BranchManager {
        BranchManager::new(self.git.clone(), self.settings.main_branch.clone())
    }

    pub async fn run(&self, issue: u64) -> Result<PipelineReport> {
        self.preflight().await?;

        let mut context = IssueContext::new(issue);
        let mut stages = Vec::new();
        let mut stage = Stage::Start;
        while let Some(next) = stage.next() {
            let outcome = self.enter(next, &mut context).await?;
            match &outcome {
                StageOutcome::Warning(what) => warn!(stage = %next, "{what}"),
                other => info!(stage = %next, "{other}"),
            }
            stages.push((next, outcome));
            stage = next;
        }

        Ok(PipelineReport { context, stages })
    }

    async fn preflight(&self) -> Result<()> {
        require_tools(self.runner.as_ref(), &["git", "gh"]).await?;
        self.git.run(&["rev-parse", "--is-inside-work-tree"]).await?;
        if !self.options.dry_run {
            self.github().ensure_auth().await?;
        }
        Ok(())
    }

    async fn enter(&self, stage: Stage, context: &mut IssueContext) -> Result<StageOutcome> {
        match stage {
            Stage::Analyzed => self.analyze(context).await,
            Stage::Branched => self.branch(context).await,
            Stage::Implemented => self.implement(context).await,
            Stage::Tested => self.test(context).await,
            Stage::Committed => self.commit(context).await,
            Stage::PrCreated => self.open_pr(context).await,
            Stage::Start | Stage::Done => Ok(StageOutcome::Completed),
        }
    }

    async fn analyze(&self, context: &mut IssueContext) -> Result<StageOutcome> {
        let analyzer = IssueAnalyzer::new(
            self.github(),
            self.git.clone(),
            self.settings.github_repo.clone(),
        );
        let issue = analyzer.fetch(context.issue).await?;
        let record = analyze_issue(&issue);
        let path = self.settings.analysis_path(context.issue);

        let outcome = if self.options.dry_run {
            StageOutcome::WouldRun(format!("write analysis to {}", path.display()))
        } else {
            // Hand-off for a later standalone `pr-creator` run.
            record.save(&path)?;
            if issue.is_closed() {
                StageOutcome::Warning(format!("issue #{} is already closed", context.issue))
            } else {
                StageOutcome::Completed
            }
        };
        context.analysis = Some(record);
        Ok(outcome)
    }

    async fn branch(&self, context: &mut IssueContext) -> Result<StageOutcome> {
        let name = context.record(&self.settings)?.branch_name.clone();
        let branches = self.branches();

        let outcome = if self.options.dry_run {
            branches.ensure_available(&name).await?;
            StageOutcome::WouldRun(format!("create and push branch {name}"))
        } else {
            branches.create(&name).await?;
            StageOutcome::Completed
        };
        context.branch = Some(name);
        Ok(outcome)
    }

    async fn implement(&self, context: &mut IssueContext) -> Result<StageOutcome> {
        if self.options.dry_run {
            return Ok(StageOutcome::WouldRun(format!(
                "run {}",
                self.implementer.describe()
            )));
        }

        let record = context.record(&self.settings)?;
        let branch = context.branch.clone().unwrap_or_else(|| record.branch_name.clone());
        let implementation = self.implementer.implement(record, &branch).await?;
        let outcome = match &implementation {
            Implementation::Applied { .. } => StageOutcome::Completed,
            Implementation::NotConfigured => {
                StageOutcome::Warning("no implementer configured".to_string())
            }
        };
        context.implementation = Some(implementation);
        Ok(outcome)
    }

    async fn test(&self, context: &mut IssueContext) -> Result<StageOutcome> {
        if self.options.skip_tests {
            return Ok(StageOutcome::Skipped("--skip-tests".to_string()));
        }
        let Some(spec) = CommandSpec::from_command_line(&self.settings.test_cmd) else {
            return Ok(StageOutcome::Skipped("no test command configured".to_string()));
        };
        if self.options.dry_run {
            return Ok(StageOutcome::WouldRun(format!("run `{}`", spec.display())));
        }

        // Test failures never block the commit.
        let outcome = match self.runner.output(&spec).await {
            Ok(output) if output.success() => {
                context.tests_passed = Some(true);
                StageOutcome::Completed
            }
            Ok(output) => {
                context.tests_passed = Some(false);
                StageOutcome::Warning(format!(
                    "tests failed (exit code {:?}); continuing",
                    output.code
                ))
            }
            Err(e) => {
                context.tests_passed = Some(false);
                StageOutcome::Warning(format!("could not run tests: {e}; continuing"))
            }
        };
        Ok(outcome)
    }

    async fn commit(&self, context: &mut IssueContext) -> Result<StageOutcome> {
        let message = commit_message(context.record(&self.settings)?);
        if self.options.dry_run {
            let subject = message.lines().next().unwrap_or_default();
            return Ok(StageOutcome::WouldRun(format!("commit \"{subject}\"")));
        }

        match self.git.commit_all(&message).await? {
            Some(sha) => {
                self.git.run(&["push"]).await?;
                context.commit = Some(sha);
                Ok(StageOutcome::Completed)
            }
            None => Ok(StageOutcome::Warning("no changes to commit".to_string())),
        }
    }

    async fn open_pr(&self, context: &mut IssueContext) -> Result<StageOutcome> {
        if self.options.no_pr {
            return Ok(StageOutcome::Skipped("--no-pr".to_string()));
        }
        let record = context.record(&self.settings)?;
        if self.options.dry_run {
            return Ok(StageOutcome::WouldRun(format!(
                "open pull request \"{}\"",
                pr_title(record)
            )));
        }
        // The implementer may commit on its own, so an empty commit stage
        // only skips the PR when the branch has nothing over main.
        if context.commit.is_none()
            && self
                .git
                .commits_since(&self.settings.main_branch)
                .await?
                .is_empty()
        {
            return Ok(StageOutcome::Skipped("no commits to propose".to_string()));
        }

        let creator = PrCreator::new(
            self.git.clone(),
            self.github(),
            self.settings.main_branch.clone(),
            self.settings.github_repo.clone(),
        );
        let overrides = PrOverrides {
            branch: context.branch.clone(),
            ..Default::default()
        };
        let url = creator.create(record, overrides).await?;
        context.pr_url = Some(url);
        Ok(StageOutcome::Completed)
    }
}

/// `<type>: <title>` subject, requirements as bullets, closing reference.
pub fn commit_message(record: &AnalysisRecord) -> String {
    let mut message = format!("{}: {}\n", record.issue_type, record.title);
    if !record.requirements.is_empty() {
        message.push('\n');
        for requirement in &record.requirements {
            message.push_str(&format!("- {requirement}\n"));
        }
    }
    message.push_str(&format!("\nCloses #{}\n", record.number));
    message
}
