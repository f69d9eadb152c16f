use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Settings;
use crate::exec::CommandRunner;
use crate::git::Git;
use crate::github::GitHubCli;
use crate::issue::analyzer::IssueAnalyzer;
use crate::issue::{AnalysisRecord, parse_issue_ref};
use crate::pipeline::{Orchestrator, PipelineOptions, implement};
use crate::pr::{PrCreator, PrOverrides};

pub async fn cmd_solve_issue(
    runner: Arc<dyn CommandRunner>,
    settings: Settings,
    issue: &str,
    options: PipelineOptions,
) -> Result<()> {
    let number = parse_issue_ref(issue)?;
    let implementer = implement::from_config(runner.clone(), settings.implement_cmd.as_deref());
    let dry_run = options.dry_run;
    let report = Orchestrator::new(runner, settings, options, implementer)
        .run(number)
        .await?;

    info!(issue = number, stage = %report.reached(), "pipeline finished");
    print!("{report}");
    if dry_run {
        println!("\nDry run: no changes were made.");
    }
    Ok(())
}

pub async fn cmd_analyze(runner: Arc<dyn CommandRunner>, settings: &Settings, issue: &str) -> Result<()> {
    let number = parse_issue_ref(issue)?;
    let analyzer = IssueAnalyzer::new(
        GitHubCli::new(runner.clone()),
        Git::new(runner, settings.remote.clone()),
        settings.github_repo.clone(),
    );
    let record = analyzer.analyze(number).await?;
    let path = settings.analysis_path(number);
    record.save(&path)?;

    println!("Issue #{}: {}", record.number, record.title);
    println!("  Type:       {}", record.issue_type);
    println!("  Complexity: {}", record.complexity);
    println!("  Branch:     {}", record.branch_name);
    if !record.requirements.is_empty() {
        println!("  Requirements:");
        for requirement in &record.requirements {
            println!("    - {requirement}");
        }
    }
    if !record.files_to_modify.is_empty() {
        println!("  Files likely affected: {}", record.files_to_modify.join(", "));
    }
    println!("\nAnalysis saved to {}", path.display());
    Ok(())
}

pub async fn cmd_pr_creator(
    runner: Arc<dyn CommandRunner>,
    settings: &Settings,
    issue: &str,
    branch: Option<String>,
    title: Option<String>,
    body_file: Option<&Path>,
) -> Result<()> {
    let number = parse_issue_ref(issue)?;
    // The cached analysis must exist before anything touches git or GitHub.
    let record = AnalysisRecord::load(&settings.analysis_path(number), number)?;
    let body = body_file
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read PR body from {}", path.display()))
        })
        .transpose()?;

    let github = GitHubCli::new(runner.clone());
    github.ensure_auth().await?;
    let creator = PrCreator::new(
        Git::new(runner, settings.remote.clone()),
        github,
        settings.main_branch.clone(),
        settings.github_repo.clone(),
    );
    let url = creator
        .create(&record, PrOverrides { branch, title, body })
        .await?;
    println!("Pull request created: {url}");
    Ok(())
}
