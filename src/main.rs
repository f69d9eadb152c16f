mod cli;
mod cmd;
mod config;
mod error;
mod exec;
mod git;
mod github;
mod issue;
mod ops;
mod pipeline;
mod pr;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

use config::Settings;
use exec::{CommandRunner, SystemRunner};
use pipeline::PipelineOptions;

/// Logs go to stderr so command output on stdout stays pipeable.
/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load()?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

    match cli.command {
        Commands::SolveIssue {
            issue,
            dry_run,
            skip_tests,
            no_pr,
        } => {
            let options = PipelineOptions {
                dry_run,
                skip_tests,
                no_pr,
            };
            cmd::cmd_solve_issue(runner, settings, &issue, options).await?;
        }
        Commands::Analyze { issue } => {
            cmd::cmd_analyze(runner, &settings, &issue).await?;
        }
        Commands::BranchManager { action } => {
            cmd::cmd_branch(runner, &settings, action).await?;
        }
        Commands::PrCreator {
            issue,
            branch,
            title,
            body_file,
        } => {
            cmd::cmd_pr_creator(runner, &settings, &issue, branch, title, body_file.as_deref()).await?;
        }
        Commands::Backup => {
            cmd::cmd_backup(runner, &settings).await?;
        }
        Commands::Restore { file, latest: _, yes } => {
            // clap guarantees exactly one of `file` and `--latest`.
            cmd::cmd_restore(runner, &settings, file, yes).await?;
        }
        Commands::Cron { action } => {
            cmd::cmd_cron(runner, &settings, action).await?;
        }
        Commands::Ssl { action } => {
            cmd::cmd_ssl(runner, &settings, action).await?;
        }
        Commands::Verify { url } => {
            cmd::cmd_verify(runner, &settings, url).await?;
        }
    }

    Ok(())
}
