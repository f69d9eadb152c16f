use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Local;
use dialoguer::Confirm;

use crate::cli::{CronAction, SslAction};
use crate::config::Settings;
use crate::error::BasekitError;
use crate::exec::CommandRunner;
use crate::ops::ssl::SslOutcome;
use crate::ops::{backup, cron, restore, ssl, verify};

pub async fn cmd_backup(runner: Arc<dyn CommandRunner>, settings: &Settings) -> Result<()> {
    let report = backup::run_backup(runner.as_ref(), settings, Local::now().naive_local()).await?;
    println!("Backup written to {} ({} bytes)", report.file.display(), report.bytes);
    for old in &report.pruned {
        println!("  removed expired backup {}", old.display());
    }
    Ok(())
}

pub async fn cmd_restore(
    runner: Arc<dyn CommandRunner>,
    settings: &Settings,
    file: Option<PathBuf>,
    yes: bool,
) -> Result<()> {
    let file = match file {
        Some(file) => file,
        None => restore::latest_backup(&settings.backup_dir)?,
    };
    if !yes {
        if !std::io::stdin().is_terminal() {
            bail!("Restoring overwrites the database; pass --yes to confirm non-interactively");
        }
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Restore {} into database '{}'? Current data will be overwritten",
                file.display(),
                settings.db_name
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            return Err(BasekitError::Aborted.into());
        }
    }

    restore::restore_backup(runner.as_ref(), settings, &file).await?;
    println!("Database '{}' restored from {}", settings.db_name, file.display());
    Ok(())
}

pub async fn cmd_cron(runner: Arc<dyn CommandRunner>, settings: &Settings, action: CronAction) -> Result<()> {
    match action {
        CronAction::Install { schedule } => {
            let exe = std::env::current_exe().context("Failed to locate the basekit executable")?;
            let project_dir = std::env::current_dir().context("Failed to get current directory")?;
            let line = cron::cron_line(&schedule, &project_dir, &exe, &settings.backup_dir)?;
            // The entry appends to a log inside the backup dir, which must exist.
            let backup_dir = project_dir.join(&settings.backup_dir);
            std::fs::create_dir_all(&backup_dir)
                .with_context(|| format!("Failed to create {}", backup_dir.display()))?;
            cron::install(runner.as_ref(), &line).await?;
            println!("Installed backup schedule:\n  {line}");
        }
        CronAction::Remove => match cron::remove(runner.as_ref()).await? {
            0 => println!("No backup schedule installed"),
            n => println!("Removed {n} backup schedule entr{}", if n == 1 { "y" } else { "ies" }),
        },
        CronAction::Show => {
            let entries = cron::show(runner.as_ref()).await?;
            if entries.is_empty() {
                println!("No backup schedule installed");
            }
            for entry in entries {
                println!("{entry}");
            }
        }
    }
    Ok(())
}

pub async fn cmd_ssl(runner: Arc<dyn CommandRunner>, settings: &Settings, action: SslAction) -> Result<()> {
    let outcome = match action {
        SslAction::SelfSigned {
            domain,
            out_dir,
            dry_run,
        } => {
            let out_dir = out_dir.unwrap_or_else(|| settings.ssl_dir.clone());
            ssl::self_signed(runner.as_ref(), &domain, &out_dir, dry_run).await?
        }
        SslAction::Letsencrypt {
            domain,
            email,
            staging,
            dry_run,
        } => ssl::letsencrypt(runner.as_ref(), settings, &domain, &email, staging, dry_run).await?,
    };

    match outcome {
        SslOutcome::Issued { cert, key } => {
            println!("Certificate: {}", cert.display());
            println!("Private key: {}", key.display());
        }
        SslOutcome::Requested { domain } => println!("Certificate issued for {domain}"),
        SslOutcome::DryRun { command } => println!("Would run: {command}"),
    }
    Ok(())
}

pub async fn cmd_verify(runner: Arc<dyn CommandRunner>, settings: &Settings, url: Option<String>) -> Result<()> {
    let base_url = url.unwrap_or_else(|| settings.verify_url.clone());
    let client = verify::http_client()?;
    let report = verify::verify(&client, runner.as_ref(), settings, &base_url).await;
    print!("{report}");
    if !report.healthy() {
        return Err(BasekitError::Verification(report.failures().join("; ")).into());
    }
    Ok(())
}
