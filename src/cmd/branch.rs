use std::sync::Arc;

use anyhow::Result;

use crate::cli::BranchAction;
use crate::config::Settings;
use crate::exec::CommandRunner;
use crate::git::{BranchManager, Git};

pub async fn cmd_branch(runner: Arc<dyn CommandRunner>, settings: &Settings, action: BranchAction) -> Result<()> {
    let manager = BranchManager::new(
        Git::new(runner, settings.remote.clone()),
        settings.main_branch.clone(),
    );

    match action {
        BranchAction::Create { name } => {
            manager.create(&name).await?;
            println!("Created and pushed branch '{name}'");
        }
        BranchAction::Switch { name } => {
            manager.switch(&name).await?;
            println!("Switched to branch '{name}'");
        }
        BranchAction::Cleanup { name } => {
            let report = manager.cleanup(&name).await?;
            match (report.local_deleted, report.remote_deleted) {
                (true, true) => println!("Deleted '{name}' locally and on the remote"),
                (true, false) => println!("Deleted local branch '{name}'"),
                (false, true) => println!("Deleted remote branch '{name}'"),
                (false, false) => println!("Branch '{name}' not found; nothing to delete"),
            }
        }
        BranchAction::Sync => {
            manager.sync().await?;
            println!("Branch '{}' is up to date", manager.main_branch());
        }
        BranchAction::Status => {
            print!("{}", manager.status().await?);
        }
    }
    Ok(())
}
