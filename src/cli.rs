use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::ops::cron::DEFAULT_SCHEDULE;

/// Basekit - issue automation and operations for the Django base project
#[derive(Parser, Debug)]
#[command(name = "basekit")]
#[command(about = "Issue automation, branch management and database operations for the Django base project")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Resolve a GitHub issue: analyze, branch, implement, test, commit, open a PR
    SolveIssue {
        /// Issue number, #number, or issue URL
        issue: String,

        /// Log every step without changing the repository or GitHub
        #[arg(long)]
        dry_run: bool,

        /// Do not run the test suite
        #[arg(long)]
        skip_tests: bool,

        /// Stop after committing; do not open a pull request
        #[arg(long)]
        no_pr: bool,
    },

    /// Analyze an issue and cache the result for pr-creator
    Analyze {
        /// Issue number, #number, or issue URL
        issue: String,
    },

    /// Create, switch, clean up and sync feature branches
    BranchManager {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Open a pull request from a cached issue analysis
    PrCreator {
        /// Issue number the analysis was cached under
        issue: String,

        /// Branch to open the PR from (defaults to the current branch)
        branch: Option<String>,

        /// PR title (defaults to one derived from the issue)
        title: Option<String>,

        /// File whose contents replace the generated PR body
        body_file: Option<PathBuf>,
    },

    /// Dump the database to a compressed file and expire old dumps
    Backup,

    /// Restore the database from a compressed dump
    Restore {
        /// Backup file to restore
        #[arg(required_unless_present = "latest")]
        file: Option<PathBuf>,

        /// Restore the newest backup
        #[arg(long, conflicts_with = "file")]
        latest: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Schedule backups with crontab
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },

    /// Provision TLS certificates
    Ssl {
        #[command(subcommand)]
        action: SslAction,
    },

    /// Check health endpoints and security headers of a deployment
    Verify {
        /// Base URL of the deployment (defaults to VERIFY_URL)
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum BranchAction {
    /// Create and push a branch off an up-to-date main branch
    Create { name: String },
    /// Check out a local or remote branch
    Switch { name: String },
    /// Delete a branch locally and on the remote
    Cleanup { name: String },
    /// Fast-forward the main branch, keeping local changes
    Sync,
    /// Show branch and working tree state
    Status,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum CronAction {
    /// Add (or replace) the scheduled backup entry
    Install {
        /// Five-field cron schedule
        #[arg(long, default_value = DEFAULT_SCHEDULE)]
        schedule: String,
    },
    /// Remove the scheduled backup entry
    Remove,
    /// Print the scheduled backup entry
    Show,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SslAction {
    /// Generate a self-signed certificate with openssl
    SelfSigned {
        #[arg(long)]
        domain: String,

        /// Output directory (defaults to SSL_DIR)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Request a certificate from Let's Encrypt through certbot
    Letsencrypt {
        #[arg(long)]
        domain: String,

        #[arg(long)]
        email: String,

        /// Use the Let's Encrypt staging environment
        #[arg(long)]
        staging: bool,

        #[arg(long)]
        dry_run: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_solve_issue_flags() {
        let cli = Cli::parse_from([
            "basekit",
            "solve-issue",
            "#123",
            "--dry-run",
            "--skip-tests",
            "--no-pr",
        ]);
        match cli.command {
            Commands::SolveIssue {
                issue,
                dry_run,
                skip_tests,
                no_pr,
            } => {
                assert_eq!(issue, "#123");
                assert!(dry_run);
                assert!(skip_tests);
                assert!(no_pr);
            }
            _ => panic!("Expected SolveIssue command"),
        }
    }

    #[test]
    fn test_solve_issue_defaults() {
        let cli = Cli::parse_from(["basekit", "solve-issue", "123"]);
        assert_eq!(
            cli.command,
            Commands::SolveIssue {
                issue: "123".to_string(),
                dry_run: false,
                skip_tests: false,
                no_pr: false,
            }
        );
    }

    #[test]
    fn test_branch_manager_actions() {
        let cli = Cli::parse_from(["basekit", "branch-manager", "create", "fix/issue-1-x"]);
        assert_eq!(
            cli.command,
            Commands::BranchManager {
                action: BranchAction::Create {
                    name: "fix/issue-1-x".to_string()
                }
            }
        );
        let cli = Cli::parse_from(["basekit", "branch-manager", "sync"]);
        assert!(matches!(
            cli.command,
            Commands::BranchManager {
                action: BranchAction::Sync
            }
        ));
    }

    #[test]
    fn test_branch_manager_create_requires_name() {
        assert!(Cli::try_parse_from(["basekit", "branch-manager", "create"]).is_err());
    }

    #[test]
    fn test_pr_creator_optional_positionals() {
        let cli = Cli::parse_from(["basekit", "pr-creator", "42", "fix/x", "Fix it", "body.md"]);
        match cli.command {
            Commands::PrCreator {
                issue,
                branch,
                title,
                body_file,
            } => {
                assert_eq!(issue, "42");
                assert_eq!(branch.as_deref(), Some("fix/x"));
                assert_eq!(title.as_deref(), Some("Fix it"));
                assert_eq!(body_file, Some(PathBuf::from("body.md")));
            }
            _ => panic!("Expected PrCreator command"),
        }
    }

    #[test]
    fn test_restore_needs_file_or_latest() {
        assert!(Cli::try_parse_from(["basekit", "restore"]).is_err());
        assert!(Cli::try_parse_from(["basekit", "restore", "--latest"]).is_ok());
        assert!(Cli::try_parse_from(["basekit", "restore", "x.sql.gz", "--latest"]).is_err());
    }

    #[test]
    fn test_cron_install_default_schedule() {
        let cli = Cli::parse_from(["basekit", "cron", "install"]);
        assert_eq!(
            cli.command,
            Commands::Cron {
                action: CronAction::Install {
                    schedule: "0 2 * * *".to_string()
                }
            }
        );
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::parse_from(["basekit", "backup", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.command, Commands::Backup);
    }

    #[test]
    fn test_help_does_not_panic() {
        // --help exits early, which clap reports as an "error"
        let result = Cli::try_parse_from(["basekit", "--help"]);
        assert!(result.is_err());
    }
}
