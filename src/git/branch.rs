use std::fmt;

use tracing::{info, warn};

use super::Git;
use crate::error::{BasekitError, BranchLocation, Result};

const SYNC_STASH_MESSAGE: &str = "basekit: auto-stash before sync";

/// Feature branch lifecycle against a protected main line.
pub struct BranchManager {
    git: Git,
    main_branch: String,
}

/// What `cleanup` actually removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub local_deleted: bool,
    pub remote_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchStatus {
    pub current: String,
    pub main: String,
    pub clean: bool,
    pub ahead: u32,
    pub behind: u32,
    pub branches: Vec<String>,
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current branch: {}", self.current)?;
        writeln!(f, "Main branch:    {}", self.main)?;
        writeln!(
            f,
            "Working tree:   {}",
            if self.clean { "clean" } else { "uncommitted changes" }
        )?;
        writeln!(
            f,
            "Relative to {}: {} ahead, {} behind",
            self.main, self.ahead, self.behind
        )?;
        writeln!(f, "Local branches:")?;
        for branch in &self.branches {
            let marker = if *branch == self.current { "*" } else { " " };
            writeln!(f, "  {marker} {branch}")?;
        }
        Ok(())
    }
}

impl BranchManager {
    pub fn new(git: Git, main_branch: impl Into<String>) -> Self {
        Self {
            git,
            main_branch: main_branch.into(),
        }
    }

    pub fn main_branch(&self) -> &str {
        &self.main_branch
    }

    /// Fail with [`BasekitError::BranchExists`] if `name` is taken locally
    /// or on the remote. Read-only.
    pub async fn ensure_available(&self, name: &str) -> Result<()> {
        if self.git.local_branch_exists(name).await? {
            return Err(BasekitError::BranchExists {
                name: name.to_string(),
                location: BranchLocation::Local,
            });
        }
        if self.git.remote_branch_exists(name).await? {
            return Err(BasekitError::BranchExists {
                name: name.to_string(),
                location: BranchLocation::Remote,
            });
        }
        Ok(())
    }

    /// Create `name` off a freshly synced main branch and push it with
    /// upstream tracking.
    pub async fn create(&self, name: &str) -> Result<()> {
        self.ensure_available(name).await?;
        self.sync().await?;

        self.git.run(&["checkout", "-b", name, &self.main_branch]).await?;
        self.git.push_upstream(name).await?;
        info!(branch = name, "created and pushed branch");
        Ok(())
    }

    /// Check out `name`, tracking the remote branch if it only exists there.
    pub async fn switch(&self, name: &str) -> Result<()> {
        if !self.git.is_clean().await? {
            return Err(BasekitError::DirtyWorkingTree);
        }

        if self.git.local_branch_exists(name).await? {
            self.git.checkout(name).await?;
        } else if self.git.remote_branch_exists(name).await? {
            let remote = self.git.remote().to_string();
            self.git.run(&["fetch", &remote, name]).await?;
            let upstream = format!("{remote}/{name}");
            self.git
                .run(&["checkout", "-b", name, "--track", &upstream])
                .await?;
        } else {
            return Err(BasekitError::BranchNotFound {
                name: name.to_string(),
            });
        }
        info!(branch = name, "switched branch");
        Ok(())
    }

    /// Delete `name` locally and on the remote. The main branch is refused.
    pub async fn cleanup(&self, name: &str) -> Result<CleanupReport> {
        if name == self.main_branch {
            return Err(BasekitError::ProtectedBranch {
                name: name.to_string(),
            });
        }

        if self.git.current_branch().await? == name {
            info!(to = %self.main_branch, "leaving branch before deleting it");
            self.git.checkout(&self.main_branch).await?;
        }

        let mut report = CleanupReport::default();
        if self.git.local_branch_exists(name).await? {
            self.git.run(&["branch", "-D", name]).await?;
            report.local_deleted = true;
        }
        if self.git.remote_branch_exists(name).await? {
            let remote = self.git.remote().to_string();
            self.git.run(&["push", &remote, "--delete", name]).await?;
            report.remote_deleted = true;
        }

        if report == CleanupReport::default() {
            warn!(branch = name, "branch not found locally or on the remote");
        }
        Ok(report)
    }

    /// Fast-forward the main branch, carrying uncommitted work across.
    pub async fn sync(&self) -> Result<()> {
        let original = self.git.current_branch().await?;
        let stashed = if self.git.is_clean().await? {
            false
        } else {
            info!("stashing uncommitted changes");
            self.git
                .run(&["stash", "push", "--include-untracked", "-m", SYNC_STASH_MESSAGE])
                .await?;
            true
        };

        let result = self.pull_main(&original).await;
        if result.is_err() {
            // Put the user back where they started before reporting.
            if original != self.main_branch
                && let Err(e) = self.git.checkout(&original).await
            {
                warn!(error = %e, branch = %original, "could not return to original branch");
            }
        }
        if stashed && let Err(e) = self.git.run(&["stash", "pop"]).await {
            warn!(error = %e, "could not restore stashed changes; they remain in `git stash list`");
            result?;
            return Err(e);
        }
        result
    }

    async fn pull_main(&self, original: &str) -> Result<()> {
        if original != self.main_branch {
            self.git.checkout(&self.main_branch).await?;
        }
        let remote = self.git.remote().to_string();
        self.git
            .run(&["pull", "--ff-only", &remote, &self.main_branch])
            .await?;
        if original != self.main_branch {
            self.git.checkout(original).await?;
        }
        info!(main = %self.main_branch, "main branch synced");
        Ok(())
    }

    pub async fn status(&self) -> Result<BranchStatus> {
        let (ahead, behind) = self.git.ahead_behind(&self.main_branch).await?;
        Ok(BranchStatus {
            current: self.git.current_branch().await?,
            main: self.main_branch.clone(),
            clean: self.git.is_clean().await?,
            ahead,
            behind,
            branches: self.git.local_branches().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::exec::CommandOutput;
    use crate::exec::testing::ScriptedRunner;

    fn manager(runner: ScriptedRunner) -> (Arc<ScriptedRunner>, BranchManager) {
        let runner = Arc::new(runner);
        let git = Git::new(runner.clone(), "origin");
        (runner, BranchManager::new(git, "main"))
    }

    fn no_remote_branch() -> ScriptedRunner {
        ScriptedRunner::new().on("git ls-remote", CommandOutput::failed(2, ""))
    }

    #[tokio::test]
    async fn create_fails_when_branch_exists_locally() {
        let (runner, branches) = manager(no_remote_branch());
        let err = branches.create("feature/issue-1-x").await.unwrap_err();
        assert!(matches!(
            err,
            BasekitError::BranchExists { location: BranchLocation::Local, .. }
        ));
        assert!(!runner.called("git checkout"));
    }

    #[tokio::test]
    async fn create_fails_when_branch_exists_remotely() {
        let (runner, branches) = manager(
            ScriptedRunner::new()
                .on("git show-ref", CommandOutput::failed(1, ""))
                .on("git ls-remote", CommandOutput::ok("abc\trefs/heads/feature/issue-1-x")),
        );
        let err = branches.create("feature/issue-1-x").await.unwrap_err();
        assert!(matches!(
            err,
            BasekitError::BranchExists { location: BranchLocation::Remote, .. }
        ));
        assert!(!runner.called("git push"));
    }

    #[tokio::test]
    async fn create_syncs_main_then_branches_and_pushes() {
        let (runner, branches) = manager(
            no_remote_branch()
                .on("git show-ref", CommandOutput::failed(1, ""))
                .on("git rev-parse --abbrev-ref HEAD", CommandOutput::ok("main"))
                .on("git status --porcelain", CommandOutput::ok(" M views.py")),
        );
        branches.create("fix/issue-2-y").await.unwrap();

        let calls = runner.calls();
        let pos = |prefix: &str| {
            calls
                .iter()
                .position(|c| c.starts_with(prefix))
                .unwrap_or_else(|| panic!("{prefix} not called: {calls:?}"))
        };
        assert!(pos("git stash push") < pos("git pull --ff-only origin main"));
        assert!(pos("git pull") < pos("git stash pop"));
        assert!(pos("git stash pop") < pos("git checkout -b fix/issue-2-y main"));
        assert!(pos("git checkout -b") < pos("git push -u origin fix/issue-2-y"));
    }

    #[tokio::test]
    async fn switch_requires_clean_tree() {
        let (_, branches) =
            manager(ScriptedRunner::new().on("git status --porcelain", CommandOutput::ok("?? new.py")));
        assert!(matches!(
            branches.switch("fix/x").await,
            Err(BasekitError::DirtyWorkingTree)
        ));
    }

    #[tokio::test]
    async fn switch_tracks_remote_only_branch() {
        let (runner, branches) = manager(
            ScriptedRunner::new()
                .on("git show-ref", CommandOutput::failed(1, ""))
                .on("git ls-remote", CommandOutput::ok("abc\trefs/heads/fix/x")),
        );
        branches.switch("fix/x").await.unwrap();
        assert!(runner.called("git fetch origin fix/x"));
        assert!(runner.called("git checkout -b fix/x --track origin/fix/x"));
    }

    #[tokio::test]
    async fn switch_checks_out_existing_local_branch() {
        let (runner, branches) = manager(ScriptedRunner::new());
        branches.switch("fix/x").await.unwrap();
        assert!(runner.called("git show-ref --verify --quiet refs/heads/fix/x"));
        assert!(runner.called("git checkout fix/x"));
        assert!(!runner.called("git ls-remote"));
        assert!(!runner.called("git fetch"));
        assert!(!runner.called("git checkout -b"));
    }

    #[tokio::test]
    async fn switch_to_unknown_branch_fails() {
        let (_, branches) = manager(no_remote_branch().on("git show-ref", CommandOutput::failed(1, "")));
        assert!(matches!(
            branches.switch("nope").await,
            Err(BasekitError::BranchNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn cleanup_refuses_main_without_touching_git() {
        let (runner, branches) = manager(ScriptedRunner::new());
        let err = branches.cleanup("main").await.unwrap_err();
        assert!(matches!(err, BasekitError::ProtectedBranch { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn cleanup_leaves_current_branch_and_deletes_both_copies() {
        let (runner, branches) = manager(
            ScriptedRunner::new()
                .on("git rev-parse --abbrev-ref HEAD", CommandOutput::ok("fix/x"))
                .on("git ls-remote", CommandOutput::ok("abc\trefs/heads/fix/x")),
        );
        let report = branches.cleanup("fix/x").await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                local_deleted: true,
                remote_deleted: true
            }
        );
        assert!(runner.called("git checkout main"));
        assert!(runner.called("git branch -D fix/x"));
        assert!(runner.called("git push origin --delete fix/x"));
    }

    #[tokio::test]
    async fn sync_reports_stash_pop_conflict() {
        let (runner, branches) = manager(
            ScriptedRunner::new()
                .on("git rev-parse --abbrev-ref HEAD", CommandOutput::ok("fix/x"))
                .on("git status --porcelain", CommandOutput::ok(" M a.py"))
                .on(
                    "git stash pop",
                    CommandOutput::failed(1, "CONFLICT (content): Merge conflict in a.py"),
                ),
        );
        let err = branches.sync().await.unwrap_err();
        match err {
            BasekitError::CommandFailed { command, stderr, .. } => {
                assert_eq!(command, "git stash pop");
                assert!(stderr.contains("Merge conflict in a.py"));
            }
            other => panic!("Expected CommandFailed, got {other}"),
        }
        assert!(runner.called("git pull --ff-only origin main"));
        assert!(runner.called("git checkout fix/x"));
    }

    #[tokio::test]
    async fn sync_returns_to_original_branch_and_restores_stash_on_failure() {
        let (runner, branches) = manager(
            ScriptedRunner::new()
                .on("git rev-parse --abbrev-ref HEAD", CommandOutput::ok("fix/x"))
                .on("git status --porcelain", CommandOutput::ok(" M a.py"))
                .on("git pull", CommandOutput::failed(1, "not possible to fast-forward")),
        );
        let err = branches.sync().await.unwrap_err();
        assert!(matches!(err, BasekitError::CommandFailed { .. }));
        assert!(runner.called("git checkout fix/x"));
        assert!(runner.called("git stash pop"));
    }

    #[tokio::test]
    async fn status_collects_branch_facts() {
        let (_, branches) = manager(
            ScriptedRunner::new()
                .on("git rev-list", CommandOutput::ok("0\t2"))
                .on("git rev-parse --abbrev-ref HEAD", CommandOutput::ok("fix/x"))
                .on("git for-each-ref", CommandOutput::ok("main\nfix/x\n")),
        );
        let status = branches.status().await.unwrap();
        assert_eq!(status.current, "fix/x");
        assert!(status.clean);
        assert_eq!((status.ahead, status.behind), (2, 0));
        assert!(status.to_string().contains("* fix/x"));
    }
}
