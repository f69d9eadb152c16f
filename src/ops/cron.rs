//! Scheduled backups through the user's crontab.

use std::path::Path;

use tracing::info;

use crate::error::{BasekitError, Result};
use crate::exec::{CommandRunner, CommandSpec};

/// Marks the lines this tool owns so they can be replaced or removed.
pub const CRON_TAG: &str = "# basekit-backup";
pub const DEFAULT_SCHEDULE: &str = "0 2 * * *";

/// The crontab line that runs `<exe> backup` from `project_dir`.
pub fn cron_line(schedule: &str, project_dir: &Path, exe: &Path, backup_dir: &Path) -> Result<String> {
    if schedule.split_whitespace().count() != 5 {
        return Err(BasekitError::Config {
            key: "schedule".to_string(),
            value: schedule.to_string(),
        });
    }
    // An absolute backup dir replaces the project dir in the join.
    let log = project_dir.join(backup_dir).join("cron.log");
    Ok(format!(
        "{schedule} cd {dir} && {exe} backup >> {log} 2>&1 {CRON_TAG}",
        dir = shell_quote(project_dir),
        exe = shell_quote(exe),
        log = shell_quote(&log),
    ))
}

/// `path` as a single shell word. Plain paths are left bare.
fn shell_quote(path: &Path) -> String {
    let text = path.to_string_lossy();
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%=,".contains(c));
    if plain {
        text.into_owned()
    } else {
        format!("'{}'", text.replace('\'', "'\\''"))
    }
}

/// Crontab contents without any tagged lines.
pub fn without_entry(crontab: &str) -> String {
    let mut kept: String = crontab
        .lines()
        .filter(|line| !line.ends_with(CRON_TAG))
        .map(|line| format!("{line}\n"))
        .collect();
    if kept.trim().is_empty() {
        kept.clear();
    }
    kept
}

/// Crontab contents with `line` as the only tagged entry.
pub fn with_entry(crontab: &str, line: &str) -> String {
    let mut updated = without_entry(crontab);
    updated.push_str(line);
    updated.push('\n');
    updated
}

pub fn tagged_entries(crontab: &str) -> Vec<String> {
    crontab
        .lines()
        .filter(|line| line.ends_with(CRON_TAG))
        .map(str::to_string)
        .collect()
}

/// Current crontab, empty when the user has none yet.
pub async fn read_crontab(runner: &dyn CommandRunner) -> Result<String> {
    let spec = CommandSpec::new("crontab").arg("-l");
    let output = runner.output(&spec).await?;
    if output.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = output.stderr_text();
    if stderr.contains("no crontab") {
        Ok(String::new())
    } else {
        Err(BasekitError::CommandFailed {
            command: spec.display(),
            code: output.code,
            stderr,
        })
    }
}

async fn write_crontab(runner: &dyn CommandRunner, contents: String) -> Result<()> {
    runner
        .run(&CommandSpec::new("crontab").arg("-").stdin(contents.into_bytes()))
        .await
        .map(drop)
}

pub async fn install(runner: &dyn CommandRunner, line: &str) -> Result<()> {
    let current = read_crontab(runner).await?;
    write_crontab(runner, with_entry(&current, line)).await?;
    info!(entry = line, "backup schedule installed");
    Ok(())
}

/// Remove tagged lines. Returns how many were removed.
pub async fn remove(runner: &dyn CommandRunner) -> Result<usize> {
    let current = read_crontab(runner).await?;
    let removed = tagged_entries(&current).len();
    if removed > 0 {
        write_crontab(runner, without_entry(&current)).await?;
        info!(removed, "backup schedule removed");
    }
    Ok(removed)
}

pub async fn show(runner: &dyn CommandRunner) -> Result<Vec<String>> {
    Ok(tagged_entries(&read_crontab(runner).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::exec::testing::ScriptedRunner;

    fn line() -> String {
        cron_line(
            DEFAULT_SCHEDULE,
            Path::new("/srv/base"),
            Path::new("/usr/local/bin/basekit"),
            Path::new("backups"),
        )
        .unwrap()
    }

    #[test]
    fn cron_line_runs_backup_from_project_dir() {
        assert_eq!(
            line(),
            "0 2 * * * cd /srv/base && /usr/local/bin/basekit backup >> /srv/base/backups/cron.log 2>&1 # basekit-backup"
        );
    }

    #[test]
    fn cron_line_keeps_absolute_backup_dir() {
        let line = cron_line(
            DEFAULT_SCHEDULE,
            Path::new("/srv/base"),
            Path::new("/usr/local/bin/basekit"),
            Path::new("/var/backups"),
        )
        .unwrap();
        assert!(line.contains(">> /var/backups/cron.log 2>&1"), "{line}");
        assert!(!line.contains("/srv/base/var"));
    }

    #[test]
    fn cron_line_quotes_paths_with_spaces() {
        let line = cron_line(
            DEFAULT_SCHEDULE,
            Path::new("/srv/my base"),
            Path::new("/opt/tools/basekit"),
            Path::new("backups"),
        )
        .unwrap();
        assert_eq!(
            line,
            "0 2 * * * cd '/srv/my base' && /opt/tools/basekit backup >> '/srv/my base/backups/cron.log' 2>&1 # basekit-backup"
        );
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote(Path::new("/srv/o'neil")), "'/srv/o'\\''neil'");
    }

    #[test]
    fn cron_line_rejects_bad_schedule() {
        let err = cron_line("@daily", Path::new("/"), Path::new("b"), Path::new("b")).unwrap_err();
        assert!(matches!(err, BasekitError::Config { .. }));
    }

    #[test]
    fn with_entry_replaces_previous_tagged_line() {
        let existing = format!("MAILTO=ops\n5 4 * * * old {CRON_TAG}\n*/5 * * * * other-job\n");
        let updated = with_entry(&existing, &line());
        assert_eq!(tagged_entries(&updated), vec![line()]);
        assert!(updated.starts_with("MAILTO=ops\n*/5 * * * * other-job\n"));
    }

    #[test]
    fn without_entry_of_only_tagged_lines_is_empty() {
        assert_eq!(without_entry(&format!("{}\n", line())), "");
    }

    #[tokio::test]
    async fn install_into_missing_crontab() {
        let runner = ScriptedRunner::new().on(
            "crontab -l",
            CommandOutput::failed(1, "no crontab for deploy"),
        );
        install(&runner, &line()).await.unwrap();
        let written = runner.input_for("crontab -").unwrap();
        assert_eq!(String::from_utf8(written).unwrap(), format!("{}\n", line()));
    }

    #[tokio::test]
    async fn remove_without_entries_writes_nothing() {
        let runner = ScriptedRunner::new().on("crontab -l", CommandOutput::ok("0 * * * * other\n"));
        assert_eq!(remove(&runner).await.unwrap(), 0);
        assert!(runner.input_for("crontab -").is_none());
    }

    #[tokio::test]
    async fn unexpected_crontab_failure_is_fatal() {
        let runner = ScriptedRunner::new().on("crontab -l", CommandOutput::failed(1, "permission denied"));
        assert!(matches!(
            show(&runner).await,
            Err(BasekitError::CommandFailed { .. })
        ));
    }
}
