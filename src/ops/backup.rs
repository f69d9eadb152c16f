//! Compressed PostgreSQL dumps with a retention window.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{info, warn};

use super::{append_log, compose_exec_db};
use crate::config::Settings;
use crate::error::{BasekitError, Result};
use crate::exec::{CommandRunner, ensure_success};

pub const BACKUP_PREFIX: &str = "backup_";
pub const BACKUP_SUFFIX: &str = ".sql.gz";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub file: PathBuf,
    pub bytes: u64,
    pub pruned: Vec<PathBuf>,
}

/// `backup_<YYYYmmdd_HHMMSS>.sql.gz`
pub fn backup_file_name(at: NaiveDateTime) -> String {
    format!("{BACKUP_PREFIX}{}{BACKUP_SUFFIX}", at.format(TIMESTAMP_FORMAT))
}

/// Timestamp embedded in a backup file name, if it follows the pattern.
pub fn backup_timestamp(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix(BACKUP_PREFIX)?.strip_suffix(BACKUP_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

fn is_backup(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(BACKUP_SUFFIX))
}

/// When a backup was taken: from its name, else from its mtime.
fn backup_age_key(path: &Path) -> Option<NaiveDateTime> {
    let from_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(backup_timestamp);
    from_name.or_else(|| {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        Some(DateTime::<Local>::from(modified).naive_local())
    })
}

/// All `*.sql.gz` files in `dir`, oldest first.
pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BasekitError::io(dir, e)),
    };
    let mut backups: Vec<(Option<NaiveDateTime>, PathBuf)> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_backup(path))
        .map(|path| (backup_age_key(&path), path))
        .collect();
    backups.sort();
    Ok(backups.into_iter().map(|(_, path)| path).collect())
}

/// Delete backups older than `retention_days` relative to `now`, never
/// touching `keep`.
pub fn prune_backups(
    dir: &Path,
    retention_days: u32,
    now: NaiveDateTime,
    keep: &Path,
) -> Result<Vec<PathBuf>> {
    let cutoff = now - TimeDelta::days(i64::from(retention_days));
    let mut pruned = Vec::new();
    for path in list_backups(dir)? {
        if path == keep {
            continue;
        }
        if backup_age_key(&path).is_some_and(|taken| taken < cutoff) {
            std::fs::remove_file(&path).map_err(|e| BasekitError::io(&path, e))?;
            info!(file = %path.display(), "removed expired backup");
            pruned.push(path);
        }
    }
    Ok(pruned)
}

/// Dump, compress, write, prune. Every outcome is recorded in the backup log.
pub async fn run_backup(
    runner: &dyn CommandRunner,
    settings: &Settings,
    now: NaiveDateTime,
) -> Result<BackupReport> {
    let dir = &settings.backup_dir;
    std::fs::create_dir_all(dir).map_err(|e| BasekitError::io(dir, e))?;

    let result = dump_and_prune(runner, settings, now).await;
    let entry = match &result {
        Ok(report) => format!(
            "backup created: {} ({} bytes, {} expired removed)",
            report.file.display(),
            report.bytes,
            report.pruned.len()
        ),
        Err(e) => format!("backup failed: {e}"),
    };
    if let Err(e) = append_log(dir, &entry) {
        warn!(error = %e, "could not write backup log");
    }
    result
}

async fn dump_and_prune(
    runner: &dyn CommandRunner,
    settings: &Settings,
    now: NaiveDateTime,
) -> Result<BackupReport> {
    let file = settings.backup_dir.join(backup_file_name(now));
    // Written under a name `list_backups` ignores until the dump is complete.
    let partial = file.with_extension("gz.partial");

    if let Err(e) = dump_compressed(runner, settings, &partial).await {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    std::fs::rename(&partial, &file).map_err(|e| BasekitError::io(&file, e))?;
    let bytes = std::fs::metadata(&file)
        .map_err(|e| BasekitError::io(&file, e))?
        .len();
    info!(file = %file.display(), bytes, "backup written");

    let pruned = prune_backups(&settings.backup_dir, settings.retention_days, now, &file)?;
    Ok(BackupReport {
        file,
        bytes,
        pruned,
    })
}

/// Stream `pg_dump` output through gzip straight into `path`.
async fn dump_compressed(runner: &dyn CommandRunner, settings: &Settings, path: &Path) -> Result<()> {
    let dump_cmd = compose_exec_db(settings).args([
        "pg_dump",
        "-U",
        settings.db_user.as_str(),
        settings.db_name.as_str(),
    ]);
    info!(database = %settings.db_name, service = %settings.db_service, "dumping database");

    let out = File::create(path).map_err(|e| BasekitError::io(path, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    let (output, dumped) = runner.stream_to(&dump_cmd, &mut encoder).await?;
    ensure_success(&dump_cmd, output)?;
    if dumped == 0 {
        return Err(BasekitError::EmptyDump);
    }
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .map_err(|e| BasekitError::io(path, e))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use chrono::NaiveDate;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    use super::*;
    use crate::exec::CommandOutput;
    use crate::exec::testing::ScriptedRunner;
    use crate::ops::BACKUP_LOG;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            backup_dir: dir.path().join("backups"),
            db_name: "base".to_string(),
            db_user: "django".to_string(),
            ..Settings::default()
        }
    }

    fn dumping_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .on("docker-compose exec -T db pg_dump", CommandOutput::ok("CREATE TABLE users();"))
    }

    fn gunzip(path: &Path) -> String {
        let mut sql = String::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut sql)
            .unwrap();
        sql
    }

    #[test]
    fn file_name_round_trips_timestamp() {
        let name = backup_file_name(at(14, 2));
        assert_eq!(name, "backup_20260314_020000.sql.gz");
        assert_eq!(backup_timestamp(&name), Some(at(14, 2)));
        assert_eq!(backup_timestamp("notes.sql.gz"), None);
    }

    #[tokio::test]
    async fn backup_writes_one_file_and_prunes_expired() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        std::fs::create_dir_all(&settings.backup_dir).unwrap();
        let expired = settings.backup_dir.join(backup_file_name(at(1, 2)));
        let recent = settings.backup_dir.join(backup_file_name(at(12, 2)));
        let unrelated = settings.backup_dir.join("README.txt");
        for path in [&expired, &recent, &unrelated] {
            std::fs::write(path, b"x").unwrap();
        }

        let runner = dumping_runner();
        let report = run_backup(&runner, &settings, at(14, 2)).await.unwrap();

        assert_eq!(report.file, settings.backup_dir.join("backup_20260314_020000.sql.gz"));
        assert_eq!(gunzip(&report.file), "CREATE TABLE users();");
        assert_eq!(report.bytes, std::fs::metadata(&report.file).unwrap().len());
        assert_eq!(report.pruned, vec![expired.clone()]);
        assert!(!expired.exists());
        assert!(recent.exists());
        assert!(unrelated.exists());

        let backups = list_backups(&settings.backup_dir).unwrap();
        assert_eq!(backups, vec![recent, report.file.clone()]);
        assert!(runner.called("docker-compose exec -T db pg_dump -U django base"));

        let log = std::fs::read_to_string(settings.backup_dir.join(BACKUP_LOG)).unwrap();
        assert!(log.contains("backup created"));
    }

    #[tokio::test]
    async fn empty_dump_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let runner = ScriptedRunner::new().on("docker-compose", CommandOutput::ok(""));

        let err = run_backup(&runner, &settings, at(14, 2)).await.unwrap_err();
        assert!(matches!(err, BasekitError::EmptyDump));
        let leftovers: Vec<_> = std::fs::read_dir(&settings.backup_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![BACKUP_LOG]);
        let log = std::fs::read_to_string(settings.backup_dir.join(BACKUP_LOG)).unwrap();
        assert!(log.contains("backup failed"));
    }

    #[tokio::test]
    async fn failed_dump_is_fatal() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let runner = ScriptedRunner::new().on(
            "docker-compose",
            CommandOutput::failed(1, "service \"db\" is not running"),
        );
        assert!(matches!(
            run_backup(&runner, &settings, at(14, 2)).await,
            Err(BasekitError::CommandFailed { .. })
        ));
        assert!(list_backups(&settings.backup_dir).unwrap().is_empty());
        assert!(!settings.backup_dir.join("backup_20260314_020000.sql.gz.partial").exists());
    }

    #[test]
    fn prune_keeps_files_inside_window() {
        let dir = TempDir::new().unwrap();
        let edge = dir.path().join(backup_file_name(at(7, 2)));
        std::fs::write(&edge, b"x").unwrap();
        let pruned = prune_backups(dir.path(), 7, at(14, 2), Path::new("")).unwrap();
        assert!(pruned.is_empty());
        assert!(edge.exists());
    }

    #[test]
    fn listing_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list_backups(&dir.path().join("nope")).unwrap().is_empty());
    }
}
