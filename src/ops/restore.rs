use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{info, warn};

use super::backup::list_backups;
use super::{append_log, compose_exec_db};
use crate::config::Settings;
use crate::error::{BasekitError, Result};
use crate::exec::{CommandRunner, ensure_success};

/// Newest backup in the configured directory.
pub fn latest_backup(dir: &Path) -> Result<PathBuf> {
    list_backups(dir)?
        .pop()
        .ok_or_else(|| BasekitError::NoBackups(dir.to_path_buf()))
}

/// Load a compressed dump into the database. Confirmation is the caller's job.
pub async fn restore_backup(
    runner: &dyn CommandRunner,
    settings: &Settings,
    file: &Path,
) -> Result<()> {
    if !file.is_file() {
        return Err(BasekitError::io(
            file,
            std::io::Error::new(std::io::ErrorKind::NotFound, "backup file not found"),
        ));
    }

    let result = decompress_and_load(runner, settings, file).await;
    let entry = match &result {
        Ok(()) => format!("restore completed from {}", file.display()),
        Err(e) => format!("restore from {} failed: {e}", file.display()),
    };
    if let Err(e) = std::fs::create_dir_all(&settings.backup_dir)
        .map_err(|e| BasekitError::io(&settings.backup_dir, e))
        .and_then(|()| append_log(&settings.backup_dir, &entry))
    {
        warn!(error = %e, "could not write backup log");
    }
    result
}

async fn decompress_and_load(
    runner: &dyn CommandRunner,
    settings: &Settings,
    file: &Path,
) -> Result<()> {
    let compressed = File::open(file).map_err(|e| BasekitError::io(file, e))?;
    let mut sql = GzDecoder::new(BufReader::new(compressed));

    info!(file = %file.display(), database = %settings.db_name, "restoring database");
    let psql = compose_exec_db(settings).args([
        "psql",
        "-v",
        "ON_ERROR_STOP=1",
        "-U",
        settings.db_user.as_str(),
        "-d",
        settings.db_name.as_str(),
    ]);
    let output = runner.stream_from(&psql, &mut sql).await?;
    ensure_success(&psql, output)?;
    info!("restore completed");
    Ok(())
}
