//! Database and deployment utilities. Each module is independent.

pub mod backup;
pub mod cron;
pub mod restore;
pub mod ssl;
pub mod verify;

use std::io::Write;
use std::path::Path;

use chrono::Local;

use crate::config::Settings;
use crate::error::{BasekitError, Result};
use crate::exec::CommandSpec;

pub const BACKUP_LOG: &str = "backup.log";

/// `docker-compose`, or the configured replacement such as `docker compose`.
pub fn compose(settings: &Settings) -> CommandSpec {
    CommandSpec::from_command_line(&settings.compose_cmd)
        .unwrap_or_else(|| CommandSpec::new("docker-compose"))
}

/// Run a command inside the database service without a TTY.
pub fn compose_exec_db(settings: &Settings) -> CommandSpec {
    compose(settings).args(["exec", "-T", settings.db_service.as_str()])
}

/// Append a timestamped line to `<dir>/backup.log`.
pub fn append_log(dir: &Path, message: &str) -> Result<()> {
    let path = dir.join(BACKUP_LOG);
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| BasekitError::io(&path, e))?;
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "[{stamp}] {message}").map_err(|e| BasekitError::io(&path, e))
}
