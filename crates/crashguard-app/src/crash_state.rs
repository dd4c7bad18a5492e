//! Crash log persistence
//!
//! Writes the last crash to the cache directory so it can be attached to a
//! report or shown on the next start.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crashguard_core::CrashJournal;

/// Crash log errors
#[derive(Error, Debug)]
pub enum CrashStateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed crash record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crash log path {0} is a symlink")]
    Symlink(PathBuf),
}

/// One persisted crash
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrashRecord {
    /// Raw, untruncated fault text
    pub fault_text: String,
    pub timestamp: DateTime<Local>,
    /// PID of the process that crashed
    pub pid: u32,
    pub app_name: String,
}

impl CrashRecord {
    pub fn new(app_name: &str, fault_text: &str) -> Self {
        Self {
            fault_text: fault_text.to_string(),
            timestamp: Local::now(),
            pid: std::process::id(),
            app_name: app_name.to_string(),
        }
    }
}

/// Get the cache directory for crashguard
fn cache_dir() -> PathBuf {
    ProjectDirs::from("io", "crashguard", "crashguard")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("crashguard"))
}

/// Get the default crash log path
pub fn crash_log_path() -> PathBuf {
    cache_dir().join("last_crash.json")
}

fn refuse_symlink(path: &Path) -> Result<(), CrashStateError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(CrashStateError::Symlink(path.to_path_buf())),
        _ => Ok(()),
    }
}

/// Write `record` to `path`
pub fn write_crash_record(path: &Path, record: &CrashRecord) -> Result<(), CrashStateError> {
    refuse_symlink(path)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let bytes = serde_json::to_vec_pretty(record)?;

    // Write atomically using temp file + rename
    let temp_path = path.with_extension("tmp");
    refuse_symlink(&temp_path)?;
    fs::write(&temp_path, &bytes)?;

    // Fault text may contain user data
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&temp_path, perms)?;
    }

    fs::rename(&temp_path, path)?;

    log::trace!("Wrote crash record: {} bytes", bytes.len());
    Ok(())
}

/// Read the crash record at `path`
pub fn read_crash_record(path: &Path) -> Result<CrashRecord, CrashStateError> {
    refuse_symlink(path)?;
    let bytes = fs::read(path)?;
    let record: CrashRecord = serde_json::from_slice(&bytes)?;

    log::info!(
        "Read crash record of {}, written by PID {} at {}",
        record.app_name,
        record.pid,
        record.timestamp
    );
    Ok(record)
}

/// Remove the crash record at `path`, if any
pub fn clear_crash_record(path: &Path) -> Result<(), CrashStateError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    // Check for symlink to prevent targeted file deletion
    if meta.file_type().is_symlink() {
        log::warn!("Crash log path is a symlink, refusing to remove");
        return Err(CrashStateError::Symlink(path.to_path_buf()));
    }
    fs::remove_file(path)?;
    Ok(())
}

/// [`CrashJournal`] writing [`CrashRecord`]s to one file
#[derive(Debug, Clone)]
pub struct FileCrashJournal {
    path: PathBuf,
    app_name: String,
}

impl FileCrashJournal {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self::at(crash_log_path(), app_name)
    }

    pub fn at(path: PathBuf, app_name: impl Into<String>) -> Self {
        Self {
            path,
            app_name: app_name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CrashJournal for FileCrashJournal {
    fn record(&self, fault_text: &str) -> io::Result<PathBuf> {
        let record = CrashRecord::new(&self.app_name, fault_text);
        match write_crash_record(&self.path, &record) {
            Ok(()) => Ok(self.path.clone()),
            Err(CrashStateError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e)),
        }
    }
}
