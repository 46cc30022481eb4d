//! # File I/O Module
//!
//! File operations around a rundown, with safety features:
//! - **Atomic writes**: write to `.tmp`, sync, rename, so an interrupted run
//!   never leaves a half-written settings file, model or export
//! - **Run lock**: one rundown per project directory, even across machines
//!   on a shared drive
//! - **Version validation**: settings schema compatibility
//! - **Backups**: timestamped copies of floor models before they are modified
//!
//! ## Example
//!
//! ```rust,no_run
//! use rundown_core::file_io::{load_settings, RunLock};
//! use std::path::Path;
//!
//! let settings = load_settings(Path::new("project/rundown.json"))?;
//!
//! // Held for the whole run, released when dropped
//! let lock = RunLock::acquire(settings.root(), "engineer")?;
//! // ... run ...
//! drop(lock);
//! # Ok::<(), rundown_core::errors::RundownError>(())
//! ```

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{RundownError, RundownResult};
use crate::settings::{RundownSettings, SCHEMA_VERSION};

/// Lock file name created in the project root directory
pub const LOCK_FILE_NAME: &str = ".rundown.lock";

/// Timestamp format used in backup, log and export file names
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d@%H_%M_%S";

/// Format a local time the way file names carry it
pub fn timestamp_label(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Hours without a floor pass starting after which a lock from another
/// machine may be taken over
pub const STALE_LOCK_HOURS: i64 = 24;

/// Who is running a rundown over a project directory, and how far it got.
/// Stored as JSON in `.rundown.lock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub user_id: String,
    pub machine: String,
    pub pid: u32,
    pub locked_at: DateTime<Utc>,

    /// Floor pass being processed, as `label` and its model file
    #[serde(default)]
    pub current_pass: Option<String>,
    #[serde(default)]
    pub current_file: Option<PathBuf>,

    /// Passes started so far and in total
    #[serde(default)]
    pub passes_started: usize,
    #[serde(default)]
    pub passes_total: usize,

    /// Last time the holder recorded progress
    pub updated_at: DateTime<Utc>,
}

impl LockInfo {
    /// Lock info for the current process, before any pass has started
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        LockInfo {
            user_id: user_id.into(),
            machine: hostname().unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id(),
            locked_at: now,
            current_pass: None,
            current_file: None,
            passes_started: 0,
            passes_total: 0,
            updated_at: now,
        }
    }

    /// `user (machine)`, plus the floor being run when known
    pub fn holder(&self) -> String {
        match &self.current_pass {
            Some(pass) => format!(
                "{} ({}), on {} [{}/{}]",
                self.user_id, self.machine, pass, self.passes_started, self.passes_total
            ),
            None => format!("{} ({})", self.user_id, self.machine),
        }
    }

    /// A lock is stale when its process is gone from this machine, or no
    /// pass has started for [`STALE_LOCK_HOURS`].
    pub fn is_stale(&self) -> bool {
        if hostname().as_deref() == Some(self.machine.as_str()) && !process_alive(self.pid) {
            return true;
        }
        (Utc::now() - self.updated_at).num_hours() >= STALE_LOCK_HOURS
    }
}

fn hostname() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("COMPUTERNAME").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOSTNAME").ok().or_else(|| std::env::var("HOST").ok())
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    fs::metadata(format!("/proc/{}", pid)).is_ok()
}

#[cfg(windows)]
fn process_alive(pid: u32) -> bool {
    use std::process::Command;
    match Command::new("tasklist").args(["/FI", &format!("PID eq {}", pid), "/NH"]).output() {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
        Err(_) => true,
    }
}

#[cfg(not(any(unix, windows)))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Exclusive lock over a project directory for the duration of a run.
///
/// The OS lock (fs2) is taken first; the [`LockInfo`] left in the file by an
/// earlier holder is only judged while that lock is held, so two operators
/// can never both take over the same stale lock. The holder rewrites the
/// file as floor passes start so others can see progress.
pub struct RunLock {
    lock_path: PathBuf,
    lock_file: File,
    pub info: LockInfo,
}

impl RunLock {
    /// Acquire the run lock on `root`.
    ///
    /// # Returns
    ///
    /// * `Ok(RunLock)` - Lock acquired, taking over a stale one if present
    /// * `Err(RundownError::FileLocked)` - Another live run holds the lock
    pub fn acquire(root: &Path, user_id: impl Into<String>) -> RundownResult<Self> {
        let lock_path = root.join(LOCK_FILE_NAME);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| RundownError::file_error("open lock", lock_path.display().to_string(), e.to_string()))?;

        if lock_file.try_lock_exclusive().is_err() {
            let (by, at) = match read_lock_info(&lock_path) {
                Ok(existing) => (existing.holder(), existing.locked_at.to_rfc3339()),
                Err(_) => ("another process".to_string(), "unknown".to_string()),
            };
            return Err(RundownError::file_locked(root.display().to_string(), by, at));
        }

        // Held: a live holder on a drive without OS locks still shows up here
        if let Some(existing) = parse_lock_info(&lock_file) {
            if !existing.is_stale() {
                return Err(RundownError::file_locked(
                    root.display().to_string(),
                    existing.holder(),
                    existing.locked_at.to_rfc3339(),
                ));
            }
            info!(previous = %existing.holder(), "Taking over stale run lock");
        }

        let lock = RunLock {
            lock_path,
            lock_file,
            info: LockInfo::new(user_id),
        };
        lock.write_info(&lock.info)?;
        debug!(path = %lock.lock_path.display(), "Run lock acquired");
        Ok(lock)
    }

    /// Holder of a live lock on `root`, if any. Stale locks read as free.
    pub fn check(root: &Path) -> Option<LockInfo> {
        let lock_path = root.join(LOCK_FILE_NAME);
        if !lock_path.exists() {
            return None;
        }
        read_lock_info(&lock_path).ok().filter(|info| !info.is_stale())
    }

    /// Record that a floor pass has started, refreshing the lock
    pub fn record_pass(&self, label: &str, file: &Path, position: usize, total: usize) -> RundownResult<LockInfo> {
        let info = LockInfo {
            current_pass: Some(label.to_string()),
            current_file: Some(file.to_path_buf()),
            passes_started: position + 1,
            passes_total: total,
            updated_at: Utc::now(),
            ..self.info.clone()
        };
        self.write_info(&info)?;
        Ok(info)
    }

    fn write_info(&self, info: &LockInfo) -> RundownResult<()> {
        let json = serde_json::to_string_pretty(info).map_err(|e| RundownError::serialization(e.to_string()))?;
        let io_error = |e: std::io::Error| RundownError::file_error("write lock", self.lock_path.display().to_string(), e.to_string());

        let mut file = &self.lock_file;
        file.set_len(0).map_err(io_error)?;
        file.seek(SeekFrom::Start(0)).map_err(io_error)?;
        file.write_all(json.as_bytes()).map_err(io_error)?;
        file.sync_all().map_err(io_error)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn read_lock_info(lock_path: &Path) -> RundownResult<LockInfo> {
    let contents = read_to_string(lock_path, "read lock")?;
    serde_json::from_str(&contents).map_err(|e| RundownError::serialization(e.to_string()))
}

fn parse_lock_info(mut file: &File) -> Option<LockInfo> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}

fn read_to_string(path: &Path, operation: &str) -> RundownResult<String> {
    let mut file =
        File::open(path).map_err(|e| RundownError::file_error(operation, path.display().to_string(), e.to_string()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| RundownError::file_error(operation, path.display().to_string(), e.to_string()))?;
    Ok(contents)
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `contents` to `path` with atomic semantics.
///
/// 1. Write to `<path>.tmp`
/// 2. Sync to disk (fsync)
/// 3. Rename over `path` (atomic on most filesystems)
///
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, contents: &[u8]) -> RundownResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| RundownError::file_error("create directory", parent.display().to_string(), e.to_string()))?;
    }

    let tmp_path = tmp_path_for(path);
    let mut tmp_file = File::create(&tmp_path)
        .map_err(|e| RundownError::file_error("create temp file", tmp_path.display().to_string(), e.to_string()))?;

    tmp_file
        .write_all(contents)
        .map_err(|e| RundownError::file_error("write temp file", tmp_path.display().to_string(), e.to_string()))?;

    tmp_file
        .sync_all()
        .map_err(|e| RundownError::file_error("sync temp file", tmp_path.display().to_string(), e.to_string()))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        RundownError::file_error("rename to final", path.display().to_string(), e.to_string())
    })
}

/// Save settings as pretty JSON with an atomic write
pub fn save_settings(settings: &RundownSettings, path: &Path) -> RundownResult<()> {
    let json = serde_json::to_string_pretty(settings).map_err(|e| RundownError::serialization(e.to_string()))?;
    write_atomic(path, json.as_bytes())
}

/// Load settings from a file.
///
/// An empty or relative `root_directory` is resolved against the directory
/// holding the settings file.
///
/// # Returns
///
/// * `Err(RundownError::VersionMismatch)` - File version is incompatible
/// * `Err(RundownError::SerializationError)` - Invalid JSON
/// * `Err(RundownError::FileError)` - I/O error
pub fn load_settings(path: &Path) -> RundownResult<RundownSettings> {
    let contents = read_to_string(path, "open")?;
    let mut settings: RundownSettings = serde_json::from_str(&contents)
        .map_err(|e| RundownError::serialization(format!("Invalid JSON in {}: {}", path.display(), e)))?;

    validate_version(&settings.version)?;

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    if settings.root_directory.as_os_str().is_empty() {
        settings.root_directory = base;
    } else if settings.root_directory.is_relative() {
        settings.root_directory = base.join(&settings.root_directory);
    }

    Ok(settings)
}

/// Validate that a file version is compatible with the current schema.
fn validate_version(file_version: &str) -> RundownResult<()> {
    let mismatch = || RundownError::VersionMismatch {
        file_version: file_version.to_string(),
        expected_version: SCHEMA_VERSION.to_string(),
    };

    let file_parts: Vec<u32> = file_version.split('.').filter_map(|p| p.parse().ok()).collect();
    let current_parts: Vec<u32> = SCHEMA_VERSION.split('.').filter_map(|p| p.parse().ok()).collect();

    let (Some(file_major), Some(current_major)) = (file_parts.first(), current_parts.first()) else {
        return Err(mismatch());
    };

    if file_major != current_major {
        return Err(mismatch());
    }

    // 0.x: a newer minor may carry breaking changes
    if *current_major == 0 {
        if let (Some(file_minor), Some(current_minor)) = (file_parts.get(1), current_parts.get(1)) {
            if file_minor > current_minor {
                return Err(mismatch());
            }
        }
    }

    Ok(())
}

/// Backup location of a floor model:
/// `<model dir>/backups/<file name>.bak_<YYYY_MM_DD@HH_MM_SS>`
pub fn backup_path(model_path: &Path, at: &DateTime<Local>) -> PathBuf {
    let dir = model_path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut name = model_path.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".bak_{}", timestamp_label(at)));
    dir.join("backups").join(name)
}

/// Create the backups directory for a model if needed and return the
/// backup path to save to.
pub fn prepare_backup(model_path: &Path, at: &DateTime<Local>) -> RundownResult<PathBuf> {
    let path = backup_path(model_path, at);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| RundownError::file_error("create backups directory", dir.display().to_string(), e.to_string()))?;
    }
    info!(backup = %path.display(), "Creating backup file");
    Ok(path)
}
