//! Advisory file lock guarding one workflow record per issue.
//!
//! The lock file lives next to the persisted state (`<state_dir>/<issue_id>.lock`)
//! and carries a small JSON payload identifying the owning process. Creation uses
//! `create_new` (O_EXCL) so two processes can never both believe they own the
//! record, and an `fd-lock` write guard is held for the lifetime of [`FileLock`].

use camino::{Utf8Path, Utf8PathBuf};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::process;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default age after which a lock held by a live process is reported as stale
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3600;

const MAX_ACQUIRE_ATTEMPTS: u32 = 3;
const MAX_READ_RETRIES: u32 = 3;
const READ_RETRY_DELAY_MS: u64 = 10;

/// Lock information stored in the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that created the lock
    pub pid: u32,
    /// Seconds since UNIX epoch when the lock was created
    pub created_at: u64,
    /// Issue whose workflow record is locked
    pub issue_id: String,
    /// sparcflow version that created the lock
    pub sparcflow_version: String,
}

/// Errors raised while acquiring, inspecting or releasing an issue lock
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "Workflow for issue '{issue_id}' is already running (PID {pid}, started {created_ago} ago)"
    )]
    ConcurrentExecution {
        issue_id: String,
        pid: u32,
        created_ago: String,
    },

    #[error(
        "Stale lock for issue '{issue_id}' (PID {pid}, age {age_secs}s). Use --force to override"
    )]
    StaleLock {
        issue_id: String,
        pid: u32,
        age_secs: u64,
    },

    #[error("Lock file is corrupted or invalid: {reason}")]
    CorruptedLock { reason: String },

    #[error("Failed to acquire lock: {reason}")]
    AcquisitionFailed { reason: String },

    #[error("Failed to release lock: {reason}")]
    ReleaseFailed { reason: String },

    #[error("IO error during lock operation: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive, process-level lock on one issue's workflow record.
///
/// Dropping the value releases the descriptor lock and removes the file.
pub struct FileLock {
    lock_path: Utf8PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    lock_info: LockInfo,
}

impl FileLock {
    /// Path of the lock file for `issue_id` inside `dir`.
    #[must_use]
    pub fn lock_path(dir: &Utf8Path, issue_id: &str) -> Utf8PathBuf {
        dir.join(format!("{issue_id}.lock"))
    }

    /// Acquire the lock for `issue_id`, creating `dir` if needed.
    ///
    /// An existing lock whose owner process has exited is reclaimed. A lock held
    /// by a live process is only overridden with `force`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::ConcurrentExecution`] when a live process holds a
    /// fresh lock, [`LockError::StaleLock`] when a live holder exceeded the TTL,
    /// and [`LockError::CorruptedLock`] when the existing file cannot be parsed.
    pub fn acquire(
        dir: &Utf8Path,
        issue_id: &str,
        force: bool,
        ttl_seconds: Option<u64>,
    ) -> Result<Self, LockError> {
        match fs::create_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(LockError::AcquisitionFailed {
                    reason: format!("Failed to create lock directory '{dir}': {e}"),
                });
            }
        }

        let lock_path = Self::lock_path(dir, issue_id);
        let ttl = ttl_seconds.unwrap_or(DEFAULT_LOCK_TTL_SECS);

        for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
            let lock_info = LockInfo {
                pid: process::id(),
                created_at: now_secs(),
                issue_id: issue_id.to_string(),
                sparcflow_version: env!("CARGO_PKG_VERSION").to_string(),
            };

            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&lock_path)
            {
                Ok(file) => return Self::finalize(lock_path, file, lock_info),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::check_existing_lock(&lock_path, issue_id, force, ttl)?;
                    Self::remove_stale_lock(&lock_path, issue_id)?;
                    backoff(attempt);
                }
                Err(e) => {
                    return Err(LockError::AcquisitionFailed {
                        reason: format!("Failed to create lock file '{lock_path}': {e}"),
                    });
                }
            }
        }

        Err(LockError::AcquisitionFailed {
            reason: format!(
                "Another process re-acquired the lock for issue '{issue_id}' after {MAX_ACQUIRE_ATTEMPTS} attempts"
            ),
        })
    }

    fn finalize(
        lock_path: Utf8PathBuf,
        file: fs::File,
        lock_info: LockInfo,
    ) -> Result<Self, LockError> {
        let lock_json =
            serde_json::to_string_pretty(&lock_info).map_err(|e| LockError::AcquisitionFailed {
                reason: format!("Failed to serialize lock info: {e}"),
            })?;

        let mut rw_lock = Box::new(RwLock::new(file));
        {
            let guard = rw_lock
                .try_write()
                .map_err(|_| LockError::ConcurrentExecution {
                    issue_id: lock_info.issue_id.clone(),
                    pid: 0,
                    created_ago: "unknown".to_string(),
                })?;

            let mut file_ref = &*guard;
            file_ref.write_all(lock_json.as_bytes())?;
            file_ref.flush()?;
            file_ref.sync_all()?;
        }

        Ok(Self {
            lock_path,
            _fd_lock: Some(rw_lock),
            lock_info,
        })
    }

    /// Rename-then-delete so a concurrent reader never sees a half-removed file.
    fn remove_stale_lock(lock_path: &Utf8Path, issue_id: &str) -> Result<(), LockError> {
        let stale_path =
            lock_path.with_extension(format!("lock.stale.{}.{}", now_millis(), process::id()));

        match fs::rename(lock_path, &stale_path) {
            Ok(()) => {
                let _ = fs::remove_file(&stale_path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::AcquisitionFailed {
                reason: format!("Failed to remove stale lock for issue '{issue_id}': {e}"),
            }),
        }
    }

    /// Read the lock file at `lock_path`, retrying briefly while another
    /// process may still be writing it. `Ok(None)` means the file vanished.
    fn read_lock_file(lock_path: &Utf8Path) -> Result<Option<LockInfo>, LockError> {
        for attempt in 0..MAX_READ_RETRIES {
            let last = attempt + 1 == MAX_READ_RETRIES;
            let content = match fs::read_to_string(lock_path) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(_) if !last => {
                    std::thread::sleep(Duration::from_millis(READ_RETRY_DELAY_MS));
                    continue;
                }
                Err(e) => {
                    return Err(LockError::CorruptedLock {
                        reason: format!("Failed to read lock file '{lock_path}': {e}"),
                    });
                }
            };

            match serde_json::from_str::<LockInfo>(&content) {
                Ok(info) => return Ok(Some(info)),
                Err(e) => {
                    let incomplete = e.is_eof() || content.trim().is_empty();
                    if incomplete && !last {
                        std::thread::sleep(Duration::from_millis(READ_RETRY_DELAY_MS));
                        continue;
                    }
                    return Err(LockError::CorruptedLock {
                        reason: format!("Failed to parse lock file '{lock_path}': {e}"),
                    });
                }
            }
        }

        Err(LockError::CorruptedLock {
            reason: format!("Lock file '{lock_path}' stayed unreadable"),
        })
    }

    /// Decide whether an existing lock may be replaced.
    fn check_existing_lock(
        lock_path: &Utf8Path,
        issue_id: &str,
        force: bool,
        ttl_seconds: u64,
    ) -> Result<(), LockError> {
        match Self::read_lock_file(lock_path)? {
            None => Ok(()),
            Some(existing) => Self::validate_existing_lock(&existing, issue_id, force, ttl_seconds),
        }
    }

    fn validate_existing_lock(
        existing: &LockInfo,
        issue_id: &str,
        force: bool,
        ttl_seconds: u64,
    ) -> Result<(), LockError> {
        if force || !is_process_running(existing.pid) {
            return Ok(());
        }

        let age_secs = now_secs().saturating_sub(existing.created_at);
        if age_secs > ttl_seconds {
            return Err(LockError::StaleLock {
                issue_id: issue_id.to_string(),
                pid: existing.pid,
                age_secs,
            });
        }

        Err(LockError::ConcurrentExecution {
            issue_id: issue_id.to_string(),
            pid: existing.pid,
            created_ago: format_duration_since(existing.created_at),
        })
    }

    /// Information about the lock currently on disk for `issue_id`, if any.
    pub fn get_lock_info(dir: &Utf8Path, issue_id: &str) -> Result<Option<LockInfo>, LockError> {
        Self::read_lock_file(&Self::lock_path(dir, issue_id))
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path, issue_id: &str) -> bool {
        Self::lock_path(dir, issue_id).exists()
    }

    /// Release the lock explicitly, surfacing removal failures.
    pub fn release(mut self) -> Result<(), LockError> {
        self._fd_lock.take();
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::ReleaseFailed {
                reason: format!("Failed to remove lock file '{}': {e}", self.lock_path),
            }),
        }
    }

    #[must_use]
    pub fn issue_id(&self) -> &str {
        &self.lock_info.issue_id
    }

    #[must_use]
    pub const fn lock_info(&self) -> &LockInfo {
        &self.lock_info
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.lock_path
    }
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("lock_path", &self.lock_path)
            .field("lock_info", &self.lock_info)
            .field("_fd_lock", &"<RwLock>")
            .finish()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self._fd_lock.take();
        let _ = fs::remove_file(&self.lock_path);
    }
}

/// Helpers for commands that touch a record without running it.
pub mod utils {
    use super::{FileLock, LockError, Utf8Path, fs, io};

    /// Check that nobody else is running the workflow for `issue_id`.
    ///
    /// Used before destructive operations such as reset. `force` skips the check.
    pub fn ensure_idle(
        dir: &Utf8Path,
        issue_id: &str,
        force: bool,
        ttl_seconds: Option<u64>,
    ) -> Result<(), LockError> {
        if force {
            return Ok(());
        }
        let lock_path = FileLock::lock_path(dir, issue_id);
        match FileLock::read_lock_file(&lock_path)? {
            None => Ok(()),
            Some(existing) => FileLock::validate_existing_lock(
                &existing,
                issue_id,
                false,
                ttl_seconds.unwrap_or(super::DEFAULT_LOCK_TTL_SECS),
            ),
        }
    }

    /// Remove the lock file regardless of its owner.
    pub fn force_remove_lock(dir: &Utf8Path, issue_id: &str) -> Result<(), LockError> {
        match fs::remove_file(FileLock::lock_path(dir, issue_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::ReleaseFailed {
                reason: format!("Failed to force remove lock: {e}"),
            }),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Exponential backoff with deterministic PID-based jitter, capped at 100ms.
fn backoff(attempt: u32) {
    let base_ms = 10u64.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_ms = (u64::from(attempt).wrapping_mul(3) + u64::from(process::id()) % 7) % 7;
    std::thread::sleep(Duration::from_millis(base_ms.saturating_add(jitter_ms).min(100)));
}

fn format_duration_since(timestamp: u64) -> String {
    let secs = now_secs().saturating_sub(timestamp);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        // SAFETY: signal 0 performs only the existence and permission check.
        let rc = unsafe { libc::kill(raw, 0) };
        if rc == 0 {
            true
        } else {
            matches!(io::Error::last_os_error().raw_os_error(), Some(code) if code == libc::EPERM)
        }
    }

    #[cfg(windows)]
    {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::minwinbase::STILL_ACTIVE;
        use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
        use winapi::um::winnt::PROCESS_QUERY_LIMITED_INFORMATION;

        // SAFETY: the handle is checked for null and closed on every path.
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return false;
            }
            let mut exit_code: u32 = 0;
            let ok = GetExitCodeProcess(handle, &mut exit_code);
            CloseHandle(handle);
            ok != 0 && exit_code == STILL_ACTIVE
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        true
    }
}
