//! Advisory project locking with crash recovery
//!
//! One pipeline run may operate on a project directory at a time. The lock is a
//! `.lock` file created with `create_new` semantics inside the project directory,
//! held with an fd lock for the life of the guard and removed on drop. It
//! coordinates reskin processes; it is not a security boundary.

use camino::{Utf8Path, Utf8PathBuf};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default age threshold for considering a lock stale (in seconds)
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 3600;

const LOCK_FILE_NAME: &str = ".lock";

/// Lock information stored in the lock file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    /// Process ID that created the lock
    pub pid: u32,
    /// Seconds since UNIX epoch when the lock was created
    pub created_at: u64,
    /// Project being locked
    pub project_id: String,
    /// reskin version that created the lock
    pub reskin_version: String,
}

/// Lock errors for project locking operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "Concurrent execution detected for project '{project_id}' (PID {pid}, created \
            {created_ago} ago)"
    )]
    ConcurrentExecution {
        project_id: String,
        pid: u32,
        created_ago: String,
    },

    #[error(
        "Stale lock detected for project '{project_id}' (PID {pid}, age {age_secs}s). Use --force \
            to override"
    )]
    StaleLock {
        project_id: String,
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

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Exclusive lock over one project directory. Released on drop.
pub struct ProjectLock {
    lock_path: Utf8PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    lock_info: LockInfo,
}

impl ProjectLock {
    /// Acquire the lock for the project rooted at `project_dir`.
    ///
    /// An existing lock held by a live process is refused unless `force` is set.
    /// A lock left by a dead process is refused as stale (older than `ttl_seconds`)
    /// or as concurrent (younger) unless `force` is set.
    pub fn acquire(
        project_dir: &Utf8Path,
        project_id: &str,
        force: bool,
        ttl_seconds: Option<u64>,
    ) -> Result<Self, LockError> {
        match fs::create_dir_all(project_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(LockError::AcquisitionFailed {
                    reason: format!("Failed to create project directory {project_dir}: {e}"),
                });
            }
        }

        let lock_path = Self::lock_path(project_dir);
        let ttl = ttl_seconds.unwrap_or(DEFAULT_STALE_THRESHOLD_SECS);
        Self::acquire_with_retry(project_id, &lock_path, force, ttl, 3)
    }

    fn acquire_with_retry(
        project_id: &str,
        lock_path: &Utf8Path,
        force: bool,
        ttl_seconds: u64,
        max_retries: u32,
    ) -> Result<Self, LockError> {
        for attempt in 0..max_retries {
            let lock_info = LockInfo {
                pid: process::id(),
                created_at: now_secs(),
                project_id: project_id.to_string(),
                reskin_version: env!("CARGO_PKG_VERSION").to_string(),
            };

            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(lock_path)
            {
                Ok(lock_file) => {
                    return Self::finalize_lock(lock_path.to_path_buf(), lock_file, lock_info);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::check_existing_lock(lock_path, project_id, force, ttl_seconds)?;
                    Self::remove_stale_lock(lock_path, project_id)?;
                    if attempt + 1 < max_retries {
                        // Deterministic jitter keyed on PID so racing processes don't lockstep.
                        let delay_ms = 10u64.saturating_mul(2u64.saturating_pow(attempt))
                            + u64::from(process::id()) % 7;
                        std::thread::sleep(std::time::Duration::from_millis(delay_ms.min(100)));
                    }
                }
                Err(e) => {
                    return Err(LockError::AcquisitionFailed {
                        reason: format!(
                            "Failed to create lock file for project '{project_id}' at \
                                '{lock_path}': {e}"
                        ),
                    });
                }
            }
        }

        Err(LockError::AcquisitionFailed {
            reason: format!(
                "Max retries ({max_retries}) exceeded for lock acquisition on project \
                    '{project_id}'"
            ),
        })
    }

    fn finalize_lock(
        lock_path: Utf8PathBuf,
        lock_file: fs::File,
        lock_info: LockInfo,
    ) -> Result<Self, LockError> {
        let lock_json =
            serde_json::to_string_pretty(&lock_info).map_err(|e| LockError::AcquisitionFailed {
                reason: format!("Failed to serialize lock info: {e}"),
            })?;

        let mut rw_lock = Box::new(RwLock::new(lock_file));
        {
            let fd_lock = rw_lock
                .try_write()
                .map_err(|_| LockError::ConcurrentExecution {
                    project_id: lock_info.project_id.clone(),
                    pid: 0,
                    created_ago: "unknown".to_string(),
                })?;

            let mut file_ref = &*fd_lock;
            file_ref
                .write_all(lock_json.as_bytes())
                .map_err(|e| LockError::AcquisitionFailed {
                    reason: format!("Failed to write lock info: {e}"),
                })?;
            file_ref.flush().map_err(|e| LockError::AcquisitionFailed {
                reason: format!("Failed to flush lock file: {e}"),
            })?;
            file_ref.sync_all().map_err(|e| LockError::AcquisitionFailed {
                reason: format!("Failed to sync lock file: {e}"),
            })?;
        }

        Ok(Self {
            lock_path,
            _fd_lock: Some(rw_lock),
            lock_info,
        })
    }

    /// Rename-then-delete so a concurrent remover sees `NotFound`, which is fine.
    fn remove_stale_lock(lock_path: &Utf8Path, project_id: &str) -> Result<(), LockError> {
        let stale_path =
            lock_path.with_extension(format!("stale.{}.{}", now_secs(), process::id()));
        match fs::rename(lock_path, &stale_path) {
            Ok(()) => {
                let _ = fs::remove_file(&stale_path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::AcquisitionFailed {
                reason: format!("Failed to rename stale lock for project '{project_id}': {e}"),
            }),
        }
    }

    /// Read the lock information for `project_dir`, if a lock exists.
    pub fn inspect(project_dir: &Utf8Path) -> Result<Option<LockInfo>, LockError> {
        let lock_path = Self::lock_path(project_dir);
        let content = match fs::read_to_string(&lock_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LockError::CorruptedLock {
                    reason: format!("Failed to read lock file: {e}"),
                });
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| LockError::CorruptedLock {
                reason: format!("Failed to parse lock file: {e}"),
            })
    }

    /// Release the lock explicitly (also happens on drop).
    pub fn release(mut self) -> Result<(), LockError> {
        self._fd_lock.take();
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::ReleaseFailed {
                reason: format!("Failed to remove lock file: {e}"),
            }),
        }
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.lock_info.project_id
    }

    #[must_use]
    pub const fn lock_info(&self) -> &LockInfo {
        &self.lock_info
    }

    fn lock_path(project_dir: &Utf8Path) -> Utf8PathBuf {
        project_dir.join(LOCK_FILE_NAME)
    }

    fn check_existing_lock(
        lock_path: &Utf8Path,
        project_id: &str,
        force: bool,
        ttl_seconds: u64,
    ) -> Result<(), LockError> {
        let content = match fs::read_to_string(lock_path) {
            Ok(content) => content,
            // Removed between create_new and read; caller retries.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(LockError::CorruptedLock {
                    reason: format!("Failed to read existing lock for project '{project_id}': {e}"),
                });
            }
        };

        let existing: LockInfo = match serde_json::from_str(&content) {
            Ok(info) => info,
            Err(_) if force => return Ok(()),
            Err(e) => {
                return Err(LockError::CorruptedLock {
                    reason: format!(
                        "Failed to parse existing lock for project '{project_id}': {e}"
                    ),
                });
            }
        };

        Self::validate_existing_lock(&existing, project_id, force, ttl_seconds)
    }

    fn validate_existing_lock(
        existing: &LockInfo,
        project_id: &str,
        force: bool,
        ttl_seconds: u64,
    ) -> Result<(), LockError> {
        if force {
            return Ok(());
        }

        let lock_age = now_secs().saturating_sub(existing.created_at);
        if !is_process_running(existing.pid) && lock_age > ttl_seconds {
            return Err(LockError::StaleLock {
                project_id: project_id.to_string(),
                pid: existing.pid,
                age_secs: lock_age,
            });
        }

        Err(LockError::ConcurrentExecution {
            project_id: project_id.to_string(),
            pid: existing.pid,
            created_ago: format_age(lock_age),
        })
    }
}

impl std::fmt::Debug for ProjectLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectLock")
            .field("lock_path", &self.lock_path)
            .field("lock_info", &self.lock_info)
            .field("_fd_lock", &"<RwLock>")
            .finish()
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        self._fd_lock.take();
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // kill(pid, 0): 0 if signalable, EPERM if it exists but belongs to someone else.
        let rc = unsafe { libc::kill(pid as i32, 0) };
        rc == 0
            || matches!(
                io::Error::last_os_error().raw_os_error(),
                Some(code) if code == libc::EPERM
            )
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

fn format_age(secs: u64) -> String {
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
