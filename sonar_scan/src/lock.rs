//! Host-wide instance lock and presence file.
//!
//! At most one scan engine may drive the devices on a host. Exclusivity is
//! an advisory `flock(2)` on the lock file; presence is the identifier file
//! next to it holding the owner's decimal pid.
//!
//! Release order: unlock, close, remove the identifier file if it still
//! names this process, remove the lock file. Release errors are logged and
//! swallowed so shutdown always completes.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::LockError;

/// Held instance lock. Released on `release()` or drop.
pub struct InstanceLock {
    lock_path: PathBuf,
    pid_path: PathBuf,
    pid: u32,
    guard: Option<Flock<File>>,
}

impl InstanceLock {
    /// Acquire the lock and publish this process's pid.
    ///
    /// # Errors
    /// `LockError::AlreadyRunning` when another holder exists; the holder's
    /// pid is read from `pid_path` when possible.
    pub fn acquire(lock_path: &Path, pid_path: &Path) -> Result<Self, LockError> {
        Self::acquire_as(lock_path, pid_path, std::process::id())
    }

    /// Acquire publishing an explicit identifier.
    pub fn acquire_as(lock_path: &Path, pid_path: &Path, pid: u32) -> Result<Self, LockError> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|source| LockError::Io {
                path: lock_path.to_path_buf(),
                source,
            })?;

        let guard = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(guard) => guard,
            Err((_file, errno)) if errno == Errno::EWOULDBLOCK => {
                return Err(LockError::AlreadyRunning {
                    holder: read_pid(pid_path),
                });
            }
            Err((_file, errno)) => return Err(LockError::Nix { source: errno }),
        };

        // Lock is held from here on; `Drop` cleans up if publishing fails.
        let mut lock = Self {
            lock_path: lock_path.to_path_buf(),
            pid_path: pid_path.to_path_buf(),
            pid,
            guard: Some(guard),
        };

        fs::write(pid_path, format!("{pid}\n")).map_err(|source| {
            lock.release();
            LockError::Io {
                path: pid_path.to_path_buf(),
                source,
            }
        })?;

        info!("Instance lock acquired ({:?}, pid {})", lock.lock_path, pid);
        Ok(lock)
    }

    /// Whether the lock is still held.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }

    /// Published identifier.
    #[inline]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Release the lock. Idempotent.
    pub fn release(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        match guard.unlock() {
            Ok(file) => drop(file),
            // Dropping the guard unlocks as well.
            Err((guard, errno)) => {
                warn!("Failed to unlock {:?}: {}", self.lock_path, errno);
                drop(guard);
            }
        }

        if read_pid(&self.pid_path) == Some(self.pid) {
            if let Err(e) = fs::remove_file(&self.pid_path) {
                warn!("Failed to remove identifier file {:?}: {}", self.pid_path, e);
            }
        } else {
            debug!("Identifier file {:?} not ours, left in place", self.pid_path);
        }

        if let Err(e) = fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove lock file {:?}: {}", self.lock_path, e);
            }
        }

        info!("Instance lock released");
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read a decimal pid from `path`.
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

// ─── Tests ──────────────────────────────────────────────────────────
