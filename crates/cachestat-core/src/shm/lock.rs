//! Cross-process mutual exclusion over an `flock(2)` lock file.
//!
//! `flock` locks belong to an open file description, not to a thread. Two
//! consequences shape this type:
//! - threads sharing one handle would all "own" the lock at once, so a
//!   `parking_lot::Mutex` serializes them before the `flock` call;
//! - a forked child shares its parent's description, so each worker must call
//!   [`CrossProcessLock::reinitialize_for_child`] to get a description of its own.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{CacheStatError, Result};

const MIN_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(10);

pub struct CrossProcessLock {
    path: PathBuf,
    file: Mutex<File>,
}

impl std::fmt::Debug for CrossProcessLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossProcessLock").field("path", &self.path).finish()
    }
}

impl CrossProcessLock {
    /// Create the lock file with `mode`, regardless of the process umask, so
    /// workers running under a reduced-privilege identity can still open it.
    pub fn create(path: &Path, mode: u32) -> Result<Self> {
        let file = super::create_options(mode)
            .open(path)
            .map_err(|e| CacheStatError::LockCreation(format!("{}: {e}", path.display())))?;
        super::apply_mode(path, mode)
            .map_err(|e| CacheStatError::LockCreation(format!("chmod {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), mode = %format_args!("{mode:o}"), "lock file created");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Re-establish process-local lock state in a new worker.
    ///
    /// Reopens the existing file; never creates it. A missing file means the
    /// generation this handle belongs to is gone.
    pub fn reinitialize_for_child(&self) -> Result<Self> {
        Self::open_existing(&self.path)
    }

    /// Attach to a lock created by another process.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let file = super::attach_options()
            .open(path)
            .map_err(|e| CacheStatError::LockAttach(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock.
    ///
    /// `None` blocks in the kernel until the holder releases. `Some(limit)`
    /// polls with exponential backoff and gives up with `UpdateSkipped` once
    /// `limit` has elapsed, so a holder that died mid-update cannot stall the
    /// caller forever.
    pub fn lock(&self, timeout: Option<Duration>) -> Result<LockGuard<'_>> {
        match timeout {
            None => self.lock_blocking(),
            Some(limit) => self.lock_bounded(limit),
        }
    }

    fn lock_blocking(&self) -> Result<LockGuard<'_>> {
        let file = self.file.lock();
        loop {
            match FileExt::lock_exclusive(&*file) {
                Ok(()) => return Ok(LockGuard { file, path: &self.path }),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(CacheStatError::UpdateSkipped(format!(
                        "flock {}: {e}",
                        self.path.display()
                    )))
                }
            }
        }
    }

    fn lock_bounded(&self, limit: Duration) -> Result<LockGuard<'_>> {
        let deadline = Instant::now() + limit;
        let file = self.file.try_lock_for(limit).ok_or_else(|| {
            CacheStatError::UpdateSkipped(format!("in-process lock wait exceeded {limit:?}"))
        })?;

        let contended = fs2::lock_contended_error().kind();
        let mut backoff = MIN_BACKOFF;
        loop {
            match FileExt::try_lock_exclusive(&*file) {
                Ok(()) => return Ok(LockGuard { file, path: &self.path }),
                Err(e) if e.kind() == contended || e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(CacheStatError::UpdateSkipped(format!(
                        "flock {}: {e}",
                        self.path.display()
                    )))
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CacheStatError::UpdateSkipped(format!(
                    "cross-process lock wait exceeded {limit:?}"
                )));
            }
            thread::sleep(backoff.min(deadline - now));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

/// Proof that the cross-process lock is held. Unlocks on drop.
pub struct LockGuard<'a> {
    file: MutexGuard<'a, File>,
    path: &'a Path,
}

impl LockGuard<'_> {
    /// Path of the lock this guard holds.
    pub fn lock_path(&self) -> &Path {
        self.path
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // flock first; the in-process mutex is released when `file` drops.
        if let Err(e) = FileExt::unlock(&*self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "cross-process unlock failed");
        }
    }
}
