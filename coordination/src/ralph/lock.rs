//! Directory-scoped exclusive lock
//!
//! At most one ralph loop may run per working directory. The lock is a
//! marker file created with exclusive-create semantics; acquisition never
//! waits. The file is removed when the guard drops, including during panic
//! unwinding.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::{RalphError, RalphResult};

/// Lock marker file name inside the working directory
pub const LOCK_FILE: &str = ".ralph.lock";

/// Held lock; released on drop
#[derive(Debug)]
pub struct RalphLock {
    path: PathBuf,
}

impl RalphLock {
    /// Take the lock for `dir`, failing immediately if it is already held.
    pub fn acquire(dir: &Path) -> RalphResult<Self> {
        let path = dir.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(RalphError::LockHeld { path });
            }
            Err(e) => return Err(RalphError::Io(e)),
        };

        let lock = Self { path };
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %lock.path.display(), "Ralph lock acquired");
        Ok(lock)
    }

    /// Whether a lock marker exists in `dir`
    pub fn is_held(dir: &Path) -> bool {
        dir.join(LOCK_FILE).exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for RalphLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Ralph lock released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove lock file: {}", e),
        }
    }
}
