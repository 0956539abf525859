//! Directory-scoped advisory write lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{Result, SendaError};

/// Name of the lock file inside a storage location.
pub const LOCK_FILE: &str = "senda.lock";

/// Holds the advisory write lock for one storage location.
///
/// Acquisition is try-once and non-blocking: if another process holds the
/// lock the call fails with [`SendaError::Lock`] and is never retried here.
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
    file: Option<File>,
}

impl DirLock {
    /// Tries to take the write lock for `location`.
    pub fn acquire(location: &Path) -> Result<Self> {
        let path = location.join(LOCK_FILE);
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                return Err(SendaError::Lock(format!(
                    "{} is locked by another process",
                    location.display()
                )));
            }
            Ok(Self {
                path,
                file: Some(file),
            })
        }
        #[cfg(not(unix))]
        {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => Ok(Self {
                    path,
                    file: Some(file),
                }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    Err(SendaError::Lock(format!(
                        "{} is locked (stale {}?)",
                        location.display(),
                        LOCK_FILE
                    )))
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        // closing the file releases the flock; the unlink is best-effort
        self.file.take();
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lock_is_exclusive_within_a_process() {
        let dir = tempdir().expect("temp dir");
        let lock = DirLock::acquire(dir.path()).expect("first acquire");
        #[cfg(unix)]
        {
            // flock is per open file description, so a second handle in the
            // same process must fail too
            let second = DirLock::acquire(dir.path());
            assert!(matches!(second, Err(SendaError::Lock(_))));
        }
        drop(lock);
        let again = DirLock::acquire(dir.path()).expect("reacquire after drop");
        drop(again);
    }
}
