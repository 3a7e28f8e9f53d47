//! Advisory lock on the segment directory.
//!
//! One live segment instance owns a directory at a time; a second open
//! fails instead of silently sharing state.

use crate::persistence::LOCK_FILE;
use anyhow::{anyhow, Context, Result};
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub struct DirectoryLock {
    // released when the Flock (and its fd) drops
    _lock: Flock<File>,
    path: PathBuf,
}

impl DirectoryLock {
    /// Take an exclusive non-blocking flock on `<dir>/.segment.lock`.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("open lock file {}", path.display()))?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => Ok(Self { _lock: lock, path }),
            Err((_, errno)) => Err(anyhow!(
                "segment directory {} is already locked ({errno})",
                dir.display()
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
