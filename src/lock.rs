//! Advisory lock on a snapshot directory.
//!
//! fs2 exclusive lock on <dir>/.snapshots.lock; held by writers, GC and
//! migration so two processes never interleave on the same directory.
//! Released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::consts::SNAPSHOT_LOCK_FILE;

pub struct DirLock {
    file: std::fs::File,
    path: PathBuf,
}

impl DirLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Block until the directory lock is held. Creates the directory if needed.
pub fn lock_dir(dir: &Path) -> Result<DirLock> {
    std::fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    let path = dir.join(SNAPSHOT_LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("lock_exclusive {}", path.display()))?;
    Ok(DirLock { file, path })
}
