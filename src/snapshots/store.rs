//! Encrypted snapshot files in one directory.
//!
//! Files:
//! - snapshot_<id>.xml: encrypt_aes(xml) text, id = epoch millis
//! - snapshot_<id>.xml.tmp: write in progress (ignored by list)
//! - .snapshots.lock: fs2 lock for writers/GC/migration
//!
//! Notes:
//! - Writes are atomic via tmp + fsync + rename + parent fsync.
//! - Id 0 is the seed snapshot and survives GC.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::xml;
use crate::component::ComponentConfiguration;
use crate::consts::{SEED_SNAPSHOT_ID, SNAPSHOT_EXT, SNAPSHOT_PREFIX, SNAPSHOT_TMP_EXT};
use crate::crypto::{CryptoService, PasswordCodec};
use crate::error::ConfigError;
use crate::lock::lock_dir;

pub struct SnapshotStore {
    dir: PathBuf,
    crypto: Arc<CryptoService>,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(dir: P, crypto: Arc<CryptoService>) -> Self {
        Self {
            dir: dir.into(),
            crypto,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{}{}{}", SNAPSHOT_PREFIX, id, SNAPSHOT_EXT))
    }

    /// Ascending snapshot ids. A missing directory yields an empty set.
    pub fn list(&self) -> Result<BTreeSet<u64>> {
        list_snapshot_ids(&self.dir)
    }

    pub fn latest(&self) -> Result<Option<u64>> {
        Ok(self.list()?.iter().next_back().copied())
    }

    /// Id for a new snapshot taken at `now_ms`; never reuses or goes below the latest.
    pub fn next_id(&self, now_ms: u64) -> Result<u64> {
        Ok(match self.latest()? {
            Some(latest) if now_ms <= latest => latest + 1,
            _ => now_ms,
        })
    }

    /// Persist configurations as snapshot `id` (definitions are not written).
    pub fn write(&self, id: u64, configs: &[ComponentConfiguration]) -> Result<()> {
        let stripped: Vec<ComponentConfiguration> =
            configs.iter().map(|c| c.stripped()).collect();
        let text = xml::marshal(&stripped)?;
        let sealed = self
            .crypto
            .encrypt_aes(&text)
            .map_err(|e| ConfigError::Persistence(format!("encrypt snapshot {}: {}", id, e)))?;

        let _lock = lock_dir(&self.dir).map_err(persistence)?;
        self.write_sealed(id, &sealed).map_err(persistence)?;
        debug!("snapshot {} written ({} components)", id, configs.len());
        Ok(())
    }

    /// Load snapshot `id`. Missing -> SnapshotNotFound, undecodable -> Decode.
    pub fn read(&self, id: u64) -> Result<Vec<ComponentConfiguration>> {
        let path = self.snapshot_path(id);
        let sealed = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::SnapshotNotFound(id).into());
            }
            Err(e) => {
                return Err(ConfigError::Persistence(format!("read {}: {}", path.display(), e)).into());
            }
        };
        let text = self
            .crypto
            .decrypt_aes(&sealed)
            .map_err(|e| ConfigError::Decode(format!("snapshot {}: {}", id, e)))?;
        xml::unmarshal(&text)
    }

    /// Delete the oldest non-seed snapshots until at most `max_count` remain.
    /// Stops at the first failed delete. Returns the deleted ids.
    pub fn garbage_collect(&self, max_count: usize) -> Result<Vec<u64>> {
        let _lock = lock_dir(&self.dir).map_err(persistence)?;
        let ids = self.list()?;
        let mut remaining = ids.len();
        let mut deleted = Vec::new();
        for id in ids {
            if remaining <= max_count {
                break;
            }
            if id == SEED_SNAPSHOT_ID {
                continue;
            }
            let path = self.snapshot_path(id);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    deleted.push(id);
                    remaining -= 1;
                }
                Err(e) => {
                    warn!("snapshot gc: cannot delete {}: {}", path.display(), e);
                    break;
                }
            }
        }
        if !deleted.is_empty() {
            info!("snapshot gc: deleted {:?}", deleted);
        }
        Ok(deleted)
    }

    /// Re-encrypt plaintext snapshots left by an older installation.
    ///
    /// Only runs when every existing snapshot fails to decrypt: each file is
    /// then parsed as plain XML, its passwords encrypted and the whole file
    /// rewritten encrypted in place. Returns whether anything was migrated.
    pub fn migrate_legacy(&self, codec: &PasswordCodec) -> Result<bool> {
        let ids = self.list()?;
        if ids.is_empty() {
            return Ok(false);
        }
        let _lock = lock_dir(&self.dir).map_err(persistence)?;

        let mut plain = Vec::with_capacity(ids.len());
        for &id in &ids {
            let path = self.snapshot_path(id);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))
                .map_err(persistence)?;
            if self.crypto.decrypt_aes(&text).is_ok() {
                return Ok(false);
            }
            plain.push((id, text));
        }

        for (id, text) in plain {
            let mut configs = xml::unmarshal(&text)?;
            for cc in configs.iter_mut() {
                codec.encrypt(&mut cc.properties);
            }
            let sealed = self
                .crypto
                .encrypt_aes(&xml::marshal(&configs)?)
                .map_err(|e| ConfigError::Persistence(format!("encrypt snapshot {}: {}", id, e)))?;
            self.write_sealed(id, &sealed).map_err(persistence)?;
            info!("snapshot {} migrated to encrypted form", id);
        }
        Ok(true)
    }

    // Caller holds the directory lock.
    fn write_sealed(&self, id: u64, sealed: &str) -> Result<()> {
        let path = self.snapshot_path(id);
        let tmp = path.with_file_name(format!(
            "{}{}{}{}",
            SNAPSHOT_PREFIX, id, SNAPSHOT_EXT, SNAPSHOT_TMP_EXT
        ));
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)
                .with_context(|| format!("open {}", tmp.display()))?;
            f.write_all(sealed.as_bytes())
                .with_context(|| format!("write {}", tmp.display()))?;
            f.sync_all()
                .with_context(|| format!("fsync {}", tmp.display()))?;
        }
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        sync_dir(&self.dir);
        Ok(())
    }
}

/// Snapshot ids present in `dir` (no key needed).
pub fn list_snapshot_ids(dir: &Path) -> Result<BTreeSet<u64>> {
    let mut ids = BTreeSet::new();
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => {
            return Err(e).with_context(|| format!("read_dir {}", dir.display()));
        }
    };
    for entry in rd {
        let entry = entry?;
        if let Some(id) = parse_snapshot_name(&entry.file_name().to_string_lossy()) {
            ids.insert(id);
        }
    }
    Ok(ids)
}

fn persistence(e: anyhow::Error) -> anyhow::Error {
    ConfigError::Persistence(format!("{:#}", e)).into()
}

// Directory fsync is best-effort (not supported on every platform).
fn sync_dir(dir: &Path) {
    if let Ok(d) = std::fs::File::open(dir) {
        let _ = d.sync_all();
    }
}

fn parse_snapshot_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(SNAPSHOT_PREFIX)?.strip_suffix(SNAPSHOT_EXT)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_names() {
        assert_eq!(parse_snapshot_name("snapshot_0.xml"), Some(0));
        assert_eq!(parse_snapshot_name("snapshot_1700000000000.xml"), Some(1_700_000_000_000));
        assert_eq!(parse_snapshot_name("snapshot_12.xml.tmp"), None);
        assert_eq!(parse_snapshot_name("snapshot_.xml"), None);
        assert_eq!(parse_snapshot_name("snapshot_-1.xml"), None);
        assert_eq!(parse_snapshot_name("other_1.xml"), None);
    }
}
