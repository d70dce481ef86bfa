use anyhow::Result;
use std::path::PathBuf;

use crate::util::{crypto_from_env, resolve_dir};
use ConfVault::{PasswordCodec, SnapshotStore};

pub fn exec(dir: Option<PathBuf>) -> Result<()> {
    let crypto = crypto_from_env()?;
    let store = SnapshotStore::new(resolve_dir(dir), crypto.clone());
    let codec = PasswordCodec::new(crypto);
    if store.migrate_legacy(&codec)? {
        println!("migrated {} snapshot(s) to encrypted form", store.list()?.len());
    } else {
        println!("nothing to migrate");
    }
    Ok(())
}
