use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use ConfVault::crypto::{CryptoService, EnvKeyProvider, PasswordCodec};
use ConfVault::{ComponentConfiguration, ServiceConfig, SnapshotStore};

pub fn crypto_from_env() -> Result<Arc<CryptoService>> {
    let provider = EnvKeyProvider::from_env().context("load snapshot key")?;
    Ok(Arc::new(CryptoService::new(Arc::new(provider))))
}

pub fn resolve_dir(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| ServiceConfig::from_env().snapshots_dir)
}

pub fn open_store(dir: Option<PathBuf>) -> Result<SnapshotStore> {
    Ok(SnapshotStore::new(resolve_dir(dir), crypto_from_env()?))
}

pub fn print_configurations(configs: &[ComponentConfiguration]) {
    for cc in configs {
        println!("[{}]", cc.pid);
        for (k, v) in &cc.properties {
            let kind = if v.is_array() {
                format!("{}[]", v.scalar_type())
            } else {
                v.scalar_type().to_string()
            };
            println!("  {} ({}) = {}", k, kind, v.texts().join(","));
        }
    }
}

pub fn masked(mut configs: Vec<ComponentConfiguration>) -> Vec<ComponentConfiguration> {
    for cc in configs.iter_mut() {
        PasswordCodec::mask(&mut cc.properties);
    }
    configs
}
