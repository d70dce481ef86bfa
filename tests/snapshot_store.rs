use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use ConfVault::snapshots::xml;
use ConfVault::{
    ComponentConfiguration, ConfigError, CryptoService, PasswordCodec, Properties, SnapshotStore,
    StaticKeyProvider, Value,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("cvtest-store-{prefix}-{pid}-{t}-{id}"))
}

fn crypto(byte: u8) -> Arc<CryptoService> {
    Arc::new(CryptoService::new(Arc::new(StaticKeyProvider::new(
        "test",
        [byte; 32],
    ))))
}

fn one(pid: &str, key: &str, v: Value) -> ComponentConfiguration {
    let mut p = Properties::new();
    p.insert(key.to_string(), v);
    ComponentConfiguration::new(pid, None, p)
}

#[test]
fn write_read_list_and_latest() -> Result<()> {
    let root = unique_root("rw");
    let store = SnapshotStore::new(&root, crypto(1));
    assert!(store.list()?.is_empty(), "missing dir lists as empty");
    assert_eq!(store.latest()?, None);

    let cfgs = vec![one("a", "baud", Value::from(9600i64)), one("b", "name", Value::from("x"))];
    store.write(100, &cfgs)?;
    store.write(250, &cfgs[..1])?;

    assert_eq!(store.list()?.into_iter().collect::<Vec<_>>(), vec![100, 250]);
    assert_eq!(store.latest()?, Some(250));
    assert_eq!(store.read(100)?, cfgs);

    // file content is not plaintext
    let raw = fs::read_to_string(store.snapshot_path(100))?;
    assert!(!raw.contains("baud"));
    // no temp leftovers
    for e in fs::read_dir(&root)? {
        let name = e?.file_name().to_string_lossy().to_string();
        assert!(!name.ends_with(".tmp"), "leftover {name}");
    }
    Ok(())
}

#[test]
fn read_errors_are_typed() -> Result<()> {
    let root = unique_root("errs");
    let store = SnapshotStore::new(&root, crypto(1));
    let err = store.read(7).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::SnapshotNotFound(7))
    ));

    store.write(7, &[one("a", "k", Value::from(1i64))])?;
    let other = SnapshotStore::new(&root, crypto(2));
    let err = other.read(7).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Decode(_))
    ));
    Ok(())
}

#[test]
fn gc_keeps_seed_and_newest() -> Result<()> {
    let root = unique_root("gc");
    let store = SnapshotStore::new(&root, crypto(1));
    for id in [0u64, 100, 250] {
        store.write(id, &[one("a", "k", Value::from(id as i64))])?;
    }
    let deleted = store.garbage_collect(2)?;
    assert_eq!(deleted, vec![100]);
    assert_eq!(store.list()?.into_iter().collect::<Vec<_>>(), vec![0, 250]);

    // the seed alone is never removed
    let deleted = store.garbage_collect(0)?;
    assert_eq!(deleted, vec![250]);
    assert_eq!(store.list()?.into_iter().collect::<Vec<_>>(), vec![0]);
    Ok(())
}

#[test]
fn ids_strictly_increase_within_one_millisecond() -> Result<()> {
    let root = unique_root("ids");
    let store = SnapshotStore::new(&root, crypto(1));
    let now = 1_700_000_000_000u64;
    let a = store.next_id(now)?;
    store.write(a, &[])?;
    let b = store.next_id(now)?;
    store.write(b, &[])?;
    let c = store.next_id(now - 5)?;
    assert_eq!(a, now);
    assert_eq!(b, now + 1);
    assert_eq!(c, now + 2);
    Ok(())
}

#[test]
fn legacy_plaintext_snapshots_are_migrated() -> Result<()> {
    let root = unique_root("legacy");
    fs::create_dir_all(&root)?;
    let c = crypto(3);
    let codec = PasswordCodec::new(c.clone());
    let store = SnapshotStore::new(&root, c.clone());

    let cfgs = vec![one("a", "pw", Value::password("admin"))];
    fs::write(store.snapshot_path(5), xml::marshal(&cfgs)?)?;
    fs::write(store.snapshot_path(6), xml::marshal(&cfgs)?)?;

    assert!(store.migrate_legacy(&codec)?);
    for id in [5, 6] {
        let back = store.read(id)?;
        let mut props = back[0].properties.clone();
        assert_ne!(props["pw"], Value::password("admin"), "password stays encrypted");
        codec.decrypt(&mut props);
        assert_eq!(props["pw"], Value::password("admin"));
    }
    // already encrypted: second run is a no-op
    assert!(!store.migrate_legacy(&codec)?);
    Ok(())
}

#[test]
fn mixed_directory_is_not_migrated() -> Result<()> {
    let root = unique_root("mixed");
    fs::create_dir_all(&root)?;
    let c = crypto(4);
    let store = SnapshotStore::new(&root, c.clone());
    store.write(1, &[one("a", "k", Value::from(1i64))])?;
    fs::write(store.snapshot_path(2), xml::marshal(&[one("a", "k", Value::from(2i64))])?)?;

    assert!(!store.migrate_legacy(&PasswordCodec::new(c))?);
    assert!(store.read(2).is_err());
    Ok(())
}
