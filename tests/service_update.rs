use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use ConfVault::consts::{KURA_SERVICE_PID, PASSWORD_PLACEHOLDER, SERVICE_FACTORYPID};
use ConfVault::{
    AttributeDefinition, ComponentConfiguration, ConfigError, ConfigStore, ConfigurationService,
    CryptoService, MemoryConfigStore, ObjectClassDefinition, Properties, Scalar, ServiceBuilder,
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
    base.join(format!("cvtest-update-{prefix}-{pid}-{t}-{id}"))
}

fn open_service(root: &Path) -> Result<(Arc<ConfigurationService>, Arc<MemoryConfigStore>)> {
    let cfg = ServiceBuilder::from_default()
        .snapshots_dir(root)
        .deferred_delay_ms(10)
        .build();
    let store = Arc::new(MemoryConfigStore::new());
    let crypto = Arc::new(CryptoService::new(Arc::new(StaticKeyProvider::new(
        "test",
        [0x42; 32],
    ))));
    let svc = ConfigurationService::open(cfg, store.clone(), crypto)?;
    Ok((svc, store))
}

/// Live store whose backend is down for one pid.
struct FlakyStore {
    inner: MemoryConfigStore,
    broken: &'static str,
}

impl ConfigStore for FlakyStore {
    fn get(&self, pid: &str) -> Result<Option<Properties>> {
        if pid == self.broken {
            anyhow::bail!("backend down for {}", pid);
        }
        self.inner.get(pid)
    }

    fn update(&self, pid: &str, properties: Properties) -> Result<()> {
        self.inner.update(pid, properties)
    }

    fn delete(&self, pid: &str) -> Result<bool> {
        self.inner.delete(pid)
    }

    fn pids(&self) -> Result<Vec<String>> {
        self.inner.pids()
    }
}

fn serial_ocd() -> ObjectClassDefinition {
    ObjectClassDefinition::new("serial", "Serial")
        .with_ad(
            AttributeDefinition::new("baud", Scalar::Integer)
                .with_default("115200")
                .with_min("1200")
                .with_max("115200")
                .with_required(true),
        )
        .with_ad(AttributeDefinition::new("parity", Scalar::String).with_default("none"))
        .with_ad(AttributeDefinition::new("password", Scalar::Password))
}

fn props(entries: &[(&str, Value)]) -> Properties {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn update_merges_over_ocd_defaults() -> Result<()> {
    let root = unique_root("defaults");
    let (svc, store) = open_service(&root)?;
    svc.register_component_ocd("serial", serial_ocd(), false, "bundle")?;
    svc.register_component_configuration("serial", "serial", None)?;

    svc.update_configuration("serial", props(&[("baud", Value::from(9600i32))]), false)?;

    let stored = store.get("serial")?.expect("stored");
    assert_eq!(stored["baud"], Value::from(9600i32));
    assert_eq!(stored["parity"], Value::from("none"));

    let cc = svc.component_configuration("serial")?.expect("tracked");
    assert_eq!(cc.definition.as_ref().map(|o| o.id.as_str()), Some("serial"));
    assert_eq!(cc.properties["baud"], Value::from(9600i32));
    Ok(())
}

#[test]
fn invalid_and_missing_attributes_are_reported() -> Result<()> {
    let root = unique_root("invalid");
    let (svc, store) = open_service(&root)?;
    let ocd = ObjectClassDefinition::new("net", "Net")
        .with_ad(AttributeDefinition::new("host", Scalar::String).with_required(true));
    svc.register_component_ocd("net", ocd, false, "bundle")?;
    svc.register_component_ocd("serial", serial_ocd(), false, "bundle")?;
    svc.register_component_configuration("net", "net", None)?;
    svc.register_component_configuration("serial", "serial", None)?;

    let err = svc
        .update_configurations(
            vec![
                ComponentConfiguration::new("net", None, props(&[("port", Value::from(1i32))])),
                ComponentConfiguration::new(
                    "serial",
                    None,
                    props(&[("baud", Value::from(1i32))]),
                ),
            ],
            false,
        )
        .unwrap_err();

    let Some(ConfigError::PartialSuccess { causes, .. }) = err.downcast_ref::<ConfigError>() else {
        panic!("expected PartialSuccess, got {err:#}");
    };
    assert_eq!(causes.len(), 2);
    assert!(matches!(
        causes[0].downcast_ref::<ConfigError>(),
        Some(ConfigError::RequiredAttributeMissing(id)) if id == "host"
    ));
    assert!(matches!(
        causes[1].downcast_ref::<ConfigError>(),
        Some(ConfigError::AttributeInvalid { id, .. }) if id == "baud"
    ));
    // nothing was written for the rejected items
    assert!(store.get("net")?.is_none());
    assert!(store.get("serial")?.is_none());
    Ok(())
}

#[test]
fn partial_success_still_applies_valid_items() -> Result<()> {
    let root = unique_root("partial");
    let (svc, store) = open_service(&root)?;
    svc.register_component_ocd("serial", serial_ocd(), false, "bundle")?;
    svc.register_component_configuration("serial", "serial", None)?;
    svc.register_component_configuration("plain", "plain", None)?;

    let err = svc
        .update_configurations(
            vec![
                ComponentConfiguration::new("plain", None, props(&[("x", Value::from(1i64))])),
                ComponentConfiguration::new(
                    "serial",
                    None,
                    props(&[("baud", Value::from("fast"))]),
                ),
                ComponentConfiguration::new("untracked", None, props(&[("x", Value::from(2i64))])),
            ],
            true,
        )
        .unwrap_err();
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::PartialSuccess { causes, .. }) => assert_eq!(causes.len(), 1),
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(store.get("plain")?.expect("applied")["x"], Value::from(1i64));
    assert!(store.get("untracked")?.is_none());
    // the snapshot was still taken
    assert_eq!(svc.snapshots()?.len(), 1);
    Ok(())
}

#[test]
fn passwords_are_encrypted_masked_and_restored() -> Result<()> {
    let root = unique_root("pw");
    let (svc, store) = open_service(&root)?;
    svc.register_component_ocd("serial", serial_ocd(), false, "bundle")?;
    svc.register_component_configuration("serial", "serial", None)?;

    svc.update_configuration("serial", props(&[("password", Value::password("s3cret"))]), false)?;
    let stored = store.get("serial")?.expect("stored");
    let cipher = stored["password"].clone();
    assert_ne!(cipher, Value::password("s3cret"));

    let shown = svc.component_configuration("serial")?.expect("tracked");
    assert_eq!(shown.properties["password"], Value::password(PASSWORD_PLACEHOLDER));

    // a UI round trip sends the placeholder back
    let mut echoed = shown.properties.clone();
    echoed.insert("parity".into(), Value::from("even"));
    svc.update_configuration("serial", echoed, false)?;
    let stored = store.get("serial")?.expect("stored");
    assert_eq!(stored["password"], cipher);
    assert_eq!(stored["parity"], Value::from("even"));

    let id = svc.snapshot()?;
    let content = svc.snapshot_content(id)?;
    let serial = content.iter().find(|c| c.pid == "serial").expect("in snapshot");
    assert_eq!(serial.properties["password"], Value::password("s3cret"));
    assert_eq!(serial.properties[KURA_SERVICE_PID], Value::from("serial"));
    Ok(())
}

#[test]
fn placeholder_without_stored_value_is_dropped() -> Result<()> {
    let root = unique_root("pw-none");
    let (svc, store) = open_service(&root)?;
    svc.register_component_configuration("c", "c", None)?;
    svc.update_configuration(
        "c",
        props(&[
            ("password", Value::password(PASSWORD_PLACEHOLDER)),
            ("k", Value::from(true)),
        ]),
        false,
    )?;
    let stored = store.get("c")?.expect("stored");
    assert!(!stored.contains_key("password"));
    assert_eq!(stored["k"], Value::from(true));
    Ok(())
}

#[test]
fn default_configuration_masks_passwords() -> Result<()> {
    let root = unique_root("default-cfg");
    let (svc, _store) = open_service(&root)?;
    let ocd = serial_ocd().with_ad(
        AttributeDefinition::new("admin", Scalar::Password).with_default("changeme"),
    );
    svc.register_component_ocd("serial", ocd, false, "bundle")?;

    let d = svc.default_component_configuration("serial")?.expect("ocd known");
    assert_eq!(d.properties["baud"], Value::from(115200i32));
    assert_eq!(d.properties["admin"], Value::password(PASSWORD_PLACEHOLDER));
    assert!(svc.default_component_configuration("unknown")?.is_none());
    assert!(svc.component_ocd("serial")?.is_some());
    Ok(())
}

#[test]
fn store_failure_on_one_item_does_not_stop_the_batch() -> Result<()> {
    let root = unique_root("flaky");
    let cfg = ServiceBuilder::from_default().snapshots_dir(&root).build();
    let store = Arc::new(FlakyStore {
        inner: MemoryConfigStore::new(),
        broken: "bad",
    });
    let crypto = Arc::new(CryptoService::new(Arc::new(StaticKeyProvider::new(
        "test",
        [0x42; 32],
    ))));
    let svc = ConfigurationService::open(cfg, store.clone(), crypto)?;
    svc.register_component_configuration("good", "good", None)?;

    let mut bad = props(&[("x", Value::from(1i64))]);
    bad.insert(SERVICE_FACTORYPID.into(), Value::from("f"));
    let err = svc
        .update_configurations(
            vec![
                ComponentConfiguration::new("bad", None, bad),
                ComponentConfiguration::new("good", None, props(&[("x", Value::from(1i64))])),
            ],
            true,
        )
        .unwrap_err();
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::PartialSuccess { causes, .. }) => {
            assert_eq!(causes.len(), 1);
            assert!(format!("{:#}", causes[0]).contains("backend down for bad"));
        }
        other => panic!("expected PartialSuccess, got {:?}", other),
    }

    let good = store.inner.get("good")?.expect("second item applied");
    assert_eq!(good["x"], Value::from(1i64));
    assert_eq!(svc.snapshots()?.len(), 1, "snapshot taken despite the failed item");
    Ok(())
}
