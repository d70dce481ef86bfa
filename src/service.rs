//! ConfigurationService: the orchestrator.
//!
//! Owns the component registry, the snapshot store and the live store handle.
//!
//! Locking:
//! - `ops` serializes mutating operations and is held across component callbacks.
//! - `registry` (RwLock) and `state` (Mutex) are taken briefly and never held
//!   while a component is called, so reads never wait on `ops`. A component
//!   may call the read APIs from inside its callbacks.
//!
//! Flow of an update:
//!   encrypt passwords -> restore placeholders -> (create factory instance)
//!   -> merge over stored props and OCD defaults -> validate -> store
//!   -> optional snapshot
//!
//! Batch operations are best-effort: every item is attempted and failures are
//! raised together as ConfigError::PartialSuccess.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::component::{
    string_property, ComponentConfiguration, ComponentKind, SelfConfiguringComponent,
};
use crate::config::ServiceConfig;
use crate::consts::{KURA_SERVICE_PID, PASSWORD_PLACEHOLDER, SERVICE_FACTORYPID};
use crate::crypto::{CryptoService, PasswordCodec};
use crate::error::ConfigError;
use crate::executor::DeferredExecutor;
use crate::merge::{build_current_configuration, live_configuration, MergeSources};
use crate::metatype::ObjectClassDefinition;
use crate::registry::{ComponentRegistry, RegistryEvent, TrackedComponent};
use crate::snapshots::SnapshotStore;
use crate::store::ConfigStore;
use crate::value::{Properties, ScalarValue, Value};

#[derive(Default)]
struct ServiceState {
    /// Deleted factory pids hidden from the merged view until the next snapshot.
    pending_delete: BTreeSet<String>,
    /// Pids the service wrote itself; their next change notification is an echo.
    pending_confirmation: BTreeSet<String>,
}

pub struct ConfigurationService {
    cfg: ServiceConfig,
    store: Arc<dyn ConfigStore>,
    codec: PasswordCodec,
    snapshots: SnapshotStore,
    ops: Mutex<()>,
    registry: RwLock<ComponentRegistry>,
    state: Mutex<ServiceState>,
    executor: DeferredExecutor,
    me: Weak<ConfigurationService>,
}

fn poisoned(what: &str) -> anyhow::Error {
    ConfigError::Configuration(format!("{} lock poisoned", what)).into()
}

impl ConfigurationService {
    pub fn open(
        cfg: ServiceConfig,
        store: Arc<dyn ConfigStore>,
        crypto: Arc<CryptoService>,
    ) -> Result<Arc<Self>> {
        let executor = DeferredExecutor::new(Duration::from_millis(cfg.deferred_delay_ms))?;
        let snapshots = SnapshotStore::new(cfg.snapshots_dir.clone(), crypto.clone());
        let codec = PasswordCodec::new(crypto);
        info!("configuration service: {}", cfg);
        Ok(Arc::new_cyclic(|me| Self {
            cfg,
            store,
            codec,
            snapshots,
            ops: Mutex::new(()),
            registry: RwLock::new(ComponentRegistry::new()),
            state: Mutex::new(ServiceState::default()),
            executor,
            me: me.clone(),
        }))
    }

    pub fn snapshot_store(&self) -> &SnapshotStore {
        &self.snapshots
    }

    fn serialize(&self) -> Result<MutexGuard<'_, ()>> {
        self.ops.lock().map_err(|_| poisoned("operation"))
    }

    fn registry(&self) -> Result<RwLockReadGuard<'_, ComponentRegistry>> {
        self.registry.read().map_err(|_| poisoned("registry"))
    }

    fn registry_mut(&self) -> Result<RwLockWriteGuard<'_, ComponentRegistry>> {
        self.registry.write().map_err(|_| poisoned("registry"))
    }

    fn state(&self) -> Result<MutexGuard<'_, ServiceState>> {
        self.state.lock().map_err(|_| poisoned("service state"))
    }

    // ---------------- lifecycle ----------------

    /// Migrate legacy snapshots, then load the latest snapshot into the live store.
    ///
    /// Only pids tracked at this point are expected to echo the write back.
    pub fn activate(&self) -> Result<()> {
        let _ops = self.serialize()?;
        if self.snapshots.migrate_legacy(&self.codec)? {
            info!("legacy plaintext snapshots migrated");
        }
        let Some(id) = self.snapshots.latest()? else {
            info!("no snapshot to load");
            return Ok(());
        };
        let configs = self.snapshots.read(id)?;
        for cc in &configs {
            let mut props = cc.properties.clone();
            self.codec.encrypt(&mut props);
            self.store
                .update(&cc.pid, props)
                .with_context(|| format!("load {} from snapshot {}", cc.pid, id))?;
            let tracked = self.registry()?.is_tracked(&cc.pid);
            if tracked {
                self.state()?.pending_confirmation.insert(cc.pid.clone());
            }
        }
        info!("snapshot {} loaded ({} components)", id, configs.len());
        Ok(())
    }

    /// External change notification for `pid`. Returns the snapshot id if one was taken.
    pub fn configuration_event(&self, pid: &str) -> Result<Option<u64>> {
        let _ops = self.serialize()?;
        let echo = self.state()?.pending_confirmation.remove(pid);
        if echo {
            debug!("configuration event for {} confirms own write", pid);
            return Ok(None);
        }
        let tracked = self.registry()?.is_tracked(pid);
        if !tracked {
            return Ok(None);
        }
        self.snapshot_locked().map(Some)
    }

    // ---------------- registration ----------------

    pub fn register_component_configuration(
        &self,
        pid: &str,
        service_pid: &str,
        factory_pid: Option<&str>,
    ) -> Result<bool> {
        let _ops = self.serialize()?;
        let factory_ocd = {
            let mut reg = self.registry_mut()?;
            if !reg.register_configurable(pid, service_pid, factory_pid) {
                return Ok(false);
            }
            factory_pid.and_then(|f| reg.ocd(f).cloned())
        };
        if let Some(ocd) = factory_ocd {
            self.fill_defaults_locked(pid, &ocd)?;
        }
        Ok(true)
    }

    pub fn register_self_configuring_component(
        &self,
        pid: &str,
        service_pid: &str,
        component: Arc<dyn SelfConfiguringComponent>,
    ) -> Result<bool> {
        let _ops = self.serialize()?;
        let added = self
            .registry_mut()?
            .register_self_configuring(pid, service_pid, component);
        Ok(added)
    }

    pub fn unregister_component_configuration(&self, pid: &str) -> Result<bool> {
        let _ops = self.serialize()?;
        let was = self.registry_mut()?.unregister(pid);
        Ok(was)
    }

    /// Register an OCD. Factory OCDs push their defaults to existing instances.
    pub fn register_component_ocd(
        &self,
        metatype_pid: &str,
        ocd: ObjectClassDefinition,
        is_factory: bool,
        provider: &str,
    ) -> Result<()> {
        let _ops = self.serialize()?;
        let instances = {
            let mut reg = self.registry_mut()?;
            reg.register_ocd(metatype_pid, ocd.clone(), is_factory, provider);
            if is_factory {
                reg.pids_for_factory(metatype_pid)
            } else {
                Vec::new()
            }
        };
        for pid in instances {
            self.fill_defaults_locked(&pid, &ocd)?;
        }
        Ok(())
    }

    pub fn unregister_metatype_provider(&self, provider: &str) -> Result<Vec<String>> {
        let _ops = self.serialize()?;
        let pids = self.registry_mut()?.unregister_provider(provider);
        Ok(pids)
    }

    pub fn subscribe(&self) -> Result<Receiver<RegistryEvent>> {
        let rx = self.registry_mut()?.subscribe();
        Ok(rx)
    }

    // ---------------- snapshots ----------------

    /// Persist the current configuration as a new snapshot. Returns its id.
    pub fn snapshot(&self) -> Result<u64> {
        let _ops = self.serialize()?;
        self.snapshot_locked()
    }

    pub fn snapshots(&self) -> Result<BTreeSet<u64>> {
        self.snapshots.list()
    }

    /// Snapshot contents with passwords decrypted.
    pub fn snapshot_content(&self, id: u64) -> Result<Vec<ComponentConfiguration>> {
        let mut configs = self.snapshots.read(id)?;
        for cc in configs.iter_mut() {
            self.codec.decrypt(&mut cc.properties);
        }
        Ok(configs)
    }

    /// Roll back to the second most recent snapshot. Returns its id.
    pub fn rollback(&self) -> Result<u64> {
        let _ops = self.serialize()?;
        let ids = self.snapshots.list()?;
        let id = match ids.iter().rev().nth(1) {
            Some(&id) => id,
            None => {
                let latest = ids.iter().next_back().copied().unwrap_or(0);
                return Err(ConfigError::SnapshotNotFound(latest).into());
            }
        };
        self.rollback_locked(id)?;
        Ok(id)
    }

    pub fn rollback_to(&self, id: u64) -> Result<()> {
        let _ops = self.serialize()?;
        self.rollback_locked(id)
    }

    // ---------------- updates ----------------

    pub fn update_configuration(
        &self,
        pid: &str,
        properties: Properties,
        take_snapshot: bool,
    ) -> Result<()> {
        self.update_configurations(
            vec![ComponentConfiguration::new(pid, None, properties)],
            take_snapshot,
        )
    }

    pub fn update_configurations(
        &self,
        configs: Vec<ComponentConfiguration>,
        take_snapshot: bool,
    ) -> Result<()> {
        let _ops = self.serialize()?;
        let mut causes = Vec::new();

        for mut cc in configs {
            self.codec.encrypt(&mut cc.properties);
            if let Err(e) = self.restore_placeholders(&mut cc) {
                causes.push(e.context(format!("update {}", cc.pid)));
                continue;
            }
            if let Err(e) = self.ensure_factory_instance(&cc) {
                causes.push(e.context(format!("update {}", cc.pid)));
                continue;
            }

            let tracked = self.registry()?.tracked(&cc.pid);
            let Some(tracked) = tracked else {
                info!("update for untracked pid {} ignored", cc.pid);
                continue;
            };
            if let Err(e) = self.apply_update_locked(&tracked, &cc) {
                warn!("update of {} failed: {:#}", cc.pid, e);
                causes.push(e.context(format!("update {}", cc.pid)));
            }
        }

        if take_snapshot {
            if let Err(e) = self.snapshot_locked() {
                if causes.is_empty() {
                    return Err(e);
                }
                causes.push(e.context("snapshot after update"));
            }
        }
        match ConfigError::partial("update configurations", causes) {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn schedule_update_configurations(
        &self,
        configs: Vec<ComponentConfiguration>,
        take_snapshot: bool,
    ) -> Result<()> {
        let me = self.me.clone();
        self.executor.schedule(move || {
            let Some(svc) = me.upgrade() else {
                return;
            };
            if let Err(e) = svc.update_configurations(configs, take_snapshot) {
                error!("deferred update failed: {:#}", e);
            }
        })
    }

    /// Deferred rollback: to `id`, or to the previous snapshot when None.
    pub fn schedule_rollback(&self, id: Option<u64>) -> Result<()> {
        let me = self.me.clone();
        self.executor.schedule(move || {
            let Some(svc) = me.upgrade() else {
                return;
            };
            let res = match id {
                Some(id) => svc.rollback_to(id),
                None => svc.rollback().map(|_| ()),
            };
            if let Err(e) = res {
                error!("deferred rollback failed: {:#}", e);
            }
        })
    }

    // ---------------- factory configurations ----------------

    pub fn create_factory_configuration(
        &self,
        factory_pid: &str,
        pid: &str,
        properties: Option<Properties>,
        take_snapshot: bool,
    ) -> Result<()> {
        let _ops = self.serialize()?;
        self.create_factory_locked(factory_pid, pid, properties)?;
        if take_snapshot {
            self.snapshot_locked()?;
        }
        Ok(())
    }

    pub fn delete_factory_configuration(&self, pid: &str, take_snapshot: bool) -> Result<()> {
        let _ops = self.serialize()?;
        if pid.is_empty() {
            return Err(ConfigError::InvalidParameter("pid must not be empty".into()).into());
        }
        let registered = self.registry()?.factory_pid_of(pid).is_some();
        let stored = self.store.get(pid)?;
        let is_factory = registered
            || stored
                .as_ref()
                .map(|p| string_property(p, SERVICE_FACTORYPID).is_some())
                .unwrap_or(false);
        if !is_factory {
            return Err(ConfigError::InvalidParameter(format!(
                "'{}' is not a factory configuration",
                pid
            ))
            .into());
        }
        self.store.delete(pid)?;
        self.registry_mut()?.unregister(pid);
        self.state()?.pending_delete.insert(pid.to_string());
        info!("factory configuration {} deleted", pid);
        if take_snapshot {
            self.snapshot_locked()?;
        }
        Ok(())
    }

    // ---------------- reads (never wait on `ops`) ----------------

    pub fn configurable_component_pids(&self) -> Result<Vec<String>> {
        Ok(self.registry()?.tracked_pids())
    }

    pub fn factory_component_pids(&self) -> Result<Vec<String>> {
        Ok(self.registry()?.factory_pids())
    }

    /// Live configurations of every tracked pid, passwords masked.
    pub fn component_configurations(&self) -> Result<Vec<ComponentConfiguration>> {
        let tracked = self.registry()?.tracked_components();
        let mut out = Vec::new();
        for t in &tracked {
            if let Some(mut cc) = live_configuration(t, self.store.as_ref())? {
                PasswordCodec::mask(&mut cc.properties);
                out.push(cc);
            }
        }
        Ok(out)
    }

    pub fn component_configuration(&self, pid: &str) -> Result<Option<ComponentConfiguration>> {
        let tracked = self.registry()?.tracked(pid);
        let Some(tracked) = tracked else {
            return Ok(None);
        };
        let cc = live_configuration(&tracked, self.store.as_ref())?;
        Ok(cc.map(|mut cc| {
            PasswordCodec::mask(&mut cc.properties);
            cc
        }))
    }

    /// OCD defaults of `pid`, passwords masked. None without an OCD.
    pub fn default_component_configuration(
        &self,
        pid: &str,
    ) -> Result<Option<ComponentConfiguration>> {
        let ocd = self.registry()?.ocd(pid).cloned();
        let Some(ocd) = ocd else {
            return Ok(None);
        };
        let mut props = ocd.default_properties(None);
        PasswordCodec::mask(&mut props);
        Ok(Some(ComponentConfiguration::new(pid, Some(ocd), props)))
    }

    pub fn component_ocd(&self, pid: &str) -> Result<Option<ObjectClassDefinition>> {
        Ok(self.registry()?.ocd(pid).cloned())
    }

    /// Merged configuration as it would be snapshotted now.
    pub fn current_configuration(&self) -> Result<Vec<ComponentConfiguration>> {
        self.current()
    }

    // ---------------- internals (callers of *_locked hold `ops`) ----------------

    fn latest_snapshot_content(&self) -> Vec<ComponentConfiguration> {
        let latest = match self.snapshots.latest() {
            Ok(Some(id)) => id,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("cannot list snapshots: {:#}", e);
                return Vec::new();
            }
        };
        match self.snapshots.read(latest) {
            Ok(c) => c,
            Err(e) => {
                warn!("cannot read snapshot {}: {:#}", latest, e);
                Vec::new()
            }
        }
    }

    fn current(&self) -> Result<Vec<ComponentConfiguration>> {
        let tracked = self.registry()?.tracked_components();
        let pending_delete = self.state()?.pending_delete.clone();
        let snapshot = self.latest_snapshot_content();
        let src = MergeSources {
            tracked: &tracked,
            store: self.store.as_ref(),
            snapshot: &snapshot,
            pending_delete: &pending_delete,
            upgrade_rules: &self.cfg.upgrade_rules,
        };
        build_current_configuration(&src, &[])
    }

    fn snapshot_locked(&self) -> Result<u64> {
        let mut configs = self.current()?;
        for cc in configs.iter_mut() {
            self.codec.encrypt(&mut cc.properties);
        }
        let id = self.write_snapshot_locked(&configs)?;
        info!("snapshot {} taken ({} components)", id, configs.len());
        Ok(id)
    }

    fn write_snapshot_locked(&self, configs: &[ComponentConfiguration]) -> Result<u64> {
        let id = self.snapshots.next_id(now_ms())?;
        self.snapshots.write(id, configs)?;
        self.state()?.pending_delete.clear();
        if let Err(e) = self.snapshots.garbage_collect(self.cfg.snapshots_count) {
            warn!("snapshot gc failed: {:#}", e);
        }
        Ok(id)
    }

    fn store_update(&self, pid: &str, props: Properties) -> Result<()> {
        self.store.update(pid, props)?;
        self.state()?.pending_confirmation.insert(pid.to_string());
        Ok(())
    }

    /// Placeholder passwords take the stored value; without one they are dropped.
    fn restore_placeholders(&self, cc: &mut ComponentConfiguration) -> Result<()> {
        let keys: Vec<String> = cc
            .properties
            .iter()
            .filter(|(_, v)| is_placeholder(v))
            .map(|(k, _)| k.clone())
            .collect();
        if keys.is_empty() {
            return Ok(());
        }
        let tracked = self.registry()?.tracked(&cc.pid);
        let live = match &tracked {
            Some(t) => live_configuration(t, self.store.as_ref())?,
            None => None,
        };
        let stored = match live {
            Some(live) => live.properties,
            None => self.store.get(&cc.pid)?.unwrap_or_default(),
        };
        for k in keys {
            match stored.get(&k) {
                Some(v) if !is_placeholder(v) => {
                    cc.properties.insert(k, v.clone());
                }
                _ => {
                    cc.properties.remove(&k);
                }
            }
        }
        Ok(())
    }

    /// A batch item naming service.factoryPid for an unknown pid creates that instance first.
    fn ensure_factory_instance(&self, cc: &ComponentConfiguration) -> Result<()> {
        let Some(fpid) = cc.factory_pid() else {
            return Ok(());
        };
        let tracked = self.registry()?.is_tracked(&cc.pid);
        if tracked || self.store.get(&cc.pid)?.is_some() {
            return Ok(());
        }
        self.create_factory_locked(fpid, &cc.pid, None)
    }

    fn apply_update_locked(
        &self,
        tracked: &TrackedComponent,
        cc: &ComponentConfiguration,
    ) -> Result<()> {
        let live = live_configuration(tracked, self.store.as_ref())?;
        let ocd = cc
            .definition
            .clone()
            .or_else(|| tracked.ocd.clone())
            .or_else(|| live.as_ref().and_then(|l| l.definition.clone()));

        let mut merged = match &ocd {
            Some(ocd) => ocd.default_properties(Some(&self.codec)),
            None => Properties::new(),
        };
        if let Some(live) = &live {
            merged.extend(live.properties.clone());
        }
        merged.extend(cc.properties.clone());
        self.codec.encrypt(&mut merged);

        if let Some(ocd) = &ocd {
            validate_properties(ocd, &merged)?;
        }

        self.store_update(&cc.pid, merged.clone())?;
        if let Some(component) = &tracked.component {
            component
                .apply_configuration(&merged)
                .with_context(|| format!("apply configuration to {}", cc.pid))?;
        }
        debug!("{} updated", cc.pid);
        Ok(())
    }

    fn create_factory_locked(
        &self,
        factory_pid: &str,
        pid: &str,
        properties: Option<Properties>,
    ) -> Result<()> {
        if factory_pid.is_empty() || pid.is_empty() {
            return Err(ConfigError::InvalidParameter(
                "factory pid and pid must not be empty".into(),
            )
            .into());
        }
        let tracked = self.registry()?.is_tracked(pid);
        if tracked || self.store.get(pid)?.is_some() {
            return Err(ConfigError::Configuration(format!(
                "configuration '{}' already exists",
                pid
            ))
            .into());
        }

        let factory_ocd = self.registry()?.ocd(factory_pid).cloned();
        let mut props = match factory_ocd {
            Some(ocd) => ocd.default_properties(Some(&self.codec)),
            None => Properties::new(),
        };
        if let Some(p) = properties {
            props.extend(p);
        }
        props.insert(KURA_SERVICE_PID.to_string(), Value::from(pid));
        props.insert(SERVICE_FACTORYPID.to_string(), Value::from(factory_pid));
        self.codec.encrypt(&mut props);

        self.store_update(pid, props)?;
        self.registry_mut()?
            .register_configurable(pid, pid, Some(factory_pid));
        self.state()?.pending_delete.remove(pid);
        info!("factory configuration {} created from {}", pid, factory_pid);
        Ok(())
    }

    fn fill_defaults_locked(&self, pid: &str, ocd: &ObjectClassDefinition) -> Result<()> {
        let mut props = self.store.get(pid)?.unwrap_or_default();
        let mut changed = false;
        for (k, v) in ocd.default_properties(Some(&self.codec)) {
            if !props.contains_key(&k) {
                props.insert(k, v);
                changed = true;
            }
        }
        if changed {
            self.store_update(pid, props)?;
        }
        Ok(())
    }

    fn rollback_locked(&self, id: u64) -> Result<()> {
        let configs = self.snapshots.read(id)?;
        info!("rolling back to snapshot {}", id);
        let mut causes = Vec::new();

        // drop every current factory instance
        let stored_pids = match self.store.pids() {
            Ok(pids) => pids,
            Err(e) => {
                causes.push(e.context("list stored configurations"));
                Vec::new()
            }
        };
        for pid in stored_pids {
            let stored = match self.store.get(&pid) {
                Ok(p) => p,
                Err(e) => {
                    causes.push(e.context(format!("read configuration {}", pid)));
                    continue;
                }
            };
            let is_factory = stored
                .as_ref()
                .map(|p| string_property(p, SERVICE_FACTORYPID).is_some())
                .unwrap_or(false);
            if !is_factory {
                continue;
            }
            if let Err(e) = self.store.delete(&pid) {
                causes.push(e.context(format!("delete factory configuration {}", pid)));
                continue;
            }
            self.registry_mut()?.unregister(&pid);
        }

        {
            let mut reg = self.registry_mut()?;
            for cc in &configs {
                if let Some(fpid) = cc.factory_pid() {
                    reg.register_configurable(&cc.pid, &cc.pid, Some(fpid));
                }
            }
        }

        for cc in &configs {
            if let Err(e) = self.rollback_component(cc) {
                warn!("rollback of {} failed: {:#}", cc.pid, e);
                causes.push(e.context(format!("rollback {}", cc.pid)));
            }
        }

        let in_snapshot: BTreeSet<&str> = configs.iter().map(|c| c.pid.as_str()).collect();
        let strays: Vec<TrackedComponent> = self
            .registry()?
            .tracked_components()
            .into_iter()
            .filter(|t| {
                t.kind() == ComponentKind::Configurable && !in_snapshot.contains(t.pid.as_str())
            })
            .collect();
        for t in strays {
            let mut props = match &t.ocd {
                Some(ocd) => ocd.default_properties(Some(&self.codec)),
                None => Properties::new(),
            };
            props.insert(KURA_SERVICE_PID.to_string(), Value::from(t.pid.as_str()));
            if let Err(e) = self.store_update(&t.pid, props) {
                causes.push(e.context(format!("reset {} to defaults", t.pid)));
            }
        }

        match self.write_snapshot_locked(&configs) {
            Ok(new_id) => info!("rollback to {} persisted as snapshot {}", id, new_id),
            Err(e) => {
                if causes.is_empty() {
                    return Err(e);
                }
                causes.push(e.context("persist rolled back snapshot"));
            }
        }

        match ConfigError::partial("rollback", causes) {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn rollback_component(&self, cc: &ComponentConfiguration) -> Result<()> {
        let (ocd, component) = {
            let reg = self.registry()?;
            (reg.ocd(&cc.pid).cloned(), reg.self_configuring(&cc.pid))
        };
        let mut props = match ocd {
            Some(ocd) => ocd.default_properties(Some(&self.codec)),
            None => Properties::new(),
        };
        props.extend(cc.properties.clone());
        self.codec.encrypt(&mut props);
        self.store_update(&cc.pid, props.clone())?;
        if let Some(component) = component {
            component.apply_configuration(&props)?;
        }
        Ok(())
    }
}

fn validate_properties(ocd: &ObjectClassDefinition, props: &Properties) -> Result<()> {
    for ad in &ocd.ads {
        match props.get(&ad.id) {
            None if ad.required => {
                return Err(ConfigError::RequiredAttributeMissing(ad.id.clone()).into());
            }
            None => {}
            Some(v) => {
                if let Some(message) = ad.validate(v) {
                    return Err(ConfigError::AttributeInvalid {
                        id: ad.id.clone(),
                        value: v.texts().join(","),
                        message,
                    }
                    .into());
                }
            }
        }
    }
    Ok(())
}

fn is_placeholder(v: &Value) -> bool {
    let items = v.items();
    !items.is_empty()
        && items.iter().all(|it| {
            matches!(it, ScalarValue::Password(pw) if pw.as_str() == PASSWORD_PLACEHOLDER)
        })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
