//! Component registry: which pids are tracked and how.
//!
//! Derived maps kept in lockstep:
//! - all_activated_pids = configurable ∪ self-configuring
//! - service_pid_by_pid, factory_pid_by_pid, self_configuring
//!
//! OCDs are registered per metatype provider; removing a provider drops its
//! OCDs. Subscribers receive `RegistryEvent`s over mpsc channels; channels
//! whose receiver is gone are pruned on the next publish.
//!
//! The registry is not synchronized; ConfigurationService keeps it behind an
//! RwLock and hands `TrackedComponent` copies to code that calls into components.

use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use crate::component::{ComponentConfiguration, ComponentKind, SelfConfiguringComponent};
use crate::metatype::ObjectClassDefinition;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered { pid: String, kind: ComponentKind },
    Unregistered { pid: String },
    OcdRegistered { pid: String, is_factory: bool },
    ProviderRemoved { provider: String, pids: Vec<String> },
}

/// Copy of what the merge needs about one tracked pid. Taken under the
/// registry lock, used after it is released.
#[derive(Clone)]
pub struct TrackedComponent {
    pub pid: String,
    pub ocd: Option<ObjectClassDefinition>,
    pub component: Option<Arc<dyn SelfConfiguringComponent>>,
}

impl TrackedComponent {
    pub fn kind(&self) -> ComponentKind {
        if self.component.is_some() {
            ComponentKind::SelfConfiguring
        } else {
            ComponentKind::Configurable
        }
    }
}

struct OcdEntry {
    ocd: ObjectClassDefinition,
    provider: String,
}

#[derive(Default)]
pub struct ComponentRegistry {
    all_activated_pids: BTreeSet<String>,
    service_pid_by_pid: BTreeMap<String, String>,
    factory_pid_by_pid: BTreeMap<String, String>,
    self_configuring: BTreeMap<String, Arc<dyn SelfConfiguringComponent>>,
    ocds: BTreeMap<String, OcdEntry>,
    factory_pids: BTreeSet<String>,
    subs: Vec<Sender<RegistryEvent>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a configurable component. Returns false if `pid` was already tracked.
    pub fn register_configurable(
        &mut self,
        pid: &str,
        service_pid: &str,
        factory_pid: Option<&str>,
    ) -> bool {
        if self.all_activated_pids.contains(pid) {
            return false;
        }
        self.all_activated_pids.insert(pid.to_string());
        self.service_pid_by_pid
            .insert(pid.to_string(), service_pid.to_string());
        if let Some(fpid) = factory_pid.filter(|f| !f.is_empty()) {
            self.factory_pid_by_pid
                .insert(pid.to_string(), fpid.to_string());
            self.factory_pids.insert(fpid.to_string());
        }
        debug!("registered configurable component {}", pid);
        self.publish(RegistryEvent::Registered {
            pid: pid.to_string(),
            kind: ComponentKind::Configurable,
        });
        true
    }

    /// Track a self-configuring component. Returns false if `pid` was already tracked.
    pub fn register_self_configuring(
        &mut self,
        pid: &str,
        service_pid: &str,
        component: Arc<dyn SelfConfiguringComponent>,
    ) -> bool {
        if self.all_activated_pids.contains(pid) {
            return false;
        }
        self.all_activated_pids.insert(pid.to_string());
        self.service_pid_by_pid
            .insert(pid.to_string(), service_pid.to_string());
        self.self_configuring.insert(pid.to_string(), component);
        debug!("registered self-configuring component {}", pid);
        self.publish(RegistryEvent::Registered {
            pid: pid.to_string(),
            kind: ComponentKind::SelfConfiguring,
        });
        true
    }

    /// Drop `pid` from every tracking map. Returns whether it was tracked.
    pub fn unregister(&mut self, pid: &str) -> bool {
        let was = self.all_activated_pids.remove(pid);
        self.service_pid_by_pid.remove(pid);
        self.factory_pid_by_pid.remove(pid);
        self.self_configuring.remove(pid);
        if was {
            debug!("unregistered component {}", pid);
            self.publish(RegistryEvent::Unregistered {
                pid: pid.to_string(),
            });
        }
        was
    }

    pub fn register_ocd(
        &mut self,
        metatype_pid: &str,
        ocd: ObjectClassDefinition,
        is_factory: bool,
        provider: &str,
    ) {
        if is_factory {
            self.factory_pids.insert(metatype_pid.to_string());
        }
        self.ocds.insert(
            metatype_pid.to_string(),
            OcdEntry {
                ocd,
                provider: provider.to_string(),
            },
        );
        self.publish(RegistryEvent::OcdRegistered {
            pid: metatype_pid.to_string(),
            is_factory,
        });
    }

    /// Forget every OCD registered by `provider`. Returns the affected metatype pids.
    pub fn unregister_provider(&mut self, provider: &str) -> Vec<String> {
        let pids: Vec<String> = self
            .ocds
            .iter()
            .filter(|(_, e)| e.provider == provider)
            .map(|(pid, _)| pid.clone())
            .collect();
        for pid in &pids {
            self.ocds.remove(pid);
        }
        if !pids.is_empty() {
            self.publish(RegistryEvent::ProviderRemoved {
                provider: provider.to_string(),
                pids: pids.clone(),
            });
        }
        pids
    }

    pub fn is_tracked(&self, pid: &str) -> bool {
        self.all_activated_pids.contains(pid)
    }

    pub fn tracked_pids(&self) -> Vec<String> {
        self.all_activated_pids.iter().cloned().collect()
    }

    pub fn factory_pids(&self) -> Vec<String> {
        self.factory_pids.iter().cloned().collect()
    }

    pub fn is_factory_pid(&self, factory_pid: &str) -> bool {
        self.factory_pids.contains(factory_pid)
    }

    pub fn service_pid(&self, pid: &str) -> Option<&str> {
        self.service_pid_by_pid.get(pid).map(|s| s.as_str())
    }

    pub fn factory_pid_of(&self, pid: &str) -> Option<&str> {
        self.factory_pid_by_pid.get(pid).map(|s| s.as_str())
    }

    /// Tracked pids created from `factory_pid`.
    pub fn pids_for_factory(&self, factory_pid: &str) -> Vec<String> {
        self.factory_pid_by_pid
            .iter()
            .filter(|(_, f)| f.as_str() == factory_pid)
            .map(|(pid, _)| pid.clone())
            .collect()
    }

    /// OCD of `pid`: its own, else the one of its factory.
    pub fn ocd(&self, pid: &str) -> Option<&ObjectClassDefinition> {
        if let Some(e) = self.ocds.get(pid) {
            return Some(&e.ocd);
        }
        let fpid = self.factory_pid_by_pid.get(pid)?;
        self.ocds.get(fpid).map(|e| &e.ocd)
    }

    pub fn kind(&self, pid: &str) -> Option<ComponentKind> {
        if !self.all_activated_pids.contains(pid) {
            None
        } else if self.self_configuring.contains_key(pid) {
            Some(ComponentKind::SelfConfiguring)
        } else {
            Some(ComponentKind::Configurable)
        }
    }

    pub fn self_configuring(&self, pid: &str) -> Option<Arc<dyn SelfConfiguringComponent>> {
        self.self_configuring.get(pid).cloned()
    }

    pub fn tracked(&self, pid: &str) -> Option<TrackedComponent> {
        if !self.all_activated_pids.contains(pid) {
            return None;
        }
        Some(TrackedComponent {
            pid: pid.to_string(),
            ocd: self.ocd(pid).cloned(),
            component: self.self_configuring(pid),
        })
    }

    pub fn tracked_components(&self) -> Vec<TrackedComponent> {
        self.all_activated_pids
            .iter()
            .filter_map(|pid| self.tracked(pid))
            .collect()
    }

    pub fn subscribe(&mut self) -> Receiver<RegistryEvent> {
        let (tx, rx) = channel();
        self.subs.push(tx);
        rx
    }

    fn publish(&mut self, ev: RegistryEvent) {
        self.subs.retain(|tx| tx.send(ev.clone()).is_ok());
    }
}

/// Check a configuration reported by a self-configuring component.
///
/// Rejected (None) when the pid is empty or differs from `pid`, when an AD has
/// an empty id, or when a property typed by an AD carries another type.
pub fn validate_self_configuration(
    pid: &str,
    cc: ComponentConfiguration,
) -> Option<ComponentConfiguration> {
    if cc.pid.is_empty() || cc.pid != pid {
        warn!(
            "self-configuring component {}: reported pid '{}' does not match",
            pid, cc.pid
        );
        return None;
    }
    if let Some(ocd) = &cc.definition {
        for ad in &ocd.ads {
            if ad.id.is_empty() {
                warn!("self-configuring component {}: attribute without id", pid);
                return None;
            }
            if let Some(v) = cc.properties.get(&ad.id) {
                if v.scalar_type() != ad.ty {
                    warn!(
                        "self-configuring component {}: '{}' is {} but declared {}",
                        pid,
                        ad.id,
                        v.scalar_type(),
                        ad.ty
                    );
                    return None;
                }
            }
        }
    }
    Some(cc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metatype::AttributeDefinition;
    use crate::value::{Properties, Scalar, Value};

    struct Fixed;
    impl SelfConfiguringComponent for Fixed {
        fn configuration(&self) -> anyhow::Result<ComponentConfiguration> {
            Ok(ComponentConfiguration::new("s", None, Properties::new()))
        }
    }

    #[test]
    fn unregister_clears_every_map() {
        let mut r = ComponentRegistry::new();
        let rx = r.subscribe();
        assert!(r.register_configurable("f-1", "svc.1", Some("f")));
        assert!(!r.register_configurable("f-1", "svc.1", Some("f")));
        assert!(r.register_self_configuring("s", "svc.2", Arc::new(Fixed)));

        assert_eq!(r.tracked_pids(), vec!["f-1".to_string(), "s".to_string()]);
        assert_eq!(r.pids_for_factory("f"), vec!["f-1".to_string()]);
        assert_eq!(r.kind("s"), Some(ComponentKind::SelfConfiguring));
        let kinds: Vec<ComponentKind> = r.tracked_components().iter().map(|t| t.kind()).collect();
        assert_eq!(
            kinds,
            vec![ComponentKind::Configurable, ComponentKind::SelfConfiguring]
        );

        assert!(r.unregister("f-1"));
        assert!(r.unregister("s"));
        assert!(r.tracked_pids().is_empty());
        assert!(r.service_pid("f-1").is_none());
        assert!(r.factory_pid_of("f-1").is_none());
        assert!(r.self_configuring("s").is_none());
        // factory stays known after its instances go away
        assert!(r.is_factory_pid("f"));

        let events: Vec<RegistryEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[2],
            RegistryEvent::Unregistered {
                pid: "f-1".into()
            }
        );
    }

    #[test]
    fn ocd_lookup_falls_back_to_factory() {
        let mut r = ComponentRegistry::new();
        r.register_ocd("f", ObjectClassDefinition::new("f", "F"), true, "bundle-a");
        r.register_configurable("f-1", "svc", Some("f"));
        assert_eq!(r.ocd("f-1").map(|o| o.id.as_str()), Some("f"));

        assert_eq!(r.unregister_provider("bundle-a"), vec!["f".to_string()]);
        assert!(r.ocd("f-1").is_none());
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut r = ComponentRegistry::new();
        drop(r.subscribe());
        r.register_configurable("a", "a", None);
        assert!(r.subs.is_empty());
    }

    #[test]
    fn self_configuration_checks() {
        let ocd = ObjectClassDefinition::new("s", "S")
            .with_ad(AttributeDefinition::new("port", Scalar::Integer));
        let mut props = Properties::new();
        props.insert("port".into(), Value::from(80i32));
        let good = ComponentConfiguration::new("s", Some(ocd.clone()), props);
        assert!(validate_self_configuration("s", good.clone()).is_some());
        assert!(validate_self_configuration("other", good).is_none());

        let mut bad_props = Properties::new();
        bad_props.insert("port".into(), Value::from("80"));
        let bad = ComponentConfiguration::new("s", Some(ocd), bad_props);
        assert!(validate_self_configuration("s", bad).is_none());

        let no_id = ObjectClassDefinition::new("s", "S")
            .with_ad(AttributeDefinition::new("", Scalar::String));
        let cc = ComponentConfiguration::new("s", Some(no_id), Properties::new());
        assert!(validate_self_configuration("s", cc).is_none());
    }
}
