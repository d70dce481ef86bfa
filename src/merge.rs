//! Current configuration = live state + pending updates + snapshot-only pids.
//!
//! Order of precedence (highest first): updates, live store / component,
//! latest snapshot. Pids pending deletion are dropped, then upgrade rules run.

use anyhow::Result;
use log::{debug, warn};
use std::collections::BTreeSet;

use crate::component::{ComponentConfiguration, ComponentKind};
use crate::registry::{validate_self_configuration, TrackedComponent};
use crate::store::ConfigStore;
use crate::upgrade::{upgrade, UpgradeRule};

/// Everything the merge reads. No service lock is held while it runs, since
/// self-configuring components are called from here.
pub struct MergeSources<'a> {
    pub tracked: &'a [TrackedComponent],
    pub store: &'a dyn ConfigStore,
    /// Contents of the latest snapshot (empty if none).
    pub snapshot: &'a [ComponentConfiguration],
    pub pending_delete: &'a BTreeSet<String>,
    pub upgrade_rules: &'a [UpgradeRule],
}

/// Live configuration of one tracked pid, decorated with its OCD.
/// None when a configurable pid has no stored entry or a self-configuring
/// component fails or reports an invalid configuration.
pub fn live_configuration(
    tracked: &TrackedComponent,
    store: &dyn ConfigStore,
) -> Result<Option<ComponentConfiguration>> {
    let pid = tracked.pid.as_str();
    match (tracked.kind(), &tracked.component) {
        (ComponentKind::SelfConfiguring, Some(component)) => match component.configuration() {
            Ok(cc) => Ok(validate_self_configuration(pid, cc)),
            Err(e) => {
                warn!("self-configuring component {} failed to report: {:#}", pid, e);
                Ok(None)
            }
        },
        _ => {
            let Some(props) = store.get(pid)? else {
                debug!("no stored configuration for {}", pid);
                return Ok(None);
            };
            Ok(Some(ComponentConfiguration::new(
                pid,
                tracked.ocd.clone(),
                props,
            )))
        }
    }
}

pub fn build_current_configuration(
    src: &MergeSources<'_>,
    updates: &[ComponentConfiguration],
) -> Result<Vec<ComponentConfiguration>> {
    let mut out: Vec<ComponentConfiguration> = Vec::new();
    for tracked in src.tracked {
        if let Some(cc) = live_configuration(tracked, src.store)? {
            out.push(cc);
        }
    }

    for upd in updates {
        if !src.tracked.iter().any(|t| t.pid == upd.pid) {
            continue;
        }
        match out.iter_mut().find(|c| c.pid == upd.pid) {
            Some(cur) => {
                for (k, v) in &upd.properties {
                    cur.properties.insert(k.clone(), v.clone());
                }
                if upd.definition.is_some() {
                    cur.definition = upd.definition.clone();
                }
            }
            None => out.push(upd.clone()),
        }
    }

    let present: BTreeSet<String> = out.iter().map(|c| c.pid.clone()).collect();
    for cc in src.snapshot {
        if !present.contains(&cc.pid) {
            out.push(cc.clone());
        }
    }

    out.retain(|c| !src.pending_delete.contains(&c.pid));
    upgrade(&mut out, src.upgrade_rules);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::KURA_SERVICE_PID;
    use crate::registry::ComponentRegistry;
    use crate::store::MemoryConfigStore;
    use crate::value::{Properties, Value};

    fn props(k: &str, v: i64) -> Properties {
        let mut p = Properties::new();
        p.insert(k.into(), Value::from(v));
        p
    }

    #[test]
    fn precedence_and_pending_delete() -> Result<()> {
        let mut reg = ComponentRegistry::new();
        reg.register_configurable("a", "a", None);
        reg.register_configurable("b", "b", None);
        let store = MemoryConfigStore::new();
        store.update("a", props("x", 1))?;
        store.update("b", props("x", 2))?;

        let snapshot = vec![
            ComponentConfiguration::new("a", None, props("x", 100)),
            ComponentConfiguration::new("gone", None, props("x", 3)),
            ComponentConfiguration::new("old", None, props("x", 4)),
        ];
        let pending: BTreeSet<String> = ["b".to_string(), "gone".to_string()].into();
        let tracked = reg.tracked_components();
        let src = MergeSources {
            tracked: &tracked,
            store: &store,
            snapshot: &snapshot,
            pending_delete: &pending,
            upgrade_rules: &[],
        };
        let updates = vec![
            ComponentConfiguration::new("a", None, props("y", 7)),
            ComponentConfiguration::new("untracked", None, props("y", 8)),
        ];
        let cur = build_current_configuration(&src, &updates)?;
        let pids: Vec<&str> = cur.iter().map(|c| c.pid.as_str()).collect();
        assert_eq!(pids, vec!["a", "old"]);
        assert_eq!(cur[0].properties["x"], Value::from(1i64));
        assert_eq!(cur[0].properties["y"], Value::from(7i64));
        assert_eq!(cur[0].properties[KURA_SERVICE_PID], Value::from("a"));
        Ok(())
    }
}
