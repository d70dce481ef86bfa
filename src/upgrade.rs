//! Schema upgrade of merged configurations.
//!
//! Every configuration gets kura.service.pid (= its pid) if missing, then the
//! configured legacy renames run. A rename never overwrites an existing target.

use log::debug;

use crate::component::ComponentConfiguration;
use crate::consts::KURA_SERVICE_PID;
use crate::value::Value;

/// Rename property `from` to `to`, for one pid or (pid = None) for all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeRule {
    pub pid: Option<String>,
    pub from: String,
    pub to: String,
}

impl UpgradeRule {
    pub fn new<S: Into<String>>(pid: Option<S>, from: S, to: S) -> Self {
        Self {
            pid: pid.map(Into::into),
            from: from.into(),
            to: to.into(),
        }
    }

    fn matches(&self, pid: &str) -> bool {
        self.pid.as_deref().map_or(true, |p| p == pid)
    }
}

pub fn upgrade(configs: &mut [ComponentConfiguration], rules: &[UpgradeRule]) {
    for cc in configs.iter_mut() {
        if !cc.properties.contains_key(KURA_SERVICE_PID) {
            cc.properties
                .insert(KURA_SERVICE_PID.to_string(), Value::from(cc.pid.as_str()));
        }
        for rule in rules.iter().filter(|r| r.matches(&cc.pid)) {
            if cc.properties.contains_key(&rule.to) {
                continue;
            }
            if let Some(v) = cc.properties.remove(&rule.from) {
                debug!("upgrade {}: '{}' -> '{}'", cc.pid, rule.from, rule.to);
                cc.properties.insert(rule.to.clone(), v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Properties;

    #[test]
    fn adds_service_pid_and_renames_once() {
        let mut props = Properties::new();
        props.insert("old".into(), Value::from(1i64));
        let mut other = Properties::new();
        other.insert("old".into(), Value::from(2i64));
        other.insert("new".into(), Value::from(3i64));
        let mut cfgs = vec![
            ComponentConfiguration::new("a", None, props),
            ComponentConfiguration::new("b", None, other),
        ];
        upgrade(&mut cfgs, &[UpgradeRule::new(None, "old", "new")]);

        assert_eq!(cfgs[0].properties[KURA_SERVICE_PID], Value::from("a"));
        assert_eq!(cfgs[0].properties["new"], Value::from(1i64));
        assert!(!cfgs[0].properties.contains_key("old"));
        // existing target wins
        assert_eq!(cfgs[1].properties["new"], Value::from(3i64));
        assert_eq!(cfgs[1].properties["old"], Value::from(2i64));
    }

    #[test]
    fn pid_scoped_rule_skips_other_pids() {
        let mut props = Properties::new();
        props.insert("x".into(), Value::from(true));
        let mut cfgs = vec![ComponentConfiguration::new("b", None, props)];
        upgrade(&mut cfgs, &[UpgradeRule::new(Some("a"), "x", "y")]);
        assert!(cfgs[0].properties.contains_key("x"));
    }
}
