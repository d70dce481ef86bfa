//! Component configurations and the self-configuring capability.

use anyhow::Result;

use crate::consts::SERVICE_FACTORYPID;
use crate::metatype::ObjectClassDefinition;
use crate::value::{Properties, ScalarValue, Value};

/// Configuration of one component: stable pid, optional schema, properties.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ComponentConfiguration {
    pub pid: String,
    pub definition: Option<ObjectClassDefinition>,
    pub properties: Properties,
}

impl ComponentConfiguration {
    pub fn new<S: Into<String>>(
        pid: S,
        definition: Option<ObjectClassDefinition>,
        properties: Properties,
    ) -> Self {
        Self {
            pid: pid.into(),
            definition,
            properties,
        }
    }

    /// Copy without the definition (what snapshots persist).
    pub fn stripped(&self) -> Self {
        Self {
            pid: self.pid.clone(),
            definition: None,
            properties: self.properties.clone(),
        }
    }

    /// Factory pid recorded in the properties, if this is a factory instance.
    pub fn factory_pid(&self) -> Option<&str> {
        string_property(&self.properties, SERVICE_FACTORYPID)
    }
}

pub(crate) fn string_property<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    match props.get(key) {
        Some(Value::Scalar(ScalarValue::String(s))) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// How a tracked component gets its configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    /// Configuration lives in the live config store.
    Configurable,
    /// The component reports its own configuration.
    SelfConfiguring,
}

/// A component that owns its configuration.
pub trait SelfConfiguringComponent: Send + Sync {
    /// Current configuration as seen by the component.
    fn configuration(&self) -> Result<ComponentConfiguration>;

    /// Called after new properties were written to the live store for this component.
    fn apply_configuration(&self, _properties: &Properties) -> Result<()> {
        Ok(())
    }
}
