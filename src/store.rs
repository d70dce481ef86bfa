//! Live configuration store.
//!
//! The host's configuration admin is abstracted as `ConfigStore`: a pid-keyed
//! map of properties. Factory instances are ordinary entries carrying
//! service.factoryPid. `MemoryConfigStore` is the in-process implementation.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::ConfigError;
use crate::value::Properties;

/// Source and sink of live component configuration. Thread-safe.
pub trait ConfigStore: Send + Sync {
    /// Stored properties of `pid`, or None if the pid has no configuration.
    fn get(&self, pid: &str) -> Result<Option<Properties>>;

    /// Replace the properties of `pid` (creating the entry if needed).
    fn update(&self, pid: &str, properties: Properties) -> Result<()>;

    /// Remove `pid`. Returns whether an entry existed.
    fn delete(&self, pid: &str) -> Result<bool>;

    /// All stored pids.
    fn pids(&self) -> Result<Vec<String>>;
}

#[derive(Default)]
pub struct MemoryConfigStore {
    inner: RwLock<BTreeMap<String, Properties>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> anyhow::Error {
    ConfigError::Persistence("config store lock poisoned".into()).into()
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, pid: &str) -> Result<Option<Properties>> {
        let g = self.inner.read().map_err(|_| poisoned())?;
        Ok(g.get(pid).cloned())
    }

    fn update(&self, pid: &str, properties: Properties) -> Result<()> {
        let mut g = self.inner.write().map_err(|_| poisoned())?;
        g.insert(pid.to_string(), properties);
        Ok(())
    }

    fn delete(&self, pid: &str) -> Result<bool> {
        let mut g = self.inner.write().map_err(|_| poisoned())?;
        Ok(g.remove(pid).is_some())
    }

    fn pids(&self) -> Result<Vec<String>> {
        let g = self.inner.read().map_err(|_| poisoned())?;
        Ok(g.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn memory_store_crud() -> Result<()> {
        let s = MemoryConfigStore::new();
        assert!(s.get("a")?.is_none());
        let mut p = Properties::new();
        p.insert("k".into(), Value::from(1i64));
        s.update("a", p.clone())?;
        assert_eq!(s.get("a")?, Some(p));
        assert_eq!(s.pids()?, vec!["a".to_string()]);
        assert!(s.delete("a")?);
        assert!(!s.delete("a")?);
        Ok(())
    }
}
