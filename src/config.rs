//! Centralized configuration and builder for the configuration service.
//!
//! - ServiceConfig::from_env() reads CV_SNAPSHOTS_DIR, CV_SNAPSHOTS_COUNT, CV_DEFER_MS.
//! - ServiceBuilder starts from env (or clean defaults) and returns a ServiceConfig,
//!   which ConfigurationService consumes.
//!
//! Defaults:
//! - snapshots_dir = "snapshots" (relative to the working directory)
//! - snapshots_count = 10
//! - deferred_delay_ms = 1000

use std::fmt;
use std::path::PathBuf;

use crate::consts::{DEFAULT_DEFER_MS, DEFAULT_SNAPSHOTS_COUNT, DEFAULT_SNAPSHOTS_DIR};
use crate::upgrade::UpgradeRule;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Directory holding snapshot_<id>.xml files.
    /// Env: CV_SNAPSHOTS_DIR
    pub snapshots_dir: PathBuf,

    /// Snapshots kept by GC (the seed snapshot 0 is never deleted).
    /// Env: CV_SNAPSHOTS_COUNT (default 10)
    pub snapshots_count: usize,

    /// Delay before scheduled updates/rollbacks run.
    /// Env: CV_DEFER_MS (default 1000)
    pub deferred_delay_ms: u64,

    /// Legacy property renames applied to every merged configuration.
    pub upgrade_rules: Vec<UpgradeRule>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            snapshots_dir: PathBuf::from(DEFAULT_SNAPSHOTS_DIR),
            snapshots_count: DEFAULT_SNAPSHOTS_COUNT,
            deferred_delay_ms: DEFAULT_DEFER_MS,
            upgrade_rules: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables; unparsable values keep defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("CV_SNAPSHOTS_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.snapshots_dir = PathBuf::from(s);
            }
        }

        if let Ok(v) = std::env::var("CV_SNAPSHOTS_COUNT") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.snapshots_count = n;
            }
        }

        if let Ok(v) = std::env::var("CV_DEFER_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.deferred_delay_ms = n;
            }
        }

        cfg
    }

    pub fn with_snapshots_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.snapshots_dir = dir.into();
        self
    }

    pub fn with_snapshots_count(mut self, n: usize) -> Self {
        self.snapshots_count = n;
        self
    }

    pub fn with_deferred_delay_ms(mut self, ms: u64) -> Self {
        self.deferred_delay_ms = ms;
        self
    }

    pub fn with_upgrade_rule(mut self, rule: UpgradeRule) -> Self {
        self.upgrade_rules.push(rule);
        self
    }
}

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ServiceConfig {{ snapshots_dir: {}, snapshots_count: {}, deferred_delay_ms: {}, upgrade_rules: {} }}",
            self.snapshots_dir.display(),
            self.snapshots_count,
            self.deferred_delay_ms,
            self.upgrade_rules.len(),
        )
    }
}

/// Builder producing a ServiceConfig.
#[derive(Clone, Debug)]
pub struct ServiceBuilder {
    cfg: ServiceConfig,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self {
            cfg: ServiceConfig::from_env(),
        }
    }
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: ServiceConfig::default(),
        }
    }

    pub fn snapshots_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cfg.snapshots_dir = dir.into();
        self
    }

    pub fn snapshots_count(mut self, n: usize) -> Self {
        self.cfg.snapshots_count = n;
        self
    }

    pub fn deferred_delay_ms(mut self, ms: u64) -> Self {
        self.cfg.deferred_delay_ms = ms;
        self
    }

    pub fn upgrade_rule(mut self, rule: UpgradeRule) -> Self {
        self.cfg.upgrade_rules.push(rule);
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.cfg
    }
}
