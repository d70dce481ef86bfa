//! Shared constants (property keys, snapshot file layout, defaults).

// -------- Reserved property keys --------
/// Stable external identifier of a component configuration.
pub const KURA_SERVICE_PID: &str = "kura.service.pid";
/// Factory pid a factory instance was created from.
pub const SERVICE_FACTORYPID: &str = "service.factoryPid";

// -------- Snapshot files --------
// <snapshots_dir>/snapshot_<id>.xml
pub const SNAPSHOT_PREFIX: &str = "snapshot_";
pub const SNAPSHOT_EXT: &str = ".xml";
pub const SNAPSHOT_TMP_EXT: &str = ".tmp";
pub const SNAPSHOT_LOCK_FILE: &str = ".snapshots.lock";
/// Seed snapshot, never garbage-collected.
pub const SEED_SNAPSHOT_ID: u64 = 0;

// -------- XML --------
pub const ESF_NAMESPACE: &str = "http://eurotech.com/esf/2.0";
pub const OCD_NAMESPACE: &str = "http://www.osgi.org/xmlns/metatype/v1.2.0";

// -------- Passwords --------
/// Value returned in place of every password by the read APIs.
pub const PASSWORD_PLACEHOLDER: &str = "PlaceHolder";

// -------- Crypto --------
pub const AES_NONCE_LEN: usize = 12;
pub const AES_AAD: &[u8] = b"CVAES01";

// -------- Defaults --------
pub const DEFAULT_SNAPSHOTS_DIR: &str = "snapshots";
pub const DEFAULT_SNAPSHOTS_COUNT: usize = 10;
pub const DEFAULT_DEFER_MS: u64 = 1000;
