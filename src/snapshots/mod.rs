//! Snapshots split into submodules:
//! - xml.rs: marshal/unmarshal of configuration lists (esf XML format).
//! - store.rs: SnapshotStore (encrypted snapshot_<id>.xml files, GC, legacy migration).

pub mod store;
pub mod xml;

pub use store::{list_snapshot_ids, SnapshotStore};
