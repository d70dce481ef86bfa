use anyhow::Result;
use std::path::PathBuf;

use crate::util::resolve_dir;
use ConfVault::consts::{SNAPSHOT_EXT, SNAPSHOT_PREFIX};
use ConfVault::snapshots::list_snapshot_ids;

pub fn exec(dir: Option<PathBuf>, json: bool) -> Result<()> {
    let dir = resolve_dir(dir);
    let ids = list_snapshot_ids(&dir)?;
    let size_of = |id: u64| {
        std::fs::metadata(dir.join(format!("{}{}{}", SNAPSHOT_PREFIX, id, SNAPSHOT_EXT)))
            .map(|m| m.len())
            .unwrap_or(0)
    };

    if json {
        let items: Vec<serde_json::Value> = ids
            .iter()
            .map(|&id| serde_json::json!({ "id": id, "bytes": size_of(id) }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!("snapshots in {}: {}", dir.display(), ids.len());
    for id in ids {
        println!("  {:>16}  {} B", id, size_of(id));
    }
    Ok(())
}
