use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::util::{masked, open_store, print_configurations};

pub fn exec(dir: Option<PathBuf>, id: Option<u64>, json: bool) -> Result<()> {
    let store = open_store(dir)?;
    let id = match id {
        Some(id) => id,
        None => store
            .latest()?
            .ok_or_else(|| anyhow!("no snapshots in {}", store.dir().display()))?,
    };
    let configs = masked(store.read(id)?);

    if json {
        let doc = serde_json::json!({ "id": id, "configurations": configs });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("snapshot {}", id);
        print_configurations(&configs);
    }
    Ok(())
}
