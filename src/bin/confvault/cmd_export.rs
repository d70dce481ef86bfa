use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::util::open_store;
use ConfVault::snapshots::xml;

pub fn exec(dir: Option<PathBuf>, id: u64, out: Option<PathBuf>) -> Result<()> {
    let store = open_store(dir)?;
    let text = xml::marshal(&store.read(id)?)?;
    match out {
        Some(path) => {
            std::fs::write(&path, text.as_bytes())
                .with_context(|| format!("write {}", path.display()))?;
            println!("snapshot {} exported to {}", id, path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
