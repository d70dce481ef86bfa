use anyhow::Result;
use std::path::PathBuf;

use crate::util::open_store;

pub fn exec(dir: Option<PathBuf>, keep: usize) -> Result<()> {
    let store = open_store(dir)?;
    let deleted = store.garbage_collect(keep)?;
    println!("deleted {} snapshot(s): {:?}", deleted.len(), deleted);
    Ok(())
}
