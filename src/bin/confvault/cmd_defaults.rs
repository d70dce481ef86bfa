use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::util::{masked, print_configurations};
use ConfVault::{parse_metatype, ComponentConfiguration};

pub fn exec(metatype: PathBuf, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(&metatype)
        .with_context(|| format!("read {}", metatype.display()))?;
    let ocds = parse_metatype(&text)?;
    let configs: Vec<ComponentConfiguration> = ocds
        .into_iter()
        .map(|ocd| {
            let props = ocd.default_properties(None);
            ComponentConfiguration::new(ocd.id.clone(), Some(ocd), props)
        })
        .collect();
    let configs = masked(configs);

    if json {
        println!("{}", serde_json::to_string_pretty(&configs)?);
    } else {
        print_configurations(&configs);
    }
    Ok(())
}
