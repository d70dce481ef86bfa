use anyhow::Result;
use base64::Engine;
use zeroize::Zeroize;

use ConfVault::crypto::generate_key;

pub fn exec(as_base64: bool) -> Result<()> {
    let mut key = generate_key();
    if as_base64 {
        println!("{}", base64::engine::general_purpose::STANDARD.encode(key));
    } else {
        let hex: String = key.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{}", hex);
    }
    key.zeroize();
    Ok(())
}
