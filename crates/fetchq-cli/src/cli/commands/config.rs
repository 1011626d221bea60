//! `fetchq config` – show where the config lives and what is in effect.

use anyhow::Result;
use fetchq_core::config::{self, FetchqConfig};

pub fn run_config(cfg: &FetchqConfig) -> Result<()> {
    let path = config::config_path()?;
    println!("# {}", path.display());
    print!("{}", config::to_toml_string(cfg)?);
    if cfg.leak_check.is_none() {
        let leak = cfg.leak_check_or_default();
        println!(
            "# leak_check (default): enabled = {}, grace_secs = {}",
            leak.enabled, leak.grace_secs
        );
    }
    Ok(())
}
