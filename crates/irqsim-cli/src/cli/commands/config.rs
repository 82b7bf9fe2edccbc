//! `irqsim config` handlers.

use anyhow::{Context, Result};
use irqsim_core::config::{Config, paths};

pub fn path() {
    let config_path = paths::config_path();
    println!("{}", config_path.display());
    if !config_path.exists() {
        eprintln!("(not created yet, run `irqsim config init`)");
    }
}

pub fn init() -> Result<()> {
    let config_path = paths::config_path();
    Config::init(&config_path)
        .with_context(|| format!("write default config to {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

/// Prints the template with every default filled in, ready to redirect into a file.
pub fn generate() -> Result<()> {
    let rendered = Config::generate().context("render default config")?;
    print!("{rendered}");
    Ok(())
}
