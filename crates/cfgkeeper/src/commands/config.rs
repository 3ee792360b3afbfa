//! `cfgkeeper config`: print the resolved configuration.

use cfgkeeper_core::Config;
use std::path::Path;

/// Print where the configuration came from and what it resolved to.
pub fn show_config(config: &Config, source: Option<&Path>) -> anyhow::Result<()> {
    println!("Configuration source:");
    match source {
        Some(path) => println!("  {}", path.display()),
        None => println!("  (defaults)"),
    }
    println!();

    println!("Current configuration:");
    println!("{}", serde_json::to_string_pretty(config)?);

    Ok(())
}
