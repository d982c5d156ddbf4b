//! `weft config`: configuration management commands.

use crate::commands::session::load_config;
use std::path::Path;
use weft_config::EngineConfig;

pub fn show_default() {
    println!("# Default configuration");
    println!(
        "# Save as {}",
        EngineConfig::config_dir().join("config.toml").display()
    );
    println!();
    print!("{}", EngineConfig::default_toml());
}

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    println!("Configuration is valid");
    println!();
    println!("  Model:         {}", config.default_model);
    println!("  Summary model: {}", config.summary_model());
    println!("  Organization:  {}", config.organization_id);
    println!("  Provider:      {}", config.provider.api_url);
    println!(
        "  API key:       {}",
        if config.provider.api_key.is_some() { "set" } else { "not set" }
    );
    println!("  Cache TTL:     {}s", config.cache.ttl_secs);
    println!("  Memory limit:  {}", config.memory.limit);

    Ok(())
}
