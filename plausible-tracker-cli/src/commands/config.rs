//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show`, and `config set` for the native
//! configuration file.

use std::path::Path;

use clap::Subcommand;
use plausible_tracker::config::ConfigSource;
use plausible_tracker::{IniSource, TrackerConfig};

use super::common::{self, SourceOverrides};
use crate::error::CliError;

/// Keys understood in the `[tracker]` section.
pub const KNOWN_KEYS: [&str; 12] = [
    "domain",
    "api",
    "script_src",
    "exclude",
    "file_types",
    "routing",
    "hash_mode_payload",
    "exclusions",
    "outbound_links",
    "file_downloads",
    "suppress_on_localhost",
    "manual_url",
];

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the settings and the configuration they resolve to
    Show,

    /// Set a configuration value
    Set {
        /// Key in the [tracker] section (e.g., domain, exclude, routing)
        key: String,

        /// Value to set
        value: String,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(config_path),
        ConfigCommands::Show => run_show(config_path),
        ConfigCommands::Set { key, value } => run_set(config_path, &key, &value),
    }
}

fn run_path(config_path: Option<&Path>) -> Result<(), CliError> {
    let path = common::resolve_config_path(config_path)?;
    println!("{}", path.display());
    Ok(())
}

fn run_show(config_path: Option<&Path>) -> Result<(), CliError> {
    let source = common::load_source(config_path, &SourceOverrides::default())?;

    for key in KNOWN_KEYS {
        match source.get(key) {
            Some(value) => println!("{:<22} {}", key, value),
            None => println!("{:<22} (not set)", key),
        }
    }

    println!();
    match TrackerConfig::from_source(&source, source.features()) {
        Ok(config) => {
            println!("endpoint:   {}", config.endpoint);
            println!("domain:     {}", config.domain);
            println!("routing:    {}", config.features.routing);
            println!("exclusions: {:?}", config.exclusion_patterns);
            println!(
                "extensions: {}",
                config.file_extensions.iter().cloned().collect::<Vec<_>>().join(",")
            );
        }
        Err(e) => println!("Configuration incomplete: {}", e),
    }
    Ok(())
}

fn run_set(config_path: Option<&Path>, key: &str, value: &str) -> Result<(), CliError> {
    if !KNOWN_KEYS.contains(&key) {
        return Err(CliError::Config(format!(
            "Unknown configuration key '{}'. Known keys: {}",
            key,
            KNOWN_KEYS.join(", ")
        )));
    }

    let path = common::resolve_config_path(config_path)?;
    let mut source = if path.exists() {
        IniSource::load(&path)?
    } else {
        IniSource::default()
    };
    source.set(key, value);
    source.save(&path)?;

    tracing::debug!(path = %path.display(), key, "Configuration updated");
    println!("{} = {}", key, value);
    if source.script_src().is_none() && source.get("api").is_none() {
        println!("Note: set 'api' or 'script_src' so the endpoint can be resolved");
    }
    Ok(())
}
