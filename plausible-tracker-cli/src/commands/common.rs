//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use plausible_tracker::config::config_file_path;
use plausible_tracker::{IniSource, Properties, Routing};

use crate::error::CliError;

/// Routing mode selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum RoutingArg {
    /// Page views on distinct history paths
    History,
    /// Page views on every hash change
    Hash,
    /// No automatic page views
    Manual,
}

impl From<RoutingArg> for Routing {
    fn from(arg: RoutingArg) -> Self {
        match arg {
            RoutingArg::History => Routing::History,
            RoutingArg::Hash => Routing::Hash,
            RoutingArg::Manual => Routing::Manual,
        }
    }
}

/// Settings that override the configuration file.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceOverrides {
    /// Site domain (data-domain)
    #[arg(long)]
    pub domain: Option<String>,

    /// Collection endpoint (data-api)
    #[arg(long)]
    pub api: Option<String>,

    /// Exclusion glob, repeatable (data-exclude)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Download extension, repeatable (file-types)
    #[arg(long = "file-type", value_name = "EXT")]
    pub file_types: Vec<String>,

    /// Routing mode
    #[arg(long, value_enum)]
    pub routing: Option<RoutingArg>,
}

impl SourceOverrides {
    /// Write the overrides into `source`.
    pub fn apply(&self, source: &mut IniSource) {
        if let Some(domain) = &self.domain {
            source.set("domain", domain.as_str());
        }
        if let Some(api) = &self.api {
            source.set("api", api.as_str());
        }
        if !self.exclude.is_empty() {
            source.set("exclude", self.exclude.join(","));
        }
        if !self.file_types.is_empty() {
            source.set("file_types", self.file_types.join(","));
        }
        if let Some(routing) = self.routing {
            source.set("routing", Routing::from(routing).as_str());
        }
    }
}

/// The config file to use: `explicit`, or the default location.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, CliError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config_file_path().ok_or_else(|| {
            CliError::Config("could not determine the configuration directory".to_string())
        }),
    }
}

/// Load the configuration file and apply `overrides`.
///
/// An explicit path must exist. A missing default file is treated as empty.
pub fn load_source(
    explicit: Option<&Path>,
    overrides: &SourceOverrides,
) -> Result<IniSource, CliError> {
    let mut source = match explicit {
        Some(path) => IniSource::load(path)?,
        None => match config_file_path() {
            Some(path) if path.exists() => IniSource::load(&path)?,
            _ => IniSource::default(),
        },
    };
    overrides.apply(&mut source);
    Ok(source)
}

/// Parse a JSON object argument.
pub fn parse_properties(flag: &str, text: &str) -> Result<Properties, CliError> {
    serde_json::from_str(text)
        .map_err(|e| CliError::InvalidArgument(format!("{} is not a JSON object: {}", flag, e)))
}

/// A single-threaded runtime, as the tracker's callbacks are not `Send`.
pub fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::RuntimeCreation(e.to_string()))
}
