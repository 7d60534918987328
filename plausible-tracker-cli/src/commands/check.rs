//! `check`: test a path against the exclusion rules.

use std::path::Path;

use clap::Args;
use plausible_tracker::config::{split_list, ConfigSource, ATTR_EXCLUDE};
use plausible_tracker::{ExclusionRules, IniSource, PageLocation};

use super::common::{self, SourceOverrides};
use crate::error::CliError;

/// Arguments for `check`.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Path (`/blog/post`) or full page URL
    pub path: String,

    #[command(flatten)]
    pub overrides: SourceOverrides,
}

/// Run `check`.
pub fn run(args: CheckArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let source = common::load_source(config_path, &args.overrides)?;
    let rules = ExclusionRules::compile(active_patterns(&source).as_slice())?;

    let path = pathname(&args.path);
    match rules.first_match(&path) {
        Some(pattern) => println!("{} is excluded by '{}'", path, pattern),
        None if !source.features().exclusions => {
            println!("{} is reported (exclusions are disabled)", path)
        }
        None if rules.is_empty() => println!("{} is reported (no exclusion rules)", path),
        None => println!("{} is reported ({} rules checked)", path, rules.len()),
    }
    Ok(())
}

/// Exclusion globs the tracker would apply; none unless exclusions are enabled.
fn active_patterns(source: &IniSource) -> Vec<String> {
    if !source.features().exclusions {
        return Vec::new();
    }
    source
        .attribute(ATTR_EXCLUDE)
        .map(|list| split_list(&list))
        .unwrap_or_default()
}

/// The path of `input`, which may be a full URL.
fn pathname(input: &str) -> String {
    PageLocation::parse(input)
        .map(|location| location.pathname)
        .unwrap_or_else(|_| input.to_string())
}
