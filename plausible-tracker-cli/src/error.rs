//! CLI error types.

use std::fmt;

use plausible_tracker::TrackerError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// The tracker library rejected the configuration or input.
    Tracker(TrackerError),

    /// Configuration file problem.
    Config(String),

    /// A command-line argument could not be used.
    InvalidArgument(String),

    /// Failed to create the Tokio runtime.
    RuntimeCreation(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Tracker(e) => write!(f, "{}", e),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::RuntimeCreation(msg) => {
                write!(f, "Failed to create Tokio runtime: {}", msg)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Tracker(e) => Some(e),
            CliError::Config(_) | CliError::InvalidArgument(_) | CliError::RuntimeCreation(_) => {
                None
            }
        }
    }
}

impl From<TrackerError> for CliError {
    fn from(e: TrackerError) -> Self {
        CliError::Tracker(e)
    }
}
