//! Tracker error types.
//!
//! Only installation can fail. Once a tracker is live, every runtime failure
//! (suppression, storage access, delivery) degrades to "do nothing" and is
//! reported through logging rather than through these errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Errors that can occur while building or installing a tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No configuration source was found for the tracker.
    #[error("no tracker configuration source found")]
    ConfigurationAbsent,

    /// The configuration does not name a site domain.
    #[error("missing required site domain (data-domain)")]
    MissingDomain,

    /// The collection endpoint could not be determined.
    #[error("invalid collection endpoint '{value}': {reason}")]
    InvalidEndpoint { value: String, reason: String },

    /// An exclusion pattern failed to compile.
    #[error("invalid exclusion pattern '{pattern}': {source}")]
    InvalidExclusionPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A configuration file could not be read or parsed.
    #[error("failed to load config file {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },

    /// The network transport could not be created.
    #[error("failed to create transport: {0}")]
    TransportInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_endpoint_display() {
        let err = TrackerError::InvalidEndpoint {
            value: "not a url".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid collection endpoint 'not a url': relative URL without a base"
        );
    }

    #[test]
    fn test_config_file_display_includes_path() {
        let err = TrackerError::ConfigFile {
            path: PathBuf::from("/etc/tracker.ini"),
            reason: "unexpected EOF".to_string(),
        };
        assert!(err.to_string().contains("/etc/tracker.ini"));
        assert!(err.to_string().contains("unexpected EOF"));
    }
}
