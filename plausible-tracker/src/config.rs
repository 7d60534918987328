//! Tracker configuration.
//!
//! Configuration is read once at install time from a [`ConfigSource`], a
//! key/value view over whatever the host uses to configure the tracker (the
//! `<script>` element's attributes in a browser, an INI file for native hosts).
//! The resulting [`TrackerConfig`] is never mutated afterwards.
//!
//! # Recognised keys
//!
//! | Attribute | INI key (`[tracker]`) | Meaning |
//! |---|---|---|
//! | `data-api` | `api` | Endpoint override |
//! | `data-domain` | `domain` | Site identifier (required) |
//! | `data-exclude` | `exclude` | Comma-separated exclusion globs |
//! | `file-types` | `file_types` | Comma-separated file extensions |
//! | `src` | `script_src` | Tracker script URL, used to derive the endpoint |

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use ini::Ini;
use url::Url;

use crate::error::{TrackerError, TrackerResult};

/// Endpoint override attribute.
pub const ATTR_API: &str = "data-api";
/// Site identifier attribute.
pub const ATTR_DOMAIN: &str = "data-domain";
/// Exclusion pattern attribute.
pub const ATTR_EXCLUDE: &str = "data-exclude";
/// File extension override attribute.
pub const ATTR_FILE_TYPES: &str = "file-types";

/// Path appended to the script origin to form the default endpoint.
pub const DEFAULT_EVENT_PATH: &str = "/api/event";

/// Extensions treated as downloads when `file-types` is not configured.
pub const DEFAULT_FILE_EXTENSIONS: [&str; 25] = [
    "pdf", "xlsx", "docx", "txt", "rtf", "csv", "exe", "key", "pps", "ppt", "pptx", "7z", "pkg",
    "rar", "gz", "zip", "avi", "mov", "mp4", "mpeg", "wmv", "midi", "mp3", "wav", "wma",
];

/// INI section holding tracker settings.
pub const INI_SECTION: &str = "tracker";

/// Directory name under the user config dir.
const CONFIG_DIR_NAME: &str = "plausible-tracker";

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Read-only key/value view of the host's tracker configuration.
pub trait ConfigSource {
    /// Value of a configuration attribute, if set.
    fn attribute(&self, name: &str) -> Option<String>;

    /// URL the tracker script was loaded from, if known.
    fn script_src(&self) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn attribute(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }

    fn script_src(&self) -> Option<String> {
        self.get("src").cloned()
    }
}

/// How page views are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Routing {
    /// History API routing, de-duplicated by path.
    #[default]
    History,
    /// Hash routing, one page view per hash change.
    Hash,
    /// No automatic page views; the host reports them explicitly.
    Manual,
}

impl Routing {
    /// Parse a routing name (`history`, `hash`, `manual`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "history" => Some(Routing::History),
            "hash" => Some(Routing::Hash),
            "manual" => Some(Routing::Manual),
            _ => None,
        }
    }

    /// Lowercase name of this routing mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Routing::History => "history",
            Routing::Hash => "hash",
            Routing::Manual => "manual",
        }
    }
}

impl fmt::Display for Routing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional tracker behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// Page-view detection strategy.
    pub routing: Routing,
    /// Tag payloads with `h: 1`.
    pub hash_mode_payload: bool,
    /// Honour `data-exclude`.
    pub exclusions: bool,
    /// Report clicks on links to other hosts.
    pub outbound_links: bool,
    /// Report clicks on links to downloadable files.
    pub file_downloads: bool,
    /// Drop all events on loopback hosts and `file:` pages.
    pub suppress_on_localhost: bool,
    /// Honour the `u` option overriding the reported URL.
    pub manual_url: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self::exclusions_file_downloads()
    }
}

impl Features {
    /// Hash routing with file downloads, suppressed on localhost.
    pub fn file_downloads_hash() -> Self {
        Self {
            routing: Routing::Hash,
            hash_mode_payload: true,
            exclusions: false,
            outbound_links: false,
            file_downloads: true,
            suppress_on_localhost: true,
            manual_url: false,
        }
    }

    /// History routing with exclusions and file downloads, suppressed on localhost.
    pub fn exclusions_file_downloads() -> Self {
        Self {
            routing: Routing::History,
            hash_mode_payload: false,
            exclusions: true,
            outbound_links: false,
            file_downloads: true,
            suppress_on_localhost: true,
            manual_url: false,
        }
    }

    /// Hash routing with exclusions and file downloads, active on localhost.
    pub fn compat_hash_local() -> Self {
        Self {
            routing: Routing::Hash,
            hash_mode_payload: true,
            exclusions: true,
            outbound_links: false,
            file_downloads: true,
            suppress_on_localhost: false,
            manual_url: false,
        }
    }

    /// Every behaviour, with manual page views and hash-tagged payloads.
    pub fn compat_full_manual() -> Self {
        Self {
            routing: Routing::Manual,
            hash_mode_payload: true,
            exclusions: true,
            outbound_links: true,
            file_downloads: true,
            suppress_on_localhost: false,
            manual_url: true,
        }
    }

    /// Features selected by this crate's build-variant cargo features.
    pub fn from_build() -> Self {
        let routing = if cfg!(feature = "manual") {
            Routing::Manual
        } else if cfg!(feature = "hash") {
            Routing::Hash
        } else {
            Routing::History
        };

        Self {
            routing,
            hash_mode_payload: cfg!(feature = "hash"),
            exclusions: cfg!(feature = "exclusions"),
            outbound_links: cfg!(feature = "outbound-links"),
            file_downloads: cfg!(feature = "file-downloads"),
            suppress_on_localhost: !cfg!(feature = "local"),
            manual_url: cfg!(feature = "manual"),
        }
    }

    /// Set the routing mode. Hash routing also turns on hash-tagged payloads.
    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        if routing == Routing::Hash {
            self.hash_mode_payload = true;
        }
        self
    }
}

/// Immutable tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Collection endpoint URL.
    pub endpoint: String,
    /// Site identifier.
    pub domain: String,
    /// Exclusion globs, in configured order.
    pub exclusion_patterns: Vec<String>,
    /// Extensions treated as file downloads.
    pub file_extensions: BTreeSet<String>,
    /// Optional behaviours.
    pub features: Features,
}

impl TrackerConfig {
    /// Create a config with default extensions, no exclusions and default features.
    pub fn new(endpoint: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            domain: domain.into(),
            exclusion_patterns: Vec::new(),
            file_extensions: default_file_extensions(),
            features: Features::default(),
        }
    }

    /// Read configuration from `source`.
    ///
    /// The endpoint is `data-api` when set, otherwise the script origin joined
    /// with [`DEFAULT_EVENT_PATH`]. `data-exclude` is only read when the
    /// exclusions feature is enabled.
    pub fn from_source(source: &dyn ConfigSource, features: Features) -> TrackerResult<Self> {
        let domain = source
            .attribute(ATTR_DOMAIN)
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or(TrackerError::MissingDomain)?;

        let endpoint = match source.attribute(ATTR_API).filter(|a| !a.trim().is_empty()) {
            Some(api) => api.trim().to_string(),
            None => {
                let src = source.script_src().ok_or_else(|| TrackerError::InvalidEndpoint {
                    value: String::new(),
                    reason: "no data-api attribute and no script source".to_string(),
                })?;
                derive_endpoint(&src)?
            }
        };

        let exclusion_patterns = if features.exclusions {
            source
                .attribute(ATTR_EXCLUDE)
                .map(|list| split_list(&list))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let file_extensions = source
            .attribute(ATTR_FILE_TYPES)
            .map(|list| split_list(&list).into_iter().collect::<BTreeSet<_>>())
            .filter(|set| !set.is_empty())
            .unwrap_or_else(default_file_extensions);

        Ok(Self {
            endpoint,
            domain,
            exclusion_patterns,
            file_extensions,
            features,
        })
    }

    /// Set the exclusion globs.
    pub fn with_exclusions<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.exclusion_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the file extension set.
    pub fn with_file_extensions<S: Into<String>>(
        mut self,
        extensions: impl IntoIterator<Item = S>,
    ) -> Self {
        self.file_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the optional behaviours.
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Whether `extension` counts as a file download.
    pub fn is_download_extension(&self, extension: &str) -> bool {
        self.file_extensions.contains(extension)
    }
}

/// The default download extension set.
pub fn default_file_extensions() -> BTreeSet<String> {
    DEFAULT_FILE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

/// Derive the collection endpoint from the tracker script's URL.
pub fn derive_endpoint(script_src: &str) -> TrackerResult<String> {
    let url = Url::parse(script_src).map_err(|e| TrackerError::InvalidEndpoint {
        value: script_src.to_string(),
        reason: e.to_string(),
    })?;

    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(TrackerError::InvalidEndpoint {
            value: script_src.to_string(),
            reason: "script source has no origin".to_string(),
        });
    }

    Ok(format!("{}{}", origin.ascii_serialization(), DEFAULT_EVENT_PATH))
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Default location of the native config file.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Tracker configuration loaded from an INI file.
///
/// ```ini
/// [tracker]
/// domain = example.com
/// api = https://stats.example.com/api/event
/// exclude = /admin/**, /preview/*
/// file_types = pdf, zip
/// routing = history
/// outbound_links = true
/// ```
#[derive(Debug, Clone, Default)]
pub struct IniSource {
    values: HashMap<String, String>,
}

impl IniSource {
    /// Load from `path`.
    pub fn load(path: &Path) -> TrackerResult<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| TrackerError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini).ok_or(TrackerError::ConfigurationAbsent)
    }

    /// Parse from INI text.
    pub fn parse(text: &str) -> TrackerResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| TrackerError::ConfigFile {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini).ok_or(TrackerError::ConfigurationAbsent)
    }

    fn from_ini(ini: &Ini) -> Option<Self> {
        let section = ini.section(Some(INI_SECTION))?;
        let values = section
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Some(Self { values })
    }

    /// Set a raw INI key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Raw INI value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Features described by the file, starting from [`Features::default`].
    ///
    /// Unknown or unparseable values keep the default.
    pub fn features(&self) -> Features {
        let mut features = Features::default();
        if let Some(routing) = self.get("routing").and_then(Routing::from_name) {
            features = features.with_routing(routing);
        }

        let flag = |key: &str, current: bool| {
            self.get(key)
                .and_then(|v| v.trim().parse::<bool>().ok())
                .unwrap_or(current)
        };
        features.hash_mode_payload = flag("hash_mode_payload", features.hash_mode_payload);
        features.exclusions = flag("exclusions", features.exclusions);
        features.outbound_links = flag("outbound_links", features.outbound_links);
        features.file_downloads = flag("file_downloads", features.file_downloads);
        features.suppress_on_localhost = flag("suppress_on_localhost", features.suppress_on_localhost);
        features.manual_url = flag("manual_url", features.manual_url);
        features
    }

    /// Write the settings back to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> TrackerResult<()> {
        let to_error = |reason: String| TrackerError::ConfigFile {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| to_error(e.to_string()))?;
        }

        let mut ini = Ini::new();
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        for key in keys {
            ini.with_section(Some(INI_SECTION))
                .set(key.as_str(), self.values[key].as_str());
        }
        ini.write_to_file(path).map_err(|e| to_error(e.to_string()))
    }
}

impl ConfigSource for IniSource {
    fn attribute(&self, name: &str) -> Option<String> {
        let key = match name {
            ATTR_API => "api",
            ATTR_DOMAIN => "domain",
            ATTR_EXCLUDE => "exclude",
            ATTR_FILE_TYPES => "file_types",
            _ => return None,
        };
        self.get(key).map(str::to_string)
    }

    fn script_src(&self) -> Option<String> {
        self.get("script_src").map(str::to_string)
    }
}
