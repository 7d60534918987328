//! Event intents and the outbound wire payload.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// Name of the page-view event.
pub const PAGEVIEW: &str = "pageview";

/// Name of the file-download event.
pub const FILE_DOWNLOAD: &str = "File Download";

/// Name of the outbound-link event.
pub const OUTBOUND_LINK_CLICK: &str = "Outbound Link: Click";

/// Completion notification, invoked once a request has settled.
pub type Callback = Box<dyn FnOnce()>;

/// Arbitrary JSON properties attached to an event.
pub type Properties = Map<String, Value>;

/// Caller-supplied options for a single event.
#[derive(Default)]
pub struct EventOptions {
    /// Free-form metadata, sent as the `m` field.
    pub meta: Option<Properties>,
    /// Custom properties, sent as the `p` field.
    pub props: Option<Properties>,
    /// Invoked when the request settles. Never invoked for suppressed events.
    pub callback: Option<Callback>,
    /// Overrides the reported URL (`u` option) when the tracker allows it.
    pub url: Option<String>,
}

impl EventOptions {
    /// Options carrying a single `url` property, as used by link events.
    pub fn with_url_prop(url: impl Into<String>) -> Self {
        let mut props = Properties::new();
        props.insert("url".to_string(), Value::String(url.into()));
        Self {
            props: Some(props),
            ..Self::default()
        }
    }

    /// Set the metadata map.
    pub fn meta(mut self, meta: Properties) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Set the properties map.
    pub fn props(mut self, props: Properties) -> Self {
        self.props = Some(props);
        self
    }

    /// Set the completion callback.
    pub fn callback(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Override the reported URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl fmt::Debug for EventOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventOptions")
            .field("meta", &self.meta)
            .field("props", &self.props)
            .field("callback", &self.callback.is_some())
            .field("url", &self.url)
            .finish()
    }
}

/// A fully resolved event, ready to be encoded.
pub struct EventIntent {
    pub name: String,
    pub url: String,
    pub referrer: Option<String>,
    pub viewport_width: u32,
    pub meta: Option<Properties>,
    pub props: Option<Properties>,
    pub callback: Option<Callback>,
    /// Tag the payload for hash-routed sites.
    pub hash_mode: bool,
}

impl EventIntent {
    /// Encode this intent for `domain`, separating out the callback.
    pub fn into_payload(self, domain: &str) -> (Payload, Option<Callback>) {
        let payload = Payload {
            n: self.name,
            u: self.url,
            d: domain.to_string(),
            r: self.referrer.filter(|r| !r.is_empty()),
            w: self.viewport_width,
            m: self.meta.map(|m| Value::Object(m).to_string()),
            p: self.props.map(|p| Value::Object(p).to_string()),
            h: self.hash_mode.then_some(1),
        };
        (payload, self.callback)
    }
}

impl fmt::Debug for EventIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventIntent")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("referrer", &self.referrer)
            .field("viewport_width", &self.viewport_width)
            .field("meta", &self.meta)
            .field("props", &self.props)
            .field("callback", &self.callback.is_some())
            .field("hash_mode", &self.hash_mode)
            .finish()
    }
}

/// The JSON object posted to the collection endpoint.
///
/// `r` is always present (possibly `null`); `m`, `p` and `h` are omitted when
/// unset. `m` and `p` carry JSON text, not nested objects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub n: String,
    pub u: String,
    pub d: String,
    pub r: Option<String>,
    pub w: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub m: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u8>,
}

impl Payload {
    /// Serialize to the request body.
    pub fn to_body(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to encode event payload");
            String::new()
        })
    }
}
