//! The host page as seen by the tracker.
//!
//! The tracker never touches browser objects directly. Everything it needs from
//! the hosting page (current location, referrer, viewport, automation markers,
//! the opt-out flag, visibility, and the ability to navigate) is read through
//! the [`Page`] trait. The `web` module implements it over `window`/`document`;
//! [`DetachedPage`] implements it in memory for native hosts and tests.

use std::cell::RefCell;
use std::fmt;

use thiserror::Error;
use url::Url;

/// Name of the persisted opt-out flag.
pub const OPT_OUT_KEY: &str = "plausible_ignore";

/// The parts of the current location the tracker reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    /// Full URL, reported as the event URL.
    pub href: String,
    /// Scheme with trailing colon, e.g. `https:` or `file:`.
    pub protocol: String,
    /// Host name and port, e.g. `example.com:8080`.
    pub host: String,
    /// Host name without port.
    pub hostname: String,
    /// Path component, used for exclusion rules and route de-duplication.
    pub pathname: String,
}

impl PageLocation {
    /// Parse an absolute URL into a location.
    pub fn parse(href: &str) -> Result<Self, url::ParseError> {
        Url::parse(href).map(|url| Self::from_url(&url))
    }

    /// Build a location from an already parsed URL.
    pub fn from_url(url: &Url) -> Self {
        // IPv6 hosts come back bracketed, as `location.hostname` reports them.
        let hostname = url.host_str().unwrap_or_default().to_string();
        let host = match url.port() {
            Some(port) => format!("{}:{}", hostname, port),
            None => hostname.clone(),
        };

        Self {
            href: url.as_str().to_string(),
            protocol: format!("{}:", url.scheme()),
            host,
            hostname,
            pathname: url.path().to_string(),
        }
    }
}

/// Global markers left behind by browser automation tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutomationMarker {
    /// `window._phantom` (PhantomJS).
    Phantom,
    /// `window.__nightmare` (Nightmare).
    Nightmare,
    /// `navigator.webdriver` (WebDriver-controlled browsers, headless Chrome).
    WebDriver,
    /// `window.Cypress` (Cypress test runner).
    Cypress,
}

impl AutomationMarker {
    /// All markers, in the order they are checked.
    pub const ALL: [AutomationMarker; 4] = [
        AutomationMarker::Phantom,
        AutomationMarker::Nightmare,
        AutomationMarker::WebDriver,
        AutomationMarker::Cypress,
    ];

    /// The global property that carries the marker.
    pub fn property(&self) -> &'static str {
        match self {
            AutomationMarker::Phantom => "_phantom",
            AutomationMarker::Nightmare => "__nightmare",
            AutomationMarker::WebDriver => "webdriver",
            AutomationMarker::Cypress => "Cypress",
        }
    }
}

impl fmt::Display for AutomationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property())
    }
}

/// Document visibility, as far as the tracker cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// The page is shown to the user.
    #[default]
    Visible,
    /// The page is in a background tab or minimised.
    Hidden,
    /// The page is being prerendered and has not been shown yet.
    Prerender,
}

impl Visibility {
    /// Parse a `document.visibilityState` value. Unknown values count as hidden.
    pub fn from_state(state: &str) -> Self {
        match state {
            "visible" => Visibility::Visible,
            "prerender" => Visibility::Prerender,
            _ => Visibility::Hidden,
        }
    }
}

/// Failure to read page-scoped storage (e.g. storage access denied).
#[derive(Debug, Clone, Error)]
#[error("storage unavailable: {0}")]
pub struct StorageError(pub String);

/// Capabilities the tracker consumes from its host page.
pub trait Page {
    /// The current location.
    fn location(&self) -> PageLocation;

    /// The document referrer, `None` when empty.
    fn referrer(&self) -> Option<String>;

    /// Viewport width in CSS pixels.
    fn viewport_width(&self) -> u32;

    /// The first automation marker present in the execution context.
    fn automation_marker(&self) -> Option<AutomationMarker>;

    /// Read the persisted opt-out flag ([`OPT_OUT_KEY`]).
    fn opt_out_flag(&self) -> Result<Option<String>, StorageError>;

    /// Current document visibility.
    fn visibility(&self) -> Visibility;

    /// Navigate the current tab to `href`.
    fn navigate(&self, href: &str);
}

#[derive(Debug)]
struct DetachedState {
    location: PageLocation,
    referrer: Option<String>,
    viewport_width: u32,
    automation: Option<AutomationMarker>,
    opt_out: Result<Option<String>, StorageError>,
    visibility: Visibility,
    navigations: Vec<String>,
}

/// An in-memory page, for hosts without a browser.
///
/// Navigation updates the stored location and is recorded, so the page can
/// stand in for a browser tab in headless tools and tests.
#[derive(Debug)]
pub struct DetachedPage {
    state: RefCell<DetachedState>,
}

impl DetachedPage {
    /// Default viewport width reported by detached pages.
    pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

    /// Create a visible page at `location` with no referrer.
    pub fn new(location: PageLocation) -> Self {
        Self {
            state: RefCell::new(DetachedState {
                location,
                referrer: None,
                viewport_width: Self::DEFAULT_VIEWPORT_WIDTH,
                automation: None,
                opt_out: Ok(None),
                visibility: Visibility::Visible,
                navigations: Vec::new(),
            }),
        }
    }

    /// Create a page by parsing `href`.
    pub fn at(href: &str) -> Result<Self, url::ParseError> {
        PageLocation::parse(href).map(Self::new)
    }

    /// Set the referrer.
    pub fn with_referrer(self, referrer: impl Into<String>) -> Self {
        self.state.borrow_mut().referrer = Some(referrer.into());
        self
    }

    /// Set the viewport width.
    pub fn with_viewport_width(self, width: u32) -> Self {
        self.state.borrow_mut().viewport_width = width;
        self
    }

    /// Replace the current location without recording a navigation.
    pub fn set_location(&self, location: PageLocation) {
        self.state.borrow_mut().location = location;
    }

    /// Set or clear the automation marker.
    pub fn set_automation_marker(&self, marker: Option<AutomationMarker>) {
        self.state.borrow_mut().automation = marker;
    }

    /// Set the value returned for the opt-out flag, or a read failure.
    pub fn set_opt_out_flag(&self, flag: Result<Option<String>, StorageError>) {
        self.state.borrow_mut().opt_out = flag;
    }

    /// Set document visibility.
    pub fn set_visibility(&self, visibility: Visibility) {
        self.state.borrow_mut().visibility = visibility;
    }

    /// Every href passed to [`Page::navigate`], oldest first.
    pub fn navigations(&self) -> Vec<String> {
        self.state.borrow().navigations.clone()
    }
}

impl Page for DetachedPage {
    fn location(&self) -> PageLocation {
        self.state.borrow().location.clone()
    }

    fn referrer(&self) -> Option<String> {
        self.state.borrow().referrer.clone()
    }

    fn viewport_width(&self) -> u32 {
        self.state.borrow().viewport_width
    }

    fn automation_marker(&self) -> Option<AutomationMarker> {
        self.state.borrow().automation
    }

    fn opt_out_flag(&self) -> Result<Option<String>, StorageError> {
        self.state.borrow().opt_out.clone()
    }

    fn visibility(&self) -> Visibility {
        self.state.borrow().visibility
    }

    fn navigate(&self, href: &str) {
        let mut state = self.state.borrow_mut();
        state.navigations.push(href.to_string());
        match PageLocation::parse(href) {
            Ok(location) => state.location = location,
            Err(e) => tracing::debug!(href, error = %e, "Detached page ignored unparseable navigation"),
        }
    }
}
