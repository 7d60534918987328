//! Link click classification.
//!
//! Every `click` and `auxclick` on the document is offered to the
//! [`InteractionClassifier`]. It finds the link behind the click, decides
//! whether the link is a file download and/or an outbound link, reports the
//! matching events, and tells the host whether to hold back the browser's
//! own navigation.
//!
//! ```text
//! click target --find_trackable_anchor--> Anchor
//!   -> file download? (extension of the URL path in the configured set)
//!   -> outbound?      (link host differs from page host)
//!   -> same-tab primary click with an event fired? defer navigation 150 ms
//! ```
//!
//! The two checks are independent: a document hosted on another site fires
//! both events, and the navigation is deferred once.

mod anchor;

pub use anchor::{find_trackable_anchor, Anchor, DomNode};

use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::config::TrackerConfig;
use crate::dispatcher::EventSink;
use crate::event::{EventOptions, FILE_DOWNLOAD, OUTBOUND_LINK_CLICK};
use crate::page::{Page, PageLocation};
use crate::scheduler::Scheduler;

/// Delay between reporting a link click and following the link.
pub const NAVIGATION_DELAY: Duration = Duration::from_millis(150);

/// Mouse button, numbered as the DOM `MouseEvent.button` property numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Main,
    Middle,
    Secondary,
    Other(i16),
}

impl MouseButton {
    /// Map a DOM `button` value.
    pub fn from_dom(button: i16) -> Self {
        match button {
            0 => MouseButton::Main,
            1 => MouseButton::Middle,
            2 => MouseButton::Secondary,
            other => MouseButton::Other(other),
        }
    }
}

/// Which click-family event was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// `click`.
    Click,
    /// `auxclick`, with the button that raised it.
    AuxClick(MouseButton),
}

/// A click-family event, reduced to what classification reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub kind: ClickKind,
    pub ctrl_key: bool,
    pub meta_key: bool,
    pub shift_key: bool,
}

impl ClickEvent {
    /// A plain `click` with no modifier held.
    pub fn click() -> Self {
        Self::new(ClickKind::Click)
    }

    /// An `auxclick` raised by `button`.
    pub fn aux_click(button: MouseButton) -> Self {
        Self::new(ClickKind::AuxClick(button))
    }

    fn new(kind: ClickKind) -> Self {
        Self {
            kind,
            ctrl_key: false,
            meta_key: false,
            shift_key: false,
        }
    }

    /// Hold ctrl.
    pub fn with_ctrl(mut self) -> Self {
        self.ctrl_key = true;
        self
    }

    /// Hold meta (cmd).
    pub fn with_meta(mut self) -> Self {
        self.meta_key = true;
        self
    }

    /// Hold shift.
    pub fn with_shift(mut self) -> Self {
        self.shift_key = true;
        self
    }

    /// Whether a modifier that opens links elsewhere is held.
    pub fn has_modifier(&self) -> bool {
        self.ctrl_key || self.meta_key || self.shift_key
    }

    /// Whether the event counts as a link activation: any `click`, or a
    /// middle-button `auxclick`.
    pub fn is_trackable(&self) -> bool {
        matches!(
            self.kind,
            ClickKind::Click | ClickKind::AuxClick(MouseButton::Middle)
        )
    }
}

/// Result of classifying one click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// No link was found above the click target.
    NotALink,
    /// A link was clicked but no event was reported.
    Untracked,
    /// Events were reported and the browser may navigate normally.
    Tracked,
    /// Events were reported and the host must cancel the default action;
    /// navigation is scheduled after [`NAVIGATION_DELAY`].
    Deferred,
}

impl ClickOutcome {
    /// Whether the host must cancel the event's default action.
    pub fn prevents_default(&self) -> bool {
        matches!(self, ClickOutcome::Deferred)
    }
}

/// What a link is, independent of how it was clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkClassification {
    /// The link resolved against the page URL.
    pub url: String,
    /// The link's file extension is in the download set.
    pub file_download: bool,
    /// The link points at another host.
    pub outbound: bool,
}

/// Reports link clicks as events and defers same-tab navigation.
pub struct InteractionClassifier {
    config: TrackerConfig,
    page: Rc<dyn Page>,
    sink: Rc<dyn EventSink>,
    scheduler: Rc<dyn Scheduler>,
}

impl fmt::Debug for InteractionClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionClassifier")
            .field("file_extensions", &self.config.file_extensions)
            .field("file_downloads", &self.config.features.file_downloads)
            .field("outbound_links", &self.config.features.outbound_links)
            .finish_non_exhaustive()
    }
}

fn same_tab_target() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^_(self|parent|top)$").expect("target pattern is valid"))
}

/// Extension of the last path segment, without the dot.
pub fn path_extension(url: &Url) -> Option<&str> {
    let segment = url.path().rsplit('/').next()?;
    segment.rsplit_once('.').map(|(_, ext)| ext).filter(|ext| !ext.is_empty())
}

impl InteractionClassifier {
    /// Create a classifier using the download extensions and link features
    /// of `config`.
    pub fn new(
        config: &TrackerConfig,
        page: Rc<dyn Page>,
        sink: Rc<dyn EventSink>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        Self {
            config: config.clone(),
            page,
            sink,
            scheduler,
        }
    }

    /// Classify `anchor` against the current page. `None` when the href
    /// cannot be resolved to a URL.
    pub fn classify(&self, anchor: &Anchor) -> Option<LinkClassification> {
        let location = self.page.location();
        let url = resolve(&location, &anchor.href)?;

        let file_download = self.config.features.file_downloads
            && path_extension(&url).is_some_and(|ext| self.config.is_download_extension(ext));
        let outbound = self.config.features.outbound_links && {
            let host = PageLocation::from_url(&url).host;
            !host.is_empty() && host != location.host
        };

        Some(LinkClassification {
            url: url.to_string(),
            file_download,
            outbound,
        })
    }

    /// Handle a click whose target is `target`.
    pub fn handle<N: DomNode>(&self, target: N, event: &ClickEvent) -> ClickOutcome {
        match find_trackable_anchor(target) {
            Some(anchor) => self.handle_anchor(&anchor, event),
            None => ClickOutcome::NotALink,
        }
    }

    /// Handle a click on `anchor`.
    pub fn handle_anchor(&self, anchor: &Anchor, event: &ClickEvent) -> ClickOutcome {
        let Some(link) = self.classify(anchor) else {
            tracing::trace!(href = %anchor.href, "Unresolvable link, ignoring click");
            return ClickOutcome::Untracked;
        };

        if !event.is_trackable() {
            tracing::trace!(kind = ?event.kind, "Click kind is not tracked");
            return ClickOutcome::Untracked;
        }

        let mut fired = false;
        if link.file_download {
            self.sink
                .track(FILE_DOWNLOAD, EventOptions::with_url_prop(link.url.clone()));
            fired = true;
        }
        if link.outbound {
            self.sink
                .track(OUTBOUND_LINK_CLICK, EventOptions::with_url_prop(link.url.clone()));
            fired = true;
        }

        if !fired {
            return ClickOutcome::Untracked;
        }

        if !self.navigates_same_tab(anchor, event) {
            return ClickOutcome::Tracked;
        }

        let page = Rc::clone(&self.page);
        let href = link.url;
        tracing::debug!(href = %href, delay_ms = NAVIGATION_DELAY.as_millis() as u64, "Deferring link navigation");
        self.scheduler
            .schedule(NAVIGATION_DELAY, Box::new(move || page.navigate(&href)));
        ClickOutcome::Deferred
    }

    fn navigates_same_tab(&self, anchor: &Anchor, event: &ClickEvent) -> bool {
        let same_tab = match anchor.target.as_deref() {
            None | Some("") => true,
            Some(target) => same_tab_target().is_match(target),
        };
        same_tab && !event.has_modifier() && event.kind == ClickKind::Click
    }
}

fn resolve(location: &PageLocation, href: &str) -> Option<Url> {
    match Url::parse(href) {
        Ok(url) => Some(url),
        Err(_) => Url::parse(&location.href).ok()?.join(href).ok(),
    }
}
