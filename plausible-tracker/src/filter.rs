//! Suppression decisions: bots, opt-out, loopback, and exclusion rules.
//!
//! Every event passes through [`SuppressionPolicy::decide`] before anything is
//! sent. Suppression is never an error; it is a normal outcome that is logged
//! and then silently drops the event.
//!
//! # Order of checks
//!
//! ```text
//! loopback/file (if enabled) -> automation marker -> opt-out flag -> exclusion rule (page views only)
//! ```

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::event::PAGEVIEW;
use crate::glob::ExclusionRules;
use crate::page::{AutomationMarker, Page, PageLocation};

/// Why an event was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressReason {
    /// A browser automation marker is present.
    Automation(AutomationMarker),
    /// The visitor opted out via the persisted flag.
    OptOut,
    /// The page is served from a loopback host or a local file.
    Localhost,
    /// A page view matched a configured exclusion pattern.
    ExclusionRule(String),
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::Automation(marker) => write!(f, "automation ({})", marker),
            SuppressReason::OptOut => write!(f, "localStorage flag"),
            SuppressReason::Localhost => write!(f, "localhost"),
            SuppressReason::ExclusionRule(_) => write!(f, "exclusion rule"),
        }
    }
}

/// Outcome of evaluating the suppression checks for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressionDecision {
    /// The event may be sent.
    Allow,
    /// The event must be dropped.
    Suppress(SuppressReason),
}

impl SuppressionDecision {
    /// Whether the event may be sent.
    pub fn is_allowed(&self) -> bool {
        matches!(self, SuppressionDecision::Allow)
    }
}

fn loopback_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // localhost | 127.x[.x[.x]] | [::] or [::1]
        Regex::new(r"^localhost$|^127(\.[0-9]+){0,2}\.[0-9]+$|^\[::1?\]$")
            .expect("loopback pattern is valid")
    })
}

/// Whether `location` is a loopback host or a local file.
pub fn is_local_context(location: &PageLocation) -> bool {
    location.protocol == "file:" || loopback_pattern().is_match(&location.hostname)
}

/// Context-wide checks that apply to every event regardless of its name.
#[derive(Debug, Clone, Copy, Default)]
pub struct BotFilter {
    suppress_on_localhost: bool,
}

impl BotFilter {
    /// Create a filter. `suppress_on_localhost` enables the loopback/file check.
    pub fn new(suppress_on_localhost: bool) -> Self {
        Self {
            suppress_on_localhost,
        }
    }

    /// Evaluate the context-wide checks against `page`.
    pub fn evaluate(&self, page: &dyn Page) -> SuppressionDecision {
        if self.suppress_on_localhost && is_local_context(&page.location()) {
            return SuppressionDecision::Suppress(SuppressReason::Localhost);
        }

        if let Some(marker) = page.automation_marker() {
            return SuppressionDecision::Suppress(SuppressReason::Automation(marker));
        }

        match page.opt_out_flag() {
            Ok(Some(flag)) if flag == "true" => {
                SuppressionDecision::Suppress(SuppressReason::OptOut)
            }
            Ok(_) => SuppressionDecision::Allow,
            Err(e) => {
                tracing::trace!(error = %e, "Opt-out flag unreadable, treating as not set");
                SuppressionDecision::Allow
            }
        }
    }
}

/// The complete suppression policy for a tracker.
#[derive(Debug, Clone, Default)]
pub struct SuppressionPolicy {
    filter: BotFilter,
    exclusions: ExclusionRules,
}

impl SuppressionPolicy {
    /// Combine the context filter with the site's exclusion rules.
    pub fn new(filter: BotFilter, exclusions: ExclusionRules) -> Self {
        Self { filter, exclusions }
    }

    /// The configured exclusion rules.
    pub fn exclusions(&self) -> &ExclusionRules {
        &self.exclusions
    }

    /// Decide whether event `name` may be sent from `page` right now.
    ///
    /// Exclusion rules only ever apply to page views.
    pub fn decide(&self, name: &str, page: &dyn Page) -> SuppressionDecision {
        let decision = self.filter.evaluate(page);
        if !decision.is_allowed() {
            return decision;
        }

        if name == PAGEVIEW {
            let path = page.location().pathname;
            if let Some(pattern) = self.exclusions.first_match(&path) {
                return SuppressionDecision::Suppress(SuppressReason::ExclusionRule(
                    pattern.as_str().to_string(),
                ));
            }
        }

        SuppressionDecision::Allow
    }
}
