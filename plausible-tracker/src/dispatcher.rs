//! The event dispatcher: the single path from "an event happened" to the wire.
//!
//! ```text
//! track(name, options)
//!   -> SuppressionPolicy::decide   (bots, opt-out, loopback, exclusions)
//!   -> EventIntent                 (url, referrer, viewport, meta/props)
//!   -> Payload                     (JSON text)
//!   -> Transport::send             (fire-and-forget, callback on settle)
//! ```

use std::fmt;
use std::rc::Rc;

use crate::config::TrackerConfig;
use crate::error::TrackerResult;
use crate::event::{EventIntent, EventOptions};
use crate::filter::{BotFilter, SuppressReason, SuppressionDecision, SuppressionPolicy};
use crate::glob::ExclusionRules;
use crate::page::Page;
use crate::transport::{EventRequest, Transport};

/// Anything that accepts tracking calls.
///
/// Implemented by [`Dispatcher`] and by the pre-install
/// [`TrackerHandle`](crate::queue::TrackerHandle); the navigation observer and
/// the interaction classifier only ever see this trait.
pub trait EventSink {
    /// Record event `name`.
    fn track(&self, name: &str, options: EventOptions);
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A request was handed to the transport.
    Sent,
    /// The event was dropped and no request was made.
    Suppressed(SuppressReason),
}

/// Builds, filters and sends events.
pub struct Dispatcher {
    config: TrackerConfig,
    policy: SuppressionPolicy,
    page: Rc<dyn Page>,
    transport: Rc<dyn Transport>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher, compiling the configured exclusion patterns.
    pub fn new(
        config: TrackerConfig,
        page: Rc<dyn Page>,
        transport: Rc<dyn Transport>,
    ) -> TrackerResult<Self> {
        let exclusions = ExclusionRules::compile(config.exclusion_patterns.as_slice())?;
        let policy = SuppressionPolicy::new(
            BotFilter::new(config.features.suppress_on_localhost),
            exclusions,
        );

        Ok(Self {
            config,
            policy,
            page,
            transport,
        })
    }

    /// The configuration this dispatcher was built from.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The suppression policy applied to every event.
    pub fn policy(&self) -> &SuppressionPolicy {
        &self.policy
    }

    /// Filter, encode and send event `name`.
    ///
    /// Suppressed events make no request and never invoke the callback. Sent
    /// events invoke the callback once the request settles.
    pub fn dispatch(&self, name: &str, options: EventOptions) -> DispatchOutcome {
        if let SuppressionDecision::Suppress(reason) = self.policy.decide(name, self.page.as_ref()) {
            match &reason {
                SuppressReason::ExclusionRule(pattern) => {
                    tracing::warn!(event = name, pattern = %pattern, "Ignoring Event: {}", reason);
                }
                _ => tracing::warn!(event = name, "Ignoring Event: {}", reason),
            }
            return DispatchOutcome::Suppressed(reason);
        }

        let (payload, callback) = self.intent(name, options).into_payload(&self.config.domain);
        tracing::debug!(event = name, url = %payload.u, endpoint = %self.config.endpoint, "Dispatching event");

        self.transport.send(
            EventRequest::new(self.config.endpoint.clone(), payload.to_body()),
            callback,
        );
        DispatchOutcome::Sent
    }

    fn intent(&self, name: &str, options: EventOptions) -> EventIntent {
        let url = match options.url {
            Some(url) if self.config.features.manual_url => url,
            _ => self.page.location().href,
        };

        EventIntent {
            name: name.to_string(),
            url,
            referrer: self.page.referrer(),
            viewport_width: self.page.viewport_width(),
            meta: options.meta,
            props: options.props,
            callback: options.callback,
            hash_mode: self.config.features.hash_mode_payload,
        }
    }
}

impl EventSink for Dispatcher {
    fn track(&self, name: &str, options: EventOptions) {
        self.dispatch(name, options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Features;
    use crate::event::{Properties, PAGEVIEW};
    use crate::page::{AutomationMarker, DetachedPage};
    use crate::transport::tests::MockTransport;
    use serde_json::json;
    use std::cell::Cell;

    const ENDPOINT: &str = "https://stats.example.com/api/event";

    fn setup(href: &str, config: TrackerConfig) -> (Dispatcher, Rc<DetachedPage>, Rc<MockTransport>) {
        let page = Rc::new(DetachedPage::at(href).unwrap().with_viewport_width(1440));
        let transport = Rc::new(MockTransport::default());
        let dispatcher = Dispatcher::new(config, page.clone(), transport.clone()).unwrap();
        (dispatcher, page, transport)
    }

    fn config() -> TrackerConfig {
        TrackerConfig::new(ENDPOINT, "example.com")
    }

    #[test]
    fn test_pageview_payload() {
        let (dispatcher, _, transport) = setup("https://example.com/pricing", config());

        assert_eq!(dispatcher.dispatch(PAGEVIEW, EventOptions::default()), DispatchOutcome::Sent);

        let requests = transport.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].endpoint, ENDPOINT);
        drop(requests);

        assert_eq!(
            transport.bodies()[0],
            json!({
                "n": "pageview",
                "u": "https://example.com/pricing",
                "d": "example.com",
                "r": null,
                "w": 1440
            })
        );
    }

    #[test]
    fn test_referrer_and_props_are_sent() {
        let page = Rc::new(
            DetachedPage::at("https://example.com/")
                .unwrap()
                .with_referrer("https://search.test/"),
        );
        let transport = Rc::new(MockTransport::default());
        let dispatcher = Dispatcher::new(config(), page, transport.clone()).unwrap();

        let mut props = Properties::new();
        props.insert("plan".to_string(), json!("pro"));
        dispatcher.dispatch("Signup", EventOptions::default().props(props));

        let bodies = transport.bodies();
        let body = &bodies[0];
        assert_eq!(body["r"], json!("https://search.test/"));
        assert_eq!(body["p"], json!(r#"{"plan":"pro"}"#));
        assert!(body.get("h").is_none());
    }

    #[test]
    fn test_hash_features_tag_payload() {
        let (dispatcher, _, transport) = setup(
            "https://example.com/#/a",
            config().with_features(Features::file_downloads_hash()),
        );
        dispatcher.dispatch(PAGEVIEW, EventOptions::default());
        assert_eq!(transport.bodies()[0]["h"], json!(1));
    }

    #[test]
    fn test_url_override_requires_manual_url() {
        let (dispatcher, _, transport) = setup("https://example.com/real", config());
        dispatcher.dispatch(PAGEVIEW, EventOptions::default().url("https://example.com/virtual"));
        assert_eq!(transport.bodies()[0]["u"], json!("https://example.com/real"));

        let (dispatcher, _, transport) = setup(
            "https://example.com/real",
            config().with_features(Features::compat_full_manual()),
        );
        dispatcher.dispatch(PAGEVIEW, EventOptions::default().url("https://example.com/virtual"));
        assert_eq!(transport.bodies()[0]["u"], json!("https://example.com/virtual"));
    }

    #[test]
    fn test_excluded_pageview_is_not_sent_but_custom_event_is() {
        let (dispatcher, _, transport) = setup(
            "https://example.com/admin/users",
            config().with_exclusions(["/admin/**"]),
        );

        assert_eq!(
            dispatcher.dispatch(PAGEVIEW, EventOptions::default()),
            DispatchOutcome::Suppressed(SuppressReason::ExclusionRule("/admin/**".to_string()))
        );
        assert_eq!(dispatcher.dispatch("Export", EventOptions::default()), DispatchOutcome::Sent);
        assert_eq!(transport.names(), vec!["Export"]);
    }

    #[test]
    fn test_suppressed_event_skips_callback() {
        let (dispatcher, page, transport) = setup("https://example.com/", config());
        page.set_automation_marker(Some(AutomationMarker::Cypress));

        let called = Rc::new(Cell::new(false));
        let flag = Rc::clone(&called);
        let outcome = dispatcher.dispatch(PAGEVIEW, EventOptions::default().callback(move || flag.set(true)));

        assert!(matches!(outcome, DispatchOutcome::Suppressed(SuppressReason::Automation(_))));
        transport.settle_all();
        assert!(!called.get());
        assert!(transport.requests.borrow().is_empty());
    }

    #[test]
    fn test_callback_runs_once_on_settle() {
        let (dispatcher, _, transport) = setup("https://example.com/", config());
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        dispatcher.dispatch(
            PAGEVIEW,
            EventOptions::default().callback(move || counter.set(counter.get() + 1)),
        );

        assert_eq!(calls.get(), 0, "callback waits for the request to settle");
        transport.settle_all();
        transport.settle_all();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_localhost_suppression_follows_features() {
        let (dispatcher, _, transport) = setup("http://localhost:8000/", config());
        assert_eq!(
            dispatcher.dispatch(PAGEVIEW, EventOptions::default()),
            DispatchOutcome::Suppressed(SuppressReason::Localhost)
        );
        assert!(transport.requests.borrow().is_empty());

        let (dispatcher, _, transport) = setup(
            "http://localhost:8000/",
            config().with_features(Features::compat_hash_local()),
        );
        assert_eq!(dispatcher.dispatch(PAGEVIEW, EventOptions::default()), DispatchOutcome::Sent);
        assert_eq!(transport.requests.borrow().len(), 1);
    }

    #[test]
    fn test_glob_metacharacters_do_not_break_construction() {
        let page = Rc::new(DetachedPage::at("https://example.com/").unwrap());
        let transport = Rc::new(MockTransport::default());
        let result = Dispatcher::new(config().with_exclusions(["/[unclosed"]), page, transport);
        assert!(result.is_ok());
    }
}
