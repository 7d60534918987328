//! Page-view detection.
//!
//! The observer turns navigation notifications into `pageview` events. Two
//! strategies exist and exactly one is active per tracker:
//!
//! - **Hash**: every hash change fires a page view, even when it repeats the
//!   previous route.
//! - **History**: `pushState` and `popstate` fire a page view only when the
//!   path differs from the last one recorded.
//!
//! # State machine
//!
//! ```text
//! (nothing recorded) --Initial, page visible------------> (recorded P)
//! (nothing recorded) --Initial, page prerendering-------> (nothing recorded, waiting)
//! (nothing recorded) --VisibilityChange to visible------> (recorded P)
//! (recorded P)       --VisibilityChange----------------> (recorded P)        no page view
//! (recorded P)       --HashChange [hash]---------------> (recorded P')       always fires
//! (recorded P)       --PushState/PopState [history]----> (recorded P')       fires iff P' != P
//! ```
//!
//! How notifications are produced (wrapping `history.pushState`, listening for
//! `hashchange`) is the host's business; the observer only needs a
//! [`NavigationSource`] to subscribe to.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::Routing;
use crate::dispatcher::EventSink;
use crate::event::{EventOptions, PAGEVIEW};
use crate::page::{Page, Visibility};

/// A navigation notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTrigger {
    /// The synchronous run at install time.
    Initial,
    /// `hashchange`.
    HashChange,
    /// A call to `history.pushState`.
    PushState,
    /// `popstate`.
    PopState,
    /// `visibilitychange`.
    VisibilityChange,
}

/// Callback receiving navigation notifications.
pub type NavigationHandler = Rc<dyn Fn(NavigationTrigger)>;

/// Something that reports navigation notifications.
pub trait NavigationSource {
    /// Deliver every future notification to `handler`.
    fn subscribe(&self, handler: NavigationHandler);
}

/// A [`NavigationSource`] driven by explicit [`emit`](NavigationBus::emit) calls.
///
/// Useful for hosts with their own router, and for tests.
#[derive(Default)]
pub struct NavigationBus {
    handlers: RefCell<Vec<NavigationHandler>>,
}

impl fmt::Debug for NavigationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationBus")
            .field("handlers", &self.handlers.borrow().len())
            .finish()
    }
}

impl NavigationBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify every subscriber.
    pub fn emit(&self, trigger: NavigationTrigger) {
        let handlers: Vec<_> = self.handlers.borrow().iter().cloned().collect();
        for handler in handlers {
            handler(trigger);
        }
    }
}

impl NavigationSource for NavigationBus {
    fn subscribe(&self, handler: NavigationHandler) {
        self.handlers.borrow_mut().push(handler);
    }
}

/// Page-view detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    /// One page view per hash change.
    Hash,
    /// One page view per distinct path.
    History,
}

impl RoutingStrategy {
    /// The strategy for `routing`, or `None` for manual page views.
    pub fn for_routing(routing: Routing) -> Option<Self> {
        match routing {
            Routing::Hash => Some(RoutingStrategy::Hash),
            Routing::History => Some(RoutingStrategy::History),
            Routing::Manual => None,
        }
    }

    fn accepts(&self, trigger: NavigationTrigger) -> bool {
        match self {
            RoutingStrategy::Hash => trigger == NavigationTrigger::HashChange,
            RoutingStrategy::History => matches!(
                trigger,
                NavigationTrigger::PushState | NavigationTrigger::PopState
            ),
        }
    }
}

/// The last path a page view was recorded for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    last_path: Option<String>,
}

impl NavigationState {
    /// Path of the most recent page view.
    pub fn last_path(&self) -> Option<&str> {
        self.last_path.as_deref()
    }

    /// Whether any page view has been recorded.
    pub fn has_recorded(&self) -> bool {
        self.last_path.is_some()
    }

    fn record(&mut self, path: String) {
        self.last_path = Some(path);
    }
}

/// Fires page views on navigation.
pub struct NavigationObserver {
    strategy: RoutingStrategy,
    page: Rc<dyn Page>,
    sink: Rc<dyn EventSink>,
    state: RefCell<NavigationState>,
}

impl fmt::Debug for NavigationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationObserver")
            .field("strategy", &self.strategy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl NavigationObserver {
    /// Create an observer that reports page views to `sink`.
    pub fn new(strategy: RoutingStrategy, page: Rc<dyn Page>, sink: Rc<dyn EventSink>) -> Self {
        Self {
            strategy,
            page,
            sink,
            state: RefCell::new(NavigationState::default()),
        }
    }

    /// The active strategy.
    pub fn strategy(&self) -> RoutingStrategy {
        self.strategy
    }

    /// A copy of the current navigation state.
    pub fn state(&self) -> NavigationState {
        self.state.borrow().clone()
    }

    /// Subscribe to `source` and run the install-time trigger.
    ///
    /// Returns whether the initial page view fired (it is deferred while the
    /// page is prerendering).
    pub fn start(self: &Rc<Self>, source: &dyn NavigationSource) -> bool {
        let observer = Rc::clone(self);
        source.subscribe(Rc::new(move |trigger| {
            observer.handle(trigger);
        }));
        self.handle(NavigationTrigger::Initial)
    }

    /// React to one notification. Returns whether a page view fired.
    pub fn handle(&self, trigger: NavigationTrigger) -> bool {
        match trigger {
            NavigationTrigger::Initial => {
                if self.page.visibility() == Visibility::Prerender {
                    tracing::debug!("Page is prerendering, deferring initial page view");
                    return false;
                }
                self.page_view()
            }
            NavigationTrigger::VisibilityChange => {
                if self.state.borrow().has_recorded()
                    || self.page.visibility() != Visibility::Visible
                {
                    return false;
                }
                self.page_view()
            }
            other if self.strategy.accepts(other) => self.page_view(),
            other => {
                tracing::trace!(trigger = ?other, strategy = ?self.strategy, "Ignoring navigation trigger");
                false
            }
        }
    }

    fn page_view(&self) -> bool {
        let path = self.page.location().pathname;
        {
            let mut state = self.state.borrow_mut();
            if self.strategy == RoutingStrategy::History && state.last_path() == Some(path.as_str()) {
                tracing::trace!(path = %path, "Path unchanged, skipping page view");
                return false;
            }
            state.record(path);
        }

        self.sink.track(PAGEVIEW, EventOptions::default());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{DetachedPage, PageLocation};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        names: RefCell<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn track(&self, name: &str, _options: EventOptions) {
            self.names.borrow_mut().push(name.to_string());
        }
    }

    fn setup(
        strategy: RoutingStrategy,
        href: &str,
    ) -> (Rc<NavigationObserver>, Rc<DetachedPage>, Rc<RecordingSink>) {
        let page = Rc::new(DetachedPage::at(href).unwrap());
        let sink = Rc::new(RecordingSink::default());
        let observer = Rc::new(NavigationObserver::new(strategy, page.clone(), sink.clone()));
        (observer, page, sink)
    }

    fn go(page: &DetachedPage, href: &str) {
        page.set_location(PageLocation::parse(href).unwrap());
    }

    #[test]
    fn test_initial_trigger_fires_pageview() {
        let (observer, _, sink) = setup(RoutingStrategy::History, "https://example.com/");
        let bus = NavigationBus::new();
        assert!(observer.start(&bus));
        assert_eq!(*sink.names.borrow(), vec!["pageview"]);
        assert_eq!(observer.state().last_path(), Some("/"));
    }

    #[test]
    fn test_hash_strategy_does_not_deduplicate() {
        let (observer, page, sink) = setup(RoutingStrategy::Hash, "https://example.com/#/a");
        let bus = NavigationBus::new();
        observer.start(&bus);

        go(&page, "https://example.com/#/b");
        bus.emit(NavigationTrigger::HashChange);
        bus.emit(NavigationTrigger::HashChange);

        assert_eq!(sink.names.borrow().len(), 3);
    }

    #[test]
    fn test_history_strategy_deduplicates_by_path() {
        let (observer, page, sink) = setup(RoutingStrategy::History, "https://example.com/");
        let bus = NavigationBus::new();
        observer.start(&bus);

        go(&page, "https://example.com/docs");
        bus.emit(NavigationTrigger::PushState);
        bus.emit(NavigationTrigger::PushState);
        go(&page, "https://example.com/");
        bus.emit(NavigationTrigger::PopState);

        assert_eq!(sink.names.borrow().len(), 3);
        assert_eq!(observer.state().last_path(), Some("/"));
    }

    #[test]
    fn test_strategies_ignore_each_others_triggers() {
        let (observer, _, sink) = setup(RoutingStrategy::Hash, "https://example.com/");
        assert!(!observer.handle(NavigationTrigger::PushState));
        assert!(!observer.handle(NavigationTrigger::PopState));

        let (history, _, history_sink) = setup(RoutingStrategy::History, "https://example.com/");
        assert!(!history.handle(NavigationTrigger::HashChange));

        assert!(sink.names.borrow().is_empty());
        assert!(history_sink.names.borrow().is_empty());
    }

    #[test]
    fn test_hash_change_while_prerendering_fires_once() {
        let (observer, page, sink) = setup(RoutingStrategy::Hash, "https://example.com/#/a");
        page.set_visibility(Visibility::Prerender);
        let bus = NavigationBus::new();
        assert!(!observer.start(&bus));

        // Only the install-time page view waits for visibility.
        go(&page, "https://example.com/#/b");
        bus.emit(NavigationTrigger::HashChange);
        assert_eq!(*sink.names.borrow(), vec!["pageview"]);

        page.set_visibility(Visibility::Visible);
        bus.emit(NavigationTrigger::VisibilityChange);
        assert_eq!(sink.names.borrow().len(), 1);
        assert!(observer.state().has_recorded());
    }

    #[test]
    fn test_prerender_defers_until_visible() {
        let (observer, page, sink) = setup(RoutingStrategy::History, "https://example.com/");
        page.set_visibility(Visibility::Prerender);
        let bus = NavigationBus::new();

        assert!(!observer.start(&bus));
        assert!(sink.names.borrow().is_empty());

        page.set_visibility(Visibility::Visible);
        bus.emit(NavigationTrigger::VisibilityChange);
        assert_eq!(sink.names.borrow().len(), 1);

        bus.emit(NavigationTrigger::VisibilityChange);
        assert_eq!(sink.names.borrow().len(), 1, "visibility never fires twice");
    }

    #[test]
    fn test_route_change_while_prerendering_skips_visibility_pageview() {
        let (observer, page, sink) = setup(RoutingStrategy::History, "https://example.com/");
        page.set_visibility(Visibility::Prerender);
        let bus = NavigationBus::new();
        observer.start(&bus);

        go(&page, "https://example.com/next");
        bus.emit(NavigationTrigger::PushState);
        assert_eq!(sink.names.borrow().len(), 1);

        page.set_visibility(Visibility::Visible);
        bus.emit(NavigationTrigger::VisibilityChange);
        assert_eq!(sink.names.borrow().len(), 1);
    }

    #[test]
    fn test_hidden_visibility_change_does_not_fire() {
        let (observer, page, sink) = setup(RoutingStrategy::Hash, "https://example.com/");
        page.set_visibility(Visibility::Prerender);
        let bus = NavigationBus::new();
        observer.start(&bus);

        page.set_visibility(Visibility::Hidden);
        bus.emit(NavigationTrigger::VisibilityChange);
        assert!(sink.names.borrow().is_empty());
    }

    #[test]
    fn test_manual_routing_has_no_strategy() {
        assert_eq!(RoutingStrategy::for_routing(Routing::Manual), None);
        assert_eq!(RoutingStrategy::for_routing(Routing::Hash), Some(RoutingStrategy::Hash));
    }
}
