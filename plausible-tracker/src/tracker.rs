//! Wiring configuration and host capabilities into a running tracker.
//!
//! Installation happens in two steps so the host can attach its click
//! listeners in between:
//!
//! 1. [`Tracker::new`] builds the dispatcher and, when link tracking is
//!    enabled, the [`InteractionClassifier`]. Nothing is sent yet.
//! 2. [`Tracker::start`] installs the dispatcher behind the entry point,
//!    replays calls queued before load, then starts the navigation observer
//!    (which sends the initial page view unless the page is prerendering).

use std::fmt;
use std::rc::Rc;

use crate::classifier::InteractionClassifier;
use crate::config::TrackerConfig;
use crate::dispatcher::{Dispatcher, EventSink};
use crate::error::TrackerResult;
use crate::navigation::{NavigationObserver, NavigationSource, RoutingStrategy};
use crate::page::Page;
use crate::queue::TrackerHandle;
use crate::scheduler::Scheduler;
use crate::transport::Transport;

/// What the host provides to the tracker.
#[derive(Clone)]
pub struct HostCapabilities {
    pub page: Rc<dyn Page>,
    pub transport: Rc<dyn Transport>,
    pub scheduler: Rc<dyn Scheduler>,
}

impl HostCapabilities {
    /// Bundle the host's capabilities.
    pub fn new(
        page: Rc<dyn Page>,
        transport: Rc<dyn Transport>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        Self {
            page,
            transport,
            scheduler,
        }
    }
}

impl fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCapabilities").finish_non_exhaustive()
    }
}

/// A tracker bound to one page.
pub struct Tracker {
    handle: Rc<TrackerHandle>,
    dispatcher: Rc<Dispatcher>,
    classifier: Option<Rc<InteractionClassifier>>,
    observer: Option<Rc<NavigationObserver>>,
    page: Rc<dyn Page>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("handle", &self.handle)
            .field("dispatcher", &self.dispatcher)
            .field("classifier", &self.classifier)
            .field("observer", &self.observer)
            .finish_non_exhaustive()
    }
}

impl Tracker {
    /// Build a tracker for `config`.
    ///
    /// `handle` is the page's entry point; it may already hold queued calls.
    /// Link and page-view events are reported through it, so they follow the
    /// same path as calls made by the page.
    pub fn new(
        config: TrackerConfig,
        host: HostCapabilities,
        handle: Rc<TrackerHandle>,
    ) -> TrackerResult<Self> {
        let features = config.features;
        let sink: Rc<dyn EventSink> = handle.clone();

        let classifier = (features.outbound_links || features.file_downloads).then(|| {
            Rc::new(InteractionClassifier::new(
                &config,
                Rc::clone(&host.page),
                Rc::clone(&sink),
                Rc::clone(&host.scheduler),
            ))
        });

        let observer = RoutingStrategy::for_routing(features.routing).map(|strategy| {
            Rc::new(NavigationObserver::new(
                strategy,
                Rc::clone(&host.page),
                Rc::clone(&sink),
            ))
        });

        let dispatcher = Rc::new(Dispatcher::new(
            config,
            Rc::clone(&host.page),
            host.transport,
        )?);

        Ok(Self {
            handle,
            dispatcher,
            classifier,
            observer,
            page: host.page,
        })
    }

    /// Go live: install the dispatcher, replay queued calls, then start
    /// page-view detection on `navigation`.
    ///
    /// Returns the number of replayed calls.
    pub fn start(&self, navigation: &dyn NavigationSource) -> usize {
        let replayed = self.handle.install(Rc::clone(&self.dispatcher));

        let initial_pageview = match &self.observer {
            Some(observer) => observer.start(navigation),
            None => false,
        };

        let config = self.dispatcher.config();
        tracing::info!(
            domain = %config.domain,
            endpoint = %config.endpoint,
            routing = %config.features.routing,
            outbound_links = config.features.outbound_links,
            file_downloads = config.features.file_downloads,
            exclusions = self.dispatcher.policy().exclusions().len(),
            replayed,
            initial_pageview,
            path = %self.page.location().pathname,
            "Tracker installed"
        );
        replayed
    }

    /// The page's entry point.
    pub fn handle(&self) -> &Rc<TrackerHandle> {
        &self.handle
    }

    /// The live dispatcher.
    pub fn dispatcher(&self) -> &Rc<Dispatcher> {
        &self.dispatcher
    }

    /// The click classifier, when outbound or download tracking is enabled.
    pub fn classifier(&self) -> Option<&Rc<InteractionClassifier>> {
        self.classifier.as_ref()
    }

    /// The navigation observer, absent with manual routing.
    pub fn observer(&self) -> Option<&Rc<NavigationObserver>> {
        self.observer.as_ref()
    }
}
