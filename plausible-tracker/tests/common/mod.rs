//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use plausible_tracker::classifier::{Anchor, DomNode};
use plausible_tracker::event::Callback;
use plausible_tracker::scheduler::Task;
use plausible_tracker::{
    DetachedPage, EventRequest, Features, HostCapabilities, NavigationBus, Scheduler, Tracker,
    TrackerConfig, TrackerHandle, Transport,
};

pub const ENDPOINT: &str = "https://stats.example.com/api/event";
pub const DOMAIN: &str = "example.com";

/// Transport that records requests and holds their callbacks.
#[derive(Default)]
pub struct RecordingTransport {
    requests: RefCell<Vec<EventRequest>>,
    pending: RefCell<Vec<Callback>>,
    immediate: Cell<bool>,
}

impl RecordingTransport {
    /// Settle every request as soon as it is sent.
    pub fn settling_immediately() -> Self {
        let transport = Self::default();
        transport.immediate.set(true);
        transport
    }

    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.requests
            .borrow()
            .iter()
            .map(|r| serde_json::from_str(&r.body).expect("payload is JSON"))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.bodies()
            .iter()
            .map(|b| b["n"].as_str().expect("event name").to_string())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn settle_all(&self) {
        let pending: Vec<_> = self.pending.borrow_mut().drain(..).collect();
        for callback in pending {
            callback();
        }
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: EventRequest, on_settled: Option<Callback>) {
        self.requests.borrow_mut().push(request);
        match on_settled {
            Some(callback) if self.immediate.get() => callback(),
            Some(callback) => self.pending.borrow_mut().push(callback),
            None => {}
        }
    }
}

/// Scheduler whose tasks run only when the test fires them.
#[derive(Default)]
pub struct PendingTimers {
    tasks: RefCell<Vec<(Duration, Task)>>,
}

impl PendingTimers {
    pub fn delays(&self) -> Vec<Duration> {
        self.tasks.borrow().iter().map(|(d, _)| *d).collect()
    }

    pub fn fire_all(&self) {
        let tasks: Vec<_> = self.tasks.borrow_mut().drain(..).collect();
        for (_, task) in tasks {
            task();
        }
    }
}

impl Scheduler for PendingTimers {
    fn schedule(&self, delay: Duration, task: Task) {
        self.tasks.borrow_mut().push((delay, task));
    }
}

/// Element in a hand-built document tree.
#[derive(Debug)]
pub struct Element {
    pub tag: &'static str,
    pub href: Option<String>,
    pub target: Option<String>,
    pub parent: Option<Rc<Element>>,
}

impl Element {
    pub fn body() -> Rc<Self> {
        Rc::new(Self {
            tag: "body",
            href: None,
            target: None,
            parent: None,
        })
    }

    pub fn child(tag: &'static str, parent: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self {
            tag,
            href: None,
            target: None,
            parent: Some(Rc::clone(parent)),
        })
    }

    pub fn link(href: &str, target: Option<&str>, parent: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self {
            tag: "a",
            href: Some(href.to_string()),
            target: target.map(str::to_string),
            parent: Some(Rc::clone(parent)),
        })
    }
}

impl<'a> DomNode for &'a Element {
    fn parent_node(&self) -> Option<Self> {
        let node: &'a Element = *self;
        node.parent.as_deref()
    }

    fn as_anchor(&self) -> Option<Anchor> {
        if !self.tag.eq_ignore_ascii_case("a") {
            return None;
        }
        self.href.as_ref().map(|href| Anchor {
            href: href.clone(),
            target: self.target.clone(),
        })
    }
}

/// A tracker wired to fakes.
pub struct TestHost {
    pub page: Rc<DetachedPage>,
    pub transport: Rc<RecordingTransport>,
    pub timers: Rc<PendingTimers>,
    pub navigation: NavigationBus,
    pub handle: Rc<TrackerHandle>,
}

impl TestHost {
    pub fn new(href: &str) -> Self {
        Self {
            page: Rc::new(DetachedPage::at(href).expect("valid test URL")),
            transport: Rc::new(RecordingTransport::default()),
            timers: Rc::new(PendingTimers::default()),
            navigation: NavigationBus::new(),
            handle: Rc::new(TrackerHandle::new()),
        }
    }

    pub fn config(features: Features) -> TrackerConfig {
        TrackerConfig::new(ENDPOINT, DOMAIN).with_features(features)
    }

    /// Build the tracker without starting it.
    pub fn build(&self, config: TrackerConfig) -> Tracker {
        let host = HostCapabilities::new(
            self.page.clone(),
            self.transport.clone(),
            self.timers.clone(),
        );
        Tracker::new(config, host, Rc::clone(&self.handle)).expect("tracker builds")
    }

    /// Build and start the tracker.
    pub fn install(&self, config: TrackerConfig) -> Tracker {
        let tracker = self.build(config);
        tracker.start(&self.navigation);
        tracker
    }

    pub fn go(&self, href: &str) {
        self.page.set_location(
            plausible_tracker::PageLocation::parse(href).expect("valid test URL"),
        );
    }
}
