//! Plausible Tracker - embeddable page-view and interaction tracking
//!
//! This library reports page views, custom events, outbound link clicks and
//! file downloads to a collection endpoint with fire-and-forget delivery.
//!
//! # Architecture
//!
//! ```text
//! NavigationObserver ─┐
//!                     ├─> TrackerHandle ─> Dispatcher ─> SuppressionPolicy
//! InteractionClassifier┘    (queue)                     └─> Transport
//! ```
//!
//! Everything the tracker needs from its host (the page, the network, a
//! timer, navigation notifications) is a trait, so the same core runs in a
//! browser (the `web` feature on wasm32) and natively (see the CLI crate).
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//! use plausible_tracker::{
//!     DetachedPage, DryRunTransport, HostCapabilities, NavigationBus, TokioScheduler, Tracker,
//!     TrackerConfig, TrackerHandle,
//! };
//!
//! let page = Rc::new(DetachedPage::at("https://example.com/").unwrap());
//! let host = HostCapabilities::new(page, Rc::new(DryRunTransport), Rc::new(TokioScheduler));
//! let config = TrackerConfig::new("https://plausible.io/api/event", "example.com");
//!
//! let tracker = Tracker::new(config, host, Rc::new(TrackerHandle::new())).unwrap();
//! tracker.start(&NavigationBus::new());
//! ```

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod filter;
pub mod glob;
pub mod navigation;
pub mod page;
pub mod queue;
pub mod scheduler;
pub mod tracker;
pub mod transport;

#[cfg(not(target_arch = "wasm32"))]
pub mod logging;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub mod web;

pub use classifier::{find_trackable_anchor, Anchor, ClickEvent, ClickOutcome, InteractionClassifier};
pub use config::{ConfigSource, Features, IniSource, Routing, TrackerConfig};
pub use dispatcher::{DispatchOutcome, Dispatcher, EventSink};
pub use error::{TrackerError, TrackerResult};
pub use event::{EventOptions, Properties, FILE_DOWNLOAD, OUTBOUND_LINK_CLICK, PAGEVIEW};
pub use filter::{SuppressReason, SuppressionDecision};
pub use glob::{ExclusionPattern, ExclusionRules};
pub use navigation::{NavigationBus, NavigationObserver, NavigationTrigger, RoutingStrategy};
pub use page::{DetachedPage, Page, PageLocation, Visibility};
pub use queue::{PendingCallQueue, TrackerHandle};
pub use scheduler::Scheduler;
pub use tracker::{HostCapabilities, Tracker};
pub use transport::{DryRunTransport, EventRequest, Transport};

#[cfg(not(target_arch = "wasm32"))]
pub use scheduler::TokioScheduler;
#[cfg(not(target_arch = "wasm32"))]
pub use transport::ReqwestTransport;
